//! 入站消息路由：原始落库 -> 解析 -> 解码/分类 -> 分路写入。
//!
//! 每条消息先原样写入，再尝试派生数据；任何一步失败只结束当前消息，
//! 不向调用方抛错，也不影响下一条消息。

use async_trait::async_trait;
use domain::{MessageCategory, RawMessage, SensorRecord};
use metbridge_ingest::{IngestError, RawMessageHandler};
use metbridge_normalize::{classify_message, envelope_records, parse_payload};
use metbridge_storage::{PersistenceGateway, StorageError};
use metbridge_telemetry::{
    new_message_id, record_gateway_reconnect, record_gateway_unavailable,
    record_malformed_payload, record_message_received, record_non_json_payload,
    record_raw_store_failure, record_raw_stored, record_sensor_stored, record_status_stored,
    record_storage_failure, record_unclassified,
};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// 写入阶段（用于日志与结果）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Raw,
    Sensor,
    Status,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Raw => "raw",
            Stage::Sensor => "sensor",
            Stage::Status => "status",
        }
    }
}

/// 单条消息的处理结果（调用方可以忽略）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// 存储不可用且重连失败，消息未落库
    GatewayUnavailable,
    /// 写入失败；Raw 阶段失败意味着整条消息丢失
    StoreFailed(Stage),
    /// 非 JSON，仅保存原始消息
    NotJson,
    /// JSON 但不是对象，仅保存原始消息
    MalformedPayload,
    SensorStored { records: usize },
    StatusStored { station_name: String },
    /// 未分类，仅保存原始消息
    Unclassified,
}

/// 路由参数。
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// 单次写入失败后的额外重试次数（0 表示不重试）
    pub max_retries: usize,
    pub retry_backoff: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

struct RouterInner {
    gateway: Arc<dyn PersistenceGateway>,
    config: RouterConfig,
}

/// 入站消息路由。
///
/// 除注入的持久化网关外不保存跨消息状态。
#[derive(Clone)]
pub struct IngestRouter {
    inner: Arc<RouterInner>,
}

impl IngestRouter {
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self::with_config(gateway, RouterConfig::default())
    }

    pub fn with_config(gateway: Arc<dyn PersistenceGateway>, config: RouterConfig) -> Self {
        Self {
            inner: Arc::new(RouterInner { gateway, config }),
        }
    }

    /// 处理一条入站消息，不返回错误。
    pub async fn process(&self, topic: &str, payload: &[u8]) -> ProcessOutcome {
        let span = info_span!("message", message_id = %new_message_id(), topic = %topic);
        self.process_inner(topic, payload).instrument(span).await
    }

    async fn process_inner(&self, topic: &str, payload: &[u8]) -> ProcessOutcome {
        record_message_received();
        info!(
            target: "metbridge.pipeline",
            payload_size = payload.len(),
            "raw_message_received"
        );

        if !self.ensure_gateway().await {
            return ProcessOutcome::GatewayUnavailable;
        }

        // 1. 原始消息无条件落库
        if let Err(err) = self
            .with_retry(Stage::Raw, || self.inner.gateway.store_raw(topic, payload))
            .await
        {
            record_raw_store_failure();
            error!(
                target: "metbridge.pipeline",
                stage = Stage::Raw.as_str(),
                error = %err,
                "raw_store_failed"
            );
            return ProcessOutcome::StoreFailed(Stage::Raw);
        }
        record_raw_stored();
        debug!(target: "metbridge.pipeline", "raw_message_stored");

        // 2. 解析 JSON
        let json = match parse_payload(payload) {
            Ok(json) => json,
            Err(err) => {
                record_non_json_payload();
                warn!(target: "metbridge.pipeline", error = %err, "non_json_payload");
                return ProcessOutcome::NotJson;
            }
        };

        // 3/4. 解码优先，其次按 topic 分类
        let category = match classify_message(topic, &json) {
            Ok(category) => category,
            Err(err) => {
                record_malformed_payload();
                warn!(target: "metbridge.pipeline", error = %err, "malformed_payload");
                return ProcessOutcome::MalformedPayload;
            }
        };
        debug!(target: "metbridge.pipeline", category = category.kind(), "message_classified");

        match category {
            MessageCategory::SensorTable(envelope) => {
                let records = envelope_records(&envelope);
                self.store_sensor(&envelope.station_name, &envelope.table_name, &records)
                    .await
            }
            MessageCategory::DeviceStatus {
                station_name,
                payload,
            } => self.store_status(station_name, &payload).await,
            MessageCategory::Unclassified => {
                record_unclassified();
                info!(target: "metbridge.pipeline", "unclassified_message");
                ProcessOutcome::Unclassified
            }
        }
    }

    async fn store_sensor(
        &self,
        station_name: &str,
        table_name: &str,
        records: &[SensorRecord],
    ) -> ProcessOutcome {
        let result = self
            .with_retry(Stage::Sensor, || {
                self.inner
                    .gateway
                    .store_sensor_records(station_name, table_name, records)
            })
            .await;
        match result {
            Ok(()) => {
                record_sensor_stored(records.len());
                info!(
                    target: "metbridge.pipeline",
                    station_name = %station_name,
                    table_name = %table_name,
                    records = records.len(),
                    "sensor_records_stored"
                );
                ProcessOutcome::SensorStored {
                    records: records.len(),
                }
            }
            Err(err) => {
                record_storage_failure();
                error!(
                    target: "metbridge.pipeline",
                    stage = Stage::Sensor.as_str(),
                    station_name = %station_name,
                    table_name = %table_name,
                    records = records.len(),
                    error = %err,
                    "sensor_store_failed"
                );
                ProcessOutcome::StoreFailed(Stage::Sensor)
            }
        }
    }

    async fn store_status(&self, station_name: String, payload: &Value) -> ProcessOutcome {
        let result = self
            .with_retry(Stage::Status, || {
                self.inner.gateway.store_status(&station_name, payload)
            })
            .await;
        match result {
            Ok(()) => {
                record_status_stored();
                info!(
                    target: "metbridge.pipeline",
                    station_name = %station_name,
                    "status_stored"
                );
                ProcessOutcome::StatusStored { station_name }
            }
            Err(err) => {
                record_storage_failure();
                error!(
                    target: "metbridge.pipeline",
                    stage = Stage::Status.as_str(),
                    station_name = %station_name,
                    error = %err,
                    "status_store_failed"
                );
                ProcessOutcome::StoreFailed(Stage::Status)
            }
        }
    }

    /// 连接不可用时请求网关重连；重连失败则放弃当前消息。
    async fn ensure_gateway(&self) -> bool {
        if self.inner.gateway.is_usable().await {
            return true;
        }
        warn!(target: "metbridge.pipeline", "gateway_unusable_reconnecting");
        match self.inner.gateway.reconnect().await {
            Ok(()) => {
                record_gateway_reconnect();
                info!(target: "metbridge.pipeline", "gateway_reconnected");
                true
            }
            Err(err) => {
                record_gateway_unavailable();
                error!(
                    target: "metbridge.pipeline",
                    error = %err,
                    "gateway_reconnect_failed_message_lost"
                );
                false
            }
        }
    }

    async fn with_retry<F, Fut>(&self, stage: Stage, mut op: F) -> Result<(), StorageError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), StorageError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    attempt += 1;
                    if attempt > self.inner.config.max_retries {
                        return Err(err);
                    }
                    debug!(
                        target: "metbridge.pipeline",
                        stage = stage.as_str(),
                        attempt = attempt,
                        error = %err,
                        "store_retry"
                    );
                    tokio::time::sleep(self.inner.config.retry_backoff).await;
                }
            }
        }
    }
}

#[async_trait]
impl RawMessageHandler for IngestRouter {
    async fn handle(&self, message: RawMessage) -> Result<(), IngestError> {
        let _ = self.process(&message.topic, &message.payload).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tracing_test::traced_test;

    const SENSOR_TOPIC: &str = "cs/v1/ST1/datatables/Five_Min";
    const SENSOR_PAYLOAD: &str = r#"{"head":{"environment":{"station_name":"ST1","table_name":"Five_Min"},"fields":[{"name":"TIMESTAMP"},{"name":"RECORD"},{"name":"Temp_C_Avg"}]},"data":[["2024-01-01T00:00:00",1,21.5]]}"#;

    /// 可编排失败次数的网关。
    #[derive(Default)]
    struct ScriptedGateway {
        raw_calls: AtomicUsize,
        sensor_calls: AtomicUsize,
        status_calls: AtomicUsize,
        reconnect_calls: AtomicUsize,
        raw_failures: AtomicUsize,
        sensor_failures: AtomicUsize,
        unusable: AtomicBool,
        reconnect_fails: bool,
    }

    impl ScriptedGateway {
        fn failing_sensor(times: usize) -> Self {
            let gateway = Self::default();
            gateway.sensor_failures.store(times, Ordering::SeqCst);
            gateway
        }

        fn take_failure(counter: &AtomicUsize) -> bool {
            counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    #[async_trait]
    impl PersistenceGateway for ScriptedGateway {
        async fn store_raw(&self, _topic: &str, _payload: &[u8]) -> Result<(), StorageError> {
            self.raw_calls.fetch_add(1, Ordering::SeqCst);
            if Self::take_failure(&self.raw_failures) {
                return Err(StorageError::new("forced raw failure"));
            }
            Ok(())
        }

        async fn store_sensor_records(
            &self,
            _station_name: &str,
            _table_name: &str,
            _records: &[SensorRecord],
        ) -> Result<(), StorageError> {
            self.sensor_calls.fetch_add(1, Ordering::SeqCst);
            if Self::take_failure(&self.sensor_failures) {
                return Err(StorageError::new("forced sensor failure"));
            }
            Ok(())
        }

        async fn store_status(
            &self,
            _station_name: &str,
            _status_payload: &Value,
        ) -> Result<(), StorageError> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn is_usable(&self) -> bool {
            !self.unusable.load(Ordering::SeqCst)
        }

        async fn reconnect(&self) -> Result<(), StorageError> {
            self.reconnect_calls.fetch_add(1, Ordering::SeqCst);
            if self.reconnect_fails {
                return Err(StorageError::new("connection refused"));
            }
            self.unusable.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    fn retrying(max_retries: usize) -> RouterConfig {
        RouterConfig {
            max_retries,
            retry_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn sensor_failure_keeps_committed_raw_row() {
        let gateway = Arc::new(ScriptedGateway::failing_sensor(usize::MAX));
        let router = IngestRouter::new(gateway.clone());

        let outcome = router.process(SENSOR_TOPIC, SENSOR_PAYLOAD.as_bytes()).await;

        assert_eq!(outcome, ProcessOutcome::StoreFailed(Stage::Sensor));
        assert_eq!(gateway.raw_calls.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.sensor_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_recovers_transient_sensor_failure() {
        let gateway = Arc::new(ScriptedGateway::failing_sensor(1));
        let router = IngestRouter::with_config(gateway.clone(), retrying(1));

        let outcome = router.process(SENSOR_TOPIC, SENSOR_PAYLOAD.as_bytes()).await;

        assert_eq!(outcome, ProcessOutcome::SensorStored { records: 1 });
        assert_eq!(gateway.sensor_calls.load(Ordering::SeqCst), 2);
        assert_eq!(gateway.raw_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_retries() {
        let gateway = Arc::new(ScriptedGateway::failing_sensor(10));
        let router = IngestRouter::with_config(gateway.clone(), retrying(2));

        let outcome = router.process(SENSOR_TOPIC, SENSOR_PAYLOAD.as_bytes()).await;

        assert_eq!(outcome, ProcessOutcome::StoreFailed(Stage::Sensor));
        assert_eq!(gateway.sensor_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn raw_failure_stops_processing() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.raw_failures.store(1, Ordering::SeqCst);
        let router = IngestRouter::new(gateway.clone());

        let outcome = router.process(SENSOR_TOPIC, SENSOR_PAYLOAD.as_bytes()).await;

        assert_eq!(outcome, ProcessOutcome::StoreFailed(Stage::Raw));
        assert_eq!(gateway.sensor_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unusable_gateway_is_reconnected_before_storing() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.unusable.store(true, Ordering::SeqCst);
        let router = IngestRouter::new(gateway.clone());

        let outcome = router
            .process("cs/v1/ST1/statusInfo", br#"{"battery_voltage":12.9}"#)
            .await;

        assert_eq!(
            outcome,
            ProcessOutcome::StatusStored {
                station_name: "ST1".to_string()
            }
        );
        assert_eq!(gateway.reconnect_calls.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.raw_calls.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.status_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_reconnect_drops_message() {
        let gateway = Arc::new(ScriptedGateway {
            reconnect_fails: true,
            ..ScriptedGateway::default()
        });
        gateway.unusable.store(true, Ordering::SeqCst);
        let router = IngestRouter::new(gateway.clone());

        let outcome = router.process(SENSOR_TOPIC, SENSOR_PAYLOAD.as_bytes()).await;

        assert_eq!(outcome, ProcessOutcome::GatewayUnavailable);
        assert_eq!(gateway.raw_calls.load(Ordering::SeqCst), 0);
        assert_eq!(gateway.sensor_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn handler_never_surfaces_storage_errors() {
        let gateway = Arc::new(ScriptedGateway::failing_sensor(usize::MAX));
        let router = IngestRouter::new(gateway.clone());

        let result = router
            .handle(RawMessage::new(SENSOR_TOPIC, SENSOR_PAYLOAD, 0))
            .await;

        assert!(result.is_ok());
        assert_eq!(gateway.raw_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn sensor_failure_is_logged_once_after_retries() {
        let gateway = Arc::new(ScriptedGateway::failing_sensor(usize::MAX));
        let router = IngestRouter::with_config(gateway.clone(), retrying(2));

        let outcome = router.process(SENSOR_TOPIC, SENSOR_PAYLOAD.as_bytes()).await;

        assert_eq!(outcome, ProcessOutcome::StoreFailed(Stage::Sensor));
        logs_assert(|lines: &[&str]| {
            let failures = lines
                .iter()
                .filter(|line| line.contains("sensor_store_failed"))
                .count();
            let retries = lines
                .iter()
                .filter(|line| line.contains("store_retry"))
                .count();
            match (failures, retries) {
                (1, 2) => Ok(()),
                other => Err(format!("unexpected (failures, retries): {other:?}")),
            }
        });
    }

    #[test]
    fn stage_names_are_stable() {
        assert_eq!(Stage::Raw.as_str(), "raw");
        assert_eq!(Stage::Sensor.as_str(), "sensor");
        assert_eq!(Stage::Status.as_str(), "status");
    }
}
