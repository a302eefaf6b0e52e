//! 日志初始化、消息关联 ID 与基础计数。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 基础指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub raw_stored: u64,
    pub raw_store_failures: u64,
    pub non_json_payloads: u64,
    pub malformed_payloads: u64,
    pub sensor_messages_stored: u64,
    pub sensor_records_stored: u64,
    pub status_stored: u64,
    pub unclassified: u64,
    pub storage_failures: u64,
    pub gateway_reconnects: u64,
    pub gateway_unavailable: u64,
}

/// 基础指标。
pub struct TelemetryMetrics {
    messages_received: AtomicU64,
    raw_stored: AtomicU64,
    raw_store_failures: AtomicU64,
    non_json_payloads: AtomicU64,
    malformed_payloads: AtomicU64,
    sensor_messages_stored: AtomicU64,
    sensor_records_stored: AtomicU64,
    status_stored: AtomicU64,
    unclassified: AtomicU64,
    storage_failures: AtomicU64,
    gateway_reconnects: AtomicU64,
    gateway_unavailable: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            raw_stored: AtomicU64::new(0),
            raw_store_failures: AtomicU64::new(0),
            non_json_payloads: AtomicU64::new(0),
            malformed_payloads: AtomicU64::new(0),
            sensor_messages_stored: AtomicU64::new(0),
            sensor_records_stored: AtomicU64::new(0),
            status_stored: AtomicU64::new(0),
            unclassified: AtomicU64::new(0),
            storage_failures: AtomicU64::new(0),
            gateway_reconnects: AtomicU64::new(0),
            gateway_unavailable: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            raw_stored: self.raw_stored.load(Ordering::Relaxed),
            raw_store_failures: self.raw_store_failures.load(Ordering::Relaxed),
            non_json_payloads: self.non_json_payloads.load(Ordering::Relaxed),
            malformed_payloads: self.malformed_payloads.load(Ordering::Relaxed),
            sensor_messages_stored: self.sensor_messages_stored.load(Ordering::Relaxed),
            sensor_records_stored: self.sensor_records_stored.load(Ordering::Relaxed),
            status_stored: self.status_stored.load(Ordering::Relaxed),
            unclassified: self.unclassified.load(Ordering::Relaxed),
            storage_failures: self.storage_failures.load(Ordering::Relaxed),
            gateway_reconnects: self.gateway_reconnects.load(Ordering::Relaxed),
            gateway_unavailable: self.gateway_unavailable.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info，可用 RUST_LOG 覆盖）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成单条消息的关联 ID。
pub fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 记录入站消息次数。
pub fn record_message_received() {
    metrics().messages_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录原始消息写入成功次数。
pub fn record_raw_stored() {
    metrics().raw_stored.fetch_add(1, Ordering::Relaxed);
}

/// 记录原始消息写入失败次数（该消息完全丢失）。
pub fn record_raw_store_failure() {
    metrics().raw_store_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录非 JSON 报文次数。
pub fn record_non_json_payload() {
    metrics().non_json_payloads.fetch_add(1, Ordering::Relaxed);
}

/// 记录非 JSON 对象报文次数。
pub fn record_malformed_payload() {
    metrics().malformed_payloads.fetch_add(1, Ordering::Relaxed);
}

/// 记录采样数据写入（消息数 + 记录数）。
pub fn record_sensor_stored(records: usize) {
    let metrics = metrics();
    metrics
        .sensor_messages_stored
        .fetch_add(1, Ordering::Relaxed);
    metrics
        .sensor_records_stored
        .fetch_add(records as u64, Ordering::Relaxed);
}

/// 记录状态快照写入次数。
pub fn record_status_stored() {
    metrics().status_stored.fetch_add(1, Ordering::Relaxed);
}

/// 记录未分类消息次数。
pub fn record_unclassified() {
    metrics().unclassified.fetch_add(1, Ordering::Relaxed);
}

/// 记录派生数据写入失败次数。
pub fn record_storage_failure() {
    metrics().storage_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录重连成功次数。
pub fn record_gateway_reconnect() {
    metrics().gateway_reconnects.fetch_add(1, Ordering::Relaxed);
}

/// 记录因存储不可用而丢弃的消息次数。
pub fn record_gateway_unavailable() {
    metrics().gateway_unavailable.fetch_add(1, Ordering::Relaxed);
}
