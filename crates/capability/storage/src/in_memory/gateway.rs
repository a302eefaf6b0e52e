//! 持久化网关内存实现
//!
//! 仅用于本地测试和接线。

use crate::error::StorageError;
use crate::traits::PersistenceGateway;
use domain::{RawMessage, SensorRecord, StatusSnapshot, now_epoch_ms};
use serde_json::Value;
use std::sync::RwLock;

/// 持久化网关内存存储
#[derive(Default)]
pub struct InMemoryGateway {
    raw_messages: RwLock<Vec<RawMessage>>,
    sensor_records: RwLock<Vec<SensorRecord>>,
    status_snapshots: RwLock<Vec<StatusSnapshot>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已保存的原始消息（按写入顺序）
    pub fn raw_messages(&self) -> Vec<RawMessage> {
        self.raw_messages
            .read()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// 已保存的采样记录（按写入顺序）
    pub fn sensor_records(&self) -> Vec<SensorRecord> {
        self.sensor_records
            .read()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// 已保存的状态快照（按写入顺序）
    pub fn status_snapshots(&self) -> Vec<StatusSnapshot> {
        self.status_snapshots
            .read()
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl PersistenceGateway for InMemoryGateway {
    async fn store_raw(&self, topic: &str, payload: &[u8]) -> Result<(), StorageError> {
        let mut messages = self
            .raw_messages
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        messages.push(RawMessage::new(topic, payload, now_epoch_ms()));
        Ok(())
    }

    async fn store_sensor_records(
        &self,
        station_name: &str,
        table_name: &str,
        records: &[SensorRecord],
    ) -> Result<(), StorageError> {
        let mut store = self
            .sensor_records
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        store.extend(records.iter().map(|record| SensorRecord {
            station_name: station_name.to_string(),
            table_name: table_name.to_string(),
            ..record.clone()
        }));
        Ok(())
    }

    async fn store_status(
        &self,
        station_name: &str,
        status_payload: &Value,
    ) -> Result<(), StorageError> {
        let mut snapshots = self
            .status_snapshots
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        snapshots.push(StatusSnapshot {
            station_name: station_name.to_string(),
            status_data: status_payload.clone(),
            received_at_ms: now_epoch_ms(),
        });
        Ok(())
    }
}
