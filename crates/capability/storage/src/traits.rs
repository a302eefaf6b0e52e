//! 存储接口 Trait 定义
//!
//! PersistenceGateway：三类只追加写入（原始消息、采样记录、状态快照）+ 连接可用性约定。
//!
//! 设计原则：
//! - 每次调用独立成事务，失败不影响之前已提交的写入
//! - 只做 insert，不做 upsert；重试可能产生重复行
//! - 连接是否可用由实现方暴露，调用方只负责在不可用时请求重连

use crate::error::StorageError;
use async_trait::async_trait;
use domain::SensorRecord;
use serde_json::Value;

/// 持久化网关
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// 原样保存一条原始消息
    async fn store_raw(&self, topic: &str, payload: &[u8]) -> Result<(), StorageError>;

    /// 保存同一报文解码出的全部采样记录（按顺序，单事务）
    async fn store_sensor_records(
        &self,
        station_name: &str,
        table_name: &str,
        records: &[SensorRecord],
    ) -> Result<(), StorageError>;

    /// 保存一条状态快照
    async fn store_status(
        &self,
        station_name: &str,
        status_payload: &Value,
    ) -> Result<(), StorageError>;

    /// 当前连接是否可用
    async fn is_usable(&self) -> bool {
        true
    }

    /// 替换当前连接
    async fn reconnect(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
