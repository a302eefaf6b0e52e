//! 气象站采集数据的领域模型。
//!
//! 所有类型都是值对象：由单次消息处理调用创建，除写入存储外不跨消息存活。

pub mod data;

pub use data::{
    Envelope, FieldDescriptor, MessageCategory, RawMessage, SensorRecord, StatusSnapshot,
};

/// 缺失站点名/表名时使用的占位值。
pub const UNKNOWN: &str = "unknown";

/// 当前 Unix 时间戳（毫秒）。
pub fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
