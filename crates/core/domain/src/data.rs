use serde_json::{Map, Value};

/// 传输层投递的原始消息（按原样落库，不依赖解码结果）。
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received_at_ms: i64,
}

impl RawMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>, received_at_ms: i64) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at_ms,
        }
    }
}

/// 数据表字段描述（与行内数值按位置对应）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// 缺少 `name` 的描述仍占位，但对应列不会进入 values。
    pub name: Option<String>,
    pub data_type: String,
    pub units: String,
}

/// 解码后的 CSIJSON 数据表报文。
///
/// 约定：`field_descriptors` 与 `rows` 的前两个位置分别是时间戳和记录号（按位置，不按字段名）。
/// `rows` 保留原始行，少于 2 列的行在生成 [`SensorRecord`] 时被跳过。
#[derive(Debug, Clone)]
pub struct Envelope {
    pub station_name: String,
    pub table_name: String,
    pub environment: Map<String, Value>,
    pub field_descriptors: Vec<FieldDescriptor>,
    pub rows: Vec<Vec<Value>>,
}

/// 一行采样数据。
#[derive(Debug, Clone, PartialEq)]
pub struct SensorRecord {
    pub station_name: String,
    pub table_name: String,
    /// 采集器上报的时间戳文本（例如 `2024-01-01T00:00:00`）；JSON null 时为 None。
    pub timestamp: Option<String>,
    /// 记录号；非整数时为 None。
    pub sequence_number: Option<i64>,
    pub values: Map<String, Value>,
}

/// 设备状态快照（站点名取自 topic，而不是报文体）。
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub station_name: String,
    pub status_data: Value,
    pub received_at_ms: i64,
}

/// 入站消息分类。
#[derive(Debug, Clone)]
pub enum MessageCategory {
    SensorTable(Envelope),
    DeviceStatus { station_name: String, payload: Value },
    Unclassified,
}

impl MessageCategory {
    /// 分类名称（用于日志字段）。
    pub fn kind(&self) -> &'static str {
        match self {
            MessageCategory::SensorTable(_) => "sensor_table",
            MessageCategory::DeviceStatus { .. } => "device_status",
            MessageCategory::Unclassified => "unclassified",
        }
    }
}
