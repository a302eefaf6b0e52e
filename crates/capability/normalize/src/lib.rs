//! 原始报文 -> 分类后的领域消息。
//!
//! 优先级：能解码为 CSIJSON 的报文一律视为数据表消息（即便 topic 含 `statusInfo`），
//! 只有 `NotAnEnvelope` 时才按 topic 判断是否为状态消息。

pub mod envelope;
pub mod topic;

pub use envelope::{decode_envelope, decode_row, envelope_records, parse_payload, zip_values};
pub use topic::{TopicCategory, classify_topic};

use domain::MessageCategory;
use serde_json::Value;

/// 解码错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("not an envelope: {0}")]
    NotAnEnvelope(&'static str),
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// 对已解析的 JSON 报文分类。
///
/// `MalformedPayload` 原样返回，由调用方决定是否继续。
pub fn classify_message(topic: &str, payload: &Value) -> Result<MessageCategory, DecodeError> {
    match decode_envelope(payload) {
        Ok(envelope) => Ok(MessageCategory::SensorTable(envelope)),
        Err(DecodeError::NotAnEnvelope(_)) => Ok(match classify_topic(topic) {
            TopicCategory::DeviceStatus { station_name } => MessageCategory::DeviceStatus {
                station_name,
                payload: payload.clone(),
            },
            TopicCategory::Unclassified => MessageCategory::Unclassified,
        }),
        Err(err) => Err(err),
    }
}
