//! CSIJSON 报文解码。
//!
//! 报文形如 `{"head": {"environment": {...}, "fields": [...]}, "data": [[...], ...]}`，
//! 每行按位置编码：第 0 列时间戳，第 1 列记录号，其余列与 `fields[2..]` 一一对应。

use crate::DecodeError;
use domain::{Envelope, FieldDescriptor, SensorRecord, UNKNOWN};
use serde_json::{Map, Value};

/// 行内保留列数（时间戳 + 记录号）。
pub const LEADING_COLUMNS: usize = 2;

/// 将原始字节解析为 JSON。
pub fn parse_payload(payload: &[u8]) -> Result<Value, DecodeError> {
    serde_json::from_slice(payload).map_err(|err| DecodeError::MalformedPayload(err.to_string()))
}

/// 解码 CSIJSON 报文。
///
/// - 非 JSON 对象：`MalformedPayload`
/// - 缺少 `head`（对象）或 `data`（数组）：`NotAnEnvelope`
/// - 站点名/表名缺失时使用 `"unknown"`，单行异常不会导致整体失败
pub fn decode_envelope(payload: &Value) -> Result<Envelope, DecodeError> {
    let object = payload
        .as_object()
        .ok_or_else(|| DecodeError::MalformedPayload("payload is not a JSON object".to_string()))?;
    let head = match object.get("head") {
        Some(Value::Object(head)) => head,
        Some(_) => return Err(DecodeError::NotAnEnvelope("head is not an object")),
        None => return Err(DecodeError::NotAnEnvelope("missing head")),
    };
    let data = match object.get("data") {
        Some(Value::Array(data)) => data,
        Some(_) => return Err(DecodeError::NotAnEnvelope("data is not an array")),
        None => return Err(DecodeError::NotAnEnvelope("missing data")),
    };

    let environment = match head.get("environment") {
        Some(Value::Object(environment)) => environment.clone(),
        _ => Map::new(),
    };
    let station_name = text_or_unknown(environment.get("station_name"));
    let table_name = text_or_unknown(environment.get("table_name"));

    let field_descriptors = match head.get("fields") {
        Some(Value::Array(fields)) => fields.iter().map(field_descriptor).collect(),
        _ => Vec::new(),
    };

    let rows = data
        .iter()
        .filter_map(|row| row.as_array().cloned())
        .collect();

    Ok(Envelope {
        station_name,
        table_name,
        environment,
        field_descriptors,
        rows,
    })
}

/// 将报文全部可用行转换为 [`SensorRecord`]，保持 `data` 中的顺序。
pub fn envelope_records(envelope: &Envelope) -> Vec<SensorRecord> {
    envelope
        .rows
        .iter()
        .filter_map(|row| decode_row(envelope, row))
        .collect()
}

/// 解码单行；少于 2 列返回 None。
pub fn decode_row(envelope: &Envelope, row: &[Value]) -> Option<SensorRecord> {
    if row.len() < LEADING_COLUMNS {
        return None;
    }
    let descriptors = envelope
        .field_descriptors
        .get(LEADING_COLUMNS..)
        .unwrap_or_default();
    Some(SensorRecord {
        station_name: envelope.station_name.clone(),
        table_name: envelope.table_name.clone(),
        timestamp: timestamp_text(&row[0]),
        sequence_number: sequence_number(&row[1]),
        values: zip_values(descriptors, &row[LEADING_COLUMNS..]),
    })
}

/// 按位置配对字段描述与数值，长度不一致时截断到较短一方；无名字段跳过。
pub fn zip_values(descriptors: &[FieldDescriptor], values: &[Value]) -> Map<String, Value> {
    let mut map = Map::new();
    for (descriptor, value) in descriptors.iter().zip(values) {
        if let Some(name) = &descriptor.name {
            map.insert(name.clone(), value.clone());
        }
    }
    map
}

fn field_descriptor(field: &Value) -> FieldDescriptor {
    let text = |key: &str| {
        field
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    FieldDescriptor {
        name: field.get("name").and_then(Value::as_str).map(str::to_string),
        data_type: text("type"),
        units: text("units"),
    }
}

fn text_or_unknown(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => UNKNOWN.to_string(),
        Some(other) => other.to_string(),
    }
}

fn timestamp_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn sequence_number(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|v| v.fract() == 0.0 && v.abs() < i64::MAX as f64)
                .map(|v| v as i64)
        }),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}
