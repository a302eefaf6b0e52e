//! Topic 分类。
//!
//! 约定：`<namespace>/<version>/<station-id>/statusInfo` 为状态消息，
//! 只依赖 `statusInfo` 段与第 2 段（从 0 计）站点号，不校验完整格式。

use domain::UNKNOWN;

/// 状态消息的 topic 段。
pub const STATUS_SEGMENT: &str = "statusInfo";

/// 站点号所在的段下标。
pub const STATION_SEGMENT_INDEX: usize = 2;

/// 基于 topic 的分类结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicCategory {
    DeviceStatus { station_name: String },
    Unclassified,
}

/// 按 topic 判断是否为状态消息。
///
/// 任一段等于 `statusInfo` 即为状态消息，站点号取第 2 段（段数不足时为 `"unknown"`）。
pub fn classify_topic(topic: &str) -> TopicCategory {
    let segments: Vec<&str> = topic.split('/').collect();
    if !segments.contains(&STATUS_SEGMENT) {
        return TopicCategory::Unclassified;
    }
    TopicCategory::DeviceStatus {
        station_name: station_from_segments(&segments),
    }
}

fn station_from_segments(segments: &[&str]) -> String {
    segments
        .get(STATION_SEGMENT_INDEX)
        .map_or_else(|| UNKNOWN.to_string(), |station| station.to_string())
}
