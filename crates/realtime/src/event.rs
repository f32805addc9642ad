//! 实体状态事件与传输帧

use icu_common::{EntityKind, IcuStatus};
use icu_errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// ICU 状态变更的主题名
pub const ICU_STATUS_TOPIC: &str = "icuStatusUpdate";

/// 实体类别对应的主题
pub fn topic_for(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Icu => ICU_STATUS_TOPIC,
    }
}

/// 实体状态变更事件
///
/// 不携带时间戳，投递顺序即先后顺序。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityStatusEvent {
    pub entity_id: String,
    pub entity_kind: EntityKind,
    pub new_status: IcuStatus,
}

impl EntityStatusEvent {
    pub fn icu(entity_id: impl Into<String>, new_status: IcuStatus) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_kind: EntityKind::Icu,
            new_status,
        }
    }

    pub fn topic(&self) -> &'static str {
        topic_for(self.entity_kind)
    }
}

/// ICU 主题上的消息负载
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IcuStatusPayload {
    pub icu_id: String,
    pub new_status: IcuStatus,
}

/// 传输帧：具名事件信封 `{"event": <topic>, "data": <payload>}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusFrame {
    pub event: String,
    pub data: serde_json::Value,
}

impl StatusFrame {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn from_event(event: &EntityStatusEvent) -> Self {
        let payload = match event.entity_kind {
            EntityKind::Icu => IcuStatusPayload {
                icu_id: event.entity_id.clone(),
                new_status: event.new_status,
            },
        };
        // 只含字符串和单元枚举的结构体序列化不会失败
        let data = serde_json::to_value(payload).unwrap_or(serde_json::Value::Null);
        Self::new(event.topic(), data)
    }

    /// 解码为状态事件
    pub fn decode_status(&self) -> AppResult<EntityStatusEvent> {
        if self.event != ICU_STATUS_TOPIC {
            return Err(AppError::validation(format!(
                "Topic {} does not carry status events",
                self.event
            )));
        }

        let payload: IcuStatusPayload = serde_json::from_value(self.data.clone())
            .map_err(|e| AppError::validation(format!("Malformed {} payload: {}", self.event, e)))?;

        Ok(EntityStatusEvent::icu(payload.icu_id, payload.new_status))
    }

    pub fn to_json(&self) -> AppResult<String> {
        serde_json::to_string(self)
            .map_err(|e| AppError::internal(format!("Failed to serialize frame: {}", e)))
    }

    pub fn from_json(raw: &str) -> AppResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| AppError::validation(format!("Failed to parse frame: {}", e)))
    }
}
