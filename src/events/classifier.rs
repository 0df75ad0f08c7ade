//! 事件分类
//!
//! 根据 `ce-type` 前缀区分系统事件与用户事件，再通过分类表确定具体事件。

use http::HeaderMap;
use tracing::debug;

use crate::context::EventType;
use crate::error::{Result, WebPubSubError};
use crate::headers::{CE_EVENT_NAME, CE_TYPE, TYPE_SYSTEM_PREFIX, TYPE_USER_PREFIX, first_value};

pub const CONNECT_EVENT: &str = "connect";
pub const CONNECTED_EVENT: &str = "connected";
pub const DISCONNECTED_EVENT: &str = "disconnected";
pub const DISCONNECT_EVENT: &str = "disconnect";
pub const MESSAGE_EVENT: &str = "message";

/// 具体事件种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connect,
    Connected,
    Disconnected,
    Disconnect,
    UserMessage,
}

/// 分类结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub event_type: EventType,
    pub event_name: String,
    pub kind: EventKind,
}

/// 分类表：`(大类, 事件名) -> 事件种类`。
/// 用户事件不区分名字，统一交给消息处理。
pub fn lookup(event_type: EventType, event_name: &str) -> Option<EventKind> {
    match (event_type, event_name) {
        (EventType::System, name) if name.eq_ignore_ascii_case(CONNECT_EVENT) => {
            Some(EventKind::Connect)
        }
        (EventType::System, name) if name.eq_ignore_ascii_case(CONNECTED_EVENT) => {
            Some(EventKind::Connected)
        }
        (EventType::System, name) if name.eq_ignore_ascii_case(DISCONNECTED_EVENT) => {
            Some(EventKind::Disconnected)
        }
        (EventType::System, name) if name.eq_ignore_ascii_case(DISCONNECT_EVENT) => {
            Some(EventKind::Disconnect)
        }
        (EventType::System, _) => None,
        (EventType::User, _) => Some(EventKind::UserMessage),
    }
}

/// 根据 `ce-type` 与 `ce-eventName` 分类。
///
/// `ce-eventName` 存在时优先；否则取 `ce-type` 去掉前缀后的部分。
pub fn classify(ce_type: Option<&str>, ce_event_name: Option<&str>) -> Result<Classification> {
    let ce_type = ce_type
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| WebPubSubError::UnsupportedEvent("missing ce-type header".to_string()))?;

    let (event_type, remainder) =
        if let Some(rest) = strip_prefix_ignore_case(ce_type, TYPE_SYSTEM_PREFIX) {
            (EventType::System, rest)
        } else if let Some(rest) = strip_prefix_ignore_case(ce_type, TYPE_USER_PREFIX) {
            (EventType::User, rest)
        } else {
            return Err(WebPubSubError::UnsupportedEvent(format!(
                "unknown event type: {ce_type}"
            )));
        };

    let event_name = ce_event_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(remainder);
    let event_name = if event_name.is_empty() && event_type == EventType::User {
        MESSAGE_EVENT
    } else {
        event_name
    };

    let kind = lookup(event_type, event_name).ok_or_else(|| {
        WebPubSubError::UnsupportedEvent(format!("unknown system event: {event_name}"))
    })?;

    debug!(?event_type, event_name, ?kind, "classified event");
    Ok(Classification {
        event_type,
        event_name: event_name.to_string(),
        kind,
    })
}

/// 从请求头分类
pub fn classify_headers(headers: &HeaderMap) -> Result<Classification> {
    classify(first_value(headers, CE_TYPE), first_value(headers, CE_EVENT_NAME))
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &value[prefix.len()..])
}
