//! 连接上下文
//!
//! 每个事件请求都会从 CloudEvents 头中解析出一个 [`ConnectionContext`]，
//! 描述发出事件的客户端连接。

use http::HeaderMap;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, WebPubSubError};
use crate::headers::{
    CE_CONNECTION_ID, CE_HUB, CE_SIGNATURE, CE_USER_ID, HOST, WEBHOOK_REQUEST_ORIGIN, first_value,
};
use crate::signature::{self, AccessKeySet};
use crate::state::{ConnectionStateCodec, ConnectionStates, StateUpdates, merge};

/// 事件大类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    System,
    User,
}

/// 单个连接的身份与安全信息
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionContext {
    pub connection_id: String,
    pub hub: String,
    pub user_id: Option<String>,
    pub signature: Option<String>,
    pub origin: String,
    pub states: Option<ConnectionStates>,
    pub event_type: Option<EventType>,
    pub event_name: String,
}

impl ConnectionContext {
    /// 从请求头解析连接上下文
    ///
    /// `ce-connectionId` 缺失或为空时返回 `MissingConnectionId`；
    /// origin 优先取 `WebHook-Request-Origin`，否则回退到 `Host`。
    pub fn from_headers(headers: &HeaderMap, codec: &ConnectionStateCodec) -> Result<Self> {
        let connection_id = first_value(headers, CE_CONNECTION_ID)
            .ok_or(WebPubSubError::MissingConnectionId)?
            .to_string();

        let origin = first_value(headers, WEBHOOK_REQUEST_ORIGIN)
            .or_else(|| first_value(headers, HOST))
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            connection_id,
            hub: first_value(headers, CE_HUB).unwrap_or_default().to_string(),
            user_id: first_value(headers, CE_USER_ID).map(str::to_string),
            signature: first_value(headers, CE_SIGNATURE).map(str::to_string),
            origin,
            states: codec.decode_headers(headers)?,
            event_type: None,
            event_name: String::new(),
        })
    }

    pub fn with_event(mut self, event_type: EventType, event_name: impl Into<String>) -> Self {
        self.event_type = Some(event_type);
        self.event_name = event_name.into();
        self
    }

    pub fn state(&self, key: &str) -> Option<&Value> {
        self.states.as_ref().and_then(|states| states.get(key))
    }

    /// 校验签名，未配置密钥时总是通过
    pub fn is_valid_signature(&self, keys: &AccessKeySet) -> bool {
        signature::verify(&self.connection_id, self.signature.as_deref(), keys)
    }

    pub fn ensure_valid_signature(&self, keys: &AccessKeySet) -> Result<()> {
        if self.is_valid_signature(keys) {
            Ok(())
        } else {
            Err(WebPubSubError::SignatureInvalid {
                connection_id: self.connection_id.clone(),
            })
        }
    }

    /// 在当前状态上应用变更，返回更新后的状态
    pub fn updated_states(&self, updates: &StateUpdates) -> Option<ConnectionStates> {
        merge(self.states.as_ref(), updates)
    }
}
