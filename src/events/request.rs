//! 事件请求模型

use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};

use crate::context::ConnectionContext;
use crate::headers::{CONTENT_TYPE_BINARY, CONTENT_TYPE_JSON, CONTENT_TYPE_TEXT};

/// 消息数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Text,
    Binary,
    Json,
}

impl DataType {
    /// 根据 content-type 推断，忽略参数与大小写
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let media_type = content_type
            .and_then(|value| value.split(';').next())
            .map(str::trim)
            .unwrap_or_default();
        if media_type.eq_ignore_ascii_case(CONTENT_TYPE_TEXT) {
            DataType::Text
        } else if media_type.eq_ignore_ascii_case(CONTENT_TYPE_JSON) {
            DataType::Json
        } else {
            DataType::Binary
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            DataType::Text => CONTENT_TYPE_TEXT,
            DataType::Json => CONTENT_TYPE_JSON,
            DataType::Binary => CONTENT_TYPE_BINARY,
        }
    }
}

/// 客户端证书
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCertificate {
    pub thumbprint: String,
}

impl ClientCertificate {
    pub fn new(thumbprint: impl Into<String>) -> Self {
        Self {
            thumbprint: thumbprint.into(),
        }
    }
}

/// connect 事件请求体，缺失的字段默认为空集合
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectEventBody {
    #[serde(deserialize_with = "null_as_default")]
    pub claims: HashMap<String, Vec<String>>,
    #[serde(deserialize_with = "null_as_default")]
    pub query: HashMap<String, Vec<String>>,
    #[serde(deserialize_with = "null_as_default")]
    pub subprotocols: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub client_certificates: Vec<ClientCertificate>,
}

/// disconnected / disconnect 事件请求体
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisconnectedEventBody {
    #[serde(deserialize_with = "null_as_default")]
    pub reason: String,
}

/// 显式的 `null` 与缺失字段同样处理
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// connect 事件：客户端请求建立连接
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectEvent {
    pub context: ConnectionContext,
    pub claims: HashMap<String, Vec<String>>,
    pub query: HashMap<String, Vec<String>>,
    pub subprotocols: Vec<String>,
    pub client_certificates: Vec<ClientCertificate>,
}

/// connected 事件：连接已建立
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectedEvent {
    pub context: ConnectionContext,
}

/// disconnected 事件：连接已断开
#[derive(Debug, Clone, PartialEq)]
pub struct DisconnectedEvent {
    pub context: ConnectionContext,
    pub reason: String,
}

/// disconnect 事件：连接即将断开
#[derive(Debug, Clone, PartialEq)]
pub struct DisconnectEvent {
    pub context: ConnectionContext,
    pub reason: String,
}

/// 用户消息事件，`data` 保持原始字节
#[derive(Debug, Clone, PartialEq)]
pub struct UserMessageEvent {
    pub context: ConnectionContext,
    pub data: Bytes,
    pub data_type: DataType,
}

/// 解析后的事件请求，每个请求恰好对应一种
#[derive(Debug, Clone, PartialEq)]
pub enum EventRequest {
    Connect(ConnectEvent),
    Connected(ConnectedEvent),
    Disconnected(DisconnectedEvent),
    Disconnect(DisconnectEvent),
    UserMessage(UserMessageEvent),
}

impl EventRequest {
    pub fn context(&self) -> &ConnectionContext {
        match self {
            EventRequest::Connect(event) => &event.context,
            EventRequest::Connected(event) => &event.context,
            EventRequest::Disconnected(event) => &event.context,
            EventRequest::Disconnect(event) => &event.context,
            EventRequest::UserMessage(event) => &event.context,
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.context().connection_id
    }
}
