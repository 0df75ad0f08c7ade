//! 事件响应模型

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

use crate::state::StateUpdates;

use super::request::DataType;

/// 错误响应码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventErrorCode {
    /// 鉴权失败
    Unauthorized,
    /// 请求本身有问题
    UserError,
    /// 服务端内部错误
    ServerError,
}

/// 错误响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventErrorResponse {
    pub code: EventErrorCode,
    pub message: String,
}

impl EventErrorResponse {
    pub fn new(code: EventErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&crate::error::WebPubSubError> for EventErrorResponse {
    fn from(err: &crate::error::WebPubSubError) -> Self {
        Self::new(err.error_code(), err.to_string())
    }
}

/// connect 事件响应
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectEventResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subprotocol: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    /// 状态变更通过响应头回传，不进入响应体
    #[serde(skip)]
    pub states: StateUpdates,
}

impl ConnectEventResponse {
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_subprotocol(mut self, subprotocol: impl Into<String>) -> Self {
        self.subprotocol = Some(subprotocol.into());
        self
    }

    pub fn join_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn set_state(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.states.set(key, value);
    }

    pub fn remove_state(&mut self, key: impl Into<String>) {
        self.states.remove(key);
    }

    pub fn clear_states(&mut self) {
        self.states.clear_all();
    }
}

/// 用户事件响应，可选地回复一条消息
#[derive(Debug, Clone, PartialEq)]
pub struct UserEventResponse {
    pub data: Bytes,
    pub data_type: DataType,
    pub states: StateUpdates,
}

impl UserEventResponse {
    pub fn new(data: impl Into<Bytes>, data_type: DataType) -> Self {
        Self {
            data: data.into(),
            data_type,
            states: StateUpdates::default(),
        }
    }

    pub fn text(data: impl Into<String>) -> Self {
        let data: String = data.into();
        Self::new(data, DataType::Text)
    }

    pub fn set_state(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.states.set(key, value);
    }

    pub fn remove_state(&mut self, key: impl Into<String>) {
        self.states.remove(key);
    }

    pub fn clear_states(&mut self) {
        self.states.clear_all();
    }
}
