//! WebPubSub 事件接入错误类型定义
//!
//! 所有解析、校验失败都以类型化错误返回，宿主层按 [`ErrorKind`] 决定
//! 返回 401 还是 400 等协议级拒绝。

use thiserror::Error;

use crate::events::EventErrorCode;

/// 错误种类，便于宿主层按种类匹配
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MissingConnectionId,
    BadRequestBody,
    UnsupportedEvent,
    SignatureInvalid,
    StateEncodingOverflow,
}

/// 事件接入错误
#[derive(Debug, Error)]
pub enum WebPubSubError {
    /// 缺少 ce-connectionId 头
    #[error("Missing connection id header")]
    MissingConnectionId,

    /// 请求体无法解析（JSON 非法、状态头损坏等）
    #[error("Bad request body: {0}")]
    BadRequestBody(String),

    /// 无法识别的事件分类
    #[error("Unsupported event: {0}")]
    UnsupportedEvent(String),

    /// 签名校验失败
    #[error("Invalid signature for connection {connection_id}")]
    SignatureInvalid { connection_id: String },

    /// 连接状态超出最大分片数
    #[error("Connection state needs {required} chunks but at most {max_chunks} are allowed")]
    StateEncodingOverflow { required: usize, max_chunks: usize },
}

/// 事件接入结果类型
pub type Result<T> = std::result::Result<T, WebPubSubError>;

impl WebPubSubError {
    pub fn bad_body(err: impl std::fmt::Display) -> Self {
        WebPubSubError::BadRequestBody(err.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            WebPubSubError::MissingConnectionId => ErrorKind::MissingConnectionId,
            WebPubSubError::BadRequestBody(_) => ErrorKind::BadRequestBody,
            WebPubSubError::UnsupportedEvent(_) => ErrorKind::UnsupportedEvent,
            WebPubSubError::SignatureInvalid { .. } => ErrorKind::SignatureInvalid,
            WebPubSubError::StateEncodingOverflow { .. } => ErrorKind::StateEncodingOverflow,
        }
    }

    /// 映射为回复给服务端的错误码
    pub fn error_code(&self) -> EventErrorCode {
        match self.kind() {
            ErrorKind::SignatureInvalid => EventErrorCode::Unauthorized,
            ErrorKind::StateEncodingOverflow => EventErrorCode::ServerError,
            ErrorKind::MissingConnectionId
            | ErrorKind::BadRequestBody
            | ErrorKind::UnsupportedEvent => EventErrorCode::UserError,
        }
    }
}
