//! Flare WebPubSub 事件接入协议层
//!
//! 把网关以 CloudEvents 形式投递到订阅方 HTTP 端点的生命周期事件与
//! 消息事件解析为类型化对象：
//!
//! - [`events`]：事件分类与请求解析
//! - [`signature`]：基于 HMAC-SHA256 的连接签名校验，支持密钥轮换
//! - [`state`]：连接状态的分片头编解码与合并
//! - [`abuse`]：WebHook 预检（滥用保护）
//! - [`dispatcher`]：串联以上步骤并回调业务 Hub
//!
//! 不包含 HTTP 传输、路由与响应写出，这些由宿主层负责。

pub mod abuse;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod headers;
pub mod signature;
pub mod state;
pub mod tracing;
pub mod validation;

pub use abuse::{AbuseProtectionGuard, AllowedOriginSet, Preflight, check_preflight, origin_allowed};
pub use config::{LoggingConfig, WebPubSubConfig, load_config};
pub use context::{ConnectionContext, EventType};
pub use dispatcher::{DispatchOutcome, EventDispatcher, StateChange, WebPubSubHub, WebhookRequest};
pub use error::{ErrorKind, Result, WebPubSubError};
pub use events::{
    ConnectEvent, ConnectEventResponse, ConnectedEvent, DataType, DisconnectEvent,
    DisconnectedEvent, EventErrorCode, EventErrorResponse, EventRequest, EventRequestParser,
    UserEventResponse, UserMessageEvent,
};
pub use signature::{AccessKey, AccessKeySet};
pub use state::{ConnectionStateCodec, ConnectionStates, StateCodecConfig, StateUpdates};
pub use validation::ValidationOptions;
