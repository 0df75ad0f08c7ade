//! CloudEvents 事件模型
//!
//! - 分类：`ce-type` / `ce-eventName` → 事件种类
//! - 解析：连接上下文 + 请求体 → [`EventRequest`]
//! - 响应：connect / 用户事件 / 错误响应

mod classifier;
mod parser;
mod request;
mod response;

pub use classifier::{
    CONNECT_EVENT, CONNECTED_EVENT, Classification, DISCONNECT_EVENT, DISCONNECTED_EVENT,
    EventKind, MESSAGE_EVENT, classify, classify_headers, lookup,
};
pub use parser::{EventRequestParser, read_body};
pub use request::{
    ClientCertificate, ConnectEvent, ConnectEventBody, ConnectedEvent, DataType,
    DisconnectEvent, DisconnectedEvent, DisconnectedEventBody, EventRequest, UserMessageEvent,
};
pub use response::{ConnectEventResponse, EventErrorCode, EventErrorResponse, UserEventResponse};
