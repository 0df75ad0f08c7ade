//! 事件调度
//!
//! [`EventDispatcher`] 串起预检、分类解析、签名校验与业务回调：
//!
//! 1. `OPTIONS` 预检直接由滥用保护处理，不进入分类
//! 2. 分类并解析出 [`EventRequest`]
//! 3. 配置了密钥时校验签名
//! 4. 调用 [`WebPubSubHub`]，并把响应中的状态变更编码为响应头
//!
//! 调度器只产出 [`DispatchOutcome`]，HTTP 响应由宿主层写出。

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use tracing::{debug, info, warn};

use crate::abuse::{AbuseProtectionGuard, Preflight, check_preflight_headers};
use crate::context::ConnectionContext;
use crate::error::{Result, WebPubSubError};
use crate::events::{
    ConnectEvent, ConnectEventResponse, ConnectedEvent, DisconnectEvent, DisconnectedEvent,
    EventErrorResponse, EventRequest, EventRequestParser, UserEventResponse, UserMessageEvent,
    read_body,
};
use crate::headers::CE_CONNECTION_STATE;
use crate::state::{ConnectionStateCodec, StateUpdates};
use crate::validation::ValidationOptions;

/// 业务回调
///
/// 通知类事件默认忽略；connect 默认接受，消息默认不回复。
#[async_trait]
pub trait WebPubSubHub: Send + Sync {
    async fn on_connect(
        &self,
        _event: &ConnectEvent,
    ) -> std::result::Result<ConnectEventResponse, EventErrorResponse> {
        Ok(ConnectEventResponse::default())
    }

    async fn on_connected(&self, _event: &ConnectedEvent) {}

    async fn on_disconnected(&self, _event: &DisconnectedEvent) {}

    async fn on_disconnect(&self, _event: &DisconnectEvent) {}

    async fn on_message(
        &self,
        _event: &UserMessageEvent,
    ) -> std::result::Result<Option<UserEventResponse>, EventErrorResponse> {
        Ok(None)
    }
}

/// 已读取完请求体的 webhook 请求
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl WebhookRequest {
    pub fn new(method: Method, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            method,
            headers,
            body: body.into(),
        }
    }

    /// 先读完请求体流再构造请求
    pub async fn from_stream<S, B, E>(
        method: Method,
        headers: HeaderMap,
        body: S,
    ) -> std::result::Result<Self, E>
    where
        S: Stream<Item = std::result::Result<B, E>>,
        B: AsRef<[u8]>,
    {
        let body = read_body(body).await?;
        Ok(Self::new(method, headers, body))
    }
}

/// 状态变化
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    /// 响应没有修改状态，宿主不需要输出状态头
    Unchanged,
    /// 状态被清空
    Cleared,
    /// 新状态的分片头
    Replaced(Vec<(HeaderName, HeaderValue)>),
}

impl StateChange {
    /// 需要写入响应的头；清空时写一个空的 `ce-connectionState`
    pub fn headers(&self) -> Vec<(HeaderName, HeaderValue)> {
        match self {
            StateChange::Unchanged => Vec::new(),
            StateChange::Cleared => vec![(
                HeaderName::from_static(CE_CONNECTION_STATE),
                HeaderValue::from_static(""),
            )],
            StateChange::Replaced(headers) => headers.clone(),
        }
    }
}

/// 调度结果
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// 预检通过，`allowed_origin` 写入 `WebHook-Allowed-Origin`
    PreflightAllowed { allowed_origin: String },
    /// 预检未通过
    PreflightRejected { requested_hosts: Vec<String> },
    Connected {
        response: ConnectEventResponse,
        states: StateChange,
    },
    Message {
        response: Option<UserEventResponse>,
        states: StateChange,
    },
    /// 通知类事件处理完成
    Accepted,
    Rejected(EventErrorResponse),
}

/// 事件调度器
pub struct EventDispatcher<H: ?Sized> {
    options: Arc<ValidationOptions>,
    guard: AbuseProtectionGuard,
    parser: EventRequestParser,
    hub: Arc<H>,
}

impl<H: ?Sized> Clone for EventDispatcher<H> {
    fn clone(&self) -> Self {
        Self {
            options: self.options.clone(),
            guard: self.guard.clone(),
            parser: self.parser.clone(),
            hub: self.hub.clone(),
        }
    }
}

impl<H> EventDispatcher<H>
where
    H: WebPubSubHub + ?Sized,
{
    pub fn new(options: Arc<ValidationOptions>, codec: ConnectionStateCodec, hub: Arc<H>) -> Self {
        Self {
            guard: AbuseProtectionGuard::new(options.allowed_origins.clone()),
            options,
            parser: EventRequestParser::new(codec),
            hub,
        }
    }

    pub fn parser(&self) -> &EventRequestParser {
        &self.parser
    }

    pub async fn dispatch(&self, request: &WebhookRequest) -> DispatchOutcome {
        if let Preflight::Preflight { requested_hosts } =
            check_preflight_headers(&request.method, &request.headers)
        {
            return self.preflight(requested_hosts);
        }

        match self.handle_event(request).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, kind = ?err.kind(), "event request rejected");
                DispatchOutcome::from(err)
            }
        }
    }

    fn preflight(&self, requested_hosts: Vec<String>) -> DispatchOutcome {
        if self.guard.allowed_origins().is_unrestricted() {
            return DispatchOutcome::PreflightAllowed {
                allowed_origin: "*".to_string(),
            };
        }

        let allowed = self.guard.allowed_hosts(&requested_hosts);
        if allowed.is_empty() {
            warn!(requested = ?requested_hosts, "abuse protection preflight rejected");
            DispatchOutcome::PreflightRejected { requested_hosts }
        } else {
            DispatchOutcome::PreflightAllowed {
                allowed_origin: allowed.join(","),
            }
        }
    }

    async fn handle_event(&self, request: &WebhookRequest) -> Result<DispatchOutcome> {
        let event = self
            .parser
            .read_event(&request.headers, request.body.clone())?;
        event.context().ensure_valid_signature(&self.options.keys)?;

        let outcome = match &event {
            EventRequest::Connect(connect) => match self.hub.on_connect(connect).await {
                Ok(response) => {
                    let states = self.state_change(&connect.context, &response.states)?;
                    info!(connection_id = %connect.context.connection_id, "connection accepted");
                    DispatchOutcome::Connected { response, states }
                }
                Err(error) => {
                    info!(
                        connection_id = %connect.context.connection_id,
                        code = ?error.code,
                        "connection refused by hub"
                    );
                    DispatchOutcome::Rejected(error)
                }
            },
            EventRequest::Connected(connected) => {
                self.hub.on_connected(connected).await;
                DispatchOutcome::Accepted
            }
            EventRequest::Disconnected(disconnected) => {
                self.hub.on_disconnected(disconnected).await;
                DispatchOutcome::Accepted
            }
            EventRequest::Disconnect(disconnect) => {
                self.hub.on_disconnect(disconnect).await;
                DispatchOutcome::Accepted
            }
            EventRequest::UserMessage(message) => match self.hub.on_message(message).await {
                Ok(response) => {
                    let states = match &response {
                        Some(reply) => self.state_change(&message.context, &reply.states)?,
                        None => StateChange::Unchanged,
                    };
                    DispatchOutcome::Message { response, states }
                }
                Err(error) => DispatchOutcome::Rejected(error),
            },
        };
        Ok(outcome)
    }

    fn state_change(
        &self,
        context: &ConnectionContext,
        updates: &StateUpdates,
    ) -> Result<StateChange> {
        if updates.is_empty() {
            return Ok(StateChange::Unchanged);
        }
        match context.updated_states(updates) {
            Some(states) if !states.is_empty() => {
                let headers = self.parser.codec().encode_headers(&states)?;
                debug!(
                    connection_id = %context.connection_id,
                    chunks = headers.len(),
                    "connection state updated"
                );
                Ok(StateChange::Replaced(headers))
            }
            // 原本没有状态，结果也为空，不需要输出状态头
            None if context.states.is_none() => Ok(StateChange::Unchanged),
            _ => Ok(StateChange::Cleared),
        }
    }
}

impl From<WebPubSubError> for DispatchOutcome {
    fn from(err: WebPubSubError) -> Self {
        DispatchOutcome::Rejected(EventErrorResponse::from(&err))
    }
}
