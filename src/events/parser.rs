//! 事件请求解析
//!
//! 先分类，再提取连接上下文，最后按事件种类解析请求体。
//! 任何一步失败都直接返回错误，不会产出字段不完整的事件。

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use http::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::context::ConnectionContext;
use crate::error::{Result, WebPubSubError};
use crate::headers::{CONTENT_TYPE, first_value};
use crate::state::ConnectionStateCodec;

use super::classifier::{Classification, EventKind, classify_headers};
use super::request::{
    ConnectEvent, ConnectEventBody, ConnectedEvent, DataType, DisconnectEvent,
    DisconnectedEvent, DisconnectedEventBody, EventRequest, UserMessageEvent,
};

/// 事件请求解析器
#[derive(Debug, Clone, Default)]
pub struct EventRequestParser {
    codec: ConnectionStateCodec,
}

impl EventRequestParser {
    pub fn new(codec: ConnectionStateCodec) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> &ConnectionStateCodec {
        &self.codec
    }

    /// 分类并解析
    pub fn read_event(&self, headers: &HeaderMap, body: Bytes) -> Result<EventRequest> {
        let classification = classify_headers(headers)?;
        self.parse(headers, body, &classification)
    }

    /// 按已确定的分类解析请求
    pub fn parse(
        &self,
        headers: &HeaderMap,
        body: Bytes,
        classification: &Classification,
    ) -> Result<EventRequest> {
        let context = ConnectionContext::from_headers(headers, &self.codec)?
            .with_event(classification.event_type, classification.event_name.clone());

        let request = match classification.kind {
            EventKind::Connect => {
                let body: ConnectEventBody = parse_json(&body, true)?;
                EventRequest::Connect(ConnectEvent {
                    context,
                    claims: body.claims,
                    query: body.query,
                    subprotocols: body.subprotocols,
                    client_certificates: body.client_certificates,
                })
            }
            EventKind::Connected => EventRequest::Connected(ConnectedEvent { context }),
            EventKind::Disconnected => {
                let body: DisconnectedEventBody = parse_json(&body, false)?;
                EventRequest::Disconnected(DisconnectedEvent {
                    context,
                    reason: body.reason,
                })
            }
            EventKind::Disconnect => {
                let body: DisconnectedEventBody = parse_json(&body, false)?;
                EventRequest::Disconnect(DisconnectEvent {
                    context,
                    reason: body.reason,
                })
            }
            EventKind::UserMessage => EventRequest::UserMessage(UserMessageEvent {
                context,
                data_type: DataType::from_content_type(first_value(headers, CONTENT_TYPE)),
                data: body,
            }),
        };

        debug!(
            connection_id = %request.connection_id(),
            event = %classification.event_name,
            "parsed event request"
        );
        Ok(request)
    }
}

/// 解析系统事件的 JSON 请求体；`required` 为 false 时空请求体取默认值
fn parse_json<T>(body: &[u8], required: bool) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        if required {
            return Err(WebPubSubError::BadRequestBody(
                "request body is required".to_string(),
            ));
        }
        return Ok(T::default());
    }
    let value: Value = serde_json::from_slice(body).map_err(|err| {
        warn!(error = %err, "malformed system event body");
        WebPubSubError::bad_body(err)
    })?;
    // 系统事件请求体必须是 JSON 对象
    if !value.is_object() {
        warn!("system event body is not a JSON object");
        return Err(WebPubSubError::BadRequestBody(
            "request body must be a JSON object".to_string(),
        ));
    }
    serde_json::from_value(value).map_err(WebPubSubError::bad_body)
}

/// 读取完整的请求体流。请求体只读取一次，分类前必须读完。
pub async fn read_body<S, B, E>(stream: S) -> std::result::Result<Bytes, E>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
{
    let mut stream = std::pin::pin!(stream);
    let mut buffer = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buffer.extend_from_slice(chunk?.as_ref());
    }
    Ok(buffer.freeze())
}
