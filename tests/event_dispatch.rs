use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use flare_webpubsub::config::parse_config;
use flare_webpubsub::events::{ConnectEvent, ConnectedEvent, DisconnectedEvent, UserMessageEvent};
use flare_webpubsub::signature::sign;
use flare_webpubsub::{
    ConnectEventResponse, ConnectionStateCodec, DataType, DispatchOutcome, ErrorKind,
    EventDispatcher, EventErrorCode, EventErrorResponse, EventRequest, EventRequestParser,
    StateChange, StateCodecConfig, UserEventResponse, ValidationOptions, WebPubSubHub,
    WebhookRequest, check_preflight, origin_allowed,
};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde_json::json;

const CONNECTION_ID: &str = "0f9c97a2f0bf4706afe87a14e0797b11";
const ACCESS_KEY: &str = "7aab239577fd4f24bc919802fb629f5f";
const SIGNATURE: &str = "sha256=7767effcb3946f3e1de039df4b986ef02c110b1469d02c0a06f41b3b727ab561";

fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        map.append(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    map
}

fn event_headers(ce_type: &str) -> HeaderMap {
    headers(&[
        ("ce-type", ce_type),
        ("ce-hub", "testhub"),
        ("ce-connectionId", CONNECTION_ID),
        ("ce-userId", "testuser"),
        ("ce-signature", SIGNATURE),
        ("Host", "my-host.com"),
        ("WebHook-Request-Origin", "my-host.com"),
    ])
}

fn options() -> Arc<ValidationOptions> {
    let config = parse_config(&format!(
        r#"
        [validation]
        connection_strings = ["Endpoint=https://my-host.com;AccessKey={ACCESS_KEY};Version=1.0;"]
        "#
    ))
    .unwrap();
    Arc::new(ValidationOptions::from_config(&config.validation).unwrap())
}

#[derive(Default)]
struct RecordingHub {
    connected: Mutex<Vec<String>>,
    disconnected: Mutex<Vec<String>>,
}

#[async_trait]
impl WebPubSubHub for RecordingHub {
    async fn on_connect(
        &self,
        event: &ConnectEvent,
    ) -> Result<ConnectEventResponse, EventErrorResponse> {
        if event.claims.contains_key("banned") {
            return Err(EventErrorResponse::new(
                EventErrorCode::Unauthorized,
                "banned user",
            ));
        }
        let mut response = ConnectEventResponse::default()
            .with_user_id("aaa")
            .join_group("lobby");
        response.set_state("test", "ddd");
        response.set_state("bbb", "bbb1");
        Ok(response)
    }

    async fn on_connected(&self, event: &ConnectedEvent) {
        self.connected
            .lock()
            .unwrap()
            .push(event.context.connection_id.clone());
    }

    async fn on_disconnected(&self, event: &DisconnectedEvent) {
        self.disconnected.lock().unwrap().push(event.reason.clone());
    }

    async fn on_message(
        &self,
        event: &UserMessageEvent,
    ) -> Result<Option<UserEventResponse>, EventErrorResponse> {
        match event.data.as_ref() {
            b"clear" => {
                let mut reply = UserEventResponse::text("cleared");
                reply.clear_states();
                Ok(Some(reply))
            }
            b"silent" => Ok(None),
            other => Ok(Some(UserEventResponse::new(
                Bytes::copy_from_slice(other),
                event.data_type,
            ))),
        }
    }
}

fn dispatcher(hub: Arc<RecordingHub>) -> EventDispatcher<RecordingHub> {
    EventDispatcher::new(options(), ConnectionStateCodec::default(), hub)
}

#[test]
fn parse_connected_event_end_to_end() {
    let parser = EventRequestParser::default();
    let map = headers(&[
        ("ce-type", "azure.webpubsub.sys.connected"),
        ("ce-hub", "chat"),
        ("ce-connectionId", "abc123"),
    ]);
    let request = parser.read_event(&map, Bytes::new()).unwrap();
    let EventRequest::Connected(event) = request else {
        panic!("expected connected event");
    };
    assert_eq!(event.context.connection_id, "abc123");
    assert_eq!(event.context.hub, "chat");
}

#[test]
fn parse_user_message_end_to_end() {
    let parser = EventRequestParser::default();
    let mut map = event_headers("azure.webpubsub.user.message");
    map.insert("content-type", HeaderValue::from_static("text/plain"));
    let request = parser
        .read_event(&map, Bytes::from_static(b"hello"))
        .unwrap();
    let EventRequest::UserMessage(event) = request else {
        panic!("expected user message");
    };
    assert_eq!(event.data_type, DataType::Text);
    assert_eq!(event.data, Bytes::from_static(b"hello"));
    assert_eq!(event.context.origin, "my-host.com");
    assert_eq!(event.context.user_id.as_deref(), Some("testuser"));
}

#[test]
fn parse_connect_event_with_state() {
    let codec = ConnectionStateCodec::new(StateCodecConfig {
        chunk_size: 16,
        max_chunks: 32,
    });
    let parser = EventRequestParser::new(codec.clone());
    let mut states = flare_webpubsub::ConnectionStates::new();
    states.insert("aaa".into(), json!("aaa"));
    states.insert("counter".into(), json!(3));

    let mut map = event_headers("azure.webpubsub.sys.connect");
    for (name, value) in codec.encode_headers(&states).unwrap() {
        map.insert(name, value);
    }
    let body = r#"{"claims":{"sub":["ddd"]},"query":{"access_token":["t"]},"subprotocols":["protocol1","protocol2"],"clientCertificates":[{"thumbprint":"111"}]}"#;
    let request = parser.read_event(&map, Bytes::from(body)).unwrap();
    let EventRequest::Connect(event) = request else {
        panic!("expected connect event");
    };
    assert_eq!(event.claims["sub"], vec!["ddd"]);
    assert_eq!(event.subprotocols, vec!["protocol1", "protocol2"]);
    assert_eq!(event.client_certificates[0].thumbprint, "111");
    assert_eq!(event.context.states, Some(states));
}

#[test]
fn malformed_connect_body_is_bad_request() {
    let parser = EventRequestParser::default();
    let err = parser
        .read_event(
            &event_headers("azure.webpubsub.sys.connect"),
            Bytes::from_static(b"{\"claims\": [oops"),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequestBody);
}

#[test]
fn preflight_only_for_options() {
    let origins = vec!["my-host.com".to_string()];
    let options = options();

    let preflight = check_preflight(&Method::OPTIONS, &origins);
    assert!(preflight.is_preflight());
    assert_eq!(preflight.requested_hosts(), ["my-host.com"]);
    assert!(origin_allowed(&preflight.requested_hosts()[0], &options.allowed_origins));

    assert!(!check_preflight(&Method::DELETE, &origins).is_preflight());
}

#[tokio::test]
async fn dispatch_preflight() {
    let dispatcher = dispatcher(Arc::new(RecordingHub::default()));

    let request = WebhookRequest::new(
        Method::OPTIONS,
        headers(&[("WebHook-Request-Origin", "my-host.com")]),
        Bytes::new(),
    );
    assert_eq!(
        dispatcher.dispatch(&request).await,
        DispatchOutcome::PreflightAllowed {
            allowed_origin: "my-host.com".to_string()
        }
    );

    let request = WebhookRequest::new(
        Method::OPTIONS,
        headers(&[("WebHook-Request-Origin", "evil.com")]),
        Bytes::new(),
    );
    assert!(matches!(
        dispatcher.dispatch(&request).await,
        DispatchOutcome::PreflightRejected { .. }
    ));
}

#[tokio::test]
async fn dispatch_preflight_unrestricted() {
    let dispatcher = EventDispatcher::new(
        Arc::new(ValidationOptions::default()),
        ConnectionStateCodec::default(),
        Arc::new(RecordingHub::default()),
    );
    let request = WebhookRequest::new(
        Method::OPTIONS,
        headers(&[("WebHook-Request-Origin", "anything.com")]),
        Bytes::new(),
    );
    assert_eq!(
        dispatcher.dispatch(&request).await,
        DispatchOutcome::PreflightAllowed {
            allowed_origin: "*".to_string()
        }
    );
}

#[tokio::test]
async fn dispatch_connect_updates_state() {
    let dispatcher = dispatcher(Arc::new(RecordingHub::default()));
    let codec = ConnectionStateCodec::default();

    let mut existing = flare_webpubsub::ConnectionStates::new();
    existing.insert("aaa".into(), json!("aaa"));
    existing.insert("bbb".into(), json!("bbb"));
    let mut map = event_headers("azure.webpubsub.sys.connect");
    for (name, value) in codec.encode_headers(&existing).unwrap() {
        map.insert(name, value);
    }

    let request = WebhookRequest::new(Method::POST, map, Bytes::from_static(b"{}"));
    let DispatchOutcome::Connected { response, states } = dispatcher.dispatch(&request).await
    else {
        panic!("expected connect outcome");
    };
    assert_eq!(response.user_id.as_deref(), Some("aaa"));
    assert_eq!(response.groups, vec!["lobby"]);

    let StateChange::Replaced(state_headers) = states else {
        panic!("expected state headers");
    };
    let mut echoed = HeaderMap::new();
    for (name, value) in state_headers {
        echoed.insert(name, value);
    }
    let decoded = codec.decode_headers(&echoed).unwrap().unwrap();
    assert_eq!(decoded["aaa"], json!("aaa"));
    assert_eq!(decoded["bbb"], json!("bbb1"));
    assert_eq!(decoded["test"], json!("ddd"));
}

#[tokio::test]
async fn dispatch_connect_refused_by_hub() {
    let dispatcher = dispatcher(Arc::new(RecordingHub::default()));
    let request = WebhookRequest::new(
        Method::POST,
        event_headers("azure.webpubsub.sys.connect"),
        Bytes::from_static(br#"{"claims":{"banned":["1"]}}"#),
    );
    let DispatchOutcome::Rejected(error) = dispatcher.dispatch(&request).await else {
        panic!("expected rejection");
    };
    assert_eq!(error.code, EventErrorCode::Unauthorized);
}

#[tokio::test]
async fn dispatch_rejects_invalid_signature() {
    let dispatcher = dispatcher(Arc::new(RecordingHub::default()));
    let mut map = event_headers("azure.webpubsub.sys.connected");
    map.insert(
        "ce-signature",
        HeaderValue::from_str(&sign(CONNECTION_ID, "wrong-key")).unwrap(),
    );
    let request = WebhookRequest::new(Method::POST, map, Bytes::new());
    let DispatchOutcome::Rejected(error) = dispatcher.dispatch(&request).await else {
        panic!("expected rejection");
    };
    assert_eq!(error.code, EventErrorCode::Unauthorized);
}

#[tokio::test]
async fn dispatch_without_keys_skips_signature() {
    let hub = Arc::new(RecordingHub::default());
    let dispatcher = EventDispatcher::new(
        Arc::new(ValidationOptions::default()),
        ConnectionStateCodec::default(),
        hub.clone(),
    );
    let mut map = event_headers("azure.webpubsub.sys.connected");
    map.remove("ce-signature");
    let request = WebhookRequest::new(Method::POST, map, Bytes::new());
    assert_eq!(dispatcher.dispatch(&request).await, DispatchOutcome::Accepted);
    assert_eq!(*hub.connected.lock().unwrap(), vec![CONNECTION_ID.to_string()]);
}

#[tokio::test]
async fn dispatch_notifications() {
    let hub = Arc::new(RecordingHub::default());
    let dispatcher = dispatcher(hub.clone());

    let request = WebhookRequest::new(
        Method::POST,
        event_headers("azure.webpubsub.sys.disconnected"),
        Bytes::from_static(br#"{"reason":"invalid"}"#),
    );
    assert_eq!(dispatcher.dispatch(&request).await, DispatchOutcome::Accepted);
    assert_eq!(*hub.disconnected.lock().unwrap(), vec!["invalid".to_string()]);

    let request = WebhookRequest::new(
        Method::POST,
        event_headers("azure.webpubsub.sys.disconnect"),
        Bytes::new(),
    );
    assert_eq!(dispatcher.dispatch(&request).await, DispatchOutcome::Accepted);
}

#[tokio::test]
async fn dispatch_user_messages() {
    let dispatcher = dispatcher(Arc::new(RecordingHub::default()));

    let mut map = event_headers("azure.webpubsub.user.message");
    map.insert("content-type", HeaderValue::from_static("application/json"));
    let request = WebhookRequest::new(Method::POST, map.clone(), Bytes::from_static(b"{\"a\":1}"));
    let DispatchOutcome::Message { response, states } = dispatcher.dispatch(&request).await else {
        panic!("expected message outcome");
    };
    let reply = response.unwrap();
    assert_eq!(reply.data, Bytes::from_static(b"{\"a\":1}"));
    assert_eq!(reply.data_type, DataType::Json);
    assert_eq!(states, StateChange::Unchanged);

    let request = WebhookRequest::new(Method::POST, map.clone(), Bytes::from_static(b"clear"));
    let DispatchOutcome::Message { states, .. } = dispatcher.dispatch(&request).await else {
        panic!("expected message outcome");
    };
    assert_eq!(states, StateChange::Unchanged);

    let mut existing = flare_webpubsub::ConnectionStates::new();
    existing.insert("aaa".into(), json!("aaa"));
    let mut stateful = map.clone();
    for (name, value) in ConnectionStateCodec::default()
        .encode_headers(&existing)
        .unwrap()
    {
        stateful.insert(name, value);
    }
    let request = WebhookRequest::new(Method::POST, stateful, Bytes::from_static(b"clear"));
    let DispatchOutcome::Message { states, .. } = dispatcher.dispatch(&request).await else {
        panic!("expected message outcome");
    };
    assert_eq!(states, StateChange::Cleared);
    let cleared = states.headers();
    assert_eq!(cleared.len(), 1);
    assert!(cleared[0].1.is_empty());

    let request = WebhookRequest::new(Method::POST, map, Bytes::from_static(b"silent"));
    assert_eq!(
        dispatcher.dispatch(&request).await,
        DispatchOutcome::Message {
            response: None,
            states: StateChange::Unchanged
        }
    );
}

#[tokio::test]
async fn dispatch_reports_parse_errors() {
    let dispatcher = dispatcher(Arc::new(RecordingHub::default()));

    let mut map = event_headers("azure.webpubsub.sys.connected");
    map.remove("ce-connectionid");
    let request = WebhookRequest::new(Method::POST, map, Bytes::new());
    let DispatchOutcome::Rejected(error) = dispatcher.dispatch(&request).await else {
        panic!("expected rejection");
    };
    assert_eq!(error.code, EventErrorCode::UserError);

    let request = WebhookRequest::new(
        Method::POST,
        event_headers("azure.webpubsub.sys.unknown"),
        Bytes::new(),
    );
    assert!(matches!(
        dispatcher.dispatch(&request).await,
        DispatchOutcome::Rejected(EventErrorResponse {
            code: EventErrorCode::UserError,
            ..
        })
    ));
}

#[tokio::test]
async fn request_from_body_stream() {
    let chunks = vec![
        Ok::<_, std::io::Error>(Bytes::from_static(b"hel")),
        Ok(Bytes::from_static(b"lo")),
    ];
    let mut map = event_headers("azure.webpubsub.user.message");
    map.insert("content-type", HeaderValue::from_static("text/plain"));
    let request = WebhookRequest::from_stream(Method::POST, map, futures_util::stream::iter(chunks))
        .await
        .unwrap();
    assert_eq!(request.body, Bytes::from_static(b"hello"));
}

struct LargeStateHub;

#[async_trait]
impl WebPubSubHub for LargeStateHub {
    async fn on_connect(
        &self,
        _event: &ConnectEvent,
    ) -> Result<ConnectEventResponse, EventErrorResponse> {
        let mut response = ConnectEventResponse::default();
        response.set_state("blob", "x".repeat(512));
        Ok(response)
    }
}

#[tokio::test]
async fn dispatch_state_overflow_is_server_error() {
    let codec = ConnectionStateCodec::new(StateCodecConfig {
        chunk_size: 64,
        max_chunks: 2,
    });
    let dispatcher = EventDispatcher::new(options(), codec, Arc::new(LargeStateHub));
    let request = WebhookRequest::new(
        Method::POST,
        event_headers("azure.webpubsub.sys.connect"),
        Bytes::from_static(b"{}"),
    );
    let DispatchOutcome::Rejected(error) = dispatcher.dispatch(&request).await else {
        panic!("expected rejection");
    };
    assert_eq!(error.code, EventErrorCode::ServerError);
}
