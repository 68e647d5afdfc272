use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use huddle_agent::EmitError;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// One Socket Mode `events_api` frame, reduced to what the bot acts on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
    /// The bot's own user id, taken from the first authorization on the
    /// payload. `None` when Slack did not include one.
    pub bot_user_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    AppMention(AppMentionEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::AppMention(_) => SlackEventType::AppMention,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    AppMention,
    Unsupported,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct AppMentionEvent {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    /// Present when the message was posted by a bot integration.
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("socket frame is not valid json: {0}")]
    InvalidJson(String),
    #[error("socket frame of type `{0}` carries no event")]
    NotAnEvent(String),
    #[error("socket frame is missing `{0}`")]
    MissingField(&'static str),
    #[error("`{event_type}` event could not be read: {message}")]
    InvalidEvent { event_type: String, message: String },
}

#[derive(Deserialize)]
struct SocketFrame {
    #[serde(rename = "type")]
    frame_type: String,
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    payload: Option<EventCallback>,
}

#[derive(Deserialize)]
struct EventCallback {
    #[serde(default)]
    event: Option<Value>,
    #[serde(default)]
    authorizations: Vec<Authorization>,
}

#[derive(Deserialize)]
struct Authorization {
    #[serde(default)]
    user_id: Option<String>,
}

impl SlackEnvelope {
    /// Parses a raw Socket Mode frame. Only `events_api` frames carry events;
    /// `hello`, `disconnect` and the rest come back as
    /// [`EnvelopeError::NotAnEvent`].
    pub fn from_socket_payload(raw: &str) -> Result<Self, EnvelopeError> {
        let frame: SocketFrame =
            serde_json::from_str(raw).map_err(|error| EnvelopeError::InvalidJson(error.to_string()))?;
        if frame.frame_type != "events_api" {
            return Err(EnvelopeError::NotAnEvent(frame.frame_type));
        }

        let envelope_id = frame.envelope_id.ok_or(EnvelopeError::MissingField("envelope_id"))?;
        let payload = frame.payload.ok_or(EnvelopeError::MissingField("payload"))?;
        let event = payload.event.ok_or(EnvelopeError::MissingField("payload.event"))?;
        let bot_user_id = payload
            .authorizations
            .into_iter()
            .next()
            .and_then(|authorization| authorization.user_id)
            .filter(|user_id| !user_id.is_empty());

        let event_type = event.get("type").and_then(Value::as_str).unwrap_or("unknown").to_owned();
        let event = match event_type.as_str() {
            "app_mention" => SlackEvent::AppMention(serde_json::from_value(event).map_err(|error| {
                EnvelopeError::InvalidEvent { event_type: event_type.clone(), message: error.to_string() }
            })?),
            _ => SlackEvent::Unsupported { event_type },
        };

        Ok(Self { envelope_id, event, bot_user_id })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded,
    /// The reply failed upstream and an apology was posted instead.
    Apologized,
    Ignored,
}

#[derive(Debug, Error)]
pub enum EventHandlerError {
    #[error(transparent)]
    Emit(#[from] EmitError),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::{
        AppMentionEvent, EnvelopeError, EventContext, EventDispatcher, EventHandler,
        EventHandlerError, HandlerResult, SlackEnvelope, SlackEvent, SlackEventType,
    };

    const MENTION_FRAME: &str = r#"{
        "envelope_id": "env-1",
        "type": "events_api",
        "accepts_response_payload": false,
        "payload": {
            "type": "event_callback",
            "event": {
                "type": "app_mention",
                "user": "U123",
                "text": "<@UBOT> what's up?",
                "ts": "1718000000.000100",
                "channel": "C42",
                "event_ts": "1718000000.000100"
            },
            "authorizations": [{ "user_id": "UBOT", "is_bot": true }]
        }
    }"#;

    #[test]
    fn parses_app_mention_frame_with_bot_identity() {
        let envelope = SlackEnvelope::from_socket_payload(MENTION_FRAME).expect("envelope");

        assert_eq!(envelope.envelope_id, "env-1");
        assert_eq!(envelope.bot_user_id.as_deref(), Some("UBOT"));
        assert_eq!(
            envelope.event,
            SlackEvent::AppMention(AppMentionEvent {
                channel: Some("C42".to_owned()),
                user: Some("U123".to_owned()),
                bot_id: None,
                text: "<@UBOT> what's up?".to_owned(),
                ts: "1718000000.000100".to_owned(),
                thread_ts: None,
            })
        );
    }

    #[test]
    fn other_event_types_are_unsupported() {
        let frame = r#"{"envelope_id":"env-2","type":"events_api","payload":{
            "event":{"type":"reaction_added","user":"U1","reaction":"thumbsup"}}}"#;

        let envelope = SlackEnvelope::from_socket_payload(frame).expect("envelope");

        assert_eq!(envelope.event, SlackEvent::Unsupported { event_type: "reaction_added".to_owned() });
        assert_eq!(envelope.bot_user_id, None);
    }

    #[test]
    fn control_and_broken_frames_are_rejected() {
        assert_eq!(
            SlackEnvelope::from_socket_payload(r#"{"type":"hello","num_connections":1}"#),
            Err(EnvelopeError::NotAnEvent("hello".to_owned()))
        );
        assert_eq!(
            SlackEnvelope::from_socket_payload(r#"{"type":"events_api","payload":{"event":{}}}"#),
            Err(EnvelopeError::MissingField("envelope_id"))
        );
        assert!(matches!(
            SlackEnvelope::from_socket_payload("{not json"),
            Err(EnvelopeError::InvalidJson(_))
        ));
    }

    struct CountingHandler;

    #[async_trait]
    impl EventHandler for CountingHandler {
        fn event_type(&self) -> SlackEventType {
            SlackEventType::AppMention
        }

        async fn handle(
            &self,
            _envelope: &SlackEnvelope,
            _ctx: &EventContext,
        ) -> Result<HandlerResult, EventHandlerError> {
            Ok(HandlerResult::Responded)
        }
    }

    #[tokio::test]
    async fn dispatcher_routes_by_event_type() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(CountingHandler);
        let mention = SlackEnvelope::from_socket_payload(MENTION_FRAME).expect("envelope");
        let other = SlackEnvelope {
            envelope_id: "env-3".to_owned(),
            event: SlackEvent::Unsupported { event_type: "message".to_owned() },
            bot_user_id: None,
        };

        assert_eq!(dispatcher.handler_count(), 1);
        assert_eq!(
            dispatcher.dispatch(&mention, &EventContext::default()).await.expect("dispatch"),
            HandlerResult::Responded
        );
        assert_eq!(
            dispatcher.dispatch(&other, &EventContext::default()).await.expect("dispatch"),
            HandlerResult::Ignored
        );
    }
}
