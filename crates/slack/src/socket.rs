//! Socket Mode receive loop. The transport only moves raw frames; deciding
//! what a frame means (event, `hello`, `disconnect`, junk) happens here.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::events::{EnvelopeError, EventContext, EventDispatcher, SlackEnvelope, SlackEvent};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("socket mode connection failed: {0}")]
    Connect(String),
    #[error("socket mode read failed: {0}")]
    Receive(String),
    #[error("socket mode ack for `{envelope_id}` failed: {message}")]
    Acknowledge { envelope_id: String, message: String },
    #[error("socket mode close failed: {0}")]
    Close(String),
}

/// Consecutive connection failures tolerated before the runner gives up, and
/// the capped exponential delay between attempts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 500, max_delay_ms: 30_000 }
    }
}

impl ReconnectPolicy {
    fn delay_for(&self, failures: u32) -> Duration {
        let factor = 2_u64.saturating_pow(failures);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }
}

#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    /// Next raw frame. `None` means the connection is closed for good.
    async fn next_frame(&self) -> Result<Option<String>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Transport with nothing to say: connects, yields no frames, closes.
#[derive(Default)]
pub struct NoopSocketTransport;

#[async_trait]
impl SocketTransport for NoopSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_frame(&self) -> Result<Option<String>, TransportError> {
        Ok(None)
    }

    async fn acknowledge(&self, _envelope_id: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Event(SlackEnvelope),
    Hello,
    Disconnect { reason: String },
    Other { frame_type: String },
    Malformed { envelope_id: Option<String>, error: EnvelopeError },
}

fn classify(raw: &str) -> Frame {
    match SlackEnvelope::from_socket_payload(raw) {
        Ok(envelope) => Frame::Event(envelope),
        Err(EnvelopeError::NotAnEvent(frame_type)) => match frame_type.as_str() {
            "hello" => Frame::Hello,
            "disconnect" => Frame::Disconnect {
                reason: frame_field(raw, "reason").unwrap_or_else(|| "unspecified".to_owned()),
            },
            _ => Frame::Other { frame_type },
        },
        Err(error) => Frame::Malformed { envelope_id: frame_field(raw, "envelope_id"), error },
    }
}

fn frame_field(raw: &str, key: &str) -> Option<String> {
    let frame: Value = serde_json::from_str(raw).ok()?;
    frame.get(key)?.as_str().map(str::to_owned)
}

/// How one connection ended without a transport error.
enum ConnectionEnd {
    Closed,
    RefreshRequested,
}

pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: EventDispatcher,
    reconnect_policy: ReconnectPolicy,
}

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, reconnect_policy }
    }

    /// Runs until the transport closes for good or consecutive failures
    /// exceed the policy. A server-requested refresh reconnects at once and
    /// resets the failure count. Never returns an error.
    pub async fn start(&self) {
        let mut failures = 0_u32;
        loop {
            match self.run_connection().await {
                Ok(ConnectionEnd::Closed) => return,
                Ok(ConnectionEnd::RefreshRequested) => failures = 0,
                Err(error) => {
                    warn!(
                        event_name = "ingress.slack.transport_failed",
                        failures,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %error,
                        "socket mode transport failed"
                    );
                    if failures >= self.reconnect_policy.max_retries {
                        warn!(
                            event_name = "ingress.slack.retries_exhausted",
                            max_retries = self.reconnect_policy.max_retries,
                            "giving up on socket mode; process keeps running"
                        );
                        return;
                    }
                    let delay = self.reconnect_policy.delay_for(failures);
                    failures += 1;
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    async fn run_connection(&self) -> Result<ConnectionEnd, TransportError> {
        self.transport.connect().await?;
        info!(event_name = "ingress.slack.connected", "socket mode connected");

        while let Some(raw) = self.transport.next_frame().await? {
            match classify(&raw) {
                Frame::Event(envelope) => self.handle_envelope(envelope).await,
                Frame::Hello => debug!(event_name = "ingress.slack.hello", "socket mode handshake"),
                Frame::Disconnect { reason } => {
                    info!(
                        event_name = "ingress.slack.refresh_requested",
                        reason = %reason,
                        "slack asked for a fresh connection"
                    );
                    self.transport.disconnect().await?;
                    return Ok(ConnectionEnd::RefreshRequested);
                }
                Frame::Other { frame_type } => {
                    debug!(frame_type = %frame_type, "ignoring socket frame");
                }
                Frame::Malformed { envelope_id, error } => {
                    warn!(
                        event_name = "ingress.slack.frame_rejected",
                        envelope_id = envelope_id.as_deref().unwrap_or("unknown"),
                        error = %error,
                        "could not read socket frame"
                    );
                    // Acked anyway so Slack stops redelivering a frame we can never read.
                    if let Some(envelope_id) = envelope_id {
                        self.acknowledge(&envelope_id).await;
                    }
                }
            }
        }

        info!(event_name = "ingress.slack.closed", "socket mode stream closed");
        self.transport.disconnect().await?;
        Ok(ConnectionEnd::Closed)
    }

    async fn handle_envelope(&self, envelope: SlackEnvelope) {
        let (channel_id, thread_id) = correlation_fields(&envelope);
        info!(
            event_name = "ingress.slack.envelope_received",
            event_type = ?envelope.event.event_type(),
            correlation_id = %envelope.envelope_id,
            channel_id = channel_id.unwrap_or("unknown"),
            thread_id = thread_id.unwrap_or("unknown"),
            "received slack envelope"
        );

        self.acknowledge(&envelope.envelope_id).await;

        let context = EventContext { correlation_id: envelope.envelope_id.clone() };
        if let Err(error) = self.dispatcher.dispatch(&envelope, &context).await {
            warn!(
                event_name = "ingress.slack.dispatch_failed",
                correlation_id = %envelope.envelope_id,
                channel_id = channel_id.unwrap_or("unknown"),
                error = %error,
                "event dispatch failed; still listening"
            );
        }
    }

    async fn acknowledge(&self, envelope_id: &str) {
        match self.transport.acknowledge(envelope_id).await {
            Ok(()) => debug!(correlation_id = envelope_id, "acknowledged slack envelope"),
            Err(error) => warn!(
                correlation_id = envelope_id,
                error = %error,
                "failed to acknowledge slack envelope"
            ),
        }
    }
}

/// Channel and thread for log correlation. A top-level mention is its own
/// thread root.
fn correlation_fields(envelope: &SlackEnvelope) -> (Option<&str>, Option<&str>) {
    match &envelope.event {
        SlackEvent::AppMention(event) => {
            (event.channel.as_deref(), event.thread_ts.as_deref().or(Some(event.ts.as_str())))
        }
        SlackEvent::Unsupported { .. } => (None, None),
    }
}
