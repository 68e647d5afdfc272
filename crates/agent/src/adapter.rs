//! The contract every inbound channel implements, and the one routine that
//! drives a single event through the dispatcher.

use async_trait::async_trait;
use huddle_core::{ApplicationError, SessionId};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::dispatcher::ChatDispatcher;

/// What an adapter makes of one raw event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    Dispatch { session_id: SessionId, text: String },
    /// Answer with fixed text without touching the dispatcher.
    Reply(String),
    Ignore,
    Exit,
}

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("failed to write reply: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to deliver reply: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait InboundAdapter: Send + Sync {
    type Event: Send + Sync;

    fn channel(&self) -> &'static str;
    fn extract(&self, event: &Self::Event) -> Inbound;
    async fn emit(&self, event: &Self::Event, reply: &str) -> Result<(), EmitError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Served {
    Replied,
    /// The dispatcher failed and an apology went out instead.
    Apologized,
    Ignored,
    Exit,
}

pub async fn serve<A>(
    adapter: &A,
    dispatcher: &ChatDispatcher,
    event: &A::Event,
    correlation_id: &str,
) -> Result<Served, EmitError>
where
    A: InboundAdapter + ?Sized,
{
    let channel = adapter.channel();
    match adapter.extract(event) {
        Inbound::Ignore => {
            debug!(event_name = "adapter.event.ignored", channel, correlation_id, "ignored event");
            Ok(Served::Ignored)
        }
        Inbound::Exit => Ok(Served::Exit),
        Inbound::Reply(canned) => {
            debug!(event_name = "adapter.event.canned", channel, correlation_id, "answered with canned reply");
            adapter.emit(event, &canned).await?;
            Ok(Served::Replied)
        }
        Inbound::Dispatch { session_id, text } => {
            match dispatcher.handle(&session_id, &text).await {
                Ok(reply) => {
                    adapter.emit(event, &reply).await?;
                    info!(
                        event_name = "adapter.reply.sent",
                        channel,
                        correlation_id,
                        session_id = %session_id,
                        "reply sent"
                    );
                    Ok(Served::Replied)
                }
                Err(failure) => {
                    let interface = ApplicationError::from(failure).into_interface(correlation_id);
                    error!(
                        event_name = "adapter.reply.failed",
                        channel,
                        correlation_id,
                        session_id = %session_id,
                        error = %interface,
                        "dispatcher failed; sending apology"
                    );
                    adapter.emit(event, interface.user_message()).await?;
                    Ok(Served::Apologized)
                }
            }
        }
    }
}
