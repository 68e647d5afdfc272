//! App-mention channel: turns `app_mention` events into dispatcher input and
//! posts the answer back into the thread of the mentioning message.

use std::sync::Arc;

use async_trait::async_trait;
use huddle_agent::{serve, ChatDispatcher, EmitError, Inbound, InboundAdapter, Served, EMPTY_MESSAGE_REPLY};
use huddle_core::SessionId;
use tracing::debug;

use crate::events::{
    AppMentionEvent, EventContext, EventHandler, EventHandlerError, HandlerResult, SlackEnvelope,
    SlackEvent, SlackEventType,
};
use crate::web_api::MessagePoster;

/// Removes every `<@BOT>` token for the given bot and trims the rest. With no
/// bot id nothing is removed.
pub fn strip_mention(text: &str, bot_user_id: Option<&str>) -> String {
    match bot_user_id {
        Some(bot) if !bot.is_empty() => text.replace(&format!("<@{bot}>"), "").trim().to_owned(),
        _ => text.trim().to_owned(),
    }
}

/// Thread timestamp, else channel, else a per-message fallback.
pub fn session_id_for(event: &AppMentionEvent) -> SessionId {
    let non_empty = |value: &Option<String>| value.as_deref().filter(|value| !value.is_empty()).map(str::to_owned);
    non_empty(&event.thread_ts)
        .or_else(|| non_empty(&event.channel))
        .map(SessionId::from)
        .unwrap_or_else(|| SessionId::new(format!("unknown_session_{}", event.ts)))
}

fn is_self_authored(event: &AppMentionEvent, bot_user_id: Option<&str>) -> bool {
    if event.bot_id.as_deref().is_some_and(|bot_id| !bot_id.is_empty()) {
        return true;
    }
    matches!((event.user.as_deref(), bot_user_id), (Some(user), Some(bot)) if user == bot)
}

pub struct MentionAdapter {
    poster: Arc<dyn MessagePoster>,
}

impl MentionAdapter {
    pub fn new(poster: Arc<dyn MessagePoster>) -> Self {
        Self { poster }
    }
}

#[async_trait]
impl InboundAdapter for MentionAdapter {
    type Event = SlackEnvelope;

    fn channel(&self) -> &'static str {
        "slack"
    }

    fn extract(&self, envelope: &SlackEnvelope) -> Inbound {
        let SlackEvent::AppMention(event) = &envelope.event else {
            return Inbound::Ignore;
        };
        let bot_user_id = envelope.bot_user_id.as_deref();
        if is_self_authored(event, bot_user_id) {
            debug!(envelope_id = %envelope.envelope_id, "skipping self-authored mention");
            return Inbound::Ignore;
        }

        let text = strip_mention(&event.text, bot_user_id);
        if text.is_empty() {
            return Inbound::Reply(EMPTY_MESSAGE_REPLY.to_owned());
        }
        Inbound::Dispatch { session_id: session_id_for(event), text }
    }

    async fn emit(&self, envelope: &SlackEnvelope, reply: &str) -> Result<(), EmitError> {
        let SlackEvent::AppMention(event) = &envelope.event else {
            return Err(EmitError::Delivery("only app mentions can be answered".to_owned()));
        };
        let channel = event
            .channel
            .as_deref()
            .filter(|channel| !channel.is_empty())
            .ok_or_else(|| EmitError::Delivery("mention carries no channel".to_owned()))?;
        let thread_ts = Some(event.ts.as_str()).filter(|ts| !ts.is_empty());

        self.poster
            .post_message(channel, reply, thread_ts)
            .await
            .map(|_| ())
            .map_err(|error| EmitError::Delivery(error.to_string()))
    }
}

pub struct AppMentionHandler {
    adapter: MentionAdapter,
    dispatcher: Arc<ChatDispatcher>,
}

impl AppMentionHandler {
    pub fn new(adapter: MentionAdapter, dispatcher: Arc<ChatDispatcher>) -> Self {
        Self { adapter, dispatcher }
    }
}

#[async_trait]
impl EventHandler for AppMentionHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::AppMention
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let served = serve(&self.adapter, &self.dispatcher, envelope, &ctx.correlation_id).await?;
        Ok(match served {
            Served::Replied => HandlerResult::Responded,
            Served::Apologized => HandlerResult::Apologized,
            Served::Ignored | Served::Exit => HandlerResult::Ignored,
        })
    }
}
