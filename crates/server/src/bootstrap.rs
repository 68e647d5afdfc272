use std::sync::Arc;
use std::time::Duration;

use huddle_agent::providers::ChatCompletionsClient;
use huddle_agent::{ChatDispatcher, ChatModel, DirectChat};
use huddle_core::config::{AppConfig, ConfigError, ConfigProfile};
use huddle_core::{LlmError, SessionHistoryStore};
use huddle_slack::events::EventDispatcher;
use huddle_slack::mention::{AppMentionHandler, MentionAdapter};
use huddle_slack::socket::{NoopSocketTransport, ReconnectPolicy, SocketModeRunner, SocketTransport};
use huddle_slack::web_api::{MessagePoster, SlackApiError, SlackWebClient};
use huddle_slack::STARTUP_MESSAGE;
use thiserror::Error;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub poster: Arc<dyn MessagePoster>,
    pub chat: Arc<ChatDispatcher>,
    pub slack_runner: SocketModeRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("llm client setup failed: {0}")]
    Llm(#[from] LlmError),
    #[error("slack client setup failed: {0}")]
    Slack(#[from] SlackApiError),
}

/// Validates the Slack profile and wires the model, Web API client and event
/// pipeline. Nothing here touches the network.
pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    config.validate(ConfigProfile::Slack)?;

    let client = ChatCompletionsClient::from_config(&config.llm)?;
    info!(
        event_name = "system.bootstrap.llm_ready",
        correlation_id = "bootstrap",
        endpoint = %client.endpoint(),
        model = %config.llm.model,
        "llm client configured"
    );
    let poster = SlackWebClient::new(config.slack.bot_token.clone())?;

    Ok(assemble(
        config,
        Arc::new(DirectChat::new(client)),
        Arc::new(poster),
        Arc::new(NoopSocketTransport),
    ))
}

pub fn assemble(
    config: AppConfig,
    model: Arc<dyn ChatModel>,
    poster: Arc<dyn MessagePoster>,
    transport: Arc<dyn SocketTransport>,
) -> Application {
    let chat = Arc::new(ChatDispatcher::new(
        Arc::new(SessionHistoryStore::new()),
        model,
        config.chat.system_prompt.clone(),
        Duration::from_secs(config.llm.timeout_secs),
    ));

    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(AppMentionHandler::new(MentionAdapter::new(poster.clone()), chat.clone()));
    let slack_runner = SocketModeRunner::new(transport, dispatcher, ReconnectPolicy::default());

    Application { config, poster, chat, slack_runner }
}

/// Posts the online notice when a test channel is configured. Failure is
/// logged and otherwise ignored. Returns whether a message was delivered.
pub async fn send_startup_notification(poster: &dyn MessagePoster, channel: Option<&str>) -> bool {
    let Some(channel) = channel else {
        return false;
    };

    match poster.post_message(channel, STARTUP_MESSAGE, None).await {
        Ok(posted) => {
            info!(
                event_name = "system.bootstrap.startup_notified",
                correlation_id = "bootstrap",
                channel_id = %posted.channel,
                "startup notification posted"
            );
            true
        }
        Err(error) => {
            warn!(
                event_name = "system.bootstrap.startup_notify_failed",
                correlation_id = "bootstrap",
                channel_id = channel,
                error = %error,
                "startup notification failed"
            );
            false
        }
    }
}
