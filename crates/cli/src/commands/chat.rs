use std::sync::Arc;
use std::time::Duration;

use huddle_agent::providers::ChatCompletionsClient;
use huddle_agent::{ChatDispatcher, ChatModel, DirectChat, LlmClient};
use huddle_core::config::{AppConfig, ConfigProfile, LoadOptions};
use huddle_core::{SessionHistoryStore, SessionId};
use tokio::io::BufReader;
use tracing::info;

use super::CommandResult;
use crate::console::{run_console, ConsoleAdapter};
use crate::logging;

const BANNER: &str = "Chatbot initialized. Type 'quit' or 'exit' to end the conversation.";

pub async fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::for_profile(ConfigProfile::Console)) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure("chat", "config_validation", error.to_string(), 2),
    };
    logging::init(&config.logging);

    let client = match ChatCompletionsClient::from_config(&config.llm) {
        Ok(client) => client,
        Err(error) => return CommandResult::failure("chat", "llm_client", error.to_string(), 2),
    };
    let model_name = client.model().to_owned();
    let timeout = Duration::from_secs(config.llm.timeout_secs);
    let system_prompt = config.chat.system_prompt.clone();
    let model = Arc::new(DirectChat::new(client));

    converse("chat", &config, &model_name, model, system_prompt, timeout, BANNER).await
}

/// Wires a chat model to stdin/stdout and runs the console loop.
pub(crate) async fn converse(
    command: &str,
    config: &AppConfig,
    model_name: &str,
    model: Arc<dyn ChatModel>,
    system_prompt: String,
    timeout: Duration,
    banner: &str,
) -> CommandResult {
    let dispatcher =
        ChatDispatcher::new(Arc::new(SessionHistoryStore::new()), model, system_prompt, timeout);
    let adapter = ConsoleAdapter::new(
        SessionId::new(config.chat.console_session_id.as_str()),
        tokio::io::stdout(),
    );
    info!(
        event_name = "cli.console.started",
        command,
        model = model_name,
        session_id = %config.chat.console_session_id,
        "console session started"
    );

    match run_console(BufReader::new(tokio::io::stdin()), &adapter, &dispatcher, banner).await {
        Ok(answered) => {
            info!(event_name = "cli.console.finished", command, answered, "console session finished");
            CommandResult::ok(String::new())
        }
        Err(error) => CommandResult::failure(command, "console_io", error.to_string(), 1),
    }
}
