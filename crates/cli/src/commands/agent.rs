use std::sync::Arc;
use std::time::Duration;

use huddle_agent::calendar::{
    CalendarService, CreateCalendarEventTool, DeleteCalendarEventTool, GoogleCalendarClient,
    ListCalendarEventsTool, REQUEST_TIMEOUT_SECS,
};
use huddle_agent::providers::ChatCompletionsClient;
use huddle_agent::tools::ToolRegistry;
use huddle_agent::{AgentRuntime, LlmClient};
use huddle_core::config::{AppConfig, ConfigProfile, LoadOptions};

use super::chat::converse;
use super::CommandResult;
use crate::logging;

const BANNER: &str = "Calendar Agent initialized. Type 'quit' to exit.";

pub fn calendar_tools(calendar: Arc<dyn CalendarService>, default_days: u32) -> ToolRegistry {
    let mut tools = ToolRegistry::default();
    tools.register(ListCalendarEventsTool::new(calendar.clone(), default_days));
    tools.register(CreateCalendarEventTool::new(calendar.clone()));
    tools.register(DeleteCalendarEventTool::new(calendar));
    tools
}

/// One agent turn may take two completions plus a calendar request.
pub fn turn_timeout(llm_timeout_secs: u64) -> Duration {
    Duration::from_secs(llm_timeout_secs.saturating_mul(2).saturating_add(REQUEST_TIMEOUT_SECS))
}

pub async fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::for_profile(ConfigProfile::Agent)) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure("agent", "config_validation", error.to_string(), 2),
    };
    logging::init(&config.logging);

    let calendar = match GoogleCalendarClient::from_config(&config.calendar) {
        Ok(calendar) => calendar,
        Err(error) => {
            return CommandResult::failure("agent", "calendar_credentials", error.to_string(), 2)
        }
    };
    let client = match ChatCompletionsClient::from_config(&config.llm) {
        Ok(client) => client,
        Err(error) => return CommandResult::failure("agent", "llm_client", error.to_string(), 2),
    };

    let model_name = client.model().to_owned();
    let tools = calendar_tools(Arc::new(calendar), config.calendar.default_days);
    let runtime = AgentRuntime::new(client, tools);
    let timeout = turn_timeout(config.llm.timeout_secs);
    let system_prompt = config.chat.agent_system_prompt.clone();

    converse("agent", &config, &model_name, Arc::new(runtime), system_prompt, timeout, BANNER).await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::turn_timeout;

    #[test]
    fn turn_timeout_covers_two_completions_and_a_calendar_request() {
        assert_eq!(turn_timeout(30), Duration::from_secs(90));
        assert_eq!(turn_timeout(1), Duration::from_secs(32));
        assert_eq!(turn_timeout(u64::MAX), Duration::from_secs(u64::MAX));
    }
}
