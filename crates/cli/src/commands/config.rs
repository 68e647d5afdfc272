use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use huddle_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

/// One displayed setting: dotted key, rendered value, and the environment
/// variables that can set it (first match wins).
struct Field<'a> {
    key: &'static str,
    value: String,
    env_keys: &'a [&'a str],
}

pub fn run() -> String {
    let options = LoadOptions { env_file: Some(PathBuf::from(".env")), ..LoadOptions::default() };
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let api_key_env = config.llm.provider.api_key_env();

    let fields = [
        Field {
            key: "llm.provider",
            value: format!("{:?}", config.llm.provider),
            env_keys: &["HUDDLE_LLM_PROVIDER"],
        },
        Field { key: "llm.model", value: config.llm.model.clone(), env_keys: &["HUDDLE_LLM_MODEL"] },
        Field {
            key: "llm.base_url",
            value: config.llm.endpoint_base().to_string(),
            env_keys: &["HUDDLE_LLM_BASE_URL"],
        },
        Field {
            key: "llm.api_key",
            value: if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" }.to_string(),
            env_keys: &["HUDDLE_LLM_API_KEY", api_key_env],
        },
        Field {
            key: "llm.timeout_secs",
            value: config.llm.timeout_secs.to_string(),
            env_keys: &["HUDDLE_LLM_TIMEOUT_SECS"],
        },
        Field {
            key: "slack.app_token",
            value: redact_token(config.slack.app_token.expose_secret()),
            env_keys: &["SLACK_APP_TOKEN"],
        },
        Field {
            key: "slack.bot_token",
            value: redact_token(config.slack.bot_token.expose_secret()),
            env_keys: &["SLACK_BOT_TOKEN"],
        },
        Field {
            key: "slack.test_channel_id",
            value: config.slack.test_channel_id.clone().unwrap_or_else(|| "<unset>".to_string()),
            env_keys: &["SLACK_TEST_CHANNEL_ID"],
        },
        Field {
            key: "calendar.token_path",
            value: config.calendar.token_path.display().to_string(),
            env_keys: &["HUDDLE_CALENDAR_TOKEN_PATH"],
        },
        Field {
            key: "calendar.calendar_id",
            value: config.calendar.calendar_id.clone(),
            env_keys: &["HUDDLE_CALENDAR_ID"],
        },
        Field {
            key: "calendar.max_results",
            value: config.calendar.max_results.to_string(),
            env_keys: &["HUDDLE_CALENDAR_MAX_RESULTS"],
        },
        Field {
            key: "chat.console_session_id",
            value: config.chat.console_session_id.clone(),
            env_keys: &[],
        },
        Field {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["HUDDLE_LOGGING_LEVEL", "HUDDLE_LOG_LEVEL"],
        },
        Field {
            key: "logging.format",
            value: format!("{:?}", config.logging.format),
            env_keys: &["HUDDLE_LOGGING_FORMAT", "HUDDLE_LOG_FORMAT"],
        },
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in &fields {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|env_key| env::var_os(env_key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
