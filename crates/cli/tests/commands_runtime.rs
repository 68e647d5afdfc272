use std::env;
use std::io::Write;
use std::sync::{Mutex, OnceLock, PoisonError};

use huddle_cli::commands::{chat, config, doctor};
use serde_json::Value;

const MODEL: &str = "llama-3.1-8b-instant";

const ENV_KEYS: [&str; 17] = [
    "HUDDLE_LLM_PROVIDER",
    "HUDDLE_LLM_API_KEY",
    "HUDDLE_LLM_BASE_URL",
    "HUDDLE_LLM_MODEL",
    "HUDDLE_LLM_TIMEOUT_SECS",
    "GROQ_API_KEY",
    "OPENAI_API_KEY",
    "SLACK_APP_TOKEN",
    "SLACK_BOT_TOKEN",
    "SLACK_TEST_CHANNEL_ID",
    "HUDDLE_CALENDAR_TOKEN_PATH",
    "HUDDLE_CALENDAR_ID",
    "HUDDLE_CALENDAR_MAX_RESULTS",
    "HUDDLE_LOGGING_LEVEL",
    "HUDDLE_LOGGING_FORMAT",
    "HUDDLE_LOG_LEVEL",
    "HUDDLE_LOG_FORMAT",
];

#[test]
fn doctor_passes_with_only_a_model_key() {
    with_env(&[("HUDDLE_LLM_API_KEY", "gsk-test"), ("HUDDLE_LLM_MODEL", MODEL)], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 0, "chat readiness is enough for doctor to pass");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");
        assert_eq!(payload["summary"], "doctor: chat is ready; some integrations are not configured");
        assert_eq!(payload["checks"][0]["name"], "config_validation");
        assert_eq!(payload["checks"][1]["status"], "fail");
        assert_eq!(payload["checks"][2]["status"], "fail");
    });
}

#[test]
fn doctor_reports_every_check_when_fully_configured() {
    let mut token = tempfile::NamedTempFile::new().expect("temp token file");
    write!(token, r#"{{"token": "ya29.test"}}"#).expect("write token");
    let token_path = token.path().display().to_string();

    with_env(
        &[
            ("HUDDLE_LLM_API_KEY", "gsk-test"),
            ("HUDDLE_LLM_MODEL", MODEL),
            ("SLACK_APP_TOKEN", "xapp-1-test"),
            ("SLACK_BOT_TOKEN", "xoxb-test"),
            ("HUDDLE_CALENDAR_TOKEN_PATH", token_path.as_str()),
        ],
        || {
            let result = doctor::run(false);
            assert_eq!(result.exit_code, 0);
            assert!(result.output.starts_with("doctor: all readiness checks passed"));
            assert!(result.output.contains("- [ok] slack_token_readiness"));
            assert!(result.output.contains("- [ok] calendar_credentials"));
        },
    );
}

#[test]
fn doctor_fails_without_model_key() {
    with_env(&[("HUDDLE_LLM_MODEL", MODEL)], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][0]["status"], "fail");
        assert_eq!(payload["checks"][1]["status"], "skipped");
        assert!(payload["checks"][0]["details"]
            .as_str()
            .expect("details")
            .contains("GROQ_API_KEY"));
    });
}

#[test]
fn doctor_names_the_missing_model_setting() {
    with_env(&[("GROQ_API_KEY", "gsk-test")], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        let details = payload["checks"][0]["details"].as_str().expect("details");
        assert!(details.contains("llm.model"), "{details}");
        assert!(details.contains("HUDDLE_LLM_MODEL"), "{details}");
    });
}

#[test]
fn config_attributes_values_to_their_source() {
    with_env(
        &[("GROQ_API_KEY", "gsk-test"), ("HUDDLE_LLM_MODEL", "llama-3.1-8b-instant")],
        || {
            let output = config::run();

            assert!(output.contains("- llm.api_key = <redacted> (source: env (GROQ_API_KEY))"));
            assert!(output
                .contains("- llm.model = llama-3.1-8b-instant (source: env (HUDDLE_LLM_MODEL))"));
            assert!(output.contains("(source: default)"));
            assert!(!output.contains("gsk-test"));
        },
    );
}

#[test]
fn chat_refuses_to_start_without_config_file() {
    with_env(&[("HUDDLE_LLM_API_KEY", "gsk-test"), ("HUDDLE_LLM_MODEL", MODEL)], || {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let result = runtime.block_on(chat::run());
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "chat");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be JSON")
}

/// Restores the managed variables when dropped, so a failing assertion does
/// not leak its environment into the next test.
struct EnvRestore(Vec<(&'static str, Option<String>)>);

impl Drop for EnvRestore {
    fn drop(&mut self) {
        for (key, value) in self.0.drain(..) {
            match value {
                Some(value) => env::set_var(key, value),
                None => env::remove_var(key),
            }
        }
    }
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(PoisonError::into_inner);

    let _restore = EnvRestore(ENV_KEYS.iter().map(|key| (*key, env::var(key).ok())).collect());

    for key in ENV_KEYS {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();
}
