pub mod agent;
pub mod chat;
pub mod config;
pub mod doctor;

use serde::Serialize;

/// What a subcommand hands back to `main`: the process exit code and text
/// for stdout (success) or stderr (failure).
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct FailurePayload<'a> {
    command: &'a str,
    status: &'static str,
    error_class: &'a str,
    message: String,
}

impl CommandResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self { exit_code: 0, output: output.into() }
    }

    /// Machine-readable failure line, e.g.
    /// `{"command":"chat","status":"error","error_class":"config_validation",...}`.
    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload =
            FailurePayload { command, status: "error", error_class, message: message.into() };
        let output = serde_json::to_string(&payload).unwrap_or_else(|error| {
            serde_json::json!({
                "command": command,
                "status": "error",
                "error_class": "serialization",
                "message": error.to_string(),
            })
            .to_string()
        });
        Self { exit_code, output }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}
