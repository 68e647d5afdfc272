use std::path::PathBuf;

use huddle_agent::calendar::GoogleCalendarClient;
use huddle_core::config::{AppConfig, ConfigProfile, LoadOptions};
use serde::Serialize;

use super::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            serde_json::json!({
                "overall_status": "fail",
                "summary": "doctor serialization failed",
                "error": error.to_string(),
            })
            .to_string()
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

/// Overall status follows config validation alone. The Slack and calendar
/// checks report whether those entry points could start.
fn build_report() -> DoctorReport {
    let mut checks = Vec::new();
    let options = LoadOptions { env_file: Some(PathBuf::from(".env")), ..LoadOptions::default() };

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: format!(
                    "model `{}` via {}",
                    config.llm.model,
                    config.llm.endpoint_base()
                ),
            });
            checks.push(check_slack_tokens(&config));
            checks.push(check_calendar_credentials(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["slack_token_readiness", "calendar_credentials"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let config_ok = checks.first().is_some_and(|check| check.status == CheckStatus::Pass);
    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if config_ok { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else if config_ok {
        "doctor: chat is ready; some integrations are not configured".to_string()
    } else {
        "doctor: configuration failed to load".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_slack_tokens(config: &AppConfig) -> DoctorCheck {
    match config.validate(ConfigProfile::Slack) {
        Ok(()) => DoctorCheck {
            name: "slack_token_readiness",
            status: CheckStatus::Pass,
            details: "app and bot tokens have the expected prefixes".to_string(),
        },
        Err(error) => DoctorCheck {
            name: "slack_token_readiness",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_calendar_credentials(config: &AppConfig) -> DoctorCheck {
    let result = config
        .validate(ConfigProfile::Agent)
        .map_err(|error| error.to_string())
        .and_then(|()| {
            GoogleCalendarClient::from_config(&config.calendar).map_err(|error| error.to_string())
        });

    match result {
        Ok(_) => DoctorCheck {
            name: "calendar_credentials",
            status: CheckStatus::Pass,
            details: format!("credential file `{}` is readable", config.calendar.token_path.display()),
        },
        Err(details) => DoctorCheck { name: "calendar_credentials", status: CheckStatus::Fail, details },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
