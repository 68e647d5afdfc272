mod bootstrap;

use anyhow::Result;
use huddle_core::config::{AppConfig, ConfigProfile, LoadOptions};

fn init_logging(config: &AppConfig) {
    use huddle_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::for_profile(ConfigProfile::Slack))?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;
    bootstrap::send_startup_notification(
        app.poster.as_ref(),
        app.config.slack.test_channel_id.as_deref(),
    )
    .await;

    let slack_runner = app.slack_runner;
    let runner = tokio::spawn(async move { slack_runner.start().await });

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        model = %app.config.llm.model,
        "huddle-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        sessions = app.chat.store().session_count(),
        "huddle-server stopping"
    );
    runner.abort();

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
