pub mod commands;
pub mod console;
pub mod logging;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "huddle",
    about = "Huddle chat assistant",
    long_about = "Talk to the assistant from the terminal, with or without calendar access, and inspect its configuration.",
    after_help = "Examples:\n  huddle chat\n  huddle agent\n  huddle doctor --json\n  huddle config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Chat with the assistant on stdin/stdout; type quit or exit to leave")]
    Chat,
    #[command(about = "Chat with the calendar-aware agent on stdin/stdout")]
    Agent,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Check model settings, Slack token readiness, and calendar credentials")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub async fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Chat => commands::chat::run().await,
        Command::Agent => commands::agent::run().await,
        Command::Config => commands::CommandResult::ok(commands::config::run()),
        Command::Doctor { json } => commands::doctor::run(json),
    };

    if result.is_success() {
        if !result.output.is_empty() {
            println!("{}", result.output);
        }
    } else {
        eprintln!("{}", result.output);
    }
    ExitCode::from(result.exit_code)
}
