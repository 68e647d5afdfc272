use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    huddle_cli::run().await
}
