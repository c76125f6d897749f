//! Binary entry point: logging, configuration, then the bot loop.

use std::process::ExitCode;

use community_bot::bot;
use community_bot::config::BotConfig;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    // RUST_LOG wins; otherwise info.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match BotConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    match bot::start(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "bot stopped with an error");
            ExitCode::FAILURE
        }
    }
}
