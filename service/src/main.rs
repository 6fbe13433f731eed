#![deny(
    clippy::expect_used,
    clippy::panic,
    clippy::print_stdout,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used
)]

use posture_api::{
    config::Config,
    startup::{shutdown_on_signal, Application},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Load and validate configuration first (fail-fast)
    let config = Config::load().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up logging from config
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.level))
        .init();

    // Init banner so container logs clearly show startup
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "posture-api starting up"
    );

    let app = match Application::build(&config).await {
        Ok(app) => app,
        Err(err) => {
            tracing::error!(error = %err, "Startup failed; exiting");
            return Err(err.into());
        }
    };

    shutdown_on_signal(app.handle());

    if let Err(err) = app.run_until_stopped().await {
        tracing::error!(error = %err, "Server stopped with an error");
        return Err(err.into());
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
