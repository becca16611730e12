//! Courier gateway entry point
//!
//! Run with:
//! ```bash
//! cargo run -p courier-gateway
//! ```
//!
//! Configuration is loaded from environment variables (and `.env` when present).

use courier_common::{try_init_tracing, ClientConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Initialize tracing
    if let Err(e) = try_init_tracing() {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run().await {
        error!(error = %e, "Gateway stopped with an error");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    info!("Starting courier gateway...");

    // Load configuration
    let config = ClientConfig::from_env().inspect_err(|e| {
        error!(error = %e, "Failed to load configuration");
    })?;

    info!(
        env = ?config.app.env,
        api_url = %config.http.api_url,
        "Configuration loaded"
    );

    courier_gateway::run(config).await?;

    info!("Gateway stopped");
    Ok(())
}
