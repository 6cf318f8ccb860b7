//! Hoard server entry point.

use hoard_config::ConfigLoader;
use hoard_core::{init_logging, ErrorSummary};
use hoard_server::{run, shutdown_signal};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Logging is configured from the loaded file, so config errors go to stderr.
    let config = match ConfigLoader::from_default_location() {
        Ok(loader) => loader.into_config(),
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }

    info!("Starting Hoard Server...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(config, shutdown_signal()).await {
        let summary = ErrorSummary::from(&e);
        error!(code = %summary.code, "Application error: {}", summary.message);
        std::process::exit(1);
    }
}
