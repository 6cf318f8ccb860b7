//! # Hoard Server
//!
//! Hosts a [`CacheService`] for the lifetime of the process: builds it from
//! configuration, starts it, and stops it on shutdown.

use hoard_cache::{register_metrics, CacheError, CacheService};
use hoard_config::AppConfig;
use hoard_core::HoardResult;
use std::future::Future;
use tokio::signal;
use tracing::{error, info, warn};

/// Build and start the cache service described by `config`.
///
/// An unreachable store does not fail startup; the service runs degraded
/// until the store answers.
pub async fn start_cache(config: &AppConfig) -> HoardResult<CacheService> {
    if config.cache.metrics_enabled {
        register_metrics();
    }

    let cache = CacheService::new(config.cache.clone())?;
    cache.start().await?;

    match cache.health_check().await {
        Ok(()) => info!(state = %cache.state(), "Cache health check passed"),
        Err(CacheError::Disabled) => info!("Cache disabled by configuration"),
        Err(e) => warn!(state = %cache.state(), error = %e, "Cache health check failed; continuing degraded"),
    }

    Ok(cache)
}

/// Run until `shutdown` resolves, then stop the cache.
pub async fn run(config: AppConfig, shutdown: impl Future<Output = ()>) -> HoardResult<()> {
    info!("Environment: {}", config.app.environment);
    info!(enabled = config.cache.enabled, prefix = %config.cache.key_prefix, "Cache settings loaded");

    let cache = start_cache(&config).await?;

    shutdown.await;

    cache.stop().await;
    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        () = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        }
    }
}
