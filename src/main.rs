// src/main.rs
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use service_health::{
    config::{self, Config},
    health::{Health, HealthOptions, HttpChecker},
    metrics::MetricsRegistry,
    server::{MetricsHandler, ServerBuilder, StatusHandler},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("service_health=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "health.yaml".to_string());

    info!("Loading configuration from: {}", config_path);
    let config = config::load_config(&config_path).await?;

    let mut health = Health::new(config.service.name.clone(), HealthOptions::from(&config));

    // Initialize metrics
    if config.metrics.enabled {
        let registry = Arc::new(MetricsRegistry::new()?);
        health = health.with_metrics(registry.collector());
        start_metrics_server(&config, registry);
    }

    let health = Arc::new(health);
    register_checkers(&health, &config)?;

    info!(
        service = %config.service.name,
        checkers = ?health.checker_names(),
        timeout = ?health.checkers_timeout(),
        "Serving health status on {}{}",
        config.server.listen,
        config.server.path
    );

    let handler = StatusHandler::new(health.clone(), config.server.path.as_str());
    let drain = config.shutdown.drain();
    let draining = health.clone();

    ServerBuilder::new(config.server.listen)
        .with_handler(handler)
        .serve_with_shutdown(async move {
            shutdown_signal().await;
            draining.shutdown();
            info!("Draining for {:?} before exit", drain);
            tokio::time::sleep(drain).await;
        })
        .await?;

    Ok(())
}

fn register_checkers(health: &Health, config: &Config) -> Result<()> {
    for checker in &config.checkers {
        let http = HttpChecker::from_config(checker)
            .with_context(|| format!("Failed to build checker {}", checker.name))?;
        info!(checker = %checker.name, url = %http.url(), "Configured HTTP checker");
        health.register_checker(checker.name.clone(), Arc::new(http));
    }
    Ok(())
}

fn start_metrics_server(config: &Config, registry: Arc<MetricsRegistry>) {
    let addr = config.metrics.listen;
    let handler = MetricsHandler::new(registry, config.metrics.path.as_str());

    info!(
        "Metrics server listening on http://{}{}",
        addr, config.metrics.path
    );

    tokio::spawn(async move {
        if let Err(e) = ServerBuilder::new(addr).with_handler(handler).serve().await {
            error!("Metrics server error: {}", e);
        }
    });
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
