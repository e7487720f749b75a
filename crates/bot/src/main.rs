mod bootstrap;
mod dispatch;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use orderkato_core::config::{AppConfig, LoadOptions};
use orderkato_core::workflow::OrderWorkflow;
use orderkato_telegram::{ReconnectPolicy, UpdatePoller};

fn init_logging(config: &AppConfig) {
    use orderkato_core::config::LogFormat::*;
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

async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    spawn_session_sweep(
        app.workflow.clone(),
        Duration::from_secs(app.config.sessions.sweep_interval_secs),
        chrono::Duration::minutes(app.config.sessions.max_idle_minutes as i64),
    );

    let poller = UpdatePoller::new(
        app.api.clone(),
        dispatch::Dispatcher::new(app.workflow.clone(), app.api.clone()),
        ReconnectPolicy::default(),
    );

    info!(event_name = "bot.started", "orderkato-bot polling for updates");
    tokio::select! {
        result = poller.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!(event_name = "bot.stopping", "shutdown signal received");
        }
    }

    Ok(())
}

/// Idle sessions are evicted on a timer so abandoned conversations do not
/// accumulate forever.
fn spawn_session_sweep(
    workflow: Arc<OrderWorkflow>,
    interval: Duration,
    max_idle: chrono::Duration,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = workflow.sessions().expire_older_than(max_idle).await;
            if evicted > 0 {
                info!(event_name = "sessions.swept", evicted, "idle sessions evicted");
            }
        }
    });
}
