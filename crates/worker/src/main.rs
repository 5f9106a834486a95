use std::sync::Arc;

use anyhow::Context;
use stageflow_core::alerts::{AlertThresholds, HIGH_VALUE_THRESHOLD_CENTS};
use stageflow_events::{EmailConfig, EmailDelivery, EventBus};
use stageflow_pipeline::{
    AlertScanner, AutomationEngine, EngineConfig, OutboxRelay, PgStore, PipelineContext,
};
use stageflow_worker::background;
use stageflow_worker::config::WorkerConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stageflow_worker=debug,stageflow_pipeline=debug".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;
    tracing::info!(
        rule_sweep_secs = config.rule_sweep_interval.as_secs(),
        outbox_poll_secs = config.outbox_poll_interval.as_secs(),
        max_cascade_depth = config.max_cascade_depth,
        "Loaded worker configuration"
    );

    // --- Database ---
    let pool = stageflow_db::create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;
    stageflow_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    stageflow_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    // --- Services ---
    let event_bus = Arc::new(EventBus::default());
    let store = Arc::new(PgStore::new(pool.clone()));
    let ctx = PipelineContext::single(store).with_bus(Arc::clone(&event_bus));
    let engine = AutomationEngine::new(
        ctx.clone(),
        EngineConfig {
            max_cascade_depth: config.max_cascade_depth,
        },
    );
    let relay = OutboxRelay::new(ctx.clone(), engine.clone(), config.outbox_batch_size);
    let scanner = AlertScanner::new(
        ctx.clone(),
        AlertThresholds {
            stuck_days: config.stuck_threshold_days,
            high_value_cents: HIGH_VALUE_THRESHOLD_CENTS,
        },
    );

    // --- Background loops ---
    let cancel = CancellationToken::new();
    let mut handles = vec![
        tokio::spawn(background::bus_listener::run(
            engine.clone(),
            event_bus.subscribe(),
            cancel.clone(),
        )),
        tokio::spawn(background::outbox::run(
            relay,
            config.outbox_poll_interval,
            cancel.clone(),
        )),
        tokio::spawn(background::rule_sweep::run(
            engine.clone(),
            config.rule_sweep_interval,
            cancel.clone(),
        )),
        tokio::spawn(background::schedule::run(
            engine,
            config.schedule_tick_interval,
            cancel.clone(),
        )),
        tokio::spawn(background::alert_scan::run(
            scanner,
            config.alert_scan_interval,
            cancel.clone(),
        )),
    ];

    match EmailConfig::from_env() {
        Some(email_config) => {
            tracing::info!(host = %email_config.smtp_host, "SMTP delivery enabled");
            handles.push(tokio::spawn(background::email_delivery::run(
                pool.clone(),
                EmailDelivery::new(email_config),
                config.email_poll_interval,
                config.email_max_attempts,
                cancel.clone(),
            )));
        }
        None => tracing::warn!("SMTP_HOST not set, queued emails will not be delivered"),
    }

    tracing::info!(loops = handles.len(), "Worker running");
    shutdown_signal().await;

    // --- Shutdown ---
    cancel.cancel();
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Background loop panicked");
        }
    }
    pool.close().await;
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for SIGINT or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown"),
        () = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
