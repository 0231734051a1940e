use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use parkease::config::Config;
use parkease::engine::Engine;
use parkease::notify::NotifyHub;
use parkease::scheduler;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    parkease::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let hub = Arc::new(NotifyHub::new());

    // Stand-in delivery worker until a mailer subscribes: log every notification.
    let mut outbox = hub.subscribe();
    tokio::spawn(async move {
        loop {
            match outbox.recv().await {
                Ok(n) => info!("notification: {}", n.to_payload()),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("notification log lagged, {missed} dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let engine = Arc::new(Engine::with_config(
        config.wal_path(),
        hub.clone(),
        config.engine_config(),
    )?);

    info!("parkease booking engine started");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  reminder interval: {}s", config.reminder_interval.as_secs());
    info!("  compact threshold: {}", config.compact_threshold);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let reminders = tokio::spawn(scheduler::run_reminder_scheduler(
        engine.clone(),
        config.reminder_interval,
    ));
    let compactor = tokio::spawn(scheduler::run_compactor(
        engine.clone(),
        config.compact_threshold,
    ));

    // Run until SIGTERM/ctrl-c
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }

    info!("shutdown signal received, stopping background tasks");
    reminders.abort();
    compactor.abort();

    if let Err(e) = engine.compact_wal().await {
        tracing::warn!("final compaction skipped: {e}");
    }

    info!("parkease stopped");
    Ok(())
}
