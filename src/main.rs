use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use labbook::clock::SystemClock;
use labbook::engine::{Engine, EngineConfig};
use labbook::limits::MS_PER_MINUTE;
use labbook::notify::NotifyHub;
use labbook::reaper;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("LABBOOK_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    labbook::observability::init(metrics_port);

    let check_in_window_minutes: i64 = std::env::var("LABBOOK_CHECK_IN_WINDOW_MINUTES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);
    let sweep_interval_secs: u64 = std::env::var("LABBOOK_SWEEP_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(300);

    let notify = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::new(
        notify.clone(),
        Arc::new(SystemClock),
        EngineConfig {
            check_in_window_ms: check_in_window_minutes * MS_PER_MINUTE,
        },
    ));

    info!("labbook engine started");
    info!("  check_in_window: {check_in_window_minutes}m");
    info!("  sweep_interval: {sweep_interval_secs}s");
    info!("  metrics: {}", metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    let reaper_handle = tokio::spawn(reaper::run_reaper(
        engine.clone(),
        Duration::from_secs(sweep_interval_secs),
        Duration::from_secs(5),
    ));

    // Mirror the event stream into the debug log.
    let mut events = notify.subscribe();
    let log_handle = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::debug!(?event, "event");
        }
    });

    // Graceful shutdown on SIGTERM/ctrl-c.
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }

    info!("shutdown signal received");
    reaper_handle.abort();
    log_handle.abort();

    // One last reclamation so nothing is left mid-expiry.
    let report = engine.run_reclamation();
    if !report.is_empty() {
        info!(
            no_shows = report.no_shows,
            auto_finished = report.auto_finished,
            repaired = report.repaired_stations,
            "final reclamation pass"
        );
    }

    info!("labbook stopped");
    Ok(())
}
