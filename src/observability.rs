use std::net::SocketAddr;

use crate::model::Event;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: reservations created. Labels: bulk.
pub const RESERVATIONS_CREATED_TOTAL: &str = "labbook_reservations_created_total";

/// Counter: booking attempts rejected by the conflict resolver. Labels: kind.
pub const CONFLICTS_TOTAL: &str = "labbook_conflicts_total";

/// Counter: state-machine transitions applied. Labels: action.
pub const TRANSITIONS_TOTAL: &str = "labbook_transitions_total";

/// Counter: transitions rejected by a guard.
pub const GUARD_REJECTIONS_TOTAL: &str = "labbook_guard_rejections_total";

/// Counter: events handed to the notify hub.
pub const EVENTS_PUBLISHED_TOTAL: &str = "labbook_events_published_total";

// ── Reclaimer metrics ───────────────────────────────────────────

/// Counter: sweep iterations completed.
pub const SWEEP_RUNS_TOTAL: &str = "labbook_sweep_runs_total";

/// Counter: reservations forced to no-show by the sweep.
pub const SWEEP_NO_SHOW_TOTAL: &str = "labbook_sweep_no_show_total";

/// Counter: reservations auto-finished by the sweep.
pub const SWEEP_AUTO_FINISHED_TOTAL: &str = "labbook_sweep_auto_finished_total";

/// Counter: station records repaired by the self-heal pass.
pub const SWEEP_REPAIRED_STATIONS_TOTAL: &str = "labbook_sweep_repaired_stations_total";

/// Histogram: full sweep duration in seconds.
pub const SWEEP_DURATION_SECONDS: &str = "labbook_sweep_duration_seconds";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Map an Event variant to a short label for metrics and logs.
pub fn event_label(event: &Event) -> &'static str {
    match event {
        Event::ReservationCreated { .. } => "reservation_created",
        Event::ReservationCheckin { .. } => "reservation_checkin",
        Event::ReservationCheckout { .. } => "reservation_checkout",
        Event::ReservationCancelled { .. } => "reservation_cancelled",
        Event::ReservationNoShow { .. } => "reservation_no_show",
        Event::ReservationFinished { .. } => "reservation_finished",
        Event::StationCreated { .. } => "station_created",
        Event::StationUpdated { .. } => "station_updated",
        Event::BulkReservationCancelled { .. } => "bulk_reservation_cancelled",
    }
}
