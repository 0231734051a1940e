use std::net::SocketAddr;

use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking attempts. Labels: outcome.
pub const BOOKINGS_TOTAL: &str = "parkease_bookings_total";

/// Histogram: create-reservation latency in seconds.
pub const BOOKING_DURATION_SECONDS: &str = "parkease_booking_duration_seconds";

/// Counter: lifecycle transitions. Labels: to.
pub const STATUS_TRANSITIONS_TOTAL: &str = "parkease_status_transitions_total";

// ── Side effects ────────────────────────────────────────────────

/// Counter: reminders dispatched by the sweep.
pub const REMINDERS_SENT_TOTAL: &str = "parkease_reminders_sent_total";

/// Counter: swallowed notifier failures. Labels: kind.
pub const NOTIFY_FAILURES_TOTAL: &str = "parkease_notify_failures_total";

/// Counter: booking references that needed the timestamp fallback.
pub const REFERENCE_FALLBACKS_TOTAL: &str = "parkease_reference_fallbacks_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "parkease_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "parkease_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map an error to a short label for metrics.
pub fn error_label(err: &EngineError) -> &'static str {
    match err {
        EngineError::NotFound(_) => "not_found",
        EngineError::AlreadyExists(_) => "already_exists",
        EngineError::InvalidInterval => "invalid_interval",
        EngineError::NoRateAvailable(_) => "no_rate",
        EngineError::SlotConflict(_) => "slot_conflict",
        EngineError::InvalidTransition { .. } => "invalid_transition",
        EngineError::UnknownStatus(_) => "unknown_status",
        EngineError::CancellationWindowClosed => "cancellation_window_closed",
        EngineError::ReferenceExhausted => "reference_exhausted",
        EngineError::ResourceInactive(_) => "resource_inactive",
        EngineError::SelfBooking => "self_booking",
        EngineError::Forbidden => "forbidden",
        EngineError::InvalidRequest(_) => "invalid_request",
        EngineError::LimitExceeded(_) => "limit_exceeded",
        EngineError::PersistenceFailure(_) => "persistence_failure",
    }
}
