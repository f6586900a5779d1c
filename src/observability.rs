use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: bookings created.
pub const BOOKINGS_CREATED_TOTAL: &str = "reserva_bookings_created_total";

/// Counter: bookings cancelled.
pub const BOOKINGS_CANCELLED_TOTAL: &str = "reserva_bookings_cancelled_total";

/// Counter: bookings rescheduled.
pub const BOOKINGS_RESCHEDULED_TOTAL: &str = "reserva_bookings_rescheduled_total";

/// Counter: create/reschedule attempts rejected by the conflict check.
pub const BOOKING_CONFLICTS_TOTAL: &str = "reserva_booking_conflicts_total";

/// Counter: operations that timed out waiting for a resource-key lock.
pub const LOCK_BUSY_TOTAL: &str = "reserva_lock_busy_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: time spent waiting for a resource-key lock, in seconds.
pub const LOCK_WAIT_SECONDS: &str = "reserva_lock_wait_seconds";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "reserva_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (events per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "reserva_journal_flush_batch_size";

/// Install the Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
