use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking operations. Labels: op, outcome.
pub const BOOKING_OPS_TOTAL: &str = "maitred_booking_ops_total";

/// Histogram: create_booking latency in seconds, lock wait included.
pub const BOOKING_CREATE_DURATION_SECONDS: &str = "maitred_booking_create_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: time spent waiting on a (table, date) lock.
pub const LOCK_WAIT_SECONDS: &str = "maitred_lock_wait_seconds";

/// Counter: booking attempts that could not serialize in time.
pub const LOCK_TIMEOUTS_TOTAL: &str = "maitred_lock_timeouts_total";

/// Gauge: active tables in the registry.
pub const TABLES_ACTIVE: &str = "maitred_tables_active";

/// Counter: bookings removed by the past-date purge.
pub const BOOKINGS_PURGED_TOTAL: &str = "maitred_bookings_purged_total";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "maitred_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (events per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "maitred_journal_flush_batch_size";

/// Install the Prometheus metrics exporter on the given port. No-op if the
/// port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Stdout tracing subscriber for the embedding service and tests.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}
