use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking attempts. Labels: status (committed, conflict, error).
pub const RESERVATIONS_TOTAL: &str = "seatgrid_reservations_total";

/// Counter: cancellations applied.
pub const CANCELLATIONS_TOTAL: &str = "seatgrid_cancellations_total";

/// Counter: sign-ins applied.
pub const SIGNINS_TOTAL: &str = "seatgrid_signins_total";

/// Histogram: availability-map aggregation latency in seconds.
pub const AVAILABILITY_DURATION_SECONDS: &str = "seatgrid_availability_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: store call latency in seconds. Labels: op.
pub const STORE_OP_DURATION_SECONDS: &str = "seatgrid_store_op_duration_seconds";

/// Counter: store calls abandoned at the timeout bound.
pub const STORE_TIMEOUTS_TOTAL: &str = "seatgrid_store_timeouts_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "seatgrid_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (records per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "seatgrid_wal_flush_batch_size";

/// Install the Prometheus metrics exporter on the given port. No-op if
/// `port` is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
