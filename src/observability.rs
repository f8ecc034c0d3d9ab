use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

// ── Ledger metrics ──────────────────────────────────────────────

/// Counter: bookings admitted.
pub const BOOKINGS_PLACED_TOTAL: &str = "classbook_bookings_placed_total";

/// Counter: booking requests refused. Labels: reason.
pub const BOOKINGS_REJECTED_TOTAL: &str = "classbook_bookings_rejected_total";

/// Counter: bookings moved from PLACED to DENIED.
pub const BOOKINGS_CANCELLED_TOTAL: &str = "classbook_bookings_cancelled_total";

/// Gauge: resources currently registered.
pub const RESOURCES_ACTIVE: &str = "classbook_resources_active";

// ── Reconciler metrics ──────────────────────────────────────────

/// Histogram: full reconcile pass duration in seconds.
pub const RECONCILE_DURATION_SECONDS: &str = "classbook_reconcile_duration_seconds";

/// Counter: availability flags flipped by reconcile passes.
pub const RECONCILE_CHANGES_TOTAL: &str = "classbook_reconcile_changes_total";

// ── WAL metrics ─────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "classbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "classbook_wal_flush_batch_size";

/// Install the fmt subscriber, filtered by `RUST_LOG` (default `info`).
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
