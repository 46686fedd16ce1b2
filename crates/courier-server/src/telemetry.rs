//! Tracing bootstrap for the Courier server.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing with console output.
///
/// # Configuration
///
/// Environment variables:
/// - `RUST_LOG`: Log filter (default: `info,courier_server=debug,courier_relay=debug`)
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,courier_server=debug,courier_relay=debug"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Telemetry initialized");

    Ok(())
}

/// Shutdown telemetry, flushing any pending output.
pub fn shutdown() {
    tracing::info!("Telemetry shutdown complete");
}
