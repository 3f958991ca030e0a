//! Tracing setup for the service binary.
//!
//! `RUST_LOG` overrides everything. Without it, only warnings are shown
//! globally plus whatever `directive` enables (e.g. `decapi=info`).

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber (stderr, compact format).
///
/// # Example
/// ```bash
/// RUST_LOG=decapi=debug decapi --port 8000
/// ```
pub fn init(directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,{directive}")));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
