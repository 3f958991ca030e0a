//! Tracing setup for the entrypoint.
//!
//! `RUST_LOG` overrides the default of warnings plus `directive`. Output goes to
//! stderr so a wrapped command's stdout stays untouched.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber (stderr, compact, no timestamps).
pub fn init(directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,{directive}")));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .without_time()
                .compact(),
        )
        .init();
}
