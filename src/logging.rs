use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Initializes the global tracing subscriber. `RUST_LOG` overrides the
/// provided default filter. Safe to call more than once (later calls are
/// no-ops), which keeps parallel test binaries happy.
pub fn init(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter.to_string()));

    INIT.call_once(|| {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    });
}
