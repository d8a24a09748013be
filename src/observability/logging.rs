//! Tracing subscriber setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::lifecycle::LifecycleMode;

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "powerd=info";

/// Install the global subscriber.
///
/// Interactive runs log human-readable lines to stderr. Under a
/// supervisor the journal gets structured fields directly, so service
/// logs are queryable without re-parsing formatted text.
pub fn init(mode: LifecycleMode) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    #[cfg(unix)]
    if mode == LifecycleMode::Managed {
        if let Ok(journald) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(filter)
                .with(journald)
                .init();
            return;
        }
        // Journal socket unavailable; fall back to stderr below.
    }
    #[cfg(not(unix))]
    let _ = mode;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .init();
}
