//! Tracing setup for the binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global subscriber. `RUST_LOG` wins when set;
/// otherwise the configured level applies to this crate with `info`
/// for everything else.
pub fn init(log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("usher={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
