//! Log subscriber setup for the binary.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Level used when nothing else is configured.
pub const DEFAULT_LEVEL: &str = "warn";

/// Pick the filter directive: an explicit level wins, then `RUST_LOG`, then
/// the config file's level, then [`DEFAULT_LEVEL`].
pub fn filter(explicit: Option<&str>, configured: Option<&str>) -> EnvFilter {
    if let Some(level) = explicit.and_then(|l| EnvFilter::try_new(l.to_lowercase()).ok()) {
        return level;
    }
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured.unwrap_or(DEFAULT_LEVEL).to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
}

/// Install the global subscriber. Later calls are ignored.
pub fn init(explicit: Option<&str>, configured: Option<&str>) {
    let result = tracing_subscriber::registry()
        .with(filter(explicit, configured))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();

    if result.is_ok() {
        tracing::debug!("logging initialized");
    }
}
