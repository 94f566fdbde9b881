//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::config::{LoggingSettings, DEFAULT_LOG_FILTER};

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages (overrides the config filter)
/// - `RUST_LOG=pantry_db=trace` - Trace for one crate only
/// - Default: `info,pantry=debug,sqlx=warn`
///
/// A second call is a no-op, so tests may call it freely.
pub fn init_tracing(settings: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.filter))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    // Already installed is fine
    let _ = if settings.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
