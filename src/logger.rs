//! Logging initialisation via tracing-subscriber.
//!
//! Precedence, highest first: CLI `-v` flags, `RUST_LOG`, the configured
//! level (itself overridable with `RELAY_LOG_LEVEL`). Call [`init`] once,
//! after config is loaded.

use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Map `-v` repetitions onto a level. `0` means "no CLI preference".
///
///   -v → warn, -vv → info, -vvv → debug, -vvvv+ → trace
pub fn level_for_verbosity(verbosity: u8) -> Option<&'static str> {
    match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    }
}

/// Build the filter. A CLI level wins outright; otherwise `RUST_LOG` is
/// consulted before falling back to `configured`.
fn build_filter(cli_level: Option<&str>, configured: &str) -> Result<EnvFilter, AppError> {
    if let Some(level) = cli_level {
        return EnvFilter::try_new(level)
            .map_err(|e| AppError::Logger(format!("invalid log level '{level}': {e}")));
    }
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured))
        .map_err(|e| AppError::Logger(format!("invalid log level '{configured}': {e}")))
}

/// Install the global subscriber, writing to stderr.
pub fn init(cli_level: Option<&str>, configured: &str) -> Result<(), AppError> {
    let filter = build_filter(cli_level, configured)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))
}
