//! Tracing setup for the mayday binary.
//!
//! Logs go to stderr so that stdout only carries the operator report
//! (the output path). Call [`init_tracing`] once at program start; later
//! calls are ignored.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV_VAR: &str = "MAYDAY_LOG";

/// Build the filter: `MAYDAY_LOG`, then `RUST_LOG`, then `level`.
pub fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Initialise the global tracing subscriber.
///
/// * `json` - emit newline-delimited JSON instead of human-readable lines.
/// * `level` - verbosity used when no filter variable is set.
pub fn init_tracing(json: bool, level: Level) {
    let filter = env_filter(level);
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init()
            .ok();
    }
}
