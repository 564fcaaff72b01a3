//! Logging initialization using tracing.

use tracing_subscriber::EnvFilter;

use crate::domain::models::LoggingConfig;

/// Environment flag that raises verbosity and enables error backtraces at
/// the CLI boundary.
pub const DEBUG_ENV: &str = "TASKFORGE_DEBUG";

/// Whether the debug flag is set.
pub fn debug_enabled() -> bool {
    std::env::var(DEBUG_ENV).is_ok_and(|v| !v.is_empty() && v != "0")
}

/// Initialize the global subscriber. Level resolution: `RUST_LOG` wins,
/// then the debug flag, then the configured level.
pub fn init(config: &LoggingConfig) {
    let default_level = if debug_enabled() {
        "debug".to_string()
    } else {
        config.level.clone()
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let result = if config.format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    // Already-initialized is fine (tests, repeated CLI invocations).
    drop(result);
}
