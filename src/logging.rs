//! Tracing setup for the `boardsync` binary.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Environment variable holding an `EnvFilter` directive string.
pub const LOG_ENV: &str = "BOARDSYNC_LOG";

/// Filter used when `BOARDSYNC_LOG` is unset or invalid.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose { "boardsync=debug,warn" } else { "warn" }
}

fn build_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)))
}

/// Installs the global subscriber. Logs go to stderr so command output on
/// stdout stays clean. Calling this twice is harmless.
pub fn init_tracing(verbose: bool) {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(build_filter(verbose))
        .try_init();
}
