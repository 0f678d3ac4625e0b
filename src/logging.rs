//! Logging configuration for zangetsu.
//!
//! Logs go to stderr so that stdout carries only query output.

use tracing_subscriber::EnvFilter;

/// Returns the filter directive used when `RUST_LOG` is not set.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

/// Initializes logging to stderr. `RUST_LOG` overrides the default level.
pub fn init_stderr_logging(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose))),
        )
        .with_writer(std::io::stderr)
        .init();
}
