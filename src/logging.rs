//! Log output setup.
//!
//! Everything goes to stderr. `RUST_LOG` takes precedence over the
//! verbosity flags when it is set.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter directive for the given verbosity flags.
pub fn default_directive(quiet: bool, verbose: u8) -> &'static str {
    if quiet {
        return "warn";
    }
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. Calling it twice is harmless; the second
/// call leaves the first subscriber in place.
pub fn init_logging(quiet: bool, verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(quiet, verbose)));

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
    if let Err(e) = result {
        tracing::debug!("Logging already initialised: {e}");
    }
}
