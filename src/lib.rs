//! driftmeasure - clock drift measurement between audio channels
//!
//! Captures multichannel audio, splits it into an analysis branch that
//! writes drift measurements as CSV and an optional branch that records
//! the raw capture as WAV, and shuts the whole graph down cleanly on
//! end-of-stream, error or termination signal.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod logging;
pub mod pipeline;

// Engine contract
pub use engine::{GraphEngine, LifecycleState, NodeKind, SimulatedEngine, StatusEvent};

// Pipeline
pub use pipeline::{LoopExit, Orchestrator, RunOptions, ShutdownSignal};

// Error handling
pub use error::{DriftError, Result};

// Config
pub use config::{CaptureConfig, CaptureSettings, Config, UndetectedPeakHandling};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_appends_git_hash_when_present() {
        let ver = version_string();
        match option_env!("GIT_HASH") {
            Some(hash) if !hash.is_empty() => assert!(ver.ends_with(&format!("+{hash}"))),
            _ => assert_eq!(ver, env!("CARGO_PKG_VERSION")),
        }
    }
}
