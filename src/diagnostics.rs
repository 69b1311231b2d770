//! Diagnostics: topology snapshots and node type availability checks.

use crate::engine::{GraphEngine, LifecycleState, NodeKind, pending_name};
use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Result of a node type availability check.
#[derive(Debug, PartialEq)]
pub enum CheckResult {
    /// Node type can be instantiated
    Ok,
    /// Node type (plugin) is not installed
    NotFound,
}

/// Snapshot label for a graph-level state change.
pub fn state_change_label(
    old: LifecycleState,
    new: LifecycleState,
    pending: Option<LifecycleState>,
) -> String {
    format!(
        "statechange_old-{}_new-{}_pending-{}",
        old.name(),
        new.name(),
        pending_name(pending)
    )
}

/// Elapsed-time prefix for snapshot file names (`H.MM.SS.NNNNNNNNN`).
fn timestamp_prefix(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!(
        "{}.{:02}.{:02}.{:09}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60,
        elapsed.subsec_nanos()
    )
}

/// Write `dot` into `dir` as `<elapsed>-<label>.dot` and return the path.
pub fn write_snapshot(dir: &Path, elapsed: Duration, label: &str, dot: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}-{}.dot", timestamp_prefix(elapsed), label));
    fs::write(&path, dot)?;
    Ok(path)
}

/// Check every node type the pipeline may need.
pub fn check_node_types<E: GraphEngine>(engine: &E) -> Vec<(NodeKind, CheckResult)> {
    NodeKind::ALL
        .iter()
        .map(|kind| {
            let result = if engine.is_available(*kind) {
                CheckResult::Ok
            } else {
                CheckResult::NotFound
            };
            (*kind, result)
        })
        .collect()
}

/// Returns true if every node type passed.
pub fn all_available(results: &[(NodeKind, CheckResult)]) -> bool {
    results.iter().all(|(_, result)| *result == CheckResult::Ok)
}
