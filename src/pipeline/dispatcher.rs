//! Translation of status events into lifecycle actions.

use crate::diagnostics;
use crate::engine::{EventSource, GraphEngine, StateChange, StatusEvent, pending_name};
use crate::pipeline::lifecycle::LifecycleController;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Why the control loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// The graph drained completely.
    EndOfStream,
    /// The graph reported an unrecoverable error.
    Fatal { message: String },
}

impl LoopExit {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> u8 {
        match self {
            LoopExit::EndOfStream => 0,
            LoopExit::Fatal { .. } => 1,
        }
    }
}

/// Whether the control loop keeps running after an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit(LoopExit),
}

/// Routes each [`StatusEvent`] to the matching lifecycle action.
#[derive(Debug, Clone, Default)]
pub struct EventDispatcher {
    dump_dir: Option<PathBuf>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a topology snapshot into `dir` on every graph-level state change.
    pub fn with_dump_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.dump_dir = dir;
        self
    }

    pub fn dump_dir(&self) -> Option<&PathBuf> {
        self.dump_dir.as_ref()
    }

    /// Handle one event.
    pub fn dispatch<E: GraphEngine>(
        &self,
        controller: &mut LifecycleController<E>,
        event: StatusEvent,
    ) -> Flow {
        match event {
            StatusEvent::StateChanged(change) => {
                self.on_state_changed(controller, &change);
                Flow::Continue
            }
            StatusEvent::Info { message, detail } => {
                info!(detail = detail.as_deref().unwrap_or(""), "{message}");
                Flow::Continue
            }
            StatusEvent::Warning { message, detail } => {
                warn!(detail = detail.as_deref().unwrap_or(""), "{message}");
                Flow::Continue
            }
            StatusEvent::Error { message, detail } => {
                error!(detail = detail.as_deref().unwrap_or(""), "{message}");
                Flow::Quit(LoopExit::Fatal { message })
            }
            StatusEvent::Latency => {
                controller.recalculate_latency();
                Flow::Continue
            }
            StatusEvent::EndOfStream => {
                info!("End of stream reached");
                Flow::Quit(LoopExit::EndOfStream)
            }
        }
    }

    fn on_state_changed<E: GraphEngine>(
        &self,
        controller: &mut LifecycleController<E>,
        change: &StateChange,
    ) {
        match &change.source {
            EventSource::Graph => {
                controller.on_graph_state(change.new);
                info!(
                    "Completed state change from {} to {}; pending: {}",
                    change.old,
                    change.new,
                    pending_name(change.pending)
                );
                if let Some(dir) = &self.dump_dir {
                    let label = diagnostics::state_change_label(change.old, change.new, change.pending);
                    match controller.dump_topology(dir, &label) {
                        Ok(path) => debug!(path = %path.display(), "wrote topology snapshot"),
                        Err(e) => warn!("Failed to write topology snapshot: {e}"),
                    }
                }
            }
            EventSource::Node(node) => {
                debug!(node = %node, old = %change.old, new = %change.new, "node state changed");
                controller.on_state_confirmed(change);
            }
            EventSource::Unknown => {
                debug!(old = %change.old, new = %change.new, "state change from unknown source");
            }
        }
    }
}
