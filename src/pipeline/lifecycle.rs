//! Graph lifecycle control.
//!
//! Forward path `Null → Ready → Paused → Playing` is requested by
//! [`LifecycleController::start`] and confirmed asynchronously through
//! status events. Draining is orthogonal to the state machine: it pushes
//! end-of-stream into the graph and completes when the graph reports
//! end-of-stream. Teardown to Null is synchronous and always available.

use crate::diagnostics;
use crate::engine::{EventSource, GraphEngine, LifecycleState, PropertyValue, StateChange};
use crate::error::Result;
use crate::pipeline::topology::{Topology, props};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Owns the graph and drives its state machine.
pub struct LifecycleController<E: GraphEngine> {
    engine: E,
    topology: Topology,
    source_name: String,
    state: LifecycleState,
    device_bound: bool,
    drain_requested: bool,
    torn_down: bool,
    created: Instant,
}

impl<E: GraphEngine> LifecycleController<E> {
    /// Take ownership of a built graph. The graph starts out in Null.
    pub fn new(engine: E, topology: Topology, source_name: impl Into<String>) -> Self {
        Self {
            engine,
            topology,
            source_name: source_name.into(),
            state: LifecycleState::Null,
            device_bound: false,
            drain_requested: false,
            torn_down: false,
            created: Instant::now(),
        }
    }

    /// Request the transition towards Playing.
    ///
    /// Never fails synchronously: a refused request is logged, and the graph
    /// reports the actual failure as an error event.
    pub fn start(&mut self) {
        if self.torn_down {
            warn!("Ignoring start request: pipeline already shut down");
            return;
        }
        info!("Starting pipeline");
        if let Err(e) = self.engine.set_state(LifecycleState::Playing) {
            warn!("Start request was not accepted: {e}");
        }
    }

    /// Push end-of-stream into the graph so buffered data and container
    /// trailers get written. Only the first call has an effect.
    pub fn request_drain(&mut self) {
        if self.drain_requested {
            debug!("Drain already requested");
            return;
        }
        if self.torn_down {
            debug!("Ignoring drain request: pipeline already shut down");
            return;
        }
        self.drain_requested = true;
        info!("Pushing end-of-stream into the pipeline");
        if !self.engine.send_end_of_stream() {
            warn!("Pipeline did not accept the end-of-stream event");
        }
    }

    /// Tear the graph down to Null. Safe to call any number of times;
    /// only the first call does anything.
    pub fn shutdown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        info!("Shutting down pipeline");
        match self.engine.set_state(LifecycleState::Null) {
            Ok(()) => self.state = LifecycleState::Null,
            Err(e) => warn!("Failed to shut down pipeline cleanly: {e}"),
        }
    }

    /// React to a confirmed state change of a node.
    ///
    /// The capture node only honours its device property once it has reached
    /// Ready, so the device is bound on the first Null → Ready confirmation
    /// and never again.
    pub fn on_state_confirmed(&mut self, change: &StateChange) {
        let EventSource::Node(node) = &change.source else {
            return;
        };
        if *node != self.topology.capture
            || change.old != LifecycleState::Null
            || change.new != LifecycleState::Ready
        {
            return;
        }
        if self.device_bound {
            debug!("Capture device already bound, not rebinding");
            return;
        }

        info!(device = %self.source_name, "Setting capture device");
        let value = PropertyValue::Str(self.source_name.clone());
        match self.engine.set_property(&self.topology.capture, props::DEVICE, value) {
            Ok(()) => self.device_bound = true,
            Err(e) => warn!("Failed to set capture device: {e}"),
        }
    }

    /// Record a confirmed graph-level state.
    pub fn on_graph_state(&mut self, state: LifecycleState) {
        self.state = state;
    }

    /// Ask the graph to recompute its end-to-end latency.
    pub fn recalculate_latency(&mut self) {
        debug!("Recalculating pipeline latency");
        if let Err(e) = self.engine.recalculate_latency() {
            warn!("Latency recalculation failed: {e}");
        }
    }

    /// Write a topology snapshot labelled `label` into `dir`.
    pub fn dump_topology(&self, dir: &Path, label: &str) -> Result<PathBuf> {
        let dot = self.engine.render_topology();
        diagnostics::write_snapshot(dir, self.created.elapsed(), label, &dot)
    }

    /// Last confirmed graph-level state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn is_device_bound(&self) -> bool {
        self.device_bound
    }

    pub fn is_drain_requested(&self) -> bool {
        self.drain_requested
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}

/// Scoped ownership of a controller whose graph may be running.
///
/// The graph is torn down exactly once: either by [`ActiveGraph::release`]
/// or, on any other way out of the scope, when the guard is dropped.
pub struct ActiveGraph<E: GraphEngine> {
    controller: LifecycleController<E>,
}

impl<E: GraphEngine> ActiveGraph<E> {
    pub fn acquire(controller: LifecycleController<E>) -> Self {
        Self { controller }
    }

    /// Tear the graph down now rather than at the end of the scope.
    pub fn release(mut self) {
        self.controller.shutdown();
    }
}

impl<E: GraphEngine> Deref for ActiveGraph<E> {
    type Target = LifecycleController<E>;

    fn deref(&self) -> &Self::Target {
        &self.controller
    }
}

impl<E: GraphEngine> DerefMut for ActiveGraph<E> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.controller
    }
}

impl<E: GraphEngine> Drop for ActiveGraph<E> {
    fn drop(&mut self) {
        self.controller.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureSettings;
    use crate::engine::{NodeId, SimulatedEngine, StatusEvent, status_channel};
    use crate::pipeline::topology::{TopologyBuilder, roles};
    use std::path::PathBuf;

    fn controller() -> LifecycleController<SimulatedEngine> {
        let config = CaptureSettings {
            source_name: Some("mic0".to_string()),
            output_csv_path: Some(PathBuf::from("/tmp/out.csv")),
            ..Default::default()
        }
        .validate()
        .unwrap();
        let mut engine = SimulatedEngine::new();
        let topology = TopologyBuilder::new(&config).build(&mut engine).unwrap();
        LifecycleController::new(engine, topology, config.source_name())
    }

    fn capture_change(old: LifecycleState, new: LifecycleState) -> StateChange {
        StateChange {
            old,
            new,
            pending: None,
            source: EventSource::Node(NodeId::new(roles::CAPTURE)),
        }
    }

    fn device(controller: &LifecycleController<SimulatedEngine>) -> Option<PropertyValue> {
        controller
            .engine()
            .snapshot()
            .property(roles::CAPTURE, props::DEVICE)
            .cloned()
    }

    #[test]
    fn test_binds_device_on_null_to_ready() {
        let mut controller = controller();
        controller.on_state_confirmed(&capture_change(LifecycleState::Null, LifecycleState::Ready));
        assert!(controller.is_device_bound());
        assert_eq!(device(&controller), Some(PropertyValue::Str("mic0".to_string())));
    }

    #[test]
    fn test_ignores_other_transitions_of_capture_node() {
        let mut controller = controller();
        controller.on_state_confirmed(&capture_change(LifecycleState::Ready, LifecycleState::Paused));
        controller.on_state_confirmed(&capture_change(LifecycleState::Paused, LifecycleState::Playing));
        assert!(!controller.is_device_bound());
        assert_eq!(device(&controller), None);
    }

    #[test]
    fn test_ignores_ready_of_other_nodes_and_graph() {
        let mut controller = controller();
        controller.on_state_confirmed(&StateChange {
            old: LifecycleState::Null,
            new: LifecycleState::Ready,
            pending: None,
            source: EventSource::Node(NodeId::new(roles::SPLITTER)),
        });
        controller.on_state_confirmed(&StateChange {
            old: LifecycleState::Null,
            new: LifecycleState::Ready,
            pending: Some(LifecycleState::Playing),
            source: EventSource::Graph,
        });
        assert!(!controller.is_device_bound());
    }

    #[test]
    fn test_second_ready_does_not_rebind() {
        let mut controller = controller();
        controller.on_state_confirmed(&capture_change(LifecycleState::Null, LifecycleState::Ready));

        // Overwrite the property behind the controller's back; a rebind would restore it.
        let capture = controller.topology().capture.clone();
        controller
            .engine
            .set_property(&capture, props::DEVICE, PropertyValue::Str("other".to_string()))
            .unwrap();

        controller.on_state_confirmed(&capture_change(LifecycleState::Null, LifecycleState::Ready));
        assert_eq!(device(&controller), Some(PropertyValue::Str("other".to_string())));
    }

    #[test]
    fn test_request_drain_is_idempotent() {
        let mut controller = controller();
        controller.start();
        for _ in 0..5 {
            controller.request_drain();
        }
        assert!(controller.is_drain_requested());
        assert_eq!(controller.engine().snapshot().eos_sent, 1);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let mut controller = controller();
        controller.start();
        controller.shutdown();
        controller.shutdown();
        let journal = controller.engine().snapshot();
        assert_eq!(journal.null_requests(), 1);
        assert_eq!(journal.state, LifecycleState::Null);
        assert_eq!(controller.state(), LifecycleState::Null);
    }

    #[test]
    fn test_shutdown_without_start_is_safe() {
        let mut controller = controller();
        controller.shutdown();
        controller.shutdown();
        assert!(controller.is_torn_down());
        assert_eq!(controller.engine().snapshot().null_requests(), 1);
    }

    #[test]
    fn test_start_after_shutdown_is_ignored() {
        let mut controller = controller();
        controller.shutdown();
        controller.start();
        controller.request_drain();
        let journal = controller.engine().snapshot();
        assert_eq!(journal.state_requests, vec![LifecycleState::Null]);
        assert_eq!(journal.eos_sent, 0);
    }

    #[test]
    fn test_start_is_asynchronous_from_callers_view() {
        let (tx, mut rx) = status_channel();
        let mut controller = controller();
        controller.engine.attach_status_sink(tx).unwrap();
        controller.start();

        // Nothing is known until the confirmation events are handled.
        assert_eq!(controller.state(), LifecycleState::Null);
        let mut confirmations = 0;
        while let Ok(event) = rx.try_recv() {
            if let StatusEvent::StateChanged(change) = event
                && change.source == EventSource::Graph
            {
                controller.on_graph_state(change.new);
                confirmations += 1;
            }
        }
        assert_eq!(confirmations, 3);
        assert_eq!(controller.state(), LifecycleState::Playing);
    }

    #[test]
    fn test_latency_recalculation_reaches_engine() {
        let mut controller = controller();
        controller.recalculate_latency();
        assert_eq!(controller.engine().snapshot().latency_recalculations, 1);
    }

    #[test]
    fn test_active_graph_drop_shuts_down_once() {
        let controller = controller();
        let journal = controller.engine().journal();
        {
            let mut active = ActiveGraph::acquire(controller);
            active.start();
        }
        let journal = journal.lock().unwrap();
        assert_eq!(journal.null_requests(), 1);
        assert_eq!(journal.state, LifecycleState::Null);
    }

    #[test]
    fn test_active_graph_release_shuts_down_once() {
        let controller = controller();
        let journal = controller.engine().journal();
        let mut active = ActiveGraph::acquire(controller);
        active.start();
        active.release();
        assert_eq!(journal.lock().unwrap().null_requests(), 1);
    }
}
