//! Drift measurement pipeline.
//!
//! Builds the capture → split → analysis/recording graph on a
//! [`GraphEngine`](crate::engine::GraphEngine), drives it through its
//! lifecycle and turns status events and termination signals into orderly
//! shutdown.

pub mod dispatcher;
pub mod factory;
pub mod lifecycle;
pub mod orchestrator;
pub mod shutdown;
pub mod topology;

pub use dispatcher::{EventDispatcher, Flow, LoopExit};
pub use factory::NodeFactory;
pub use lifecycle::{ActiveGraph, LifecycleController};
pub use orchestrator::{ControlHandle, Orchestrator, RunOptions};
pub use shutdown::{ControlMessage, ShutdownCoordinator, ShutdownSignal, control_channel};
pub use topology::{AnalysisBranch, RecordingBranch, Topology, TopologyBuilder};
