//! Graph-execution engine contract.
//!
//! The pipeline layer never talks to a media framework directly; it drives a
//! [`GraphEngine`], which owns the actual node graph. Control commands go in
//! through the trait, confirmations and diagnostics come back as
//! [`StatusEvent`]s on the channel handed to
//! [`GraphEngine::attach_status_sink`].

#[cfg(feature = "gstreamer")]
pub mod gst;
pub mod simulated;

use crate::error::Result;
use std::fmt;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub use simulated::{EngineJournal, SimulatedEngine};

/// Sending half of the status event channel.
pub type StatusSender = UnboundedSender<StatusEvent>;

/// Receiving half of the status event channel.
pub type StatusReceiver = UnboundedReceiver<StatusEvent>;

/// Create a status event channel.
pub fn status_channel() -> (StatusSender, StatusReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// Logical node types the pipeline is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    CaptureSource,
    Splitter,
    BufferStage,
    FormatStage,
    AnalysisNode,
    ContainerEncoder,
    FileSink,
}

impl NodeKind {
    /// Every node type a complete pipeline may need.
    pub const ALL: [NodeKind; 7] = [
        NodeKind::CaptureSource,
        NodeKind::Splitter,
        NodeKind::BufferStage,
        NodeKind::FormatStage,
        NodeKind::AnalysisNode,
        NodeKind::ContainerEncoder,
        NodeKind::FileSink,
    ];

    /// Element factory implementing this node type.
    pub fn factory_name(self) -> &'static str {
        match self {
            NodeKind::CaptureSource => "pulsesrc",
            NodeKind::Splitter => "tee",
            NodeKind::BufferStage => "queue",
            NodeKind::FormatStage => "audioconvert",
            NodeKind::AnalysisNode => "driftmeasure",
            NodeKind::ContainerEncoder => "wavenc",
            NodeKind::FileSink => "filesink",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.factory_name())
    }
}

/// Identifier of a node inside one graph (its unique node name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Typed node property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    U32(u32),
    U64(u64),
    I64(i64),
    F32(f32),
    Str(String),
    /// Enumerated property, given by its nick (e.g. `"none"`).
    Enum(&'static str),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "{v}"),
            PropertyValue::U32(v) => write!(f, "{v}"),
            PropertyValue::U64(v) => write!(f, "{v}"),
            PropertyValue::I64(v) => write!(f, "{v}"),
            PropertyValue::F32(v) => write!(f, "{v}"),
            PropertyValue::Str(v) => write!(f, "\"{v}\""),
            PropertyValue::Enum(v) => f.write_str(v),
        }
    }
}

/// Format constraint applied to a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatFilter {
    pub media_type: &'static str,
    pub rate: u32,
    pub channels: u32,
}

impl fmt::Display for FormatFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, rate=(int){}, channels=(int){}",
            self.media_type, self.rate, self.channels
        )
    }
}

/// Graph-level lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    Null,
    Ready,
    Paused,
    Playing,
}

impl LifecycleState {
    /// Upper-case state name, as used in logs and snapshot file names.
    pub fn name(self) -> &'static str {
        match self {
            LifecycleState::Null => "NULL",
            LifecycleState::Ready => "READY",
            LifecycleState::Paused => "PAUSED",
            LifecycleState::Playing => "PLAYING",
        }
    }

    /// Next state on the way towards `target`, or `None` once reached.
    pub fn step_towards(self, target: LifecycleState) -> Option<LifecycleState> {
        use LifecycleState::*;
        let next = match self.cmp(&target) {
            std::cmp::Ordering::Equal => return None,
            std::cmp::Ordering::Less => match self {
                Null => Ready,
                Ready => Paused,
                Paused | Playing => Playing,
            },
            std::cmp::Ordering::Greater => match self {
                Playing => Paused,
                Paused => Ready,
                Ready | Null => Null,
            },
        };
        Some(next)
    }
}

/// Name of an optional pending state (`VOID_PENDING` when none).
pub fn pending_name(pending: Option<LifecycleState>) -> &'static str {
    pending.map_or("VOID_PENDING", LifecycleState::name)
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Originator of a status event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSource {
    /// The graph as a whole.
    Graph,
    /// A node of the graph.
    Node(NodeId),
    /// Something the engine could not attribute.
    Unknown,
}

/// Confirmed state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub old: LifecycleState,
    pub new: LifecycleState,
    pub pending: Option<LifecycleState>,
    pub source: EventSource,
}

/// Asynchronous notification emitted by the graph.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    StateChanged(StateChange),
    Info {
        message: String,
        detail: Option<String>,
    },
    Warning {
        message: String,
        detail: Option<String>,
    },
    Error {
        message: String,
        detail: Option<String>,
    },
    Latency,
    EndOfStream,
}

/// Control surface of a graph-execution engine.
///
/// Implementations own one graph. All methods are called from the single
/// control-loop thread; only the status sink may be used from engine-internal
/// threads.
pub trait GraphEngine {
    /// Returns true if nodes of `kind` can be instantiated.
    fn is_available(&self, kind: NodeKind) -> bool;

    /// Instantiate a node and add it to the graph under a unique `name`.
    fn create_node(&mut self, kind: NodeKind, name: &str) -> Result<NodeId>;

    /// Link two nodes, optionally constraining the negotiated format.
    fn link(&mut self, from: &NodeId, to: &NodeId, filter: Option<&FormatFilter>) -> Result<()>;

    /// Assign a node property.
    fn set_property(&mut self, node: &NodeId, property: &str, value: PropertyValue)
    -> Result<()>;

    /// Request a graph-level state transition.
    ///
    /// Success means the request was accepted; confirmation arrives later as
    /// [`StatusEvent::StateChanged`]. A transition to [`LifecycleState::Null`]
    /// completes before returning.
    fn set_state(&mut self, target: LifecycleState) -> Result<()>;

    /// Push an end-of-stream signal into the graph. Returns false if the
    /// graph refused it.
    fn send_end_of_stream(&mut self) -> bool;

    /// Recompute end-to-end latency.
    fn recalculate_latency(&mut self) -> Result<()>;

    /// Graphviz rendering of the current topology.
    fn render_topology(&self) -> String;

    /// Route all status events of this graph to `sink`, in production order.
    fn attach_status_sink(&mut self, sink: StatusSender) -> Result<()>;
}
