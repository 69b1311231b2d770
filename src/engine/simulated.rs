//! Deterministic in-process engine.
//!
//! Behaves like a well-mannered media framework without touching any audio
//! hardware: state transitions are walked one step at a time and confirmed
//! per node and then for the whole graph, end-of-stream finalises every file
//! sink once the graph is playing, and every call is recorded in an
//! [`EngineJournal`] that stays readable after the engine has been moved into
//! the pipeline.

use super::{
    EventSource, FormatFilter, GraphEngine, LifecycleState, NodeId, NodeKind, PropertyValue,
    StateChange, StatusEvent, StatusSender,
};
use crate::error::{DriftError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A node as the simulated engine sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct SimNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub properties: BTreeMap<String, PropertyValue>,
}

/// A link between two simulated nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct SimLink {
    pub from: NodeId,
    pub to: NodeId,
    pub filter: Option<FormatFilter>,
}

/// Everything the simulated engine was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineJournal {
    pub nodes: Vec<SimNode>,
    pub links: Vec<SimLink>,
    /// Every `set_state` target, in call order.
    pub state_requests: Vec<LifecycleState>,
    /// Current graph state.
    pub state: LifecycleState,
    /// Number of end-of-stream signals pushed into the graph.
    pub eos_sent: usize,
    /// File sinks that received end-of-stream while playing.
    pub finalized_sinks: Vec<NodeId>,
    pub latency_recalculations: usize,
}

impl Default for EngineJournal {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            links: Vec::new(),
            state_requests: Vec::new(),
            state: LifecycleState::Null,
            eos_sent: 0,
            finalized_sinks: Vec::new(),
            latency_recalculations: 0,
        }
    }
}

impl EngineJournal {
    pub fn node(&self, name: &str) -> Option<&SimNode> {
        self.nodes.iter().find(|node| node.id.as_str() == name)
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<&SimNode> {
        self.nodes.iter().filter(|node| node.kind == kind).collect()
    }

    pub fn property(&self, node: &str, property: &str) -> Option<&PropertyValue> {
        self.node(node).and_then(|n| n.properties.get(property))
    }

    pub fn links_from(&self, name: &str) -> Vec<&SimLink> {
        self.links
            .iter()
            .filter(|link| link.from.as_str() == name)
            .collect()
    }

    /// How many times teardown to Null was requested.
    pub fn null_requests(&self) -> usize {
        self.state_requests
            .iter()
            .filter(|state| **state == LifecycleState::Null)
            .count()
    }
}

/// Simulated graph-execution engine.
#[derive(Debug, Default)]
pub struct SimulatedEngine {
    journal: Arc<Mutex<EngineJournal>>,
    unavailable: BTreeSet<NodeKind>,
    sink: Option<StatusSender>,
    on_playing: Vec<StatusEvent>,
    refuse_eos: bool,
    eos_pending: bool,
}

impl SimulatedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend nodes of `kind` cannot be instantiated.
    pub fn without_kind(mut self, kind: NodeKind) -> Self {
        self.unavailable.insert(kind);
        self
    }

    /// Emit `events` the first time the graph reaches Playing.
    pub fn with_events_on_playing(mut self, events: Vec<StatusEvent>) -> Self {
        self.on_playing = events;
        self
    }

    /// Refuse every end-of-stream signal.
    pub fn refusing_end_of_stream(mut self) -> Self {
        self.refuse_eos = true;
        self
    }

    /// Shared handle to the journal.
    pub fn journal(&self) -> Arc<Mutex<EngineJournal>> {
        Arc::clone(&self.journal)
    }

    /// Copy of the journal as it is right now.
    pub fn snapshot(&self) -> EngineJournal {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, EngineJournal> {
        self.journal.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: StatusEvent) {
        if let Some(sink) = &self.sink {
            // Receiver gone means nobody is listening any more.
            sink.send(event).ok();
        }
    }

    /// Confirm one transition step: nodes downstream-first, then the graph.
    fn confirm_step(&self, old: LifecycleState, new: LifecycleState, target: LifecycleState) {
        let node_ids: Vec<NodeId> = self.lock().nodes.iter().rev().map(|n| n.id.clone()).collect();
        for id in node_ids {
            self.emit(StatusEvent::StateChanged(StateChange {
                old,
                new,
                pending: None,
                source: EventSource::Node(id),
            }));
        }
        let pending = (new != target).then_some(target);
        self.emit(StatusEvent::StateChanged(StateChange {
            old,
            new,
            pending,
            source: EventSource::Graph,
        }));
    }

    fn finish_stream(&mut self) {
        self.eos_pending = false;
        {
            let mut journal = self.lock();
            let sinks: Vec<NodeId> = journal
                .nodes
                .iter()
                .filter(|node| node.kind == NodeKind::FileSink)
                .map(|node| node.id.clone())
                .collect();
            journal.finalized_sinks.extend(sinks);
        }
        self.emit(StatusEvent::EndOfStream);
    }

    fn require_node(&self, id: &NodeId) -> Result<()> {
        if self.lock().node(id.as_str()).is_some() {
            Ok(())
        } else {
            Err(DriftError::UnknownNode {
                node: id.to_string(),
            })
        }
    }
}

impl GraphEngine for SimulatedEngine {
    fn is_available(&self, kind: NodeKind) -> bool {
        !self.unavailable.contains(&kind)
    }

    fn create_node(&mut self, kind: NodeKind, name: &str) -> Result<NodeId> {
        if !self.is_available(kind) {
            return Err(DriftError::NodeUnavailable {
                factory: kind.factory_name().to_string(),
                role: name.to_string(),
            });
        }
        let mut journal = self.lock();
        if journal.node(name).is_some() {
            return Err(DriftError::Engine {
                message: format!("node name \"{name}\" is already in use"),
            });
        }
        let id = NodeId::new(name);
        journal.nodes.push(SimNode {
            id: id.clone(),
            kind,
            properties: BTreeMap::new(),
        });
        Ok(id)
    }

    fn link(&mut self, from: &NodeId, to: &NodeId, filter: Option<&FormatFilter>) -> Result<()> {
        self.require_node(from)?;
        self.require_node(to)?;
        self.lock().links.push(SimLink {
            from: from.clone(),
            to: to.clone(),
            filter: filter.cloned(),
        });
        Ok(())
    }

    fn set_property(
        &mut self,
        node: &NodeId,
        property: &str,
        value: PropertyValue,
    ) -> Result<()> {
        let mut journal = self.lock();
        let Some(entry) = journal.nodes.iter_mut().find(|n| &n.id == node) else {
            return Err(DriftError::UnknownNode {
                node: node.to_string(),
            });
        };
        entry.properties.insert(property.to_string(), value);
        Ok(())
    }

    fn set_state(&mut self, target: LifecycleState) -> Result<()> {
        let mut current = {
            let mut journal = self.lock();
            journal.state_requests.push(target);
            journal.state
        };

        while let Some(next) = current.step_towards(target) {
            self.lock().state = next;
            self.confirm_step(current, next, target);
            current = next;

            if current == LifecycleState::Playing {
                for event in std::mem::take(&mut self.on_playing) {
                    self.emit(event);
                }
                if self.eos_pending {
                    self.finish_stream();
                }
            }
        }
        Ok(())
    }

    fn send_end_of_stream(&mut self) -> bool {
        self.lock().eos_sent += 1;
        if self.refuse_eos {
            return false;
        }
        if self.lock().state == LifecycleState::Playing {
            self.finish_stream();
        } else {
            self.eos_pending = true;
        }
        true
    }

    fn recalculate_latency(&mut self) -> Result<()> {
        self.lock().latency_recalculations += 1;
        Ok(())
    }

    fn render_topology(&self) -> String {
        let journal = self.lock();
        let mut dot = String::from("digraph pipeline {\n  rankdir=LR;\n");
        for node in &journal.nodes {
            let mut label = format!("{}\\n({})", node.id, node.kind);
            for (name, value) in &node.properties {
                let value = value.to_string().replace('"', "\\\"");
                label.push_str(&format!("\\n{name}={value}"));
            }
            dot.push_str(&format!("  \"{}\" [label=\"{}\"];\n", node.id, label));
        }
        for link in &journal.links {
            let edge = match &link.filter {
                Some(filter) => format!(
                    "  \"{}\" -> \"{}\" [label=\"{}\"];\n",
                    link.from, link.to, filter
                ),
                None => format!("  \"{}\" -> \"{}\";\n", link.from, link.to),
            };
            dot.push_str(&edge);
        }
        dot.push_str(&format!("  label=\"state: {}\";\n}}\n", journal.state));
        dot
    }

    fn attach_status_sink(&mut self, sink: StatusSender) -> Result<()> {
        self.sink = Some(sink);
        Ok(())
    }
}
