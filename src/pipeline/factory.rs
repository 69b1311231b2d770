//! Node creation with fail-fast availability checks.

use crate::engine::{FormatFilter, GraphEngine, NodeId, NodeKind, PropertyValue};
use crate::error::{DriftError, Result};
use tracing::debug;

/// Creates and configures nodes on a [`GraphEngine`].
///
/// Every failure names both the node type and the role the node was meant
/// to play, so a missing plugin is obvious from the error alone.
pub struct NodeFactory<'a, E: GraphEngine> {
    engine: &'a mut E,
}

impl<'a, E: GraphEngine> NodeFactory<'a, E> {
    pub fn new(engine: &'a mut E) -> Self {
        Self { engine }
    }

    /// Check that every `(kind, role)` can be instantiated before anything
    /// is built.
    pub fn ensure_available(&self, required: &[(NodeKind, &str)]) -> Result<()> {
        for (kind, role) in required {
            if !self.engine.is_available(*kind) {
                return Err(DriftError::NodeUnavailable {
                    factory: kind.factory_name().to_string(),
                    role: role.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Instantiate a node of `kind` named after its `role`.
    pub fn make(&mut self, kind: NodeKind, role: &str) -> Result<NodeId> {
        if !self.engine.is_available(kind) {
            return Err(DriftError::NodeUnavailable {
                factory: kind.factory_name().to_string(),
                role: role.to_string(),
            });
        }
        let id = self.engine.create_node(kind, role)?;
        debug!(node = %id, factory = kind.factory_name(), "created node");
        Ok(id)
    }

    /// Assign a batch of properties to `node`, in order.
    pub fn configure(&mut self, node: &NodeId, properties: Vec<(&str, PropertyValue)>) -> Result<()> {
        for (name, value) in properties {
            debug!(node = %node, property = name, value = %value, "setting property");
            self.engine.set_property(node, name, value)?;
        }
        Ok(())
    }

    /// Link `nodes` into a chain: `nodes[0] -> nodes[1] -> ...`.
    pub fn link_chain(&mut self, nodes: &[&NodeId]) -> Result<()> {
        for pair in nodes.windows(2) {
            self.engine.link(pair[0], pair[1], None)?;
        }
        Ok(())
    }

    /// Link two nodes through a format constraint.
    pub fn link_filtered(&mut self, from: &NodeId, to: &NodeId, filter: &FormatFilter) -> Result<()> {
        debug!(from = %from, to = %to, filter = %filter, "linking with format filter");
        self.engine.link(from, to, Some(filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SimulatedEngine;

    #[test]
    fn test_make_names_node_after_role() {
        let mut engine = SimulatedEngine::new();
        let mut factory = NodeFactory::new(&mut engine);
        let id = factory.make(NodeKind::BufferStage, "csv_queue").unwrap();
        assert_eq!(id.as_str(), "csv_queue");
        assert_eq!(
            engine.snapshot().node("csv_queue").map(|n| n.kind),
            Some(NodeKind::BufferStage)
        );
    }

    #[test]
    fn test_ensure_available_reports_first_missing() {
        let mut engine = SimulatedEngine::new().without_kind(NodeKind::ContainerEncoder);
        let factory = NodeFactory::new(&mut engine);
        let result = factory.ensure_available(&[
            (NodeKind::Splitter, "tee"),
            (NodeKind::ContainerEncoder, "wav_wavenc"),
        ]);
        match result {
            Err(DriftError::NodeUnavailable { factory, role }) => {
                assert_eq!(factory, "wavenc");
                assert_eq!(role, "wav_wavenc");
            }
            other => panic!("Expected NodeUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn test_ensure_available_builds_nothing() {
        let mut engine = SimulatedEngine::new().without_kind(NodeKind::FileSink);
        let factory = NodeFactory::new(&mut engine);
        assert!(
            factory
                .ensure_available(&[(NodeKind::FileSink, "csv_filesink")])
                .is_err()
        );
        assert!(engine.snapshot().nodes.is_empty());
    }

    #[test]
    fn test_link_chain_links_neighbours() {
        let mut engine = SimulatedEngine::new();
        let mut factory = NodeFactory::new(&mut engine);
        let a = factory.make(NodeKind::BufferStage, "a").unwrap();
        let b = factory.make(NodeKind::FormatStage, "b").unwrap();
        let c = factory.make(NodeKind::FileSink, "c").unwrap();
        factory.link_chain(&[&a, &b, &c]).unwrap();

        let journal = engine.snapshot();
        assert_eq!(journal.links.len(), 2);
        assert_eq!(journal.links[0].from, a);
        assert_eq!(journal.links[0].to, b);
        assert_eq!(journal.links[1].from, b);
        assert_eq!(journal.links[1].to, c);
    }

    #[test]
    fn test_configure_sets_properties_in_order() {
        let mut engine = SimulatedEngine::new();
        let mut factory = NodeFactory::new(&mut engine);
        let sink = factory.make(NodeKind::FileSink, "csv_filesink").unwrap();
        factory
            .configure(
                &sink,
                vec![
                    ("location", PropertyValue::Str("/tmp/out.csv".to_string())),
                    ("async", PropertyValue::Bool(false)),
                ],
            )
            .unwrap();

        let journal = engine.snapshot();
        assert_eq!(
            journal.property("csv_filesink", "async"),
            Some(&PropertyValue::Bool(false))
        );
    }
}
