//! Builders for flow graphs used in tests.

use apiflow_core::{ConnectorCondition, Flow, FlowConnector, FlowNode, RequestId};

/// The request id conventionally assigned to a builder node
pub fn request_id_for(node_id: &str) -> RequestId {
    RequestId(format!("req-{}", node_id))
}

/// Fluent builder for test flows.
///
/// Node `"a"` gets request id `"req-a"` and alias `"a"`; the connector from
/// `"a"` to `"b"` gets id `"a->b"`.
pub struct FlowBuilder {
    flow: Flow,
}

impl FlowBuilder {
    /// Start a flow with the given id
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let name = format!("test flow {}", id);
        Self {
            flow: Flow::new(id, name),
        }
    }

    /// Add a node
    pub fn node(mut self, id: &str) -> Self {
        let request_id = request_id_for(id);
        self.flow.nodes.push(FlowNode::new(id, request_id.0, id));
        self
    }

    /// Add a connector between two nodes
    pub fn connect(mut self, source: &str, target: &str, condition: ConnectorCondition) -> Self {
        self.flow.connectors.push(FlowConnector::new(
            format!("{}->{}", source, target),
            source,
            target,
            condition,
        ));
        self
    }

    /// Finish the flow
    pub fn build(self) -> Flow {
        self.flow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiflow_core::NodeId;

    #[test]
    fn test_builder_assigns_conventional_ids() {
        let flow = FlowBuilder::new("f")
            .node("a")
            .node("b")
            .connect("a", "b", ConnectorCondition::Success)
            .build();

        assert!(flow.validate().is_ok());
        let a = flow.node(&NodeId("a".to_string())).unwrap();
        assert_eq!(a.request_id, request_id_for("a"));
        assert_eq!(flow.connectors[0].id.0, "a->b");
    }
}
