//! The flow graph model: request nodes joined by conditional connectors.

use crate::error::FlowError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Unique identifier for a flow
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowId(pub String);

/// Unique identifier for a node within a flow
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

/// Unique identifier for a connector within a flow
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectorId(pub String);

/// Opaque reference to a request definition, resolved by the request executor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ConnectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The predicate gating a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorCondition {
    /// Source node obtained a response (any status code)
    Success,
    /// Source node failed to obtain a response
    Failure,
    /// Source node produced a validation verdict with `all_passed == true`
    ValidationPass,
    /// Source node produced a validation verdict with `all_passed == false`
    ValidationFail,
    /// Always fires once the source node is terminal
    Any,
}

/// One HTTP request step in a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowNode {
    /// Node identifier, unique within the flow
    pub id: NodeId,

    /// The request this node executes
    pub request_id: RequestId,

    /// Display name, unique within the flow
    pub alias: String,
}

impl FlowNode {
    /// Create a node
    pub fn new(
        id: impl Into<String>,
        request_id: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            id: NodeId(id.into()),
            request_id: RequestId(request_id.into()),
            alias: alias.into(),
        }
    }
}

/// A directed, conditionally-activated edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowConnector {
    /// Connector identifier, unique within the flow
    pub id: ConnectorId,

    /// The node whose terminal result is tested
    pub source_node_id: NodeId,

    /// The node made ready when the condition holds
    pub target_node_id: NodeId,

    /// The predicate gating this connector
    pub condition: ConnectorCondition,
}

impl FlowConnector {
    /// Create a connector
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        condition: ConnectorCondition,
    ) -> Self {
        Self {
            id: ConnectorId(id.into()),
            source_node_id: NodeId(source.into()),
            target_node_id: NodeId(target.into()),
            condition,
        }
    }
}

/// A directed graph of request nodes and conditional connectors.
///
/// Cycles are permitted at the data level; the orchestrator guarantees each
/// node executes at most once per run, so a cyclic edge never re-triggers an
/// already-terminal node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    /// Flow identifier
    pub id: FlowId,

    /// Display name
    pub name: String,

    /// The request nodes
    #[serde(default)]
    pub nodes: Vec<FlowNode>,

    /// The conditional edges
    #[serde(default)]
    pub connectors: Vec<FlowConnector>,
}

impl Flow {
    /// Create an empty flow
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: FlowId(id.into()),
            name: name.into(),
            nodes: Vec::new(),
            connectors: Vec::new(),
        }
    }

    /// Look up a node by id
    pub fn node(&self, id: &NodeId) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Nodes with no incoming connectors
    pub fn entry_nodes(&self) -> Vec<&FlowNode> {
        let targets: HashSet<&NodeId> =
            self.connectors.iter().map(|c| &c.target_node_id).collect();
        self.nodes
            .iter()
            .filter(|n| !targets.contains(&n.id))
            .collect()
    }

    /// Check the structural invariants of the graph.
    ///
    /// Enforced: unique node ids and aliases, connector endpoints referencing
    /// existing nodes, no self-loops, no duplicate (source, target) pairs.
    pub fn validate(&self) -> Result<(), FlowError> {
        let mut node_ids = HashSet::new();
        let mut aliases = HashSet::new();
        for node in &self.nodes {
            if !node_ids.insert(&node.id) {
                return Err(FlowError::FlowValidationError(format!(
                    "Duplicate node id: {}",
                    node.id
                )));
            }
            if !aliases.insert(node.alias.as_str()) {
                return Err(FlowError::FlowValidationError(format!(
                    "Duplicate node alias: {}",
                    node.alias
                )));
            }
        }

        let mut edges = HashSet::new();
        for connector in &self.connectors {
            if !node_ids.contains(&connector.source_node_id) {
                return Err(FlowError::FlowValidationError(format!(
                    "Connector {} references unknown source node: {}",
                    connector.id, connector.source_node_id
                )));
            }
            if !node_ids.contains(&connector.target_node_id) {
                return Err(FlowError::FlowValidationError(format!(
                    "Connector {} references unknown target node: {}",
                    connector.id, connector.target_node_id
                )));
            }
            if connector.source_node_id == connector.target_node_id {
                return Err(FlowError::FlowValidationError(format!(
                    "Connector {} is a self-loop on node {}",
                    connector.id, connector.source_node_id
                )));
            }
            if !edges.insert((&connector.source_node_id, &connector.target_node_id)) {
                return Err(FlowError::FlowValidationError(format!(
                    "Duplicate connector between {} and {}",
                    connector.source_node_id, connector.target_node_id
                )));
            }
        }

        Ok(())
    }
}
