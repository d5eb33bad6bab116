//! Run and node result aggregates.

use crate::domain::flow::{ConnectorId, Flow, FlowId, NodeId};
use apiflow_validation::{ResponseData, ValidationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for one execution of a flow
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a fresh run id
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a single node within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Not yet scheduled
    Idle,
    /// Ready and waiting for a launch slot
    Pending,
    /// Execution in flight
    Running,
    /// Obtained a response
    Success,
    /// Failed to obtain a response
    Failed,
    /// Will never run because no incoming connector fired
    Skipped,
}

impl NodeStatus {
    /// Whether the node has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeStatus::Success | NodeStatus::Failed | NodeStatus::Skipped
        )
    }
}

/// Overall status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The run is in progress
    Running,
    /// Every non-skipped node succeeded
    Success,
    /// At least one node failed, or the run failed structurally
    Failed,
    /// The cancellation signal fired before completion
    Cancelled,
}

/// The response captured for one node, with its validation verdict when the
/// request declared assertions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeResponse {
    /// The raw response data
    #[serde(flatten)]
    pub data: ResponseData,

    /// Verdict of the request's declared assertions, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResult>,
}

impl NodeResponse {
    /// A response with no validation verdict
    pub fn new(data: ResponseData) -> Self {
        Self {
            data,
            validation: None,
        }
    }

    /// Attach a validation verdict
    pub fn with_validation(mut self, validation: ValidationResult) -> Self {
        self.validation = Some(validation);
        self
    }
}

/// The result of one node within a run.
///
/// Created when the run starts, written only by the scheduling loop, and
/// immutable once the status is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowNodeResult {
    /// The node this result belongs to
    pub node_id: NodeId,

    /// Lifecycle status
    pub status: NodeStatus,

    /// The captured response, when one was obtained
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<NodeResponse>,

    /// Failure detail, when the node failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When execution started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the node reached a terminal state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl FlowNodeResult {
    /// A fresh idle result for the given node
    pub fn idle(node_id: NodeId) -> Self {
        Self {
            node_id,
            status: NodeStatus::Idle,
            response: None,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// A terminal skipped result
    pub fn skipped(node_id: NodeId) -> Self {
        Self {
            node_id,
            status: NodeStatus::Skipped,
            response: None,
            error: None,
            started_at: None,
            completed_at: Some(Utc::now()),
        }
    }
}

/// Progress counters for a run.
///
/// `total` is fixed at run start; each node increments `completed` and
/// exactly one of the outcome counters when it reaches a terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunProgress {
    /// Node count at run start
    pub total: usize,
    /// Nodes that reached a terminal state
    pub completed: usize,
    /// Nodes that obtained a response
    pub succeeded: usize,
    /// Nodes that failed to obtain a response
    pub failed: usize,
    /// Nodes that never ran
    pub skipped: usize,
}

/// The complete result of one flow run: the stable wire contract exposed to
/// UI layers and automation tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowRunResult {
    /// Unique id for this run
    pub run_id: RunId,

    /// The flow that was executed
    pub flow_id: FlowId,

    /// Overall status
    pub status: RunStatus,

    /// Per-node results, serialized as an ordered entry sequence because map
    /// key order does not survive serialization across process boundaries
    #[serde(with = "node_result_entries")]
    pub node_results: HashMap<NodeId, FlowNodeResult>,

    /// Connectors whose condition was satisfied
    #[serde(default)]
    pub active_connector_ids: Vec<ConnectorId>,

    /// Connectors whose condition was not satisfied, or which were skipped
    /// transitively
    #[serde(default)]
    pub skipped_connector_ids: Vec<ConnectorId>,

    /// Progress counters
    pub progress: RunProgress,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run reached a terminal status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Structural failure detail; unset for per-node failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FlowRunResult {
    /// A fresh running result with an idle entry per node
    pub fn new(flow: &Flow) -> Self {
        let node_results = flow
            .nodes
            .iter()
            .map(|n| (n.id.clone(), FlowNodeResult::idle(n.id.clone())))
            .collect::<HashMap<_, _>>();
        Self {
            run_id: RunId::new(),
            flow_id: flow.id.clone(),
            status: RunStatus::Running,
            node_results,
            active_connector_ids: Vec::new(),
            skipped_connector_ids: Vec::new(),
            progress: RunProgress {
                total: flow.nodes.len(),
                ..RunProgress::default()
            },
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    /// A terminal failed result carrying a structural error and no node
    /// results
    pub fn structural_failure(flow_id: FlowId, error: impl Into<String>) -> Self {
        Self {
            run_id: RunId::new(),
            flow_id,
            status: RunStatus::Failed,
            node_results: HashMap::new(),
            active_connector_ids: Vec::new(),
            skipped_connector_ids: Vec::new(),
            progress: RunProgress::default(),
            started_at: Utc::now(),
            completed_at: Some(Utc::now()),
            error: Some(error.into()),
        }
    }

    /// Look up a node's result
    pub fn node_result(&self, node_id: &NodeId) -> Option<&FlowNodeResult> {
        self.node_results.get(node_id)
    }
}

/// Serializes the node-result map as a sequence of results ordered by node
/// id, and rebuilds the map on the way in.
mod node_result_entries {
    use super::{FlowNodeResult, NodeId};
    use serde::de::{Deserialize, Deserializer};
    use serde::ser::{SerializeSeq, Serializer};
    use std::collections::HashMap;

    pub fn serialize<S>(
        map: &HashMap<NodeId, FlowNodeResult>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut entries: Vec<&FlowNodeResult> = map.values().collect();
        entries.sort_by(|a, b| a.node_id.0.cmp(&b.node_id.0));
        let mut seq = serializer.serialize_seq(Some(entries.len()))?;
        for entry in entries {
            seq.serialize_element(entry)?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<HashMap<NodeId, FlowNodeResult>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries = Vec::<FlowNodeResult>::deserialize(deserializer)?;
        Ok(entries
            .into_iter()
            .map(|r| (r.node_id.clone(), r))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::flow::FlowNode;
    use pretty_assertions::assert_eq;

    fn sample_flow() -> Flow {
        let mut flow = Flow::new("flow-1", "Sample");
        flow.nodes.push(FlowNode::new("b", "req-b", "Second"));
        flow.nodes.push(FlowNode::new("a", "req-a", "First"));
        flow
    }

    #[test]
    fn test_new_run_result_seeds_idle_entries() {
        let run = FlowRunResult::new(&sample_flow());
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.progress.total, 2);
        assert_eq!(run.progress.completed, 0);
        assert_eq!(
            run.node_result(&NodeId("a".to_string())).unwrap().status,
            NodeStatus::Idle
        );
    }

    #[test]
    fn test_structural_failure_has_no_node_results() {
        let run = FlowRunResult::structural_failure(FlowId("flow-1".to_string()), "no entry nodes");
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.node_results.is_empty());
        assert_eq!(run.error.as_deref(), Some("no entry nodes"));
        assert!(run.completed_at.is_some());
    }

    #[test]
    fn test_node_results_serialize_as_ordered_entry_sequence() {
        let run = FlowRunResult::new(&sample_flow());
        let json = serde_json::to_value(&run).unwrap();

        let entries = json["nodeResults"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        // Sorted by node id, not map iteration order.
        assert_eq!(entries[0]["nodeId"], "a");
        assert_eq!(entries[1]["nodeId"], "b");
    }

    #[test]
    fn test_run_result_round_trips_through_serde() {
        let mut run = FlowRunResult::new(&sample_flow());
        let a = NodeId("a".to_string());
        if let Some(result) = run.node_results.get_mut(&a) {
            result.status = NodeStatus::Success;
            result.response = Some(NodeResponse::new(ResponseData::new(200)));
            result.completed_at = Some(Utc::now());
        }

        let json = serde_json::to_string(&run).unwrap();
        let back: FlowRunResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, run);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(NodeStatus::Success.is_terminal());
        assert!(NodeStatus::Failed.is_terminal());
        assert!(NodeStatus::Skipped.is_terminal());
        assert!(!NodeStatus::Idle.is_terminal());
        assert!(!NodeStatus::Pending.is_terminal());
        assert!(!NodeStatus::Running.is_terminal());
    }
}
