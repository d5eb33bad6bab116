//! Run-result bookkeeping: folds terminal node results into the run.
//!
//! Counting rules: each node increments `completed` and exactly one outcome
//! counter, once, when it reaches a terminal state. The fold is additive and
//! order-independent because node completion order is not deterministic
//! under parallel execution.

use crate::domain::run_result::{FlowNodeResult, FlowRunResult, NodeStatus, RunStatus};
use chrono::Utc;
use tracing::{debug, warn};

/// Record a node's terminal result on the run.
///
/// Returns false (and leaves the run untouched) if the result is not
/// terminal or the node was already terminal; a node is never
/// double-counted.
pub fn record_terminal(run: &mut FlowRunResult, result: FlowNodeResult) -> bool {
    if !result.status.is_terminal() {
        warn!(node_id = %result.node_id, status = ?result.status, "Ignoring non-terminal node result");
        return false;
    }
    if let Some(existing) = run.node_results.get(&result.node_id) {
        if existing.status.is_terminal() {
            warn!(node_id = %result.node_id, "Node already terminal; ignoring duplicate result");
            return false;
        }
    }

    debug!(node_id = %result.node_id, status = ?result.status, "Recording terminal node result");
    run.progress.completed += 1;
    match result.status {
        NodeStatus::Success => run.progress.succeeded += 1,
        NodeStatus::Failed => run.progress.failed += 1,
        NodeStatus::Skipped => run.progress.skipped += 1,
        _ => unreachable!("non-terminal statuses rejected above"),
    }
    run.node_results.insert(result.node_id.clone(), result);
    true
}

/// Freeze the run with its terminal status.
///
/// `Failed` if any node failed or a run-level error was recorded, otherwise
/// `Success`; a cancelled run keeps `Cancelled` regardless of node outcomes.
pub fn finalize(run: &mut FlowRunResult, cancelled: bool) {
    run.status = if cancelled {
        RunStatus::Cancelled
    } else if run.progress.failed > 0 || run.error.is_some() {
        RunStatus::Failed
    } else {
        RunStatus::Success
    };
    run.completed_at = Some(Utc::now());
}
