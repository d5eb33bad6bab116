//! The flow orchestrator: concurrent graph traversal with conditional
//! branching.
//!
//! `execute` owns a single scheduling loop. Node executions run as spawned
//! tasks and report their terminal results over an mpsc channel, so
//! connector evaluation, skip cascading, and result aggregation all happen
//! on one task and need no locking.

use crate::application::aggregator;
use crate::application::execution_context::{
    ExecutionContext, ExecutionStatus, FlowExecutionConfig,
};
use crate::domain::flow::{ConnectorCondition, Flow, FlowConnector, NodeId};
use crate::domain::run_result::{FlowNodeResult, FlowRunResult, NodeStatus};
use apiflow_validation::ValidationResult;
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Execute a flow to completion and return its run result.
///
/// Structural errors (invalid graph, no entry nodes) fail the run before any
/// node executes; per-node failures never abort the run, they only decide
/// which downstream connectors fire.
pub async fn execute(
    flow: &Flow,
    ctx: Arc<ExecutionContext>,
    config: FlowExecutionConfig,
) -> FlowRunResult {
    if let Err(e) = flow.validate() {
        warn!(flow_id = %flow.id, error = %e, "Flow failed structural validation");
        return FlowRunResult::structural_failure(flow.id.clone(), e.to_string());
    }

    let mut run = FlowRunResult::new(flow);
    info!(flow_id = %flow.id, run_id = %run.run_id, nodes = flow.nodes.len(), "Starting flow run");

    if flow.nodes.is_empty() {
        aggregator::finalize(&mut run, false);
        return run;
    }

    let entry_nodes = flow.entry_nodes();
    if entry_nodes.is_empty() {
        warn!(flow_id = %flow.id, "Flow has no entry nodes");
        return FlowRunResult::structural_failure(
            flow.id.clone(),
            "Flow has no entry nodes: every node has an incoming connector",
        );
    }

    let mut outgoing: HashMap<NodeId, Vec<FlowConnector>> = HashMap::new();
    let mut incoming_total: HashMap<NodeId, usize> = HashMap::new();
    for node in &flow.nodes {
        incoming_total.insert(node.id.clone(), 0);
    }
    for connector in &flow.connectors {
        outgoing
            .entry(connector.source_node_id.clone())
            .or_default()
            .push(connector.clone());
        *incoming_total
            .entry(connector.target_node_id.clone())
            .or_default() += 1;
    }

    let overrides = config.overrides_for(&ctx);

    // Scheduling state, owned entirely by this loop.
    let mut ready: VecDeque<NodeId> = VecDeque::new();
    let mut readied: HashSet<NodeId> = HashSet::new();
    let mut launched: HashSet<NodeId> = HashSet::new();
    let mut evaluated_incoming: HashMap<NodeId, usize> = HashMap::new();
    let mut has_active_incoming: HashSet<NodeId> = HashSet::new();

    for node in entry_nodes {
        make_ready(&mut run, &mut ready, &mut readied, node.id.clone());
    }

    let (tx, mut rx) = mpsc::channel::<(FlowNodeResult, Option<String>)>(flow.nodes.len());
    let mut in_flight: usize = 0;
    let mut cancelled = false;

    loop {
        if !cancelled && ctx.cancellation().is_cancelled() {
            info!(run_id = %run.run_id, "Cancellation observed; no further nodes will launch");
            cancelled = true;
        }

        // Launch wave. Serial mode holds at most one execution in flight.
        while !cancelled {
            let node_id = match ready.pop_front() {
                Some(id) => id,
                None => break,
            };
            if launched.contains(&node_id) {
                continue;
            }
            if !config.parallel && in_flight > 0 {
                ready.push_front(node_id);
                break;
            }
            launched.insert(node_id.clone());

            let node = match flow.node(&node_id) {
                Some(node) => node,
                None => continue,
            };
            let started_at = Utc::now();
            if let Some(result) = run.node_results.get_mut(&node_id) {
                result.status = NodeStatus::Running;
                result.started_at = Some(started_at);
            }
            debug!(run_id = %run.run_id, node_id = %node_id, request_id = %node.request_id, "Launching node");

            let ctx = Arc::clone(&ctx);
            let tx = tx.clone();
            let overrides = overrides.clone();
            let request_id = node.request_id.clone();
            let task_node_id = node_id.clone();
            tokio::spawn(async move {
                let outcome = ctx.executor().execute(&request_id, &overrides, &ctx).await;
                let (result, run_error) = match outcome {
                    Ok(exec) => {
                        let status = match exec.status {
                            ExecutionStatus::Success => NodeStatus::Success,
                            ExecutionStatus::Failed => NodeStatus::Failed,
                        };
                        (
                            FlowNodeResult {
                                node_id: task_node_id,
                                status,
                                response: exec.response,
                                error: exec.error,
                                started_at: Some(started_at),
                                completed_at: Some(Utc::now()),
                            },
                            None,
                        )
                    }
                    Err(e) => {
                        warn!(node_id = %task_node_id, error = %e, "Node execution could not start");
                        (
                            FlowNodeResult {
                                node_id: task_node_id,
                                status: NodeStatus::Failed,
                                response: None,
                                error: Some(e.to_string()),
                                started_at: Some(started_at),
                                completed_at: Some(Utc::now()),
                            },
                            Some(e.to_string()),
                        )
                    }
                };
                let _ = tx.send((result, run_error)).await;
            });
            in_flight += 1;
        }

        if in_flight == 0 {
            break;
        }

        let (result, run_error) = match rx.recv().await {
            Some(completion) => completion,
            None => break,
        };
        in_flight -= 1;

        if let Some(error) = run_error {
            if run.error.is_none() {
                run.error = Some(error);
            }
        }

        let node_id = result.node_id.clone();
        let connectors = outgoing.get(&node_id).cloned().unwrap_or_default();
        aggregator::record_terminal(&mut run, result.clone());

        for connector in connectors {
            let active = condition_met(connector.condition, &result);
            let target = connector.target_node_id.clone();
            debug!(
                run_id = %run.run_id,
                connector_id = %connector.id,
                condition = ?connector.condition,
                active,
                "Evaluated connector"
            );
            *evaluated_incoming.entry(target.clone()).or_insert(0) += 1;
            if active {
                run.active_connector_ids.push(connector.id.clone());
                has_active_incoming.insert(target.clone());
                // OR semantics: the first active incoming connector makes
                // the target ready.
                if !readied.contains(&target) && !launched.contains(&target) {
                    make_ready(&mut run, &mut ready, &mut readied, target);
                }
            } else {
                run.skipped_connector_ids.push(connector.id.clone());
                skip_if_unreachable(
                    &mut run,
                    target,
                    &outgoing,
                    &incoming_total,
                    &mut evaluated_incoming,
                    &has_active_incoming,
                    &readied,
                    &launched,
                );
            }
        }
    }

    // Nodes reachable only through a cycle never get an evaluated incoming
    // connector; mark them and their edges skipped so the run is complete.
    if !cancelled {
        sweep_unreached(&mut run, flow, &outgoing);
    }

    aggregator::finalize(&mut run, cancelled);
    info!(
        run_id = %run.run_id,
        status = ?run.status,
        succeeded = run.progress.succeeded,
        failed = run.progress.failed,
        skipped = run.progress.skipped,
        "Flow run finished"
    );
    run
}

fn make_ready(
    run: &mut FlowRunResult,
    ready: &mut VecDeque<NodeId>,
    readied: &mut HashSet<NodeId>,
    node_id: NodeId,
) {
    if let Some(result) = run.node_results.get_mut(&node_id) {
        result.status = NodeStatus::Pending;
    }
    readied.insert(node_id.clone());
    ready.push_back(node_id);
}

fn validation_of(result: &FlowNodeResult) -> Option<&ValidationResult> {
    result
        .response
        .as_ref()
        .and_then(|response| response.validation.as_ref())
}

/// Whether a connector fires, given its source node's terminal result.
fn condition_met(condition: ConnectorCondition, result: &FlowNodeResult) -> bool {
    match condition {
        ConnectorCondition::Any => true,
        ConnectorCondition::Success => result.status == NodeStatus::Success,
        ConnectorCondition::Failure => result.status == NodeStatus::Failed,
        ConnectorCondition::ValidationPass => {
            validation_of(result).map(|v| v.all_passed).unwrap_or(false)
        }
        ConnectorCondition::ValidationFail => validation_of(result)
            .map(|v| !v.all_passed)
            .unwrap_or(false),
    }
}

/// Skip `target` once all its incoming connectors are evaluated and none
/// fired, then cascade: a skipped node's outgoing connectors are marked
/// skipped without evaluating their conditions, which can skip further
/// nodes downstream.
#[allow(clippy::too_many_arguments)]
fn skip_if_unreachable(
    run: &mut FlowRunResult,
    target: NodeId,
    outgoing: &HashMap<NodeId, Vec<FlowConnector>>,
    incoming_total: &HashMap<NodeId, usize>,
    evaluated_incoming: &mut HashMap<NodeId, usize>,
    has_active_incoming: &HashSet<NodeId>,
    readied: &HashSet<NodeId>,
    launched: &HashSet<NodeId>,
) {
    let mut stack = vec![target];
    while let Some(node_id) = stack.pop() {
        if readied.contains(&node_id) || launched.contains(&node_id) {
            continue;
        }
        if has_active_incoming.contains(&node_id) {
            continue;
        }
        let total = incoming_total.get(&node_id).copied().unwrap_or(0);
        let evaluated = evaluated_incoming.get(&node_id).copied().unwrap_or(0);
        if evaluated < total {
            continue;
        }
        if !aggregator::record_terminal(run, FlowNodeResult::skipped(node_id.clone())) {
            continue;
        }
        debug!(run_id = %run.run_id, node_id = %node_id, "Node skipped: no incoming connector fired");

        for connector in outgoing.get(&node_id).into_iter().flatten() {
            run.skipped_connector_ids.push(connector.id.clone());
            let downstream = connector.target_node_id.clone();
            *evaluated_incoming.entry(downstream.clone()).or_insert(0) += 1;
            stack.push(downstream);
        }
    }
}

/// Terminalize nodes the traversal never reached (pure-cycle islands),
/// marking them and their outgoing connectors skipped.
fn sweep_unreached(
    run: &mut FlowRunResult,
    flow: &Flow,
    outgoing: &HashMap<NodeId, Vec<FlowConnector>>,
) {
    for node in &flow.nodes {
        let unreached = run
            .node_result(&node.id)
            .map(|r| !r.status.is_terminal())
            .unwrap_or(false);
        if !unreached {
            continue;
        }
        debug!(run_id = %run.run_id, node_id = %node.id, "Node unreachable from any entry node; skipping");
        aggregator::record_terminal(run, FlowNodeResult::skipped(node.id.clone()));
        for connector in outgoing.get(&node.id).into_iter().flatten() {
            if !run.skipped_connector_ids.contains(&connector.id)
                && !run.active_connector_ids.contains(&connector.id)
            {
                run.skipped_connector_ids.push(connector.id.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::run_result::NodeResponse;
    use apiflow_validation::{ResponseData, RuleOutcome, ValidationResult};
    use chrono::Utc;

    fn terminal(status: NodeStatus, validation: Option<ValidationResult>) -> FlowNodeResult {
        let response = match status {
            NodeStatus::Success => {
                let mut response = NodeResponse::new(ResponseData::new(200));
                response.validation = validation;
                Some(response)
            }
            _ => None,
        };
        FlowNodeResult {
            node_id: NodeId("n".to_string()),
            status,
            response,
            error: None,
            started_at: Some(Utc::now()),
            completed_at: Some(Utc::now()),
        }
    }

    fn verdict(all_passed: bool) -> ValidationResult {
        let outcome = if all_passed {
            RuleOutcome::passed("r", apiflow_validation::RuleCategory::Status, "ok")
        } else {
            RuleOutcome::failed("r", apiflow_validation::RuleCategory::Status, "bad")
        };
        ValidationResult::from_outcomes(vec![(outcome, true)])
    }

    #[test]
    fn test_any_condition_always_fires() {
        assert!(condition_met(
            ConnectorCondition::Any,
            &terminal(NodeStatus::Success, None)
        ));
        assert!(condition_met(
            ConnectorCondition::Any,
            &terminal(NodeStatus::Failed, None)
        ));
    }

    #[test]
    fn test_success_and_failure_conditions_mirror_status() {
        let success = terminal(NodeStatus::Success, None);
        let failed = terminal(NodeStatus::Failed, None);

        assert!(condition_met(ConnectorCondition::Success, &success));
        assert!(!condition_met(ConnectorCondition::Success, &failed));
        assert!(condition_met(ConnectorCondition::Failure, &failed));
        assert!(!condition_met(ConnectorCondition::Failure, &success));
    }

    #[test]
    fn test_validation_conditions_require_a_verdict() {
        let no_verdict = terminal(NodeStatus::Success, None);
        assert!(!condition_met(ConnectorCondition::ValidationPass, &no_verdict));
        assert!(!condition_met(ConnectorCondition::ValidationFail, &no_verdict));

        let passing = terminal(NodeStatus::Success, Some(verdict(true)));
        assert!(condition_met(ConnectorCondition::ValidationPass, &passing));
        assert!(!condition_met(ConnectorCondition::ValidationFail, &passing));

        let failing = terminal(NodeStatus::Success, Some(verdict(false)));
        assert!(!condition_met(ConnectorCondition::ValidationPass, &failing));
        assert!(condition_met(ConnectorCondition::ValidationFail, &failing));
    }
}
