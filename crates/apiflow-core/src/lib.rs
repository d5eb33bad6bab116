//!
//! Apiflow Core - the flow orchestration engine.
//!
//! A flow is a directed graph of HTTP request nodes joined by conditional
//! connectors. This crate owns the data model, the orchestrator that
//! traverses the graph concurrently, and the run-result aggregation; the
//! actual network call is delegated to an injected [`RequestExecutor`].
//! Response validation lives in the `apiflow-validation` crate and is
//! re-exported here for callers that evaluate ad-hoc requests.
//!
//! ```no_run
//! use apiflow_core::{execute, ExecutionContext, Flow, FlowExecutionConfig};
//! use std::sync::Arc;
//!
//! async fn run(flow: &Flow, ctx: Arc<ExecutionContext>) {
//!     let result = execute(flow, ctx, FlowExecutionConfig::default()).await;
//!     println!("run finished: {:?}", result.status);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Error types
pub mod error;

/// Domain model: flows, nodes, connectors, run results
pub mod domain;

/// Application services: orchestrator, execution context, aggregation
pub mod application;

pub use application::execution_context::{
    AuthOutcome, AuthProvider, CancellationSignal, ExecutionContext, ExecutionStatus,
    FlowExecutionConfig, NodeExecution, RequestExecutor, RequestOverrides, WorkspaceStore,
};
pub use application::orchestrator::execute;
pub use domain::flow::{
    ConnectorCondition, ConnectorId, Flow, FlowConnector, FlowId, FlowNode, NodeId, RequestId,
};
pub use domain::run_result::{
    FlowNodeResult, FlowRunResult, NodeResponse, NodeStatus, RunId, RunProgress, RunStatus,
};
pub use domain::workspace::{AuthConfig, Collection, Environment};
pub use error::FlowError;

// Validation is part of the public surface: `evaluate` is directly callable
// for single ad-hoc requests outside a flow run.
pub use apiflow_validation::{evaluate, EnvVars, ResponseData, RuleLibrary, ValidationResult};
