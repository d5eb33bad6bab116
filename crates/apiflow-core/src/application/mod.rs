//! Application services: the orchestrator and its run-scoped context.

/// Run-scoped context, collaborator traits, cancellation
pub mod execution_context;

/// The flow orchestrator
pub mod orchestrator;

/// Run-result bookkeeping
pub mod aggregator;
