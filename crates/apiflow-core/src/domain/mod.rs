//! Domain model for flows and their run results.

/// The flow graph: nodes, connectors, conditions
pub mod flow;

/// Run and node result aggregates
pub mod run_result;

/// Read-only workspace records
pub mod workspace;
