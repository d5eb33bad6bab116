//!
//! Apiflow Test Utils - shared fakes and builders for testing the apiflow
//! engine.
//!
//! Everything here is in-memory and deterministic: a scripted request
//! executor, a static auth provider, a fixed workspace store, and a fluent
//! flow builder.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Flow graph builders
pub mod builders;

/// Fake collaborator implementations
pub mod implementations;

pub use builders::{request_id_for, FlowBuilder};
pub use implementations::{InMemoryWorkspaceStore, ScriptedRequestExecutor, StaticAuthProvider};
