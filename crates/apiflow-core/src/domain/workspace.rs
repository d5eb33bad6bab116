//! Read-only workspace records handed to a run through [`WorkspaceStore`].
//!
//! [`WorkspaceStore`]: crate::application::execution_context::WorkspaceStore

use crate::domain::flow::RequestId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A named set of variable bindings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    /// Environment identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Variable bindings, substituted into requests and validation rules
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

/// An authentication configuration, applied by an injected auth provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// Auth identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Scheme discriminator (basic, digest, oauth2, ...), interpreted by the
    /// auth provider
    pub scheme: String,

    /// Scheme-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// A named group of request definitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    /// Collection identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// The requests in this collection
    #[serde(default)]
    pub request_ids: Vec<RequestId>,
}
