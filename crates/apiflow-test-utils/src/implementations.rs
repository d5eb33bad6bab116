//! Hand-written fakes for the collaborator traits.
//!
//! Fakes over mocks: each implementation holds simple in-memory state and
//! records what it was asked to do, so tests assert on behavior instead of
//! call expectations.

use apiflow_core::{
    AuthConfig, AuthOutcome, AuthProvider, Collection, Environment, ExecutionContext, Flow,
    FlowError, NodeExecution, NodeResponse, RequestExecutor, RequestId, RequestOverrides,
    ResponseData, WorkspaceStore,
};
use apiflow_validation::EnvVars;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

enum ScriptedOutcome {
    Succeed(NodeResponse),
    FailTransport(String),
    Unresolvable(FlowError),
}

struct Script {
    outcome: ScriptedOutcome,
    delay: Option<Duration>,
}

/// A request executor that replays scripted outcomes per request id.
///
/// Unscripted requests succeed with an empty 200 response. Every call is
/// recorded, with the overrides it received, for ordering and forwarding
/// assertions.
#[derive(Default)]
pub struct ScriptedRequestExecutor {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<(RequestId, RequestOverrides)>>,
}

impl ScriptedRequestExecutor {
    /// An executor with no scripts: everything succeeds with a 200
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self, request_id: impl Into<String>, outcome: ScriptedOutcome) {
        self.scripts.lock().insert(
            request_id.into(),
            Script {
                outcome,
                delay: None,
            },
        );
    }

    /// Script a success with the given response
    pub fn succeed_with(&self, request_id: impl Into<String>, response: NodeResponse) {
        self.script(request_id, ScriptedOutcome::Succeed(response));
    }

    /// Script a transport failure (the node fails, the run continues)
    pub fn fail(&self, request_id: impl Into<String>, error: impl Into<String>) {
        self.script(request_id, ScriptedOutcome::FailTransport(error.into()));
    }

    /// Script a resolution error (surfaces as a run-level error)
    pub fn unresolvable(&self, request_id: impl Into<String>) {
        let id = request_id.into();
        self.script(
            id.clone(),
            ScriptedOutcome::Unresolvable(FlowError::RequestNotFound(id)),
        );
    }

    /// Delay the scripted request by the given duration before answering
    pub fn delay(&self, request_id: &str, delay: Duration) {
        if let Some(script) = self.scripts.lock().get_mut(request_id) {
            script.delay = Some(delay);
        }
    }

    /// The request ids executed so far, in call order
    pub fn calls(&self) -> Vec<RequestId> {
        self.calls.lock().iter().map(|(id, _)| id.clone()).collect()
    }

    /// The overrides received for each call, in call order
    pub fn received_overrides(&self) -> Vec<RequestOverrides> {
        self.calls
            .lock()
            .iter()
            .map(|(_, overrides)| overrides.clone())
            .collect()
    }
}

#[async_trait]
impl RequestExecutor for ScriptedRequestExecutor {
    async fn execute(
        &self,
        request_id: &RequestId,
        overrides: &RequestOverrides,
        _ctx: &ExecutionContext,
    ) -> Result<NodeExecution, FlowError> {
        self.calls
            .lock()
            .push((request_id.clone(), overrides.clone()));

        let (outcome, delay) = {
            let scripts = self.scripts.lock();
            match scripts.get(&request_id.0) {
                Some(script) => {
                    let outcome = match &script.outcome {
                        ScriptedOutcome::Succeed(response) => Ok(NodeExecution::success(response.clone())),
                        ScriptedOutcome::FailTransport(error) => {
                            Ok(NodeExecution::failure(error.clone()))
                        }
                        ScriptedOutcome::Unresolvable(error) => Err(error.clone()),
                    };
                    (outcome, script.delay)
                }
                None => (
                    Ok(NodeExecution::success(NodeResponse::new(ResponseData::new(
                        200,
                    )))),
                    None,
                ),
            }
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        outcome
    }
}

/// An auth provider that replays a fixed outcome per auth id: header
/// additions for ordinary schemes, or a preformed response for
/// challenge-response schemes.
#[derive(Default)]
pub struct StaticAuthProvider {
    outcomes: Mutex<HashMap<String, AuthOutcome>>,
}

impl StaticAuthProvider {
    /// A provider with no registered auths
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the headers returned for an auth id
    pub fn register(&self, auth_id: impl Into<String>, headers: Vec<(String, String)>) {
        self.outcomes.lock().insert(
            auth_id.into(),
            AuthOutcome::Additions {
                headers,
                query: Vec::new(),
            },
        );
    }

    /// Register a preformed response for an auth id, as a
    /// challenge-response scheme would produce
    pub fn register_preformed(&self, auth_id: impl Into<String>, response: ResponseData) {
        self.outcomes
            .lock()
            .insert(auth_id.into(), AuthOutcome::PreformedResponse(response));
    }
}

#[async_trait]
impl AuthProvider for StaticAuthProvider {
    async fn apply(&self, auth: &AuthConfig, _env_vars: &EnvVars) -> Result<AuthOutcome, FlowError> {
        self.outcomes
            .lock()
            .get(&auth.id)
            .cloned()
            .ok_or_else(|| FlowError::AuthError(format!("Unknown auth: {}", auth.id)))
    }
}

/// A workspace store serving fixed in-memory records.
#[derive(Default)]
pub struct InMemoryWorkspaceStore {
    /// Environments returned by the store
    pub environments: Vec<Environment>,
    /// Auth configurations returned by the store
    pub auths: Vec<AuthConfig>,
    /// Collections returned by the store
    pub collections: Vec<Collection>,
    /// Flows returned by the store
    pub flows: Vec<Flow>,
}

impl InMemoryWorkspaceStore {
    /// An empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkspaceStore for InMemoryWorkspaceStore {
    async fn environments(&self) -> Result<Vec<Environment>, FlowError> {
        Ok(self.environments.clone())
    }

    async fn auths(&self) -> Result<Vec<AuthConfig>, FlowError> {
        Ok(self.auths.clone())
    }

    async fn collections(&self) -> Result<Vec<Collection>, FlowError> {
        Ok(self.collections.clone())
    }

    async fn flows(&self) -> Result<Vec<Flow>, FlowError> {
        Ok(self.flows.clone())
    }
}
