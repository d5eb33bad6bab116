//! Run-scoped context: collaborator handles, variable bindings, cancellation.

use crate::domain::flow::{Flow, RequestId};
use crate::domain::run_result::NodeResponse;
use crate::domain::workspace::{AuthConfig, Collection, Environment};
use crate::error::FlowError;
use apiflow_validation::{EnvVars, ResponseData, ValidationRule};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag for a run.
///
/// The orchestrator polls it before launching each wave of nodes; it never
/// interrupts an in-flight request.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal(Arc<AtomicBool>);

impl CancellationSignal {
    /// A fresh, un-cancelled signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-run adjustments forwarded to the request executor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOverrides {
    /// Effective auth configuration id, when one applies
    pub auth_id: Option<String>,

    /// Merged variable bindings for substitution into the concrete request
    pub variables: EnvVars,
}

/// Transport-level outcome of a node's execution.
///
/// Orthogonal to both status code and validation verdict: a 500 that
/// produced a response is `Success`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// A response was obtained
    Success,
    /// No response could be obtained (network failure, timeout)
    Failed,
}

/// What the request executor reports back for one node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeExecution {
    /// Transport-level outcome
    pub status: ExecutionStatus,

    /// The captured response, including the validation verdict when the
    /// request declared assertions
    pub response: Option<NodeResponse>,

    /// Transport failure detail
    pub error: Option<String>,
}

impl NodeExecution {
    /// A successful execution carrying the given response
    pub fn success(response: NodeResponse) -> Self {
        Self {
            status: ExecutionStatus::Success,
            response: Some(response),
            error: None,
        }
    }

    /// A failed execution with a transport error message
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            response: None,
            error: Some(error.into()),
        }
    }
}

/// Resolves a request id to a concrete request and performs the network
/// call.
///
/// The executor owns variable substitution into the request, auth
/// application, and evaluation of the request's declared assertions; the
/// orchestrator treats it as opaque. An `Err` return means the request could
/// not even be resolved and is surfaced as a run-level error.
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    /// Execute the request behind `request_id`
    async fn execute(
        &self,
        request_id: &RequestId,
        overrides: &RequestOverrides,
        ctx: &ExecutionContext,
    ) -> Result<NodeExecution, FlowError>;
}

/// What an auth provider contributes to an outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    /// Headers and query parameters to merge into the request
    Additions {
        /// Header additions
        headers: Vec<(String, String)>,
        /// Query parameter additions
        query: Vec<(String, String)>,
    },
    /// A fully-formed response, to be treated as if the request executor had
    /// produced it (challenge-response schemes)
    PreformedResponse(ResponseData),
}

/// Applies an auth configuration to an outgoing request.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Resolve the given auth configuration against the environment
    async fn apply(&self, auth: &AuthConfig, env_vars: &EnvVars) -> Result<AuthOutcome, FlowError>;
}

/// Read-only bulk loaders for the workspace records available to a run.
#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    /// All environments
    async fn environments(&self) -> Result<Vec<Environment>, FlowError>;

    /// All auth configurations
    async fn auths(&self) -> Result<Vec<AuthConfig>, FlowError>;

    /// All collections
    async fn collections(&self) -> Result<Vec<Collection>, FlowError>;

    /// All flows
    async fn flows(&self) -> Result<Vec<Flow>, FlowError>;
}

/// Immutable-per-run bag of collaborators and run-scoped configuration.
pub struct ExecutionContext {
    executor: Arc<dyn RequestExecutor>,
    auth_provider: Option<Arc<dyn AuthProvider>>,
    store: Option<Arc<dyn WorkspaceStore>>,
    rule_library: HashMap<String, ValidationRule>,
    variables: EnvVars,
    default_auth_id: Option<String>,
    cancellation: CancellationSignal,
}

impl ExecutionContext {
    /// Create a context around the injected request executor
    pub fn new(executor: Arc<dyn RequestExecutor>) -> Self {
        Self {
            executor,
            auth_provider: None,
            store: None,
            rule_library: HashMap::new(),
            variables: EnvVars::new(),
            default_auth_id: None,
            cancellation: CancellationSignal::new(),
        }
    }

    /// Attach an auth provider
    pub fn with_auth_provider(mut self, provider: Arc<dyn AuthProvider>) -> Self {
        self.auth_provider = Some(provider);
        self
    }

    /// Attach a workspace store
    pub fn with_store(mut self, store: Arc<dyn WorkspaceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the shared rule library
    pub fn with_rule_library(mut self, library: HashMap<String, ValidationRule>) -> Self {
        self.rule_library = library;
        self
    }

    /// Set the context-level variable bindings
    pub fn with_variables(mut self, variables: EnvVars) -> Self {
        self.variables = variables;
        self
    }

    /// Set the context-level default auth
    pub fn with_default_auth(mut self, auth_id: impl Into<String>) -> Self {
        self.default_auth_id = Some(auth_id.into());
        self
    }

    /// The injected request executor
    pub fn executor(&self) -> &Arc<dyn RequestExecutor> {
        &self.executor
    }

    /// The injected auth provider, if any
    pub fn auth_provider(&self) -> Option<&Arc<dyn AuthProvider>> {
        self.auth_provider.as_ref()
    }

    /// The injected workspace store, if any
    pub fn store(&self) -> Option<&Arc<dyn WorkspaceStore>> {
        self.store.as_ref()
    }

    /// The shared rule library
    pub fn rule_library(&self) -> &HashMap<String, ValidationRule> {
        &self.rule_library
    }

    /// Context-level variable bindings
    pub fn variables(&self) -> &EnvVars {
        &self.variables
    }

    /// Context-level default auth id
    pub fn default_auth_id(&self) -> Option<&str> {
        self.default_auth_id.as_deref()
    }

    /// The run's cancellation signal
    pub fn cancellation(&self) -> &CancellationSignal {
        &self.cancellation
    }
}

/// Per-run execution options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowExecutionConfig {
    /// When false, nodes run one at a time in ready-set order
    pub parallel: bool,

    /// Overrides the context's default auth for this run
    pub default_auth_id: Option<String>,

    /// Overlaid on the context's variable bindings for this run
    pub variables: EnvVars,
}

impl Default for FlowExecutionConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            default_auth_id: None,
            variables: EnvVars::new(),
        }
    }
}

impl FlowExecutionConfig {
    /// Serialized execution
    pub fn serial() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }

    /// The overrides handed to the executor: config-level settings win over
    /// context-level ones.
    pub fn overrides_for(&self, ctx: &ExecutionContext) -> RequestOverrides {
        let mut variables = ctx.variables().clone();
        variables.extend(self.variables.clone());
        RequestOverrides {
            auth_id: self
                .default_auth_id
                .clone()
                .or_else(|| ctx.default_auth_id().map(String::from)),
            variables,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiflow_validation::ResponseData;

    struct NoopExecutor;

    #[async_trait]
    impl RequestExecutor for NoopExecutor {
        async fn execute(
            &self,
            _request_id: &RequestId,
            _overrides: &RequestOverrides,
            _ctx: &ExecutionContext,
        ) -> Result<NodeExecution, FlowError> {
            Ok(NodeExecution::success(NodeResponse::new(ResponseData::new(
                200,
            ))))
        }
    }

    fn context() -> ExecutionContext {
        ExecutionContext::new(Arc::new(NoopExecutor))
    }

    #[test]
    fn test_cancellation_signal_is_sticky_and_shared() {
        let signal = CancellationSignal::new();
        let clone = signal.clone();
        assert!(!signal.is_cancelled());
        clone.cancel();
        assert!(signal.is_cancelled());
    }

    #[test]
    fn test_config_overrides_win_over_context() {
        let mut ctx_vars = EnvVars::new();
        ctx_vars.insert("base".to_string(), "from-context".to_string());
        ctx_vars.insert("shared".to_string(), "from-context".to_string());
        let ctx = context()
            .with_variables(ctx_vars)
            .with_default_auth("ctx-auth");

        let mut config = FlowExecutionConfig::default();
        config.default_auth_id = Some("run-auth".to_string());
        config
            .variables
            .insert("shared".to_string(), "from-config".to_string());

        let overrides = config.overrides_for(&ctx);
        assert_eq!(overrides.auth_id.as_deref(), Some("run-auth"));
        assert_eq!(overrides.variables["base"], "from-context");
        assert_eq!(overrides.variables["shared"], "from-config");
    }

    #[test]
    fn test_context_default_auth_applies_when_config_is_silent() {
        let ctx = context().with_default_auth("ctx-auth");
        let overrides = FlowExecutionConfig::default().overrides_for(&ctx);
        assert_eq!(overrides.auth_id.as_deref(), Some("ctx-auth"));
    }

    #[tokio::test]
    async fn test_executor_is_reachable_through_context() {
        let ctx = context();
        let result = ctx
            .executor()
            .execute(
                &RequestId("req-1".to_string()),
                &RequestOverrides::default(),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Success);
    }
}
