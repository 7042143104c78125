//! Shared, read-only gateway state.
//!
//! Built once at startup; requests only read it. The sandbox supervisor's
//! in-flight set is the one piece of interior mutability.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use mimic_core::{IntegrationMapper, ResponseMapper, RouteTable};
use mimic_executor::{HandlerResolver, Sandbox, SandboxBackend};

/// Everything a request needs, shared across handlers.
pub struct GatewayState {
    pub routes: RouteTable,
    pub mapper: IntegrationMapper,
    pub responses: ResponseMapper,
    pub sandbox: Sandbox<Arc<dyn SandboxBackend>>,
    pub resolver: Box<dyn HandlerResolver>,
    /// Environment passed to every invocation.
    pub env: BTreeMap<String, String>,
    /// Used when a handler descriptor declares no timeout.
    pub default_timeout: Duration,
}

impl GatewayState {
    /// Wire a state from its parts; stage variables are shared by both mappers.
    #[must_use]
    pub fn new(
        routes: RouteTable,
        stage: impl Into<String>,
        stage_variables: BTreeMap<String, String>,
        backend: Arc<dyn SandboxBackend>,
        resolver: Box<dyn HandlerResolver>,
    ) -> Self {
        Self {
            routes,
            mapper: IntegrationMapper::new(stage, stage_variables.clone()),
            responses: ResponseMapper::new(stage_variables),
            sandbox: Sandbox::new(backend),
            resolver,
            env: BTreeMap::new(),
            default_timeout: Duration::from_secs(6),
        }
    }

    /// Set the environment passed to every invocation.
    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Set the timeout for handlers without one.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

/// Handle shared with axum handlers.
pub type AppState = Arc<GatewayState>;
