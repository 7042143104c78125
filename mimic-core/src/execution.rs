use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::{ContentHash, RequestId};

/// Everything the sandbox needs to run one handler invocation.
///
/// One request is built per invocation and never reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ExecutionRequest {
    /// Absolute path of the handler module.
    pub handler_path: PathBuf,
    /// Exported function invoked inside the module.
    pub function_name: String,
    /// Event built by the integration mapper.
    pub event: Value,
    /// Context built by the integration mapper.
    pub context: Value,
    /// Wall-clock budget for the whole invocation.
    pub timeout: Duration,
    /// Per-invocation environment, layered over the sandbox's explicit base
    /// environment. Nothing is inherited from the gateway process.
    pub env: BTreeMap<String, String>,
    /// Memory size reported to the handler as `memoryLimitInMB`.
    pub memory_size_mb: u32,
}

impl ExecutionRequest {
    /// Create a request with an empty environment and a 128 MB memory size.
    #[must_use]
    pub fn new(
        handler_path: PathBuf,
        function_name: impl Into<String>,
        event: Value,
        context: Value,
        timeout: Duration,
    ) -> Self {
        Self {
            handler_path,
            function_name: function_name.into(),
            event,
            context,
            timeout,
            env: BTreeMap::new(),
            memory_size_mb: 128,
        }
    }

    /// Replace the subprocess environment.
    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Replace the reported memory size.
    #[must_use]
    pub fn with_memory_size(mut self, memory_size_mb: u32) -> Self {
        self.memory_size_mb = memory_size_mb;
        self
    }
}

/// The single terminal outcome of an [`ExecutionRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail")]
#[non_exhaustive]
pub enum ExecutionResult {
    /// The handler completed with a payload.
    Success(Value),
    /// The handler threw or reported an error.
    HandlerFailure(String),
    /// The timer fired before any terminal message arrived.
    Timeout,
    /// The subprocess exited without sending a terminal message.
    ProcessCrashed(String),
    /// The handler module could not be loaded.
    ModuleLoadError(String),
}

impl ExecutionResult {
    /// Taxonomy name of this outcome.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "Success",
            Self::HandlerFailure(_) => "HandlerFailure",
            Self::Timeout => "Timeout",
            Self::ProcessCrashed(_) => "ProcessCrashed",
            Self::ModuleLoadError(_) => "ModuleLoadError",
        }
    }

    /// Returns `true` for [`ExecutionResult::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// String form used for response selection: the payload on success
    /// (strings verbatim, everything else as JSON text), the error message
    /// otherwise.
    #[must_use]
    pub fn result_string(&self) -> String {
        match self {
            Self::Success(Value::String(s)) => s.clone(),
            Self::Success(value) => value.to_string(),
            Self::HandlerFailure(message) => message.clone(),
            Self::Timeout => "Task timed out".to_owned(),
            Self::ProcessCrashed(detail) | Self::ModuleLoadError(detail) => detail.clone(),
        }
    }

    /// Value bound to `input` when rendering the response body.
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::Success(value) => value.clone(),
            _ => serde_json::json!({
                "errorMessage": self.result_string(),
                "errorType": self.kind(),
            }),
        }
    }
}

/// Audit record logged once per completed invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct InvocationRecord {
    /// Request that triggered the invocation.
    pub request_id: RequestId,
    /// Function that was invoked.
    pub function_name: String,
    /// SHA-256 of the serialized event.
    pub event_hash: ContentHash,
    /// SHA-256 of the result string.
    pub result_hash: ContentHash,
    /// When the invocation began.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration of the invocation.
    pub duration: Duration,
    /// Taxonomy name of the outcome.
    pub outcome: String,
}

impl InvocationRecord {
    /// Build the record for a finished invocation.
    #[must_use]
    pub fn new(
        request_id: RequestId,
        request: &ExecutionRequest,
        result: &ExecutionResult,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self {
            request_id,
            function_name: request.function_name.clone(),
            event_hash: ContentHash::of(request.event.to_string().as_bytes()),
            result_hash: ContentHash::of(result.result_string().as_bytes()),
            started_at,
            duration,
            outcome: result.kind().to_owned(),
        }
    }
}
