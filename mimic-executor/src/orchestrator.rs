//! High-level sandbox supervisor wrapping a [`SandboxBackend`].
//!
//! Tracks in-flight invocations and records an [`InvocationRecord`] for every
//! completed one.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::Utc;
use mimic_core::{ExecutionRequest, ExecutionResult, InvocationRecord, RequestId};
use uuid::Uuid;

use crate::{SandboxBackend, SandboxError};

/// Result of a supervised invocation.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Invocation {
    pub result: ExecutionResult,
    pub record: InvocationRecord,
}

/// Supervisor for handler invocations.
///
/// Wraps a [`SandboxBackend`] and maintains the set of in-flight requests.
/// All operations are safe to call concurrently; each call runs in its own
/// subprocess.
pub struct Sandbox<B: SandboxBackend> {
    backend: B,
    in_flight: Arc<Mutex<BTreeSet<Uuid>>>,
}

impl<B: SandboxBackend> Sandbox<B> {
    /// Create a new supervisor backed by the given sandbox.
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            in_flight: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    /// Run one invocation and record it.
    ///
    /// The request stays registered as in flight until the returned future
    /// completes or is dropped.
    ///
    /// # Errors
    /// Propagates errors from the underlying [`SandboxBackend::execute`].
    pub async fn execute(&self, request_id: RequestId, request: ExecutionRequest) -> Result<Invocation, SandboxError> {
        let _guard = InFlight::register(&self.in_flight, request_id.as_uuid());
        let started_at = Utc::now();
        let wall_start = Instant::now();

        tracing::info!(%request_id, function = %request.function_name, "invoking handler");

        let result = self.backend.execute(request.clone()).await?;
        let record = InvocationRecord::new(request_id, &request, &result, started_at, wall_start.elapsed());

        tracing::info!(
            %request_id,
            function = %record.function_name,
            outcome = %record.outcome,
            event_hash = %record.event_hash,
            result_hash = %record.result_hash,
            elapsed_ms = record.duration.as_millis(),
            "invocation complete"
        );

        Ok(Invocation { result, record })
    }

    /// Check the backend's environment.
    ///
    /// # Errors
    /// Propagates errors from the underlying [`SandboxBackend::health_check`].
    pub async fn health_check(&self) -> Result<(), SandboxError> {
        self.backend.health_check().await
    }

    /// Return the number of invocations currently running.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Removes an invocation from the in-flight set when dropped.
struct InFlight {
    set: Arc<Mutex<BTreeSet<Uuid>>>,
    id: Uuid,
}

impl InFlight {
    fn register(set: &Arc<Mutex<BTreeSet<Uuid>>>, id: Uuid) -> Self {
        set.lock().unwrap_or_else(PoisonError::into_inner).insert(id);
        Self { set: Arc::clone(set), id }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.set.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Notify;

    use super::*;

    struct AlwaysFailBackend;

    #[async_trait]
    impl SandboxBackend for AlwaysFailBackend {
        async fn execute(&self, _request: ExecutionRequest) -> Result<ExecutionResult, SandboxError> {
            Err(SandboxError::SpawnFailed("mock always fails".to_owned()))
        }

        async fn health_check(&self) -> Result<(), SandboxError> {
            Ok(())
        }
    }

    /// Blocks every invocation until released.
    struct GatedBackend {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl SandboxBackend for GatedBackend {
        async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult, SandboxError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(ExecutionResult::Success(request.event))
        }

        async fn health_check(&self) -> Result<(), SandboxError> {
            Ok(())
        }
    }

    fn request() -> ExecutionRequest {
        ExecutionRequest::new(
            PathBuf::from("/srv/fn/index.js"),
            "handler",
            json!({ "n": 1 }),
            json!({}),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn sandbox_active_count_starts_at_zero() {
        let sandbox = Sandbox::new(AlwaysFailBackend);
        assert_eq!(sandbox.active_count(), 0, "new sandbox must have zero in-flight invocations");
    }

    #[tokio::test]
    async fn sandbox_execute_propagates_backend_error_and_unregisters() {
        let sandbox = Sandbox::new(AlwaysFailBackend);
        let result = sandbox.execute(RequestId::new(), request()).await;
        assert!(
            matches!(result, Err(SandboxError::SpawnFailed(_))),
            "execute must propagate backend SpawnFailed"
        );
        assert_eq!(sandbox.active_count(), 0);
    }

    #[tokio::test]
    async fn sandbox_counts_in_flight_and_records_outcome() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let sandbox = Arc::new(Sandbox::new(GatedBackend {
            entered: Arc::clone(&entered),
            release: Arc::clone(&release),
        }));

        let task = {
            let sandbox = Arc::clone(&sandbox);
            tokio::spawn(async move { sandbox.execute(RequestId::new(), request()).await })
        };
        entered.notified().await;
        assert_eq!(sandbox.active_count(), 1);

        release.notify_one();
        let invocation = match task.await {
            Ok(Ok(invocation)) => invocation,
            other => panic!("invocation failed: {other:?}"),
        };
        assert_eq!(sandbox.active_count(), 0);
        assert_eq!(invocation.result, ExecutionResult::Success(json!({ "n": 1 })));
        assert_eq!(invocation.record.outcome, "Success");
        assert_eq!(invocation.record.function_name, "handler");
    }

    #[tokio::test]
    async fn dropped_invocation_is_unregistered() {
        let entered = Arc::new(Notify::new());
        let sandbox = Arc::new(Sandbox::new(GatedBackend {
            entered: Arc::clone(&entered),
            release: Arc::new(Notify::new()),
        }));
        let task = {
            let sandbox = Arc::clone(&sandbox);
            tokio::spawn(async move { sandbox.execute(RequestId::new(), request()).await })
        };
        entered.notified().await;
        assert_eq!(sandbox.active_count(), 1);
        task.abort();
        let _ = task.await;
        assert_eq!(sandbox.active_count(), 0);
    }
}
