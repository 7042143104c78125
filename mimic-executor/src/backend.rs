//! Sandbox backend abstraction trait.
//!
//! Allows the gateway and its tests to swap the process sandbox for a
//! scripted one without changing the request pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use mimic_core::{ExecutionRequest, ExecutionResult};

use crate::SandboxError;

/// Runs handler invocations in isolation.
///
/// Implementations must be `Send + Sync` to allow use across async tasks.
///
/// # Cancel Safety
/// Dropping an `execute` future must not leave a handler process behind.
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    /// Run one invocation to its single terminal outcome.
    ///
    /// Handler failures, timeouts and crashes are `Ok` results; errors mean
    /// the invocation could not be attempted or observed.
    ///
    /// # Errors
    /// Returns [`SandboxError::RuntimeNotFound`] or [`SandboxError::SpawnFailed`]
    /// if the subprocess cannot be started, and [`SandboxError::Ipc`] if the
    /// control channel cannot be set up.
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult, SandboxError>;

    /// Check if the backend is available and properly configured.
    ///
    /// # Errors
    /// Returns [`SandboxError::RuntimeNotFound`] if the runtime is missing.
    async fn health_check(&self) -> Result<(), SandboxError>;
}

#[async_trait]
impl<T: SandboxBackend + ?Sized> SandboxBackend for Arc<T> {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult, SandboxError> {
        (**self).execute(request).await
    }

    async fn health_check(&self) -> Result<(), SandboxError> {
        (**self).health_check().await
    }
}
