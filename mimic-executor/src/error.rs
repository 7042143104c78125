//! Error types for the executor crate.
//!
//! These are infrastructure failures. Handler outcomes, including timeouts
//! and crashes, are reported as [`mimic_core::ExecutionResult`] values.

use std::path::PathBuf;

/// Errors that prevent an invocation from being attempted or observed.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SandboxError {
    /// Runtime binary not found at the configured path or on `PATH`.
    #[error("runtime binary not found: {program}")]
    RuntimeNotFound { program: PathBuf },

    /// The subprocess could not be started.
    #[error("sandbox spawn failed: {0}")]
    SpawnFailed(String),

    /// The IPC socket could not be created or used.
    #[error("IPC channel failed: {0}")]
    Ipc(String),

    /// The child sent a frame that does not follow the protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// No descriptor exists for the function named by an integration.
    #[error("no handler registered for function '{name}'")]
    HandlerNotFound { name: String },

    /// A function descriptor exists but cannot be used.
    #[error("invalid function descriptor {}: {reason}", path.display())]
    InvalidDescriptor { path: PathBuf, reason: String },

    /// Underlying I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
