//! Handler execution sandbox for the mimic API gateway emulator.
//!
//! Runs every invocation in a fresh, time-bounded subprocess with an
//! explicit environment, exchanging one request and one result over a
//! private Unix socket.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod backend;
pub mod config;
pub mod error;
pub mod ipc;
pub mod logs;
pub mod orchestrator;
pub mod process;
pub mod resolver;

pub use backend::SandboxBackend;
pub use config::{SandboxConfig, NODE_BOOTSTRAP};
pub use error::SandboxError;
pub use logs::{LogLine, LogSink, Stream, TracingSink};
pub use orchestrator::{Invocation, Sandbox};
pub use process::{ProcessBackend, EXITED_EARLY, INVALID_TERMINAL};
pub use resolver::{function_name_from_uri, DescriptorResolver, HandlerResolver, ResolvedHandler};
