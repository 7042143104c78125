//! Local HTTP gateway for the mimic API emulator.
//!
//! Serves an API document's routes, mapping each request through its
//! integration templates into a sandboxed handler invocation and the result
//! back into an HTTP response.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use routes::create_router;
pub use state::{AppState, GatewayState};
