//! Core types for the mimic local API gateway.
//!
//! Everything here is synchronous and free of I/O beyond reading the API
//! document: route matching, request/response mapping templates, and the
//! execution request/result model shared with the sandbox.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod api;
pub mod error;
pub mod examples;
pub mod execution;
pub mod id;
pub mod mapping;
pub mod routing;
pub mod template;

pub use api::{ApiSpec, HttpMethod, IntegrationDefinition, ResponseDefinition, Route};
pub use error::CoreError;
pub use execution::{ExecutionRequest, ExecutionResult, InvocationRecord};
pub use id::{ContentHash, RequestId, LOCAL_API_ID};
pub use mapping::{HttpResponse, InboundRequest, IntegrationMapper, MappedRequest, ResponseMapper};
pub use routing::{RouteMatch, RouteTable};
pub use template::{InputBinding, Scope, TemplateInterpreter};
