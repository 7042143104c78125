//! Request and response mapping around a handler invocation.

pub mod request;
pub mod response;

pub use request::{parse_query, InboundRequest, IntegrationMapper, MappedRequest};
pub use response::{HttpResponse, ResponseMapper, DEFAULT_CONTENT_TYPE};
