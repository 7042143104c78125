/// Errors produced by the `mimic-core` crate.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CoreError {
    /// A route with the same method and literal path pattern is already registered.
    #[error("duplicate route {method} {path}")]
    DuplicateRoute { method: String, path: String },

    /// A path pattern could not be compiled into a matcher.
    #[error("invalid route pattern '{path}': {reason}")]
    InvalidRoutePattern { path: String, reason: String },

    /// A response selection pattern is not a valid regular expression.
    #[error("invalid response pattern '{pattern}': {reason}")]
    InvalidResponsePattern { pattern: String, reason: String },

    /// An integration declares no `default` response.
    #[error("integration for {method} {path} has no default response")]
    MissingDefaultResponse { method: String, path: String },

    /// The API document could not be parsed.
    #[error("failed to parse API document: {0}")]
    SpecParse(String),

    /// An operation key names an HTTP method the gateway does not serve.
    #[error("unsupported HTTP method '{0}'")]
    UnsupportedMethod(String),

    /// The request template did not evaluate to valid JSON.
    #[error("request template produced invalid JSON: {reason}")]
    EventBuild { reason: String, rendered: String },
}

impl CoreError {
    /// Failure-taxonomy name reported to HTTP clients.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateRoute { .. } => "DuplicateRoute",
            Self::InvalidRoutePattern { .. } => "InvalidRoutePattern",
            Self::InvalidResponsePattern { .. } => "InvalidResponsePattern",
            Self::MissingDefaultResponse { .. } => "MissingDefaultResponse",
            Self::SpecParse(_) => "SpecParse",
            Self::UnsupportedMethod(_) => "UnsupportedMethod",
            Self::EventBuild { .. } => "EventBuildError",
        }
    }
}
