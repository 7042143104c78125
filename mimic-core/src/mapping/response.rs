//! Handler result → HTTP response.
//!
//! Response patterns are tried in declaration order against the result's
//! string form and the first match wins, regardless of how specific a later
//! pattern is.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::api::{IntegrationDefinition, ResponseDefinition};
use crate::execution::ExecutionResult;
use crate::template::{InputBinding, Scope, TemplateInterpreter};

/// Content type assumed when the client sends no usable `Accept` header.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

const HEADER_PREFIX: &str = "method.response.header.";
const BODY_PREFIX: &str = "integration.response.body";

/// A fully rendered HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct HttpResponse {
    pub status_code: u16,
    pub body: String,
    pub headers: Vec<(String, String)>,
}

impl HttpResponse {
    /// A response with no headers.
    #[must_use]
    pub fn new(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            status_code,
            body: body.into(),
            headers: Vec::new(),
        }
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Response header by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Selects a response definition and renders its body.
#[derive(Debug, Clone, Default)]
pub struct ResponseMapper {
    interpreter: TemplateInterpreter,
    stage_variables: BTreeMap<String, String>,
}

impl ResponseMapper {
    /// Create a mapper whose templates see `stage_variables`.
    #[must_use]
    pub fn new(stage_variables: BTreeMap<String, String>) -> Self {
        Self {
            interpreter: TemplateInterpreter::new(),
            stage_variables,
        }
    }

    /// Render `result` for a client that sent `accept`.
    ///
    /// Successful results fall back to the `default` response. Failures that
    /// match no declared pattern become a 500 carrying the failure kind.
    #[must_use]
    pub fn render(
        &self,
        integration: &IntegrationDefinition,
        result: &ExecutionResult,
        accept: Option<&str>,
        context: &Value,
    ) -> HttpResponse {
        let subject = result.result_string();
        let selected = integration
            .patterns()
            .find(|(pattern, _)| pattern.is_match(&subject))
            .map(|(pattern, definition)| {
                tracing::debug!(pattern = pattern.as_str(), status = definition.status_code, "response pattern matched");
                definition
            });

        let definition = match selected {
            Some(definition) => definition,
            None if result.is_success() => integration.default_response(),
            None => return unmatched_failure(result),
        };

        let payload = result.payload();
        let content_type = preferred_type(accept);
        let template = definition
            .response_templates
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(content_type));

        let (body, content_type) = match template {
            Some((key, template)) => {
                let scope = Scope::new(
                    InputBinding::from_payload(payload.clone()),
                    context.clone(),
                    self.stage_variables.clone(),
                );
                (self.interpreter.evaluate(template, &scope), key.clone())
            }
            None => (subject, DEFAULT_CONTENT_TYPE.to_owned()),
        };

        let mut headers = vec![("Content-Type".to_owned(), content_type)];
        headers.extend(response_headers(definition, &payload));
        HttpResponse {
            status_code: definition.status_code,
            body,
            headers,
        }
    }
}

fn unmatched_failure(result: &ExecutionResult) -> HttpResponse {
    let body = json!({
        "message": result.result_string(),
        "kind": result.kind(),
    });
    HttpResponse::new(500, body.to_string()).with_header("Content-Type", DEFAULT_CONTENT_TYPE)
}

/// First media range of the `Accept` header; wildcards and absence select
/// [`DEFAULT_CONTENT_TYPE`].
fn preferred_type(accept: Option<&str>) -> &str {
    accept
        .and_then(|value| value.split(',').next())
        .and_then(|range| range.split(';').next())
        .map(str::trim)
        .filter(|range| !range.is_empty() && *range != "*/*")
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}

/// `method.response.header.NAME` entries with a `'literal'` or
/// `integration.response.body[.FIELD]` source.
fn response_headers(definition: &ResponseDefinition, payload: &Value) -> Vec<(String, String)> {
    definition
        .response_parameters
        .iter()
        .filter_map(|(destination, source)| {
            let name = destination.strip_prefix(HEADER_PREFIX)?;
            let value = if let Some(literal) = source.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
                literal.to_owned()
            } else {
                let rest = source.strip_prefix(BODY_PREFIX)?;
                let found = match rest.strip_prefix('.') {
                    Some(field) => payload.get(field)?,
                    None if rest.is_empty() => payload,
                    None => return None,
                };
                match found {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                }
            };
            Some((name.to_owned(), value))
        })
        .collect()
}
