//! Inbound request → handler `event` and `context`.

use std::collections::BTreeMap;

use percent_encoding::percent_decode_str;
use serde_json::{json, Map, Value};

use crate::api::{HttpMethod, IntegrationDefinition};
use crate::error::CoreError;
use crate::id::{RequestId, LOCAL_API_ID};
use crate::routing::RouteMatch;
use crate::template::{InputBinding, Scope, TemplateInterpreter};

const INTEGRATION_PREFIX: &str = "integration.request.";
const METHOD_PREFIX: &str = "method.request.";

/// An HTTP request as seen by the gateway, before mapping.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct InboundRequest {
    pub method: HttpMethod,
    /// Raw request path, without the query string.
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl InboundRequest {
    /// Create a request with no query, headers or body.
    #[must_use]
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: String::new(),
        }
    }

    /// Parse and attach a raw query string (`a=1&b=two+words`).
    #[must_use]
    pub fn with_query_string(mut self, raw: &str) -> Self {
        self.query = parse_query(raw);
        self
    }

    /// Attach a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Attach a body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_lookup(&self.headers, name)
    }
}

/// Parse a query string; repeated keys keep the last value.
#[must_use]
pub fn parse_query(raw: &str) -> BTreeMap<String, String> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    percent_decode_str(&raw.replace('+', " ")).decode_utf8_lossy().into_owned()
}

fn header_lookup<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Output of [`IntegrationMapper::build`].
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct MappedRequest {
    pub request_id: RequestId,
    /// Event handed to the handler.
    pub event: Value,
    /// Context handed to the handler and carried to response rendering.
    pub context: Value,
}

/// Builds handler invocations from inbound requests.
#[derive(Debug, Clone)]
pub struct IntegrationMapper {
    interpreter: TemplateInterpreter,
    stage: String,
    stage_variables: BTreeMap<String, String>,
}

impl IntegrationMapper {
    /// Create a mapper for a deployment stage.
    #[must_use]
    pub fn new(stage: impl Into<String>, stage_variables: BTreeMap<String, String>) -> Self {
        Self {
            interpreter: TemplateInterpreter::new(),
            stage: stage.into(),
            stage_variables,
        }
    }

    /// Stage variables visible to templates.
    #[must_use]
    pub fn stage_variables(&self) -> &BTreeMap<String, String> {
        &self.stage_variables
    }

    /// Build the `event` and `context` for a matched request.
    ///
    /// # Errors
    /// Returns [`CoreError::EventBuild`] if the selected request template does
    /// not render to valid JSON.
    pub fn build(&self, request: &InboundRequest, matched: &RouteMatch<'_>) -> Result<MappedRequest, CoreError> {
        let route = matched.route;
        let request_id = RequestId::new();
        let method = request.method;
        let context = json!({
            "requestId": request_id.to_string(),
            "resourceId": format!("{method} {}", route.path),
            "resourcePath": route.path,
            "httpMethod": method.as_str(),
            "stage": self.stage,
            "apiId": LOCAL_API_ID,
            "identity": {},
        });

        let integration = integration_parameters(request, &matched.path_params, &route.integration);
        let input = InputBinding {
            path: string_map(&integration, "path"),
            querystring: string_map(&integration, "querystring"),
            header: string_map(&integration, "header"),
            body: parse_body(&request.body),
            raw_body: request.body.clone(),
        };
        let scope = Scope::new(input, context.clone(), self.stage_variables.clone());

        let event = match select_template(&route.integration, request.header("content-type")) {
            Some(template) => {
                let rendered = self.interpreter.evaluate(template, &scope);
                if rendered.trim().is_empty() {
                    json!({})
                } else {
                    serde_json::from_str(&rendered).map_err(|e| CoreError::EventBuild {
                        reason: e.to_string(),
                        rendered,
                    })?
                }
            }
            None => json!({}),
        };

        tracing::debug!(%request_id, resource = %route.path, "event built");
        Ok(MappedRequest {
            request_id,
            event,
            context,
        })
    }
}

/// The `integration` object: method-request values by location, with every
/// `requestParameters` entry applied.
fn integration_parameters(
    request: &InboundRequest,
    path_params: &BTreeMap<String, String>,
    integration: &IntegrationDefinition,
) -> Value {
    let mut out = json!({
        "path": path_params,
        "querystring": request.query,
        "header": request.headers,
    });

    for (destination, source) in &integration.request_parameters {
        let destination = destination.strip_prefix(INTEGRATION_PREFIX).unwrap_or(destination);
        let Some(value) = resolve_source(request, path_params, source) else {
            tracing::debug!(%source, "request parameter source not present");
            continue;
        };
        set_path(&mut out, destination, Value::String(value));
    }
    out
}

/// Resolve `method.request.{path|querystring|header}.NAME` or a `'literal'`.
fn resolve_source(request: &InboundRequest, path_params: &BTreeMap<String, String>, source: &str) -> Option<String> {
    if let Some(literal) = source.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        return Some(literal.to_owned());
    }
    let source = source.strip_prefix(METHOD_PREFIX).unwrap_or(source);
    let (location, name) = source.split_once('.')?;
    match location {
        "path" => path_params.get(name).cloned(),
        "querystring" => request.query.get(name).cloned(),
        "header" => request.header(name).map(str::to_owned),
        _ => None,
    }
}

fn set_path(target: &mut Value, dotted: &str, value: Value) {
    let mut segments: Vec<&str> = dotted.split('.').filter(|s| !s.is_empty()).collect();
    let Some(last) = segments.pop() else {
        return;
    };
    let mut node = target;
    for segment in segments {
        if !node.get(segment).is_some_and(Value::is_object) {
            if let Value::Object(map) = node {
                map.insert(segment.to_owned(), Value::Object(Map::new()));
            }
        }
        node = match node.get_mut(segment) {
            Some(next) => next,
            None => return,
        };
    }
    if let Value::Object(map) = node {
        map.insert(last.to_owned(), value);
    }
}

fn string_map(integration: &Value, location: &str) -> BTreeMap<String, String> {
    integration
        .get(location)
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .map(|(k, v)| {
                    let text = v.as_str().map_or_else(|| v.to_string(), str::to_owned);
                    (k.clone(), text)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Empty bodies read as `{}`; non-JSON bodies read as a JSON string.
fn parse_body(body: &str) -> Value {
    if body.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_owned()))
}

/// Exact content-type match (ignoring parameters and case), else the first
/// declared template.
fn select_template<'a>(integration: &'a IntegrationDefinition, content_type: Option<&str>) -> Option<&'a str> {
    let essence = content_type
        .and_then(|ct| ct.split(';').next())
        .map(str::trim)
        .unwrap_or_default();
    integration
        .request_templates
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(essence))
        .or_else(|| integration.request_templates.first())
        .map(|(_, template)| template.as_str())
}
