//! API description model and document loading.
//!
//! An [`ApiSpec`] is read once at startup from a Swagger/OpenAPI document
//! whose operations carry an `x-amazon-apigateway-integration` extension,
//! and is read-only afterwards.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// Name of the mandatory fallback response.
pub const DEFAULT_RESPONSE: &str = "default";

/// Operation extension carrying the integration metadata.
pub const INTEGRATION_EXTENSION: &str = "x-amazon-apigateway-integration";

/// Operation key that registers a route for every method.
pub const ANY_METHOD_KEY: &str = "x-amazon-apigateway-any-method";

/// HTTP methods a route can be declared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[non_exhaustive]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    /// Matches every method.
    Any,
}

impl HttpMethod {
    /// Upper-case method name as it appears in `context.httpMethod`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Any => "ANY",
        }
    }

    /// Whether a route declared for `self` serves a request made with `method`.
    #[must_use]
    pub fn accepts(self, method: Self) -> bool {
        self == Self::Any || self == method
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "ANY" => Ok(Self::Any),
            _ if s == ANY_METHOD_KEY => Ok(Self::Any),
            _ => Err(CoreError::UnsupportedMethod(s.to_owned())),
        }
    }
}

/// How a handler result is turned into an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ResponseDefinition {
    /// HTTP status code of the response.
    #[serde(deserialize_with = "status_code_from_any")]
    pub status_code: u16,
    /// Content type to mapping template.
    #[serde(default)]
    pub response_templates: IndexMap<String, String>,
    /// `method.response.header.*` destination to source expression.
    #[serde(default)]
    pub response_parameters: IndexMap<String, String>,
}

impl ResponseDefinition {
    /// A response with the given status and no templates.
    #[must_use]
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            response_templates: IndexMap::new(),
            response_parameters: IndexMap::new(),
        }
    }

    /// Add a response template for `content_type`.
    #[must_use]
    pub fn with_template(mut self, content_type: impl Into<String>, template: impl Into<String>) -> Self {
        self.response_templates.insert(content_type.into(), template.into());
        self
    }
}

/// Swagger documents write status codes as strings; accept both forms.
fn status_code_from_any<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(u16),
        Text(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Number(n) => Ok(n),
        Repr::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid status code '{s}'"))),
    }
}

/// Raw integration extension as it appears in the document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIntegration {
    #[serde(default)]
    uri: String,
    #[serde(default)]
    request_parameters: IndexMap<String, String>,
    #[serde(default)]
    request_templates: IndexMap<String, String>,
    #[serde(default)]
    responses: IndexMap<String, ResponseDefinition>,
}

/// Per-route descriptor: request mapping, handler identifier and response
/// selection.
///
/// Response patterns are compiled when the definition is built, so a
/// malformed pattern fails at load time rather than per request.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct IntegrationDefinition {
    /// Opaque handler identifier resolved outside the core.
    pub uri: String,
    /// `integration.request.*` destination to `method.request.*` source.
    pub request_parameters: IndexMap<String, String>,
    /// Content type to request mapping template, in declaration order.
    pub request_templates: IndexMap<String, String>,
    /// Selection patterns (compiled) paired with their definitions, in
    /// declaration order, excluding `default`.
    patterns: Vec<(Regex, ResponseDefinition)>,
    /// Fallback response.
    default_response: ResponseDefinition,
}

impl IntegrationDefinition {
    /// Build a definition, compiling every response pattern.
    ///
    /// # Errors
    /// Returns [`CoreError::MissingDefaultResponse`] if `responses` has no
    /// `default` entry and [`CoreError::InvalidResponsePattern`] if a pattern
    /// is not a valid regular expression.
    pub fn new(
        uri: impl Into<String>,
        request_parameters: IndexMap<String, String>,
        request_templates: IndexMap<String, String>,
        mut responses: IndexMap<String, ResponseDefinition>,
    ) -> Result<Self, CoreError> {
        let uri = uri.into();
        let default_response = responses
            .shift_remove(DEFAULT_RESPONSE)
            .ok_or_else(|| CoreError::MissingDefaultResponse {
                method: String::new(),
                path: uri.clone(),
            })?;

        let patterns = responses
            .into_iter()
            .map(|(pattern, definition)| {
                Regex::new(&pattern)
                    .map(|re| (re, definition))
                    .map_err(|e| CoreError::InvalidResponsePattern {
                        pattern,
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            uri,
            request_parameters,
            request_templates,
            patterns,
            default_response,
        })
    }

    /// Shorthand for a definition with only a default response.
    ///
    /// # Errors
    /// Never fails in practice; the signature mirrors [`Self::new`].
    pub fn with_default(uri: impl Into<String>, default_response: ResponseDefinition) -> Result<Self, CoreError> {
        let mut responses = IndexMap::new();
        responses.insert(DEFAULT_RESPONSE.to_owned(), default_response);
        Self::new(uri, IndexMap::new(), IndexMap::new(), responses)
    }

    /// Declared selection patterns in declaration order.
    pub fn patterns(&self) -> impl Iterator<Item = (&Regex, &ResponseDefinition)> {
        self.patterns.iter().map(|(re, def)| (re, def))
    }

    /// The mandatory `default` response.
    #[must_use]
    pub fn default_response(&self) -> &ResponseDefinition {
        &self.default_response
    }
}

/// One declared (method, path) operation.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Route {
    /// Method the route is declared for.
    pub method: HttpMethod,
    /// Literal path pattern, e.g. `/items/{id}`.
    pub path: String,
    /// Names of the `{name}` segments, in path order.
    pub param_names: Vec<String>,
    /// Integration metadata for the route.
    pub integration: IntegrationDefinition,
}

/// Parsed API description: routes in document order.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct ApiSpec {
    /// Routes in declaration order.
    pub routes: Vec<Route>,
}

impl ApiSpec {
    /// Parse a JSON document.
    ///
    /// # Errors
    /// Returns [`CoreError::SpecParse`] on malformed input, plus any error
    /// from building an [`IntegrationDefinition`].
    pub fn from_json_str(text: &str) -> Result<Self, CoreError> {
        let doc: Value = serde_json::from_str(text).map_err(|e| CoreError::SpecParse(e.to_string()))?;
        Self::from_document(&doc)
    }

    /// Parse a YAML document.
    ///
    /// # Errors
    /// Same as [`Self::from_json_str`].
    pub fn from_yaml_str(text: &str) -> Result<Self, CoreError> {
        let doc: Value = serde_yml::from_str(text).map_err(|e| CoreError::SpecParse(e.to_string()))?;
        Self::from_document(&doc)
    }

    /// Read a document from disk, choosing YAML for `.yaml`/`.yml` files and
    /// JSON otherwise.
    ///
    /// # Errors
    /// Returns [`CoreError::SpecParse`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CoreError::SpecParse(format!("read {}: {e}", path.display())))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml_str(&text),
            _ => Self::from_json_str(&text),
        }
    }

    fn from_document(doc: &Value) -> Result<Self, CoreError> {
        let Some(paths) = doc.get("paths").and_then(Value::as_object) else {
            return Err(CoreError::SpecParse("document has no 'paths' object".to_owned()));
        };

        let mut routes = Vec::new();
        for (path, item) in paths {
            let Some(operations) = item.as_object() else {
                continue;
            };
            for (key, operation) in operations {
                // Path-level keys such as `parameters` are not operations.
                let Ok(method) = key.parse::<HttpMethod>() else {
                    continue;
                };
                let Some(raw) = operation.get(INTEGRATION_EXTENSION) else {
                    tracing::warn!(%method, %path, "operation has no integration; skipping");
                    continue;
                };
                let raw: RawIntegration = serde_json::from_value(raw.clone()).map_err(|e| {
                    CoreError::SpecParse(format!("{method} {path}: {e}"))
                })?;
                let integration = IntegrationDefinition::new(
                    raw.uri,
                    raw.request_parameters,
                    raw.request_templates,
                    raw.responses,
                )
                .map_err(|e| match e {
                    CoreError::MissingDefaultResponse { .. } => CoreError::MissingDefaultResponse {
                        method: method.to_string(),
                        path: path.clone(),
                    },
                    other => other,
                })?;
                routes.push(Route {
                    method,
                    path: path.clone(),
                    param_names: path_param_names(path),
                    integration,
                });
            }
        }

        tracing::debug!(routes = routes.len(), "API document loaded");
        Ok(Self { routes })
    }
}

/// Names of the `{name}` / `{name+}` segments of a path pattern.
#[must_use]
pub fn path_param_names(path: &str) -> Vec<String> {
    path.split('/')
        .filter_map(|segment| segment.strip_prefix('{')?.strip_suffix('}'))
        .map(|name| name.trim_end_matches('+').to_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "swagger": "2.0",
        "paths": {
            "/items/{id}": {
                "parameters": [],
                "get": {
                    "x-amazon-apigateway-integration": {
                        "uri": "arn:aws:apigateway:us-east-1:lambda:path/2015-03-31/functions/arn:aws:lambda:us-east-1:1:function:GetItem/invocations",
                        "requestTemplates": { "application/json": "{\"id\":\"$input.params('id')\"}" },
                        "responses": {
                            "^not found": { "statusCode": "404" },
                            "default": { "statusCode": 200 }
                        }
                    }
                },
                "delete": { "summary": "no integration" }
            }
        }
    }"#;

    #[test]
    fn json_document_loads_routes_in_order() {
        let spec = match ApiSpec::from_json_str(DOC) {
            Ok(s) => s,
            Err(e) => panic!("load failed: {e}"),
        };
        assert_eq!(spec.routes.len(), 1, "operation without integration must be skipped");
        let route = &spec.routes[0];
        assert_eq!(route.method, HttpMethod::Get);
        assert_eq!(route.param_names, vec!["id".to_owned()]);
        assert_eq!(route.integration.default_response().status_code, 200);
        let patterns: Vec<_> = route.integration.patterns().map(|(re, d)| (re.as_str().to_owned(), d.status_code)).collect();
        assert_eq!(patterns, vec![("^not found".to_owned(), 404)]);
    }

    #[test]
    fn yaml_document_loads() {
        let yaml = r#"
paths:
  /pets:
    x-amazon-apigateway-any-method:
      x-amazon-apigateway-integration:
        uri: ListPets
        responses:
          default:
            statusCode: "201"
"#;
        let spec = match ApiSpec::from_yaml_str(yaml) {
            Ok(s) => s,
            Err(e) => panic!("load failed: {e}"),
        };
        assert_eq!(spec.routes[0].method, HttpMethod::Any);
        assert_eq!(spec.routes[0].integration.default_response().status_code, 201);
    }

    #[test]
    fn missing_default_response_is_rejected() {
        let doc = r#"{"paths":{"/a":{"get":{"x-amazon-apigateway-integration":{"uri":"A","responses":{"^x":{"statusCode":400}}}}}}}"#;
        let err = ApiSpec::from_json_str(doc).err();
        assert!(
            matches!(err, Some(CoreError::MissingDefaultResponse { ref method, ref path }) if method == "GET" && path == "/a"),
            "got {err:?}"
        );
    }

    #[test]
    fn invalid_response_pattern_is_rejected() {
        let doc = r#"{"paths":{"/a":{"get":{"x-amazon-apigateway-integration":{"uri":"A","responses":{"(":{"statusCode":400},"default":{"statusCode":200}}}}}}}"#;
        assert!(matches!(ApiSpec::from_json_str(doc), Err(CoreError::InvalidResponsePattern { .. })));
    }

    #[test]
    fn document_without_paths_is_a_parse_error() {
        assert!(matches!(ApiSpec::from_json_str("{}"), Err(CoreError::SpecParse(_))));
        assert!(matches!(ApiSpec::from_json_str("not json"), Err(CoreError::SpecParse(_))));
    }

    #[test]
    fn path_param_names_include_greedy_segments() {
        assert_eq!(path_param_names("/a/{x}/b/{rest+}"), vec!["x".to_owned(), "rest".to_owned()]);
        assert!(path_param_names("/plain").is_empty());
    }

    #[test]
    fn method_parsing_is_case_insensitive() {
        assert!(matches!("get".parse::<HttpMethod>(), Ok(HttpMethod::Get)));
        assert!(matches!("parameters".parse::<HttpMethod>(), Err(CoreError::UnsupportedMethod(_))));
        assert!(HttpMethod::Any.accepts(HttpMethod::Post));
        assert!(!HttpMethod::Get.accepts(HttpMethod::Post));
    }
}
