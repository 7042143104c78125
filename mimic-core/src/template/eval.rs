//! Evaluation of parsed expressions against a [`Scope`].
//!
//! Only the four fixed roots are reachable. Every lookup is a pure function
//! of the scope.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::jsonpath::{self, JsonPathError};
use super::parser::{Arg, Expr, Root, Segment};
use super::util;

/// The request (or response) data bound to `$input`.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct InputBinding {
    /// Path parameters after request-parameter mapping.
    pub path: BTreeMap<String, String>,
    /// Query string parameters after request-parameter mapping.
    pub querystring: BTreeMap<String, String>,
    /// Headers after request-parameter mapping.
    pub header: BTreeMap<String, String>,
    /// Parsed payload queried by `json()` and `path()`.
    pub body: Value,
    /// Raw payload text returned by `$input.body`.
    pub raw_body: String,
}

impl InputBinding {
    /// Binding for a payload with no parameters, as used on the response side.
    #[must_use]
    pub fn from_payload(body: Value) -> Self {
        let raw_body = match &body {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Self {
            body,
            raw_body,
            ..Self::default()
        }
    }

    /// Resolve a parameter: path, then query string, then header
    /// (case-insensitive).
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.path
            .get(name)
            .or_else(|| self.querystring.get(name))
            .or_else(|| {
                self.header
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value)
            })
            .map(String::as_str)
    }

    /// All parameters in one map; path values shadow query values, which
    /// shadow headers.
    #[must_use]
    pub fn merged_params(&self) -> Value {
        let mut merged = Map::new();
        for source in [&self.header, &self.querystring, &self.path] {
            for (key, value) in source {
                merged.insert(key.clone(), Value::String(value.clone()));
            }
        }
        Value::Object(merged)
    }
}

/// Bindings visible to a template.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct Scope {
    pub input: InputBinding,
    pub context: Value,
    pub stage_variables: BTreeMap<String, String>,
}

impl Scope {
    /// Create a scope from its three data roots.
    #[must_use]
    pub fn new(input: InputBinding, context: Value, stage_variables: BTreeMap<String, String>) -> Self {
        Self {
            input,
            context,
            stage_variables,
        }
    }
}

/// Why a single token could not be resolved. Never escapes the interpreter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum TokenError {
    #[error("no member '{0}'")]
    UnknownMember(String),
    #[error("no function '{0}'")]
    UnknownFunction(String),
    #[error("{function} expects {expected} argument(s), got {got}")]
    Arity {
        function: String,
        expected: &'static str,
        got: usize,
    },
    #[error(transparent)]
    JsonPath(#[from] JsonPathError),
    #[error("{0}")]
    Transform(String),
    #[error("${0} is not a value")]
    NotAValue(&'static str),
}

enum Resolved {
    Input,
    Util,
    Value(Value),
}

/// Evaluate an expression to a JSON value.
///
/// # Errors
/// Returns a [`TokenError`] for missing members, unknown functions, bad
/// arguments or malformed JSON paths.
pub fn evaluate_expr(expr: &Expr, scope: &Scope) -> Result<Value, TokenError> {
    let mut current = match expr.root {
        Root::Input => Resolved::Input,
        Root::Util => Resolved::Util,
        Root::Context => Resolved::Value(scope.context.clone()),
        Root::StageVariables => Resolved::Value(Value::Object(
            scope
                .stage_variables
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )),
    };

    for segment in &expr.segments {
        current = match (current, segment) {
            (Resolved::Input, Segment::Member(name)) if name == "body" => {
                Resolved::Value(Value::String(scope.input.raw_body.clone()))
            }
            (Resolved::Input, Segment::Call { name, args }) => {
                let args = evaluate_args(args, scope)?;
                Resolved::Value(call_input(&scope.input, name, &args)?)
            }
            (Resolved::Util, Segment::Call { name, args }) => {
                let args = evaluate_args(args, scope)?;
                Resolved::Value(call_util(name, &args)?)
            }
            (Resolved::Value(value), Segment::Member(name)) => match value {
                Value::Object(mut map) => Resolved::Value(
                    map.remove(name)
                        .ok_or_else(|| TokenError::UnknownMember(name.clone()))?,
                ),
                _ => return Err(TokenError::UnknownMember(name.clone())),
            },
            (_, Segment::Member(name)) => return Err(TokenError::UnknownMember(name.clone())),
            (Resolved::Value(_), Segment::Call { name, .. }) => {
                return Err(TokenError::UnknownFunction(name.clone()))
            }
        };
    }

    match current {
        Resolved::Value(value) => Ok(value),
        Resolved::Input => Err(TokenError::NotAValue("input")),
        Resolved::Util => Err(TokenError::NotAValue("util")),
    }
}

fn evaluate_args(args: &[Arg], scope: &Scope) -> Result<Vec<Value>, TokenError> {
    args.iter()
        .map(|arg| match arg {
            Arg::Literal(value) => Ok(value.clone()),
            Arg::Expr(expr) => evaluate_expr(expr, scope),
        })
        .collect()
}

/// String form of an argument: strings verbatim, `null` empty, everything
/// else as JSON text.
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn single<'a>(function: &str, args: &'a [Value]) -> Result<&'a Value, TokenError> {
    match args {
        [only] => Ok(only),
        _ => Err(TokenError::Arity {
            function: function.to_owned(),
            expected: "1",
            got: args.len(),
        }),
    }
}

fn call_input(input: &InputBinding, name: &str, args: &[Value]) -> Result<Value, TokenError> {
    match name {
        "params" => match args {
            [] => Ok(input.merged_params()),
            [key] => Ok(Value::String(input.param(&text(key)).unwrap_or_default().to_owned())),
            _ => Err(TokenError::Arity {
                function: "params".to_owned(),
                expected: "0 or 1",
                got: args.len(),
            }),
        },
        "json" => {
            let found = jsonpath::query(&input.body, &text(single(name, args)?))?;
            Ok(Value::String(found.to_string()))
        }
        "path" => Ok(jsonpath::query(&input.body, &text(single(name, args)?))?),
        _ => Err(TokenError::UnknownFunction(format!("input.{name}"))),
    }
}

fn call_util(name: &str, args: &[Value]) -> Result<Value, TokenError> {
    let arg = text(single(name, args)?);
    let out = match name {
        "escapeJavaScript" => util::escape_javascript(&arg),
        "urlEncode" => util::url_encode(&arg),
        "urlDecode" => util::url_decode(&arg),
        "base64Encode" => util::base64_encode(&arg),
        "base64Decode" => util::base64_decode(&arg).map_err(TokenError::Transform)?,
        "parseJson" => {
            return serde_json::from_str(&arg).map_err(|e| TokenError::Transform(format!("parseJson: {e}")))
        }
        _ => return Err(TokenError::UnknownFunction(format!("util.{name}"))),
    };
    Ok(Value::String(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::parser::parse_expression;
    use serde_json::json;

    fn scope() -> Scope {
        let mut input = InputBinding::from_payload(json!({ "id": 1, "name": "a \"b\"" }));
        input.path.insert("id".to_owned(), "42".to_owned());
        input.querystring.insert("id".to_owned(), "from-query".to_owned());
        input.querystring.insert("q".to_owned(), "a b".to_owned());
        input.header.insert("X-Trace".to_owned(), "t-1".to_owned());
        let mut stage = BTreeMap::new();
        stage.insert("table".to_owned(), "items-dev".to_owned());
        Scope::new(input, json!({ "stage": "dev", "identity": {} }), stage)
    }

    fn eval(src: &str) -> Result<Value, TokenError> {
        let (expr, _) = match parse_expression(src) {
            Ok(p) => p,
            Err(e) => panic!("parse {src}: {e}"),
        };
        evaluate_expr(&expr, &scope())
    }

    #[test]
    fn params_precedence_path_query_header() {
        assert_eq!(eval("$input.params('id')"), Ok(json!("42")));
        assert_eq!(eval("$input.params('q')"), Ok(json!("a b")));
        assert_eq!(eval("$input.params('x-trace')"), Ok(json!("t-1")));
        assert_eq!(eval("$input.params('missing')"), Ok(json!("")));
    }

    #[test]
    fn params_without_argument_merges() {
        assert_eq!(
            eval("$input.params()"),
            Ok(json!({ "X-Trace": "t-1", "id": "42", "q": "a b" }))
        );
    }

    #[test]
    fn json_encodes_and_path_returns_raw() {
        assert_eq!(eval("$input.json('$.id')"), Ok(json!("1")));
        assert_eq!(eval("$input.json('$.name')"), Ok(json!("\"a \\\"b\\\"\"")));
        assert_eq!(eval("$input.path('$.name')"), Ok(json!("a \"b\"")));
    }

    #[test]
    fn context_and_stage_variables() {
        assert_eq!(eval("$context.stage"), Ok(json!("dev")));
        assert_eq!(eval("$stageVariables.table"), Ok(json!("items-dev")));
        assert_eq!(eval("$context.identity"), Ok(json!({})));
    }

    #[test]
    fn util_with_variable_argument() {
        assert_eq!(eval("$util.urlEncode($input.params('q'))"), Ok(json!("a%20b")));
        assert_eq!(eval("$util.parseJson('{\"a\":[1]}')"), Ok(json!({ "a": [1] })));
    }

    #[test]
    fn failures_are_token_errors() {
        assert_eq!(eval("$context.missing"), Err(TokenError::UnknownMember("missing".to_owned())));
        assert!(matches!(eval("$input.foo.bar"), Err(TokenError::UnknownMember(_))));
        assert!(matches!(eval("$util.eval('1')"), Err(TokenError::UnknownFunction(_))));
        assert!(matches!(eval("$input.json('nope')"), Err(TokenError::JsonPath(_))));
        assert!(matches!(eval("$util.base64Decode('%%%')"), Err(TokenError::Transform(_))));
        assert_eq!(eval("$input"), Err(TokenError::NotAValue("input")));
        assert!(matches!(eval("$input.params('a', 'b')"), Err(TokenError::Arity { .. })));
    }
}
