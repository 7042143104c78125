//! Mapping-template interpreter.
//!
//! A template is plain text with embedded expression tokens such as
//! `$input.params('id')` or `$util.urlEncode($context.stage)`. Tokens are
//! located by [`scanner`], parsed into a small AST by [`parser`] and
//! evaluated against a [`Scope`] by [`eval`]. Nothing outside the scope is
//! reachable from the grammar.
//!
//! A token that fails to resolve is left in the output as written; the rest
//! of the template still renders.

pub mod eval;
pub mod jsonpath;
pub mod parser;
pub mod scanner;
pub mod util;

use serde_json::Value;

pub use eval::{InputBinding, Scope, TokenError};
use scanner::{Piece, Quoting};

/// Evaluates mapping templates against a request or response scope.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateInterpreter;

impl TemplateInterpreter {
    /// Create an interpreter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Render `template` against `scope`.
    ///
    /// Templates without tokens are returned unchanged.
    #[must_use]
    pub fn evaluate(&self, template: &str, scope: &Scope) -> String {
        let mut out = String::with_capacity(template.len());
        for piece in scanner::scan(template) {
            match piece {
                Piece::Text(text) => out.push_str(text),
                Piece::Token { expr, source, quoting } => match eval::evaluate_expr(&expr, scope) {
                    Ok(value) => out.push_str(&coerce(&value, quoting)),
                    Err(error) => {
                        tracing::debug!(token = source, %error, "template token left unresolved");
                        out.push_str(source);
                    }
                },
            }
        }
        out
    }
}

/// Substitute a value according to where its token appeared.
fn coerce(value: &Value, quoting: Quoting) -> String {
    match quoting {
        Quoting::Bare => match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
        Quoting::Whole => json_string(value),
        Quoting::Inner => {
            let quoted = json_string(value);
            quoted[1..quoted.len() - 1].to_owned()
        }
    }
}

/// JSON string literal of the value's text form; `null` becomes `""`.
fn json_string(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    Value::String(text).to_string()
}
