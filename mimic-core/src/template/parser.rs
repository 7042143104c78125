//! Recursive-descent parser for a single expression token.
//!
//! Grammar (whitespace only allowed inside argument lists):
//!
//! ```text
//! expr     := '$' root ( '.' ident call? )*
//! root     := 'input' | 'context' | 'util' | 'stageVariables'
//! call     := '(' ( arg ( ',' arg )* )? ')'
//! arg      := string | number | 'true' | 'false' | 'null' | expr
//! ```
//!
//! The parser consumes the longest well-formed prefix. A `.` that is not
//! followed by an identifier ends the token, so `$context.stage.` parses as
//! `$context.stage` followed by literal text.

use serde_json::{Number, Value};

/// Maximum nesting of expressions inside call arguments.
pub const MAX_DEPTH: usize = 4;

/// The fixed bindings an expression can start from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Root {
    Input,
    Context,
    Util,
    StageVariables,
}

impl Root {
    const ALL: [(&'static str, Root); 4] = [
        ("input", Root::Input),
        ("context", Root::Context),
        ("util", Root::Util),
        ("stageVariables", Root::StageVariables),
    ];

    fn from_ident(ident: &str) -> Option<Self> {
        Self::ALL.iter().find(|(name, _)| *name == ident).map(|(_, root)| *root)
    }
}

/// One step after the root.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// `.name`
    Member(String),
    /// `.name(args)`
    Call { name: String, args: Vec<Arg> },
}

/// A call argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Literal(Value),
    Expr(Expr),
}

/// A parsed expression token.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub root: Root,
    pub segments: Vec<Segment>,
}

/// Why a token could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ParseError {
    #[error("expected '$' at offset {0}")]
    ExpectedDollar(usize),
    #[error("unknown root binding at offset {0}")]
    UnknownRoot(usize),
    #[error("unterminated argument list")]
    UnterminatedCall,
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("invalid argument at offset {0}")]
    InvalidArgument(usize),
    #[error("expressions nested deeper than {}", MAX_DEPTH)]
    TooDeep,
}

/// Parse the expression starting at the beginning of `src`.
///
/// Returns the expression and the number of bytes consumed.
///
/// # Errors
/// Returns a [`ParseError`] if `src` does not start with a well-formed token.
pub fn parse_expression(src: &str) -> Result<(Expr, usize), ParseError> {
    let mut parser = Parser { src: src.as_bytes(), text: src, pos: 0 };
    let expr = parser.expr(0)?;
    Ok((expr, parser.pos))
}

/// Returns `true` if `src` starts with `$` and a known root name that is not
/// a prefix of a longer identifier.
#[must_use]
pub fn starts_token(src: &str) -> bool {
    let Some(rest) = src.strip_prefix('$') else {
        return false;
    };
    let end = rest.bytes().position(|b| !is_ident_byte(b)).unwrap_or(rest.len());
    Root::from_ident(&rest[..end]).is_some()
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

struct Parser<'a> {
    src: &'a [u8],
    text: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn ident(&mut self) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_byte) {
            self.pos += 1;
        }
        &self.text[start..self.pos]
    }

    fn expr(&mut self, depth: usize) -> Result<Expr, ParseError> {
        if depth > MAX_DEPTH {
            return Err(ParseError::TooDeep);
        }
        if self.peek() != Some(b'$') {
            return Err(ParseError::ExpectedDollar(self.pos));
        }
        self.pos += 1;
        let root_at = self.pos;
        let root = Root::from_ident(self.ident()).ok_or(ParseError::UnknownRoot(root_at))?;

        let mut segments = Vec::new();
        while self.peek() == Some(b'.') && self.peek_at(1).is_some_and(is_ident_start) {
            self.pos += 1;
            let name = self.ident().to_owned();
            if self.peek() == Some(b'(') {
                self.pos += 1;
                let args = self.args(depth)?;
                segments.push(Segment::Call { name, args });
            } else {
                segments.push(Segment::Member(name));
            }
        }
        Ok(Expr { root, segments })
    }

    /// Parses arguments after the opening parenthesis, through the closing one.
    fn args(&mut self, depth: usize) -> Result<Vec<Arg>, ParseError> {
        let mut args = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(b')') {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            self.skip_whitespace();
            args.push(self.arg(depth)?);
            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b')') => {
                    self.pos += 1;
                    return Ok(args);
                }
                None => return Err(ParseError::UnterminatedCall),
                Some(_) => return Err(ParseError::InvalidArgument(self.pos)),
            }
        }
    }

    fn arg(&mut self, depth: usize) -> Result<Arg, ParseError> {
        match self.peek() {
            None => Err(ParseError::UnterminatedCall),
            Some(b'$') => Ok(Arg::Expr(self.expr(depth + 1)?)),
            Some(quote @ (b'\'' | b'"')) => Ok(Arg::Literal(Value::String(self.string(quote)?))),
            Some(b) if b == b'-' || b.is_ascii_digit() => self.number(),
            Some(b) if is_ident_start(b) => {
                let at = self.pos;
                match self.ident() {
                    "true" => Ok(Arg::Literal(Value::Bool(true))),
                    "false" => Ok(Arg::Literal(Value::Bool(false))),
                    "null" => Ok(Arg::Literal(Value::Null)),
                    _ => Err(ParseError::InvalidArgument(at)),
                }
            }
            Some(_) => Err(ParseError::InvalidArgument(self.pos)),
        }
    }

    fn string(&mut self, quote: u8) -> Result<String, ParseError> {
        self.pos += 1;
        let mut out = String::new();
        let mut run_start = self.pos;
        loop {
            match self.peek() {
                None => return Err(ParseError::UnterminatedString),
                Some(b) if b == quote => {
                    out.push_str(&self.text[run_start..self.pos]);
                    self.pos += 1;
                    return Ok(out);
                }
                Some(b'\\') if self.peek_at(1).is_some() => {
                    out.push_str(&self.text[run_start..self.pos]);
                    let escaped = self.peek_at(1).unwrap_or(b'\\');
                    match escaped {
                        b'n' => out.push('\n'),
                        b't' => out.push('\t'),
                        b'\\' | b'\'' | b'"' => out.push(char::from(escaped)),
                        _ => {
                            // Unknown escapes are kept verbatim; only ASCII
                            // escapes are collapsed so slicing stays on a
                            // char boundary.
                            out.push('\\');
                            self.pos += 1;
                            run_start = self.pos;
                            continue;
                        }
                    }
                    self.pos += 2;
                    run_start = self.pos;
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn number(&mut self) -> Result<Arg, ParseError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while self.peek().is_some_and(|b| b.is_ascii_digit() || b == b'.') {
            self.pos += 1;
        }
        let literal = &self.text[start..self.pos];
        if let Ok(int) = literal.parse::<i64>() {
            return Ok(Arg::Literal(Value::Number(int.into())));
        }
        literal
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(|n| Arg::Literal(Value::Number(n)))
            .ok_or(ParseError::InvalidArgument(start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> (Expr, usize) {
        match parse_expression(src) {
            Ok(parsed) => parsed,
            Err(e) => panic!("parse of {src:?} failed: {e}"),
        }
    }

    #[test]
    fn member_chain_and_call() {
        let (expr, used) = parse("$input.json('$.id') tail");
        assert_eq!(used, "$input.json('$.id')".len());
        assert_eq!(expr.root, Root::Input);
        assert_eq!(
            expr.segments,
            vec![Segment::Call {
                name: "json".to_owned(),
                args: vec![Arg::Literal(Value::String("$.id".to_owned()))],
            }]
        );
    }

    #[test]
    fn trailing_dot_ends_token() {
        let (expr, used) = parse("$context.stage.");
        assert_eq!(used, "$context.stage".len());
        assert_eq!(expr.segments, vec![Segment::Member("stage".to_owned())]);
    }

    #[test]
    fn nested_variable_argument() {
        let (expr, _) = parse("$util.urlEncode($input.params('q'))");
        match &expr.segments[0] {
            Segment::Call { name, args } => {
                assert_eq!(name, "urlEncode");
                assert!(matches!(&args[0], Arg::Expr(inner) if inner.root == Root::Input));
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn literal_arguments() {
        let (expr, _) = parse(r#"$util.f(1, -2.5, true, null, "a\"b")"#);
        let Segment::Call { args, .. } = &expr.segments[0] else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 5);
        assert_eq!(args[0], Arg::Literal(Value::from(1)));
        assert_eq!(args[2], Arg::Literal(Value::Bool(true)));
        assert_eq!(args[4], Arg::Literal(Value::String("a\"b".to_owned())));
    }

    #[test]
    fn malformed_tokens_are_errors() {
        assert_eq!(parse_expression("$nope.x").err(), Some(ParseError::UnknownRoot(1)));
        assert_eq!(parse_expression("$input.params('id'").err(), Some(ParseError::UnterminatedCall));
        assert_eq!(parse_expression("$input.params('id)").err(), Some(ParseError::UnterminatedString));
        assert!(matches!(parse_expression("$input.params(foo)"), Err(ParseError::InvalidArgument(_))));
    }

    #[test]
    fn nesting_is_bounded() {
        let deep = "$util.a($util.a($util.a($util.a($util.a($util.a('x'))))))";
        assert_eq!(parse_expression(deep).err(), Some(ParseError::TooDeep));
    }

    #[test]
    fn starts_token_requires_exact_root() {
        assert!(starts_token("$input.body"));
        assert!(starts_token("$stageVariables"));
        assert!(!starts_token("$inputs.body"));
        assert!(!starts_token("$5.00"));
        assert!(!starts_token("input"));
    }
}
