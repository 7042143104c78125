//! Quote-aware tokenizer for mapping templates.
//!
//! The template is walked byte by byte. Outside quotes a `$` followed by a
//! root name starts a bare token. A `"…"` or `'…'` segment is scanned as a
//! unit: escaped quotes inside it are unescaped before the token is parsed,
//! and a segment that holds exactly one token is replaced as a whole.

use super::parser::{parse_expression, starts_token, Expr};

/// Where a token appeared, which decides how its value is substituted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quoting {
    /// Outside any quotes: substitute the value verbatim.
    Bare,
    /// The token is the entire content of a quoted segment: the segment,
    /// quotes included, becomes one JSON string.
    Whole,
    /// The token shares a quoted segment with other text: substitute the
    /// escaped string content without quotes.
    Inner,
}

/// A scanned piece of a template.
#[derive(Debug, Clone, PartialEq)]
pub enum Piece<'a> {
    Text(&'a str),
    Token {
        expr: Expr,
        /// Original template text, restored when evaluation fails.
        source: &'a str,
        quoting: Quoting,
    },
}

/// Split a template into literal text and expression tokens.
#[must_use]
pub fn scan(template: &str) -> Vec<Piece<'_>> {
    let mut scanner = Scanner {
        template,
        bytes: template.as_bytes(),
        pieces: Vec::new(),
        text_start: 0,
    };
    scanner.run();
    scanner.pieces
}

struct Scanner<'a> {
    template: &'a str,
    bytes: &'a [u8],
    pieces: Vec<Piece<'a>>,
    text_start: usize,
}

impl<'a> Scanner<'a> {
    fn run(&mut self) {
        let mut i = 0;
        while i < self.bytes.len() {
            match self.bytes[i] {
                b'$' if starts_token(&self.template[i..]) => {
                    if let Ok((expr, used)) = parse_expression(&self.template[i..]) {
                        self.push_token(i, i + used, expr, Quoting::Bare);
                        i += used;
                        continue;
                    }
                    i += 1;
                }
                quote @ (b'"' | b'\'') => match self.closing_quote(i + 1, quote) {
                    Some(close) if self.quoted(i, close) => i = close + 1,
                    // A lone quote, or one whose partner sits inside a
                    // token's arguments, is ordinary text.
                    _ => i += 1,
                },
                _ => i += 1,
            }
        }
        self.flush_text(self.bytes.len());
    }

    fn closing_quote(&self, from: usize, quote: u8) -> Option<usize> {
        let mut j = from;
        while j < self.bytes.len() {
            match self.bytes[j] {
                b'\\' => j += 2,
                b if b == quote => return Some(j),
                _ => j += 1,
            }
        }
        None
    }

    /// Scan the segment between `open` and `close` as a unit.
    ///
    /// Returns `false`, emitting nothing, when a token inside the segment
    /// only parses by running past `close`; the opening quote was then
    /// literal text such as an apostrophe.
    fn quoted(&mut self, open: usize, close: usize) -> bool {
        let content_start = open + 1;
        let mut tokens = Vec::new();
        let mut k = content_start;
        while k < close {
            if self.bytes[k] == b'$' && starts_token(&self.template[k..close]) {
                let (view, offsets) = unescape_quotes(&self.template[k..close]);
                if let Ok((expr, used)) = parse_expression(&view) {
                    let end = k + offsets[used];
                    tokens.push((k, end, expr));
                    k = end;
                    continue;
                }
                if matches!(parse_expression(&self.template[k..]), Ok((_, used)) if k + used > close) {
                    return false;
                }
            }
            k += if self.bytes[k] == b'\\' { 2 } else { 1 };
        }

        let whole = matches!(tokens.as_slice(), [(start, end, _)] if *start == content_start && *end == close);
        if whole {
            if let Some((_, _, expr)) = tokens.pop() {
                self.push_token(open, close + 1, expr, Quoting::Whole);
            }
            return true;
        }
        for (start, end, expr) in tokens {
            self.push_token(start, end, expr, Quoting::Inner);
        }
        true
    }

    fn push_token(&mut self, start: usize, end: usize, expr: Expr, quoting: Quoting) {
        self.flush_text(start);
        let template = self.template;
        self.pieces.push(Piece::Token {
            expr,
            source: &template[start..end],
            quoting,
        });
        self.text_start = end;
    }

    fn flush_text(&mut self, upto: usize) {
        if upto > self.text_start {
            let template = self.template;
            self.pieces.push(Piece::Text(&template[self.text_start..upto]));
        }
        self.text_start = upto;
    }
}

/// Replace `\"` and `\'` with bare quotes.
///
/// Returns the unescaped text and, for every byte offset of it (plus one past
/// the end), the matching offset in `raw`.
fn unescape_quotes(raw: &str) -> (String, Vec<usize>) {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut offsets = Vec::with_capacity(bytes.len() + 1);
    let mut j = 0;
    while j < bytes.len() {
        if bytes[j] == b'\\' && matches!(bytes.get(j + 1), Some(b'"' | b'\'')) {
            offsets.push(j);
            out.push(bytes[j + 1]);
            j += 2;
        } else {
            offsets.push(j);
            out.push(bytes[j]);
            j += 1;
        }
    }
    offsets.push(bytes.len());
    // Only ASCII backslashes were removed, so the bytes stay valid UTF-8.
    let text = String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());
    (text, offsets)
}
