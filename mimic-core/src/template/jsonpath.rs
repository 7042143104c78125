//! The JSON-path subset accepted by `$input.json(...)` and `$input.path(...)`.
//!
//! Supported steps: `$`, `.name`, `['name']`, `[index]`, `[*]` and `.*`.
//! A missing key or index yields `null`; a malformed path is an error.

use serde_json::Value;

/// Why a JSON-path expression was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid JSON path '{path}': {reason}")]
pub struct JsonPathError {
    pub path: String,
    pub reason: &'static str,
}

#[derive(Debug, PartialEq)]
enum Step {
    Key(String),
    Index(usize),
    Wildcard,
}

/// Evaluate `path` against `root`.
///
/// # Errors
/// Returns [`JsonPathError`] if the path does not start with `$` or contains
/// an unsupported step.
pub fn query(root: &Value, path: &str) -> Result<Value, JsonPathError> {
    let steps = parse(path)?;
    let mut nodes = vec![root];
    let mut fan_out = false;

    for step in &steps {
        nodes = match step {
            Step::Key(key) => nodes.into_iter().filter_map(|n| n.get(key.as_str())).collect(),
            Step::Index(i) => nodes.into_iter().filter_map(|n| n.get(*i)).collect(),
            Step::Wildcard => {
                fan_out = true;
                nodes.into_iter().flat_map(children).collect()
            }
        };
    }

    if fan_out {
        Ok(Value::Array(nodes.into_iter().cloned().collect()))
    } else {
        Ok(nodes.first().map_or(Value::Null, |n| (*n).clone()))
    }
}

fn children(node: &Value) -> Box<dyn Iterator<Item = &Value> + '_> {
    match node {
        Value::Array(items) => Box::new(items.iter()),
        Value::Object(map) => Box::new(map.values()),
        _ => Box::new(std::iter::empty()),
    }
}

fn parse(path: &str) -> Result<Vec<Step>, JsonPathError> {
    let fail = |reason| JsonPathError { path: path.to_owned(), reason };
    let trimmed = path.trim();
    let mut rest = trimmed.strip_prefix('$').ok_or_else(|| fail("must start with '$'"))?;
    let mut steps = Vec::new();

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('.') {
            if let Some(after_star) = after.strip_prefix('*') {
                steps.push(Step::Wildcard);
                rest = after_star;
                continue;
            }
            let end = after.find(['.', '[']).unwrap_or(after.len());
            if end == 0 {
                return Err(fail("empty member name"));
            }
            steps.push(Step::Key(after[..end].to_owned()));
            rest = &after[end..];
        } else if let Some(after) = rest.strip_prefix('[') {
            let close = after.find(']').ok_or_else(|| fail("unterminated bracket"))?;
            let inner = after[..close].trim();
            let step = if inner == "*" {
                Step::Wildcard
            } else if let Some(quoted) = inner
                .strip_prefix('\'')
                .and_then(|s| s.strip_suffix('\''))
                .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
            {
                Step::Key(quoted.to_owned())
            } else {
                Step::Index(inner.parse().map_err(|_| fail("bracket must hold an index, a quoted key or '*'"))?)
            };
            steps.push(step);
            rest = &after[close + 1..];
        } else {
            return Err(fail("expected '.' or '['"));
        }
    }
    Ok(steps)
}
