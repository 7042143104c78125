//! Method + path resolution.
//!
//! Path parameter segments (`{name}`) are rewritten into capture groups when
//! a route is registered. Matching walks routes in declaration order and the
//! first match wins.

use std::collections::{BTreeMap, HashSet};

use percent_encoding::percent_decode_str;
use regex::Regex;

use crate::api::{path_param_names, ApiSpec, HttpMethod, IntegrationDefinition, Route};
use crate::error::CoreError;

/// A registered route with its compiled matcher.
#[derive(Debug)]
struct CompiledRoute {
    route: Route,
    matcher: Regex,
}

/// The outcome of a successful [`RouteTable::find`].
#[derive(Debug)]
#[non_exhaustive]
pub struct RouteMatch<'a> {
    /// The matched route.
    pub route: &'a Route,
    /// Parameter name to (percent-decoded) captured value.
    pub path_params: BTreeMap<String, String>,
}

/// Immutable-after-startup table of declared routes.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
    keys: HashSet<(HttpMethod, String)>,
}

impl RouteTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from every route of an [`ApiSpec`], in document order.
    ///
    /// # Errors
    /// Propagates [`CoreError::DuplicateRoute`] and
    /// [`CoreError::InvalidRoutePattern`] from [`Self::register`].
    pub fn from_spec(spec: ApiSpec) -> Result<Self, CoreError> {
        let mut table = Self::new();
        for route in spec.routes {
            table.register(route.method, &route.path, route.integration)?;
        }
        Ok(table)
    }

    /// Register a route.
    ///
    /// # Errors
    /// Returns [`CoreError::DuplicateRoute`] if `(method, path)` is already
    /// present, or [`CoreError::InvalidRoutePattern`] if a segment has an
    /// unbalanced brace or an empty parameter name.
    pub fn register(
        &mut self,
        method: HttpMethod,
        path: &str,
        integration: IntegrationDefinition,
    ) -> Result<(), CoreError> {
        let key = (method, path.to_owned());
        if self.keys.contains(&key) {
            return Err(CoreError::DuplicateRoute {
                method: method.to_string(),
                path: path.to_owned(),
            });
        }

        let matcher = compile_pattern(path)?;
        self.keys.insert(key);
        self.routes.push(CompiledRoute {
            route: Route {
                method,
                path: path.to_owned(),
                param_names: path_param_names(path),
                integration,
            },
            matcher,
        });
        Ok(())
    }

    /// Resolve a request to the first declared matching route.
    ///
    /// Returns `None` when nothing matches (`RouteNotFound` at the HTTP
    /// boundary).
    #[must_use]
    pub fn find(&self, method: HttpMethod, path: &str) -> Option<RouteMatch<'_>> {
        self.routes
            .iter()
            .filter(|compiled| compiled.route.method.accepts(method))
            .find_map(|compiled| {
                let captures = compiled.matcher.captures(path)?;
                let path_params = compiled
                    .route
                    .param_names
                    .iter()
                    .zip(captures.iter().skip(1))
                    .filter_map(|(name, capture)| {
                        let raw = capture?.as_str();
                        let value = percent_decode_str(raw).decode_utf8_lossy().into_owned();
                        Some((name.clone(), value))
                    })
                    .collect();
                Some(RouteMatch {
                    route: &compiled.route,
                    path_params,
                })
            })
    }

    /// Registered routes in declaration order.
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter().map(|compiled| &compiled.route)
    }

    /// Number of registered routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if no route is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Turn `/items/{id}/{rest+}` into `^/items/([^/]+)/(.+)$`.
fn compile_pattern(path: &str) -> Result<Regex, CoreError> {
    let invalid = |reason: &str| CoreError::InvalidRoutePattern {
        path: path.to_owned(),
        reason: reason.to_owned(),
    };

    let mut pattern = String::from("^");
    for (i, segment) in path.split('/').enumerate() {
        if i > 0 {
            pattern.push('/');
        }
        match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) if name.is_empty() || name == "+" => return Err(invalid("empty parameter name")),
            Some(name) if name.ends_with('+') => pattern.push_str("(.+)"),
            Some(_) => pattern.push_str("([^/]+)"),
            None if segment.contains(['{', '}']) => return Err(invalid("unbalanced brace in segment")),
            None => pattern.push_str(&regex::escape(segment)),
        }
    }
    pattern.push('$');

    Regex::new(&pattern).map_err(|e| invalid(&e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ResponseDefinition;

    fn integration(uri: &str) -> IntegrationDefinition {
        match IntegrationDefinition::with_default(uri, ResponseDefinition::new(200)) {
            Ok(i) => i,
            Err(e) => panic!("integration: {e}"),
        }
    }

    fn table(routes: &[(HttpMethod, &str)]) -> RouteTable {
        let mut table = RouteTable::new();
        for (method, path) in routes {
            if let Err(e) = table.register(*method, path, integration(path)) {
                panic!("register {method} {path}: {e}");
            }
        }
        table
    }

    #[test]
    fn match_binds_path_parameters() {
        let table = table(&[(HttpMethod::Get, "/items/{id}")]);
        let found = match table.find(HttpMethod::Get, "/items/42") {
            Some(m) => m,
            None => panic!("expected a match"),
        };
        assert_eq!(found.route.path, "/items/{id}");
        assert_eq!(found.path_params.get("id").map(String::as_str), Some("42"));
    }

    #[test]
    fn duplicate_route_is_rejected() {
        let mut table = table(&[(HttpMethod::Get, "/items")]);
        let result = table.register(HttpMethod::Get, "/items", integration("again"));
        assert!(matches!(result, Err(CoreError::DuplicateRoute { .. })), "got {result:?}");
        assert!(table.register(HttpMethod::Post, "/items", integration("post")).is_ok());
    }

    #[test]
    fn declaration_order_breaks_ties() {
        let table = table(&[(HttpMethod::Get, "/items/{id}"), (HttpMethod::Get, "/items/special")]);
        let found = table.find(HttpMethod::Get, "/items/special");
        assert_eq!(found.map(|m| m.route.path.as_str()), Some("/items/{id}"));
    }

    #[test]
    fn unmatched_method_or_path_is_not_found() {
        let table = table(&[(HttpMethod::Get, "/items/{id}")]);
        assert!(table.find(HttpMethod::Post, "/items/1").is_none());
        assert!(table.find(HttpMethod::Get, "/items/1/extra").is_none());
        assert!(table.find(HttpMethod::Get, "/items/").is_none());
    }

    #[test]
    fn any_route_and_greedy_parameter() {
        let table = table(&[(HttpMethod::Any, "/files/{path+}")]);
        let found = match table.find(HttpMethod::Delete, "/files/a/b%20c.txt") {
            Some(m) => m,
            None => panic!("expected a match"),
        };
        assert_eq!(found.path_params.get("path").map(String::as_str), Some("a/b c.txt"));
    }

    #[test]
    fn literal_segments_are_escaped() {
        let table = table(&[(HttpMethod::Get, "/v1.0/items")]);
        assert!(table.find(HttpMethod::Get, "/v1.0/items").is_some());
        assert!(table.find(HttpMethod::Get, "/v1x0/items").is_none());
    }

    #[test]
    fn malformed_pattern_is_rejected() {
        let mut table = RouteTable::new();
        let result = table.register(HttpMethod::Get, "/items/{id", integration("x"));
        assert!(matches!(result, Err(CoreError::InvalidRoutePattern { .. })));
        let result = table.register(HttpMethod::Get, "/items/{}", integration("x"));
        assert!(matches!(result, Err(CoreError::InvalidRoutePattern { .. })));
        assert!(table.is_empty());
    }

    proptest::proptest! {
        #[test]
        fn proptest_registered_route_matches_concrete_path(
            prefix in "[a-z]{1,8}",
            a in "[A-Za-z0-9_-]{1,12}",
            b in "[A-Za-z0-9_-]{1,12}",
        ) {
            let pattern = format!("/{prefix}/{{first}}/sub/{{second}}");
            let table = table(&[(HttpMethod::Put, pattern.as_str())]);
            let concrete = format!("/{prefix}/{a}/sub/{b}");
            let found = table.find(HttpMethod::Put, &concrete);
            proptest::prop_assert!(found.is_some());
            let found = found.map(|m| m.path_params).unwrap_or_default();
            proptest::prop_assert_eq!(found.get("first"), Some(&a));
            proptest::prop_assert_eq!(found.get("second"), Some(&b));
        }
    }
}
