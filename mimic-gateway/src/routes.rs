//! Axum router and the request pipeline.
//!
//! Every request outside `/__mimic/` goes through
//! route → integration → execution → response, strictly in that order.

use std::collections::BTreeMap;

use axum::{
    body::Bytes,
    extract::State,
    http::{header::ACCEPT, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use mimic_core::{ExecutionRequest, ExecutionResult, HttpMethod, HttpResponse, InboundRequest};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{error::GatewayError, state::AppState};

/// Build the application router over the given state.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/__mimic/health", get(health))
        .fallback(dispatch)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// `GET /__mimic/health`: runtime availability and in-flight invocations.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let active = state.sandbox.active_count();
    let routes = state.routes.len();
    match state.sandbox.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "active": active, "routes": routes })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "active": active, "routes": routes, "error": e.to_string() })),
        ),
    }
}

/// Fallback handler: map, invoke and render one API request.
///
/// # Errors
/// Returns [`GatewayError::RouteNotFound`] when nothing matches,
/// [`GatewayError::EventBuild`] when the request template renders invalid
/// JSON and [`GatewayError::Sandbox`] when the invocation cannot run.
/// Handler failures are not errors; they are rendered through the route's
/// response definitions.
pub async fn dispatch(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let path = uri.path();
    let not_found = || GatewayError::RouteNotFound {
        method: method.to_string(),
        path: path.to_owned(),
    };
    let http_method: HttpMethod = method.as_str().parse().map_err(|_| not_found())?;
    let matched = state.routes.find(http_method, path).ok_or_else(not_found)?;
    let route = matched.route;

    let body = String::from_utf8(body.to_vec())
        .map_err(|_| GatewayError::InvalidRequest("request body is not valid UTF-8".to_owned()))?;
    let mut request = InboundRequest::new(http_method, path)
        .with_query_string(uri.query().unwrap_or_default())
        .with_body(body);
    request.headers = header_map(&headers);

    let mapped = state.mapper.build(&request, &matched)?;
    let request_id = mapped.request_id;

    let result = match state.resolver.resolve(&route.integration.uri) {
        Ok(handler) => {
            let timeout = handler.timeout.unwrap_or(state.default_timeout);
            let execution = ExecutionRequest::new(
                handler.path,
                handler.function_name,
                mapped.event,
                mapped.context.clone(),
                timeout,
            )
            .with_env(state.env.clone())
            .with_memory_size(handler.memory_size);
            state.sandbox.execute(request_id, execution).await?.result
        }
        Err(e) => {
            tracing::warn!(%request_id, uri = %route.integration.uri, error = %e, "handler could not be resolved");
            ExecutionResult::ModuleLoadError(e.to_string())
        }
    };

    let accept = headers.get(ACCEPT).and_then(|v| v.to_str().ok());
    let rendered = state.responses.render(&route.integration, &result, accept, &mapped.context);
    tracing::debug!(%request_id, status = rendered.status_code, outcome = result.kind(), "response rendered");
    Ok(into_response(rendered))
}

/// Header values that are not visible ASCII are skipped.
fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_owned(), v.to_owned())))
        .collect()
}

fn into_response(rendered: HttpResponse) -> Response {
    let status = StatusCode::from_u16(rendered.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, rendered.body).into_response();
    for (name, value) in rendered.headers {
        match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().insert(name, value);
            }
            _ => tracing::warn!(header = %name, "dropping invalid response header"),
        }
    }
    response
}
