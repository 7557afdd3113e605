//! Request dispatch against a deployment snapshot.

use std::collections::{BTreeMap, HashMap};

use ads_core::arn::{self, Arn};
use ads_core::{HandlerKind, HttpMethod, RequestShape};
use ads_handlers::{HandlerContext, HandlerRequest, TableLayout, invoke};
use ads_state::{DeployedRoute, DeploymentRecord, FunctionRecord, IntegrationRecord, StateResult, StateStore};
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::GatewayState;

/// The deployment currently published to `stage` of the API named `api_name`.
pub fn published_deployment(
    store: &StateStore,
    api_name: &str,
    stage: &str,
) -> StateResult<Option<DeploymentRecord>> {
    let Some(api) = store.list_apis()?.into_iter().find(|a| a.name == api_name) else {
        return Ok(None);
    };
    let Some(stage) = store.get_stage(&api.id, stage)? else {
        return Ok(None);
    };
    store.get_deployment(&api.id, &stage.deployment_id)
}

/// Fallback handler: every request lands here.
pub async fn dispatch(State(state): State<GatewayState>, method: Method, uri: Uri, body: Bytes) -> Response {
    let response = route_request(&state, &method, uri.path(), &body).await;
    info!(%method, path = %uri.path(), status = response.status().as_u16(), "request");
    response
}

async fn route_request(state: &GatewayState, method: &Method, path: &str, body: &[u8]) -> Response {
    let Some(route_path) = strip_stage(path, &state.stage) else {
        return gateway_error(StatusCode::NOT_FOUND, "Not Found");
    };
    let deployment = match published_deployment(&state.store, &state.api_name, &state.stage) {
        Ok(Some(deployment)) => deployment,
        Ok(None) => {
            return gateway_error(
                StatusCode::NOT_FOUND,
                &format!("stage {} is not deployed", state.stage),
            );
        }
        Err(e) => {
            warn!(error = %e, "reading deployment failed");
            return gateway_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };

    let verb = HttpMethod::parse(method.as_str());
    let mut path_known = false;
    for route in &deployment.routes {
        let Some(params) = match_path(&route.path, route_path) else {
            continue;
        };
        path_known = true;
        if Some(route.method) == verb {
            debug!(route = %route.path, method = %route.method, deployment = %deployment.id, "route matched");
            return invoke_route(state, route, &params, body).await;
        }
    }

    if path_known {
        gateway_error(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
    } else {
        gateway_error(StatusCode::NOT_FOUND, "Not Found")
    }
}

async fn invoke_route(
    state: &GatewayState,
    route: &DeployedRoute,
    params: &HashMap<String, String>,
    body: &[u8],
) -> Response {
    let (uri, request_template) = match &route.integration {
        Some(IntegrationRecord::Function { uri, request_template }) => (uri, request_template),
        Some(IntegrationRecord::Mock { .. }) => {
            return respond(StatusCode::OK, &route.response_headers, String::new());
        }
        None => {
            warn!(route = %route.path, "route has no integration");
            return gateway_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };

    let Some(shape) = RequestShape::from_template(request_template) else {
        warn!(route = %route.path, template = %request_template, "unsupported mapping template");
        return gateway_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
    };
    let function = match resolve_function(&state.store, uri) {
        Ok(function) => function,
        Err(reason) => {
            warn!(route = %route.path, %reason, "integration target unavailable");
            return gateway_error(StatusCode::BAD_GATEWAY, "Internal server error");
        }
    };
    let Some(kind) = HandlerKind::from_name(&function.handler) else {
        warn!(function = %function.name, handler = %function.handler, "unknown entry point");
        return gateway_error(StatusCode::BAD_GATEWAY, "Internal server error");
    };

    let ctx = HandlerContext::new(state.items.clone(), TableLayout::from_vars(&function.environment));
    let response = invoke(kind, &ctx, shape_request(shape, params, body)).await;

    let status = StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = if route.response_template.is_some() {
        response.body
    } else {
        serde_json::to_string(&response).unwrap_or_default()
    };
    respond(status, &route.response_headers, body)
}

/// `/prod/listings` → `/listings` when serving stage `prod`.
fn strip_stage<'a>(path: &'a str, stage: &str) -> Option<&'a str> {
    let rest = path.strip_prefix('/')?.strip_prefix(stage)?;
    match rest {
        "" => Some("/"),
        rest if rest.starts_with('/') => Some(rest),
        _ => None,
    }
}

/// Match `path` against a route template, binding `{param}` segments.
fn match_path(template: &str, path: &str) -> Option<HashMap<String, String>> {
    let expected: Vec<&str> = template.split('/').filter(|s| !s.is_empty()).collect();
    let actual: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if expected.len() != actual.len() {
        return None;
    }
    let mut params = HashMap::new();
    for (want, got) in expected.iter().zip(&actual) {
        match want.strip_prefix('{').and_then(|w| w.strip_suffix('}')) {
            Some(name) => {
                params.insert(name.to_string(), (*got).to_string());
            }
            None if want == got => {}
            None => return None,
        }
    }
    Some(params)
}

/// Build the handler request the mapping template `shape` describes.
fn shape_request(shape: RequestShape, params: &HashMap<String, String>, body: &[u8]) -> HandlerRequest {
    let mut request = HandlerRequest::default();
    if shape.carries_path_id() {
        let id = params.get("id").cloned().unwrap_or_default();
        request.path_parameters = Some(HashMap::from([("id".to_string(), id)]));
    }
    if shape.carries_body() {
        request.body = Some(json_body(body));
    }
    request
}

/// The request body as JSON. An empty body is `{}`; anything unparsable is
/// passed through as a string so the handler can reject it.
fn json_body(body: &[u8]) -> Value {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Value::Object(Map::new());
    }
    serde_json::from_slice(body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

fn resolve_function(store: &StateStore, uri: &str) -> Result<FunctionRecord, String> {
    let function_arn =
        arn::function_arn_from_uri(uri).ok_or_else(|| format!("not a function integration: {uri}"))?;
    let parsed = Arn::parse(function_arn).map_err(|e| e.to_string())?;
    let name = parsed.resource.strip_prefix("function:").unwrap_or(&parsed.resource);
    store
        .get_function(name)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("function {name} does not exist"))
}

fn respond(status: StatusCode, headers: &BTreeMap<String, String>, body: String) -> Response {
    let mut response = (status, body).into_response();
    let map = response.headers_mut();
    map.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    for (name, value) in headers {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => warn!(header = %name, "skipping malformed response header"),
        }
    }
    response
}

fn gateway_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}
