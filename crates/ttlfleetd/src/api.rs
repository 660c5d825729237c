//! HTTP API
//!
//! All routes under `/api/v1` require a bearer token; `/health` does not.
//! Errors are returned as `{"error": "<message>"}`.

use axum::{
    Extension, Json, Router,
    extract::{Path, Request, State, rejection::JsonRejection},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use ttlfleet_cloud::{Image, Server};
use ttlfleet_controlplane::{
    Authorizer, Caller, ControlError, ControlPlane, ErrorKind, Operation, ServiceView, Termination,
    handle_message,
};

pub struct AppState {
    pub control: Arc<ControlPlane>,
    pub authorizer: Authorizer,
}

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/api/v1/server", get(list_servers).post(create_server))
        .route("/api/v1/server/{name}", axum::routing::delete(stop_server))
        .route("/api/v1/server/{name}/_start", post(start_server))
        .route("/api/v1/server/{name}/_extend", put(extend_server))
        .route("/api/v1/server/{name}/_type", put(retype_server))
        .route("/api/v1/server/{name}/_reboot", post(reboot_server))
        .route("/api/v1/chat", post(chat))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .with_state(state)
}

/// Error response of every handler
#[derive(Debug)]
pub enum ApiError {
    Control(ControlError),
    BadRequest(String),
}

impl From<ControlError> for ApiError {
    fn from(e: ControlError) -> Self {
        ApiError::Control(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

/// HTTP status for a control plane error
pub fn status_for(error: &ControlError) -> StatusCode {
    match error.kind() {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound | ErrorKind::NotManaged => StatusCode::NOT_FOUND,
        ErrorKind::Provider => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Policy => match error {
            ControlError::MissingTtl(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::CONFLICT,
        },
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Control(e) => {
                let status = status_for(&e);
                if status.is_server_error() {
                    tracing::error!("Request failed: {}", e);
                }
                (status, e.to_string())
            }
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let caller = state.authorizer.verify_header(header)?;
    tracing::debug!("{} {} by {}", request.method(), request.uri().path(), caller.subject);

    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn list_servers(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<Vec<ServiceView>>> {
    caller.authorize(Operation::List)?;
    Ok(Json(state.control.list_managed().await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateServerRequest {
    #[serde(default)]
    pub server_name: String,
    #[serde(default)]
    pub server_type: String,
    pub ttl: Option<String>,
}

async fn create_server(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<CreateServerRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Server>)> {
    caller.authorize(Operation::Create)?;
    let Json(request) = payload?;

    let control = &state.control;
    let ttl = request
        .ttl
        .unwrap_or_else(|| control.config().default_ttl.clone());
    tracing::info!("{} creates server {}", caller.subject, request.server_name);
    let server = control
        .create_new(&request.server_name, &request.server_type, &ttl)
        .await?;
    Ok((StatusCode::CREATED, Json(server)))
}

#[derive(Debug, Default, Deserialize)]
pub struct StartServerRequest {
    pub ttl: Option<String>,
}

async fn start_server(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(name): Path<String>,
    payload: Option<Json<StartServerRequest>>,
) -> ApiResult<(StatusCode, Json<Server>)> {
    caller.authorize(Operation::Start)?;
    let request = payload.map(|Json(r)| r).unwrap_or_default();

    let control = &state.control;
    let ttl = request
        .ttl
        .unwrap_or_else(|| control.config().default_ttl.clone());
    tracing::info!("{} starts server {}", caller.subject, name);
    let server = control.restart(&name, &ttl).await?;
    Ok((StatusCode::CREATED, Json(server)))
}

#[derive(Debug, Deserialize)]
pub struct ExtendServerRequest {
    #[serde(default)]
    pub ttl: String,
    /// Shorten instead of extend
    #[serde(default)]
    pub inverse: bool,
}

#[derive(Debug, Serialize)]
pub struct ExtendServerResponse {
    pub ttl: String,
}

async fn extend_server(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(name): Path<String>,
    payload: Result<Json<ExtendServerRequest>, JsonRejection>,
) -> ApiResult<Json<ExtendServerResponse>> {
    // Prune grants the same roles, so a malformed body is still a 403 first
    caller.authorize(Operation::Extend)?;
    let Json(request) = payload?;
    let until = if request.inverse {
        caller.authorize(Operation::Prune)?;
        state.control.prune(&name, &request.ttl).await?
    } else {
        caller.authorize(Operation::Extend)?;
        state.control.extend(&name, &request.ttl).await?
    };
    Ok(Json(ExtendServerResponse {
        ttl: until.to_rfc3339(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetypeServerRequest {
    #[serde(default)]
    pub server_type: String,
}

async fn retype_server(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(name): Path<String>,
    payload: Result<Json<RetypeServerRequest>, JsonRejection>,
) -> ApiResult<Json<Image>> {
    caller.authorize(Operation::Retype)?;
    let Json(request) = payload?;
    Ok(Json(state.control.retype(&name, &request.server_type).await?))
}

async fn reboot_server(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    caller.authorize(Operation::Reboot)?;
    state.control.reboot(&name).await?;
    Ok(Json(json!({ "server": name, "rebooted": true })))
}

async fn stop_server(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(name): Path<String>,
) -> ApiResult<Json<Termination>> {
    caller.authorize(Operation::Stop)?;
    tracing::info!("{} stops server {}", caller.subject, name);
    Ok(Json(state.control.terminate(&name).await?))
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    /// `None` when the message was not a command
    pub reply: Option<String>,
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Json<ChatResponse>> {
    let Json(request) = payload?;
    let reply = handle_message(&state.control, &caller, &request.text).await;
    Ok(Json(ChatResponse { reply }))
}
