//! North-bound chat-completion surface and administrative CRUD (§6).
//!
//! Handlers are thin: they parse the HTTP-shaped request, call into
//! `gateway-core`, and map the result back to JSON or SSE. Business logic
//! — selection, retry, translation — lives entirely in the core crate.

use crate::gateway_error::ApiError;
use crate::server::AppState;
use axum::body::Body;
use axum::extract::{Json, Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use futures::StreamExt;
use gateway_core::domain::{NodeStrategy, Provider, ProviderStatus, Route, RouteMode, RouteNode};
use gateway_core::pipeline::to_sse;
use gateway_core::store::{ProviderAttrs, RouteAttrs, RouteNodeAttrs};
use gateway_core::{ChatRequest, GatewayError, RouteSelector};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

/// Attempts budget for the chat pipeline's retry envelope (§4.F): one try
/// per configured route node plus slack for re-selection misses.
const MAX_RETRIES: u32 = 5;

// ---------------------------------------------------------------------
// Liveness
// ---------------------------------------------------------------------

pub async fn ping() -> &'static str {
    "pong"
}

// ---------------------------------------------------------------------
// Chat completions (§4.F, §6)
// ---------------------------------------------------------------------

/// `POST /v1/chat/completions`. `model` names a route directly — the
/// pipeline resolves it with no separate model hint (§9 open-question
/// resolution: named-route semantics).
pub async fn chat_completions(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<axum::response::Response, ApiError> {
    let timeout = state.settings.request_timeout();
    if request.is_streaming() {
        let chunks = state
            .pipeline
            .stream(request, RouteSelector { route_name: None }, timeout, MAX_RETRIES)
            .await
            .map_err(ApiError::from)?;

        let body = to_sse(chunks).map(|frame| match frame {
            Ok(text) => Ok::<_, Infallible>(text),
            Err(e) => Ok(format!("data: {{\"error\": \"{e}\"}}\n\n")),
        });

        return Ok((
            [(header::CONTENT_TYPE, "text/event-stream")],
            Body::from_stream(body),
        )
            .into_response());
    }

    let response = state
        .pipeline
        .complete(request, RouteSelector { route_name: None }, timeout, MAX_RETRIES)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(response).into_response())
}

#[derive(Debug, Serialize)]
struct ModelEntry {
    id: String,
    object: &'static str,
    created: i64,
    owned_by: String,
}

#[derive(Debug, Serialize)]
struct ModelList {
    object: &'static str,
    data: Vec<ModelEntry>,
}

/// `GET /v1/models`: every model of every active+healthy provider (§6).
pub async fn list_models(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let providers = state.store.list_providers().await.map_err(ApiError::from)?;
    let created = chrono::Utc::now().timestamp();
    let data = providers
        .iter()
        .filter(|p| p.is_active && p.is_healthy)
        .flat_map(|p| {
            p.models.iter().map(move |m| ModelEntry {
                id: m.clone(),
                object: "model",
                created,
                owned_by: p.name.clone(),
            })
        })
        .collect();
    Ok(Json(ModelList {
        object: "list",
        data,
    }))
}

// ---------------------------------------------------------------------
// Provider admin CRUD (§6)
// ---------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ProviderOut {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub models: Vec<String>,
    pub is_active: bool,
    pub status: ProviderStatus,
    pub latency_ms: Option<i64>,
    pub last_tested_at: Option<chrono::DateTime<chrono::Utc>>,
    pub consecutive_failures: i64,
    pub is_healthy: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<Provider> for ProviderOut {
    fn from(p: Provider) -> Self {
        Self {
            id: p.id,
            name: p.name,
            base_url: p.base_url,
            models: p.models,
            is_active: p.is_active,
            status: p.status,
            latency_ms: p.latency_ms,
            last_tested_at: p.last_tested_at,
            consecutive_failures: p.consecutive_failures,
            is_healthy: p.is_healthy,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateProviderRequest {
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    pub models: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

pub async fn list_providers(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let providers = state.store.list_providers().await.map_err(ApiError::from)?;
    Ok(Json(
        providers.into_iter().map(ProviderOut::from).collect::<Vec<_>>(),
    ))
}

pub async fn create_provider(
    State(state): State<AppState>,
    Json(body): Json<CreateProviderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.models.is_empty() {
        return Err(ApiError(GatewayError::ValidationError {
            field: "models".to_string(),
            message: "must be non-empty on create".to_string(),
        }));
    }
    let api_key_opaque =
        gateway_core::crypto::encrypt(&state.settings.api_key_secret, &body.api_key)
            .map_err(ApiError::from)?;

    let provider = state
        .store
        .create_provider(ProviderAttrs {
            name: body.name,
            base_url: body.base_url,
            api_key_opaque,
            models: body.models,
            is_active: body.is_active,
        })
        .await
        .map_err(ApiError::from)?;

    state.write_backup().await;
    Ok((StatusCode::CREATED, Json(ProviderOut::from(provider))))
}

pub async fn get_provider(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let provider = state.store.get_provider(&id).await.map_err(ApiError::from)?;
    Ok(Json(ProviderOut::from(provider)))
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateProviderRequest {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub models: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

pub async fn update_provider(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateProviderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let existing = state.store.get_provider(&id).await.map_err(ApiError::from)?;
    let api_key_opaque = match body.api_key {
        Some(plaintext) => gateway_core::crypto::encrypt(&state.settings.api_key_secret, &plaintext)
            .map_err(ApiError::from)?,
        None => existing.api_key_opaque,
    };
    let provider = state
        .store
        .update_provider(
            &id,
            ProviderAttrs {
                name: body.name.unwrap_or(existing.name),
                base_url: body.base_url.unwrap_or(existing.base_url),
                api_key_opaque,
                models: body.models.unwrap_or(existing.models),
                is_active: body.is_active.unwrap_or(existing.is_active),
            },
        )
        .await
        .map_err(ApiError::from)?;

    state.write_backup().await;
    Ok(Json(ProviderOut::from(provider)))
}

pub async fn delete_provider(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.delete_provider(&id).await.map_err(ApiError::from)?;
    state.write_backup().await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct ProbeResult {
    pub status: ProviderStatus,
    pub latency_ms: Option<i64>,
    pub is_healthy: bool,
}

/// `POST /api/providers/{id}/test`: synchronous connectivity probe, same
/// algorithm as the background health checker (§4.G), persisted to the
/// provider row.
pub async fn test_provider(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let provider = state.store.get_provider(&id).await.map_err(ApiError::from)?;
    let api_key = gateway_core::crypto::decrypt(&state.settings.api_key_secret, &provider.api_key_opaque)
        .map_err(ApiError::from)?;

    let outcome = gateway_core::health::probe(
        &state.http,
        provider.normalised_base_url(),
        &api_key,
        state.settings.health_check_timeout(),
    )
    .await;

    let consecutive_failures = if outcome.failed {
        provider.consecutive_failures + 1
    } else {
        0
    };
    let is_healthy =
        !outcome.failed || consecutive_failures < state.settings.health_check_failure_threshold as i64;

    state
        .store
        .set_provider_health(&id, outcome.status, outcome.latency_ms, consecutive_failures, is_healthy)
        .await
        .map_err(ApiError::from)?;
    state.write_backup().await;

    Ok(Json(ProbeResult {
        status: outcome.status,
        latency_ms: outcome.latency_ms,
        is_healthy,
    }))
}

#[derive(Debug, Deserialize)]
pub struct TestDirectRequest {
    pub base_url: String,
    pub api_key: String,
}

/// `POST /api/providers/test-direct`: probes an unsaved configuration, no
/// store interaction at all.
pub async fn test_provider_direct(
    State(state): State<AppState>,
    Json(body): Json<TestDirectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = gateway_core::health::probe(
        &state.http,
        body.base_url.trim_end_matches('/'),
        &body.api_key,
        state.settings.health_check_timeout(),
    )
    .await;
    Ok(Json(ProbeResult {
        status: outcome.status,
        latency_ms: outcome.latency_ms,
        is_healthy: !outcome.failed,
    }))
}

#[derive(Debug, Deserialize)]
pub struct HealthOverrideRequest {
    pub is_healthy: bool,
}

/// `PATCH /api/providers/{id}/health`: operator override, resets the
/// consecutive-failure counter per §4.G.
pub async fn override_provider_health(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<HealthOverrideRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let provider = state.store.get_provider(&id).await.map_err(ApiError::from)?;
    state
        .store
        .set_provider_health(&id, provider.status, provider.latency_ms, 0, body.is_healthy)
        .await
        .map_err(ApiError::from)?;
    state.write_backup().await;

    let updated = state.store.get_provider(&id).await.map_err(ApiError::from)?;
    Ok(Json(ProviderOut::from(updated)))
}

// ---------------------------------------------------------------------
// Route admin CRUD (§6)
// ---------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct RouteNodeOut {
    pub id: String,
    pub api_id: String,
    pub models: Vec<String>,
    pub strategy: NodeStrategy,
    pub priority: i32,
    pub metadata: serde_json::Value,
}

impl From<RouteNode> for RouteNodeOut {
    fn from(n: RouteNode) -> Self {
        Self {
            id: n.id,
            api_id: n.api_id,
            models: n.models,
            strategy: n.strategy,
            priority: n.priority,
            metadata: n.metadata,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RouteOut {
    pub id: String,
    pub name: String,
    pub mode: RouteMode,
    pub is_active: bool,
    pub config: serde_json::Value,
    pub nodes: Vec<RouteNodeOut>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

fn route_out(route: Route, nodes: Vec<RouteNode>) -> RouteOut {
    RouteOut {
        id: route.id,
        name: route.name,
        mode: route.mode,
        is_active: route.is_active,
        config: route.config,
        nodes: nodes.into_iter().map(RouteNodeOut::from).collect(),
        created_at: route.created_at,
        updated_at: route.updated_at,
    }
}

#[derive(Debug, Deserialize)]
pub struct RouteNodeIn {
    pub api_id: String,
    #[serde(default)]
    pub models: Vec<String>,
    pub strategy: NodeStrategy,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_metadata")]
    pub metadata: serde_json::Value,
}

fn default_metadata() -> serde_json::Value {
    serde_json::json!({})
}

#[derive(Debug, Deserialize)]
pub struct CreateRouteRequest {
    pub name: String,
    pub mode: RouteMode,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_metadata")]
    pub config: serde_json::Value,
    #[serde(default)]
    pub nodes: Vec<RouteNodeIn>,
}

/// Validates node references and `selectedModels` against the providers
/// that actually exist (§4.E "Validation on create/update").
async fn validate_nodes(
    state: &AppState,
    nodes: &[RouteNodeIn],
    config: &serde_json::Value,
) -> Result<(), GatewayError> {
    for node in nodes {
        let provider = state.store.get_provider(&node.api_id).await?;
        if !node.models.is_empty() && !node.models.iter().all(|m| provider.models.contains(m)) {
            return Err(GatewayError::RouteValidationError {
                message: format!(
                    "node models for provider '{}' must be a subset of its configured models",
                    provider.name
                ),
            });
        }
    }

    if let Some(selected) = config.get("selectedModels").and_then(|v| v.as_array()) {
        let mut union: Vec<String> = Vec::new();
        for node in nodes {
            let provider = state.store.get_provider(&node.api_id).await?;
            union.extend(provider.models);
        }
        let selected: Vec<&str> = selected.iter().filter_map(|v| v.as_str()).collect();
        if !selected.is_empty() && !selected.iter().all(|m| union.iter().any(|u| u == m)) {
            return Err(GatewayError::RouteValidationError {
                message: "config.selectedModels must be a subset of the candidate providers' models"
                    .to_string(),
            });
        }
    }
    Ok(())
}

pub async fn list_routes(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let routes = state.store.list_routes().await.map_err(ApiError::from)?;
    let mut out = Vec::with_capacity(routes.len());
    for route in routes {
        let rwn = state
            .store
            .get_route_with_nodes(&route.id)
            .await
            .map_err(ApiError::from)?;
        out.push(route_out(
            rwn.route,
            rwn.nodes.into_iter().map(|(n, _)| n).collect(),
        ));
    }
    Ok(Json(out))
}

pub async fn create_route(
    State(state): State<AppState>,
    Json(body): Json<CreateRouteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_nodes(&state, &body.nodes, &body.config)
        .await
        .map_err(ApiError::from)?;

    let route = state
        .store
        .create_route(RouteAttrs {
            name: body.name,
            mode: body.mode,
            is_active: body.is_active,
            config: body.config,
        })
        .await
        .map_err(ApiError::from)?;

    for node in body.nodes {
        state
            .store
            .add_route_node(
                &route.id,
                RouteNodeAttrs {
                    api_id: node.api_id,
                    models: node.models,
                    strategy: node.strategy,
                    priority: node.priority,
                    metadata: node.metadata,
                },
            )
            .await
            .map_err(ApiError::from)?;
    }

    state.write_backup().await;
    let rwn = state
        .store
        .get_route_with_nodes(&route.id)
        .await
        .map_err(ApiError::from)?;
    Ok((
        StatusCode::CREATED,
        Json(route_out(rwn.route, rwn.nodes.into_iter().map(|(n, _)| n).collect())),
    ))
}

pub async fn get_route(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let rwn = state
        .store
        .get_route_with_nodes(&id)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(route_out(
        rwn.route,
        rwn.nodes.into_iter().map(|(n, _)| n).collect(),
    )))
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateRouteRequest {
    pub name: Option<String>,
    pub mode: Option<RouteMode>,
    pub is_active: Option<bool>,
    pub config: Option<serde_json::Value>,
    pub nodes: Option<Vec<RouteNodeIn>>,
}

pub async fn update_route(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateRouteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let existing = state.store.get_route(&id).await.map_err(ApiError::from)?;
    let config = body.config.unwrap_or(existing.config);

    if let Some(nodes) = &body.nodes {
        validate_nodes(&state, nodes, &config).await.map_err(ApiError::from)?;
    }

    let route = state
        .store
        .update_route(
            &id,
            RouteAttrs {
                name: body.name.unwrap_or(existing.name),
                mode: body.mode.unwrap_or(existing.mode),
                is_active: body.is_active.unwrap_or(existing.is_active),
                config,
            },
        )
        .await
        .map_err(ApiError::from)?;

    if let Some(nodes) = body.nodes {
        let attrs = nodes
            .into_iter()
            .map(|n| RouteNodeAttrs {
                api_id: n.api_id,
                models: n.models,
                strategy: n.strategy,
                priority: n.priority,
                metadata: n.metadata,
            })
            .collect();
        state
            .store
            .replace_route_nodes(&route.id, attrs)
            .await
            .map_err(ApiError::from)?;
    }

    state.write_backup().await;
    let rwn = state
        .store
        .get_route_with_nodes(&route.id)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(route_out(rwn.route, rwn.nodes.into_iter().map(|(n, _)| n).collect())))
}

pub async fn delete_route(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.delete_route(&id).await.map_err(ApiError::from)?;
    state.routing.clear_route(&id);
    state.write_backup().await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Default)]
pub struct SelectRequest {
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SelectResponse {
    pub provider_id: String,
    pub provider_name: String,
    pub model: String,
}

/// `POST /api/model-routes/{id}/select`: asks the routing engine to pick
/// now, advancing scheduling state exactly as a real chat request would.
pub async fn select_route(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<SelectRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let rwn = state
        .store
        .get_route_with_nodes(&id)
        .await
        .map_err(ApiError::from)?;
    let all_providers = state.store.list_providers().await.map_err(ApiError::from)?;
    let model_hint = body.and_then(|Json(b)| b.model);

    let (provider, model) = state
        .routing
        .select(&rwn, &all_providers, model_hint.as_deref())
        .map_err(ApiError::from)?;

    Ok(Json(SelectResponse {
        provider_id: provider.id,
        provider_name: provider.name,
        model,
    }))
}

/// `GET /api/model-routes/{id}/state`: the scheduling cursor map for a
/// route, for observability only.
pub async fn route_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    Json(state.routing.state_for_route(&id))
}

// ---------------------------------------------------------------------
// Backup / restore (§6)
// ---------------------------------------------------------------------

pub async fn restore_backup(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let summary =
        gateway_core::backup::restore_from_backup(&state.store, &state.backup_path())
            .await
            .map_err(ApiError::from)?;
    Ok(Json(summary))
}
