//! HTTP server assembly: shared application state, route table, and
//! middleware stack (§6).

use crate::config::Settings;
use crate::handlers;
use axum::routing::{get, patch, post};
use axum::Router;
use gateway_core::health::{HealthCheckConfig, HealthChecker};
use gateway_core::{ChatPipeline, RoutingEngine, Store};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Shared application state, cloned (cheaply, via `Arc`) into every handler.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<Store>,
    pub routing: Arc<RoutingEngine>,
    pub pipeline: Arc<ChatPipeline>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn backup_path(&self) -> std::path::PathBuf {
        std::path::PathBuf::from(&self.settings.backup_file)
    }

    /// Best-effort snapshot after any mutation to providers/routes (§4.C).
    /// A failed write is logged, never surfaced to the caller — the mutation
    /// itself already committed to the database.
    pub async fn write_backup(&self) {
        if let Err(e) = gateway_core::backup::write_backup(&self.store, &self.backup_path()).await {
            tracing::warn!("failed to write backup snapshot: {e}");
        }
    }
}

/// Builds the store, routing engine, and chat pipeline, wires the HTTP
/// route table, and — if configured — starts the background health
/// checker. Returns the router and the checker so `main` can stop it on
/// shutdown.
pub async fn create_server(settings: Settings) -> anyhow::Result<(Router, Arc<HealthChecker>)> {
    let store = Arc::new(Store::connect(&settings.database_url).await?);
    let routing = Arc::new(RoutingEngine::new());
    let http = reqwest::Client::builder()
        .timeout(settings.request_timeout())
        .build()?;
    let pipeline = Arc::new(ChatPipeline::new(
        store.clone(),
        routing.clone(),
        http.clone(),
        settings.api_key_secret.clone(),
    ));

    let settings = Arc::new(settings);
    let state = AppState {
        settings: settings.clone(),
        store: store.clone(),
        routing,
        pipeline,
        http: http.clone(),
    };

    let health_checker = Arc::new(HealthChecker::new());
    if settings.health_check_enabled {
        health_checker.start(
            store,
            http,
            settings.api_key_secret.clone(),
            HealthCheckConfig {
                interval: settings.health_check_interval(),
                timeout: settings.health_check_timeout(),
                failure_threshold: settings.health_check_failure_threshold as i64,
                backup_path: state.backup_path(),
            },
        );
    }

    let app = Router::new()
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/models", get(handlers::list_models))
        .route("/ping", get(handlers::ping))
        .route(
            "/api/providers",
            get(handlers::list_providers).post(handlers::create_provider),
        )
        .route(
            "/api/providers/{id}",
            get(handlers::get_provider)
                .patch(handlers::update_provider)
                .delete(handlers::delete_provider),
        )
        .route("/api/providers/{id}/test", post(handlers::test_provider))
        .route(
            "/api/providers/test-direct",
            post(handlers::test_provider_direct),
        )
        .route(
            "/api/providers/{id}/health",
            patch(handlers::override_provider_health),
        )
        .route(
            "/api/model-routes",
            get(handlers::list_routes).post(handlers::create_route),
        )
        .route(
            "/api/model-routes/{id}",
            get(handlers::get_route)
                .patch(handlers::update_route)
                .delete(handlers::delete_route),
        )
        .route(
            "/api/model-routes/{id}/select",
            post(handlers::select_route),
        )
        .route(
            "/api/model-routes/{id}/state",
            get(handlers::route_state),
        )
        .route(
            "/api/admin/providers/restore",
            post(handlers::restore_backup),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(TimeoutLayer::new(Duration::from_secs(120))),
        )
        .with_state(state);

    Ok((app, health_checker))
}
