pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    body::Body,
    extract::State,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::from_fn,
    routing::{get, post},
    Json, Router,
};
use service_core::middleware::{
    security_headers::security_headers_middleware,
    tracing::{make_request_span, request_id_middleware, REQUEST_ID_HEADER},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::IdentityConfig;
use crate::middleware::metrics_middleware;
use crate::services::{IdentityService, CLUSTER_AUTH_HEADER};
use service_core::error::AppError;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: IdentityConfig,
    pub identity: Arc<IdentityService>,
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    let entity_routes = Router::new()
        .route("/api/v3/entities", post(handlers::register_entity))
        .route("/api/v3/:kinds/:id", get(handlers::get_entity))
        .route("/api/v3/:kinds/:id/rights", get(handlers::list_rights))
        .route(
            "/api/v3/:kinds/:id/memberships",
            get(handlers::list_memberships),
        );

    let api_key_routes = Router::new()
        .route(
            "/api/v3/:kinds/:id/api-keys",
            get(handlers::list_api_keys).post(handlers::create_api_key),
        )
        .route(
            "/api/v3/:kinds/:id/api-keys/:key_id",
            get(handlers::get_api_key)
                .put(handlers::update_api_key)
                .delete(handlers::delete_api_key),
        )
        .route(
            "/api/v3/:kinds/:id/api-keys/:key_id/rotate",
            post(handlers::rotate_api_key),
        );

    let collaborator_routes = Router::new()
        .route(
            "/api/v3/:kinds/:id/collaborators",
            get(handlers::list_collaborators).put(handlers::set_collaborator),
        )
        .route(
            "/api/v3/:kinds/:id/collaborators/:account_kinds/:account_id",
            get(handlers::get_collaborator).delete(handlers::delete_collaborator),
        );

    let origins = state
        .config
        .security
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(origin) => Some(origin),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e);
                None
            }
        })
        .collect::<Vec<HeaderValue>>();

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics))
        .merge(entity_routes)
        .merge(api_key_routes)
        .merge(collaborator_routes)
        .with_state(state)
        // Add metrics middleware
        .layer(from_fn(metrics_middleware))
        // Add tracing layer
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<Body>))
        // Add tracing middleware for request_id
        .layer(from_fn(request_id_middleware))
        // Add security headers middleware
        .layer(from_fn(security_headers_middleware))
        // Add CORS layer
        .layer(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    header::AUTHORIZATION,
                    header::CONTENT_TYPE,
                    HeaderName::from_static(CLUSTER_AUTH_HEADER),
                    HeaderName::from_static(REQUEST_ID_HEADER),
                ])
                .expose_headers([HeaderName::from_static(dtos::TOTAL_COUNT_HEADER)]),
        );

    Ok(app)
}

/// Service health check
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.identity.store().health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "store": "up"
        }
    })))
}
