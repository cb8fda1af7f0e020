use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{CreateApiKeyRequest, Pagination, UpdateApiKeyRequest},
    middleware::Authenticated,
    models::SanitizedApiKey,
    services::UpdateOutcome,
    utils::ValidatedJson,
    AppState,
};

use super::{paged, ApiKeyPath, EntityPath};

/// Create an API key. The response is the only place the bearer appears.
///
/// POST /api/v3/{kinds}/{id}/api-keys
pub async fn create_api_key(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(path): Path<EntityPath>,
    ValidatedJson(req): ValidatedJson<CreateApiKeyRequest>,
) -> Result<(StatusCode, Json<SanitizedApiKey>), AppError> {
    let entity = path.entity()?;
    let key = state
        .identity
        .create_api_key(&principal, &entity, req)
        .await?;

    Ok((StatusCode::CREATED, Json(key)))
}

/// GET /api/v3/{kinds}/{id}/api-keys
pub async fn list_api_keys(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(path): Path<EntityPath>,
    Query(pagination): Query<Pagination>,
) -> Result<Response, AppError> {
    let entity = path.entity()?;
    let page = state
        .identity
        .list_api_keys(&principal, &entity, &pagination)
        .await?;
    Ok(paged(page))
}

/// GET /api/v3/{kinds}/{id}/api-keys/{key_id}
pub async fn get_api_key(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(path): Path<ApiKeyPath>,
) -> Result<Json<SanitizedApiKey>, AppError> {
    let entity = path.entity()?;
    let key = state
        .identity
        .get_api_key(&principal, &entity, &path.key_id)
        .await?;
    Ok(Json(key))
}

/// Update name, rights or expiry under a field mask. Answers 204 when the
/// update deleted the key.
///
/// PUT /api/v3/{kinds}/{id}/api-keys/{key_id}
pub async fn update_api_key(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(path): Path<ApiKeyPath>,
    Json(req): Json<UpdateApiKeyRequest>,
) -> Result<Response, AppError> {
    let entity = path.entity()?;
    let outcome = state
        .identity
        .update_api_key(&principal, &entity, &path.key_id, req)
        .await?;

    match outcome {
        UpdateOutcome::Updated(key) => Ok(Json(key).into_response()),
        UpdateOutcome::Deleted => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// POST /api/v3/{kinds}/{id}/api-keys/{key_id}/rotate
pub async fn rotate_api_key(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(path): Path<ApiKeyPath>,
) -> Result<Json<SanitizedApiKey>, AppError> {
    let entity = path.entity()?;
    let key = state
        .identity
        .rotate_api_key(&principal, &entity, &path.key_id)
        .await?;
    Ok(Json(key))
}

/// DELETE /api/v3/{kinds}/{id}/api-keys/{key_id}
pub async fn delete_api_key(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(path): Path<ApiKeyPath>,
) -> Result<StatusCode, AppError> {
    let entity = path.entity()?;
    state
        .identity
        .delete_api_key(&principal, &entity, &path.key_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
