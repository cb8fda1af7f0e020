use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{MembershipsQuery, Pagination, RegisterEntityRequest, RightsResponse},
    middleware::Authenticated,
    services::ServiceError,
    AppState,
};

use super::{paged, EntityPath};

/// POST /api/v3/entities
pub async fn register_entity(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Json(req): Json<RegisterEntityRequest>,
) -> Result<(StatusCode, Json<RightsResponse>), AppError> {
    state
        .identity
        .register_entity(&principal, &req.entity, &req.owner)
        .await?;

    let rights = state.identity.list_rights(&principal, &req.entity).await?;
    Ok((
        StatusCode::CREATED,
        Json(RightsResponse {
            entity: req.entity,
            rights,
        }),
    ))
}

/// GET /api/v3/{kinds}/{id}
pub async fn get_entity(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(path): Path<EntityPath>,
) -> Result<Json<RightsResponse>, AppError> {
    let entity = path.entity()?;
    let rights = state.identity.get_entity(&principal, &entity).await?;
    Ok(Json(RightsResponse { entity, rights }))
}

/// GET /api/v3/{kinds}/{id}/rights
pub async fn list_rights(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(path): Path<EntityPath>,
) -> Result<Json<RightsResponse>, AppError> {
    let entity = path.entity()?;
    let rights = state.identity.list_rights(&principal, &entity).await?;
    Ok(Json(RightsResponse { entity, rights }))
}

/// GET /api/v3/{kinds}/{id}/memberships
pub async fn list_memberships(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(path): Path<EntityPath>,
    Query(query): Query<MembershipsQuery>,
    Query(pagination): Query<Pagination>,
) -> Result<Response, AppError> {
    let account = path.entity()?.as_account().ok_or_else(|| {
        ServiceError::invalid_argument(
            "unsupported_account",
            "Only users and organizations have memberships",
        )
    })?;

    let page = state
        .identity
        .list_memberships(
            &principal,
            &account,
            query.kind,
            query.include_indirect,
            &pagination,
        )
        .await?;
    Ok(paged(page))
}
