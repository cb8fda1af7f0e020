use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{Pagination, SetCollaboratorRequest},
    middleware::Authenticated,
    models::Collaborator,
    AppState,
};

use super::{paged, CollaboratorPath, EntityPath};

/// GET /api/v3/{kinds}/{id}/collaborators
pub async fn list_collaborators(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(path): Path<EntityPath>,
    Query(pagination): Query<Pagination>,
) -> Result<Response, AppError> {
    let entity = path.entity()?;
    let page = state
        .identity
        .list_collaborators(&principal, &entity, &pagination)
        .await?;
    Ok(paged(page))
}

/// Set, change or (with empty rights) remove a collaborator.
///
/// PUT /api/v3/{kinds}/{id}/collaborators
pub async fn set_collaborator(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(path): Path<EntityPath>,
    Json(req): Json<SetCollaboratorRequest>,
) -> Result<StatusCode, AppError> {
    let entity = path.entity()?;
    state
        .identity
        .set_collaborator(&principal, &entity, req)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v3/{kinds}/{id}/collaborators/{account_kinds}/{account_id}
pub async fn get_collaborator(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(path): Path<CollaboratorPath>,
) -> Result<Json<Collaborator>, AppError> {
    let entity = path.entity()?;
    let account = path.account()?;
    let collaborator = state
        .identity
        .get_collaborator(&principal, &entity, &account)
        .await?;
    Ok(Json(collaborator))
}

/// DELETE /api/v3/{kinds}/{id}/collaborators/{account_kinds}/{account_id}
pub async fn delete_collaborator(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(path): Path<CollaboratorPath>,
) -> Result<StatusCode, AppError> {
    let entity = path.entity()?;
    let account = path.account()?;
    state
        .identity
        .delete_collaborator(&principal, &entity, &account)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
