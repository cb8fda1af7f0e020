use service_core::axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use service_core::error::AppError;

use crate::{
    models::Principal,
    services::{ServiceError, CLUSTER_AUTH_HEADER},
    utils::CredentialError,
    AppState,
};

/// The caller of a request. Resolved once and cached in the request
/// extensions; anonymous callers get an anonymous principal and each
/// operation decides whether that is enough.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(principal) = parts.extensions.get::<Principal>() {
            return Ok(Authenticated(principal.clone()));
        }

        let authorization = parts
            .headers
            .get(header::AUTHORIZATION)
            .map(|value| {
                value
                    .to_str()
                    .map_err(|_| ServiceError::MalformedCredential(CredentialError::Malformed))
            })
            .transpose()?;
        let cluster_auth = parts
            .headers
            .get(CLUSTER_AUTH_HEADER)
            .map(|value| value.to_str().map_err(|_| ServiceError::Unauthenticated))
            .transpose()?;

        let principal = state.identity.authenticate(authorization, cluster_auth).await?;
        tracing::debug!(
            source = ?principal.source,
            subject = %principal.actor(),
            "Principal resolved"
        );

        parts.extensions.insert(principal.clone());
        Ok(Authenticated(principal))
    }
}
