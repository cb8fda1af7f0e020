//! HTTP handlers for the identity server.
//!
//! Every entity route lives under `/api/v3/{kinds}/{id}`; the helpers here
//! turn those path segments into typed identifiers.

pub mod api_keys;
pub mod collaborators;
pub mod entities;
pub mod metrics;

pub use api_keys::*;
pub use collaborators::*;
pub use entities::*;
pub use metrics::*;

use axum::{
    http::{HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    dtos::{Page, TOTAL_COUNT_HEADER},
    models::{AccountId, EntityId, EntityKind},
    services::ServiceError,
};

#[derive(Debug, Deserialize)]
pub struct EntityPath {
    pub kinds: String,
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiKeyPath {
    pub kinds: String,
    pub id: String,
    pub key_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CollaboratorPath {
    pub kinds: String,
    pub id: String,
    pub account_kinds: String,
    pub account_id: String,
}

impl EntityPath {
    pub fn entity(&self) -> Result<EntityId, ServiceError> {
        entity_from_path(&self.kinds, &self.id)
    }
}

impl ApiKeyPath {
    pub fn entity(&self) -> Result<EntityId, ServiceError> {
        entity_from_path(&self.kinds, &self.id)
    }
}

impl CollaboratorPath {
    pub fn entity(&self) -> Result<EntityId, ServiceError> {
        entity_from_path(&self.kinds, &self.id)
    }

    pub fn account(&self) -> Result<AccountId, ServiceError> {
        let kind = EntityKind::from_plural(&self.account_kinds)?;
        Ok(AccountId::parse(kind, &self.account_id)?)
    }
}

/// End devices are addressed through their application, never directly.
fn entity_from_path(kinds: &str, id: &str) -> Result<EntityId, ServiceError> {
    let kind = EntityKind::from_plural(kinds)?;
    if kind == EntityKind::EndDevice {
        return Err(ServiceError::invalid_argument(
            "unsupported_entity_kind",
            "End devices are not addressable here",
        ));
    }
    Ok(EntityId::parse(kind, id)?)
}

/// A listing page with its unpaginated total in `x-total-count`.
pub(crate) fn paged<T: Serialize>(page: Page<T>) -> Response {
    (
        StatusCode::OK,
        [(
            HeaderName::from_static(TOTAL_COUNT_HEADER),
            page.total.to_string(),
        )],
        Json(page.items),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_from_path() {
        let entity = entity_from_path("applications", "app-a").unwrap();
        assert_eq!(entity.kind(), EntityKind::Application);
        assert_eq!(entity.id_string(), "app-a");

        let err = entity_from_path("end_devices", "app-a/dev-1").unwrap_err();
        assert_eq!(err.name(), "unsupported_entity_kind");

        let err = entity_from_path("widgets", "w").unwrap_err();
        assert_eq!(err.name(), "unknown_entity_kind");
    }

    #[test]
    fn test_collaborator_account() {
        let path = CollaboratorPath {
            kinds: "applications".to_string(),
            id: "app-a".to_string(),
            account_kinds: "gateways".to_string(),
            account_id: "gtw-1".to_string(),
        };
        assert!(path.entity().is_ok());
        assert_eq!(path.account().unwrap_err().name(), "unsupported_collaborator");
    }
}
