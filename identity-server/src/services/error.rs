use service_core::error::{AppError, ErrorDetail};
use thiserror::Error;

use crate::models::{EntityId, IdError, Rights, UnknownRight};
use crate::utils::CredentialError;

use super::store::{StoreError, API_KEY_NAME_CONSTRAINT, ENTITY_CONSTRAINT};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Malformed credential: {0}")]
    MalformedCredential(#[from] CredentialError),

    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("Access token expired")]
    TokenExpired,

    #[error("API key expired")]
    CredentialExpired,

    #[error("Missing rights: {missing}")]
    PermissionDenied { missing: Rights },

    #[error("{message}")]
    NotFound { name: &'static str, message: String },

    #[error("{message}")]
    InvalidArgument { name: &'static str, message: String },

    #[error("Entity {0} needs at least one collaborator with all rights")]
    EntityNeedsCollaborator(EntityId),

    #[error("{message}")]
    Conflict { name: &'static str, message: String },

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn not_found(name: &'static str, message: impl Into<String>) -> Self {
        ServiceError::NotFound {
            name,
            message: message.into(),
        }
    }

    pub fn invalid_argument(name: &'static str, message: impl Into<String>) -> Self {
        ServiceError::InvalidArgument {
            name,
            message: message.into(),
        }
    }

    pub fn conflict(name: &'static str, message: impl Into<String>) -> Self {
        ServiceError::Conflict {
            name,
            message: message.into(),
        }
    }

    pub fn missing_rights(missing: Rights) -> Self {
        ServiceError::PermissionDenied { missing }
    }

    /// Stable error name reported to clients.
    pub fn name(&self) -> &'static str {
        match self {
            ServiceError::MalformedCredential(_) => "malformed_credential",
            ServiceError::Unauthenticated => "unauthenticated",
            ServiceError::TokenExpired => "token_expired",
            ServiceError::CredentialExpired => "credential_expired",
            ServiceError::PermissionDenied { .. } => "missing_rights",
            ServiceError::NotFound { name, .. } => *name,
            ServiceError::InvalidArgument { name, .. } => *name,
            ServiceError::EntityNeedsCollaborator(_) => "entity_needs_collaborator",
            ServiceError::Conflict { name, .. } => *name,
            ServiceError::Store(_) => "store",
            ServiceError::Internal(_) => "internal",
        }
    }
}

fn unique_violation_name(constraint: &str) -> &'static str {
    match constraint {
        API_KEY_NAME_CONSTRAINT => "api_key_name_taken",
        ENTITY_CONSTRAINT => "entity_exists",
        _ => "already_exists",
    }
}

/// Unique violations and serialization failures are conflicts the client can
/// act on; everything else stays a store failure.
impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(constraint) => ServiceError::conflict(
                unique_violation_name(&constraint),
                format!("Unique constraint {} violated", constraint),
            ),
            StoreError::SerializationFailure => ServiceError::conflict(
                "concurrent_modification",
                "Concurrent modification, retry the request",
            ),
            other => ServiceError::Store(other),
        }
    }
}

impl From<IdError> for ServiceError {
    fn from(err: IdError) -> Self {
        let name = match err {
            IdError::Blacklisted(_) => "blacklisted_identifier",
            IdError::UnknownKind(_) => "unknown_entity_kind",
            IdError::NotAnAccount(_) => "unsupported_collaborator",
            IdError::Empty | IdError::Invalid(_) => "invalid_identifier",
        };
        ServiceError::invalid_argument(name, err.to_string())
    }
}

impl From<UnknownRight> for ServiceError {
    fn from(err: UnknownRight) -> Self {
        ServiceError::invalid_argument("unknown_right", err.to_string())
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::invalid_argument("validation_failed", err.to_string())
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let name = err.name();
        match err {
            ServiceError::MalformedCredential(e) => {
                AppError::MalformedCredential(ErrorDetail::new(name, e.to_string()))
            }
            ServiceError::Unauthenticated
            | ServiceError::TokenExpired
            | ServiceError::CredentialExpired => {
                AppError::Unauthenticated(ErrorDetail::new(name, err.to_string()))
            }
            ServiceError::PermissionDenied { ref missing } => AppError::PermissionDenied(
                ErrorDetail::new(name, err.to_string())
                    .with_attribute("missing_rights", missing.names()),
            ),
            ServiceError::NotFound { message, .. } => {
                AppError::NotFound(ErrorDetail::new(name, message))
            }
            ServiceError::InvalidArgument { message, .. } => {
                AppError::InvalidArgument(ErrorDetail::new(name, message))
            }
            ServiceError::EntityNeedsCollaborator(ref entity) => AppError::FailedPrecondition(
                ErrorDetail::new(name, err.to_string()).with_attribute("entity", entity),
            ),
            ServiceError::Conflict { message, .. } => {
                AppError::Conflict(ErrorDetail::new(name, message))
            }
            ServiceError::Store(e) => AppError::DatabaseError(anyhow::anyhow!(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
