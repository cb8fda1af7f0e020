use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::EntityId;
use super::rights::Rights;

/// A long-lived credential scoped to a single entity. Only the argon2
/// hash of its secret is ever stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiKey {
    pub id: String,
    pub entity: EntityId,
    pub name: String,
    pub secret_hash: String,
    /// Ceiling of what the key can ever present.
    pub rights: Rights,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    pub fn new(
        id: String,
        entity: EntityId,
        name: String,
        secret_hash: String,
        rights: Rights,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            entity,
            name,
            secret_hash,
            rights,
            created_at: now,
            updated_at: now,
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Response form. `key` is only ever set right after issuing a secret.
    pub fn sanitized(&self, key: Option<String>) -> SanitizedApiKey {
        SanitizedApiKey {
            id: self.id.clone(),
            entity: self.entity.clone(),
            name: self.name.clone(),
            rights: self.rights.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            expires_at: self.expires_at,
            key,
        }
    }
}

/// API key without its secret hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanitizedApiKey {
    pub id: String,
    pub entity: EntityId,
    pub name: String,
    pub rights: Rights,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}
