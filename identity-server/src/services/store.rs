//! Transactional store abstraction.
//!
//! Every read and write goes through a [`StoreTx`]. A transaction only
//! becomes durable through [`StoreTx::commit`]; dropping it rolls back,
//! which is also what happens when a request is cancelled mid-flight.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{AccessToken, AccountId, ApiKey, Collaborator, EntityId, Rights, User, UserId};

/// Unique constraint guarding API key names per entity.
pub const API_KEY_NAME_CONSTRAINT: &str = "api_keys_entity_name_key";
/// Primary key of the entity registry.
pub const ENTITY_CONSTRAINT: &str = "entities_pkey";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint `{0}` violated")]
    UniqueViolation(String),

    #[error("could not serialize access due to a concurrent transaction")]
    SerializationFailure,

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[source] anyhow::Error),
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Opens a serializable transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait StoreTx: Send {
    async fn get_user(&mut self, user_id: &UserId) -> Result<Option<User>, StoreError>;

    async fn upsert_user(&mut self, user: &User) -> Result<(), StoreError>;

    /// Users exist through their user row, everything else through the
    /// entity registry.
    async fn entity_exists(&mut self, entity: &EntityId) -> Result<bool, StoreError>;

    /// Fails with [`ENTITY_CONSTRAINT`] when the entity already exists.
    async fn insert_entity(&mut self, entity: &EntityId) -> Result<(), StoreError>;

    async fn get_membership(
        &mut self,
        account: &AccountId,
        entity: &EntityId,
    ) -> Result<Option<Rights>, StoreError>;

    async fn upsert_membership(
        &mut self,
        account: &AccountId,
        entity: &EntityId,
        rights: &Rights,
    ) -> Result<(), StoreError>;

    async fn delete_membership(
        &mut self,
        account: &AccountId,
        entity: &EntityId,
    ) -> Result<bool, StoreError>;

    /// Direct members of `entity`, ordered by account.
    async fn list_members(&mut self, entity: &EntityId) -> Result<Vec<Collaborator>, StoreError>;

    /// Direct memberships held by `account`, ordered by entity.
    async fn list_memberships(
        &mut self,
        account: &AccountId,
    ) -> Result<Vec<(EntityId, Rights)>, StoreError>;

    async fn get_api_key(&mut self, key_id: &str) -> Result<Option<ApiKey>, StoreError>;

    /// Keys of `entity`, oldest first.
    async fn list_api_keys(&mut self, entity: &EntityId) -> Result<Vec<ApiKey>, StoreError>;

    /// Fails with [`API_KEY_NAME_CONSTRAINT`] on a duplicate name.
    async fn insert_api_key(&mut self, key: &ApiKey) -> Result<(), StoreError>;

    async fn update_api_key(&mut self, key: &ApiKey) -> Result<(), StoreError>;

    async fn delete_api_key(&mut self, key_id: &str) -> Result<bool, StoreError>;

    async fn get_access_token(
        &mut self,
        token_hash: &str,
    ) -> Result<Option<AccessToken>, StoreError>;

    async fn insert_access_token(&mut self, token: &AccessToken) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
