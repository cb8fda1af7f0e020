//! In-memory store for tests and local development.
//!
//! A transaction takes an owned lock on the whole state and works on a
//! copy, so transactions are trivially serializable. Committing swaps the
//! copy in; dropping the transaction discards it.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::{AccessToken, AccountId, ApiKey, Collaborator, EntityId, Rights, User, UserId};

use super::store::{Store, StoreError, StoreTx, API_KEY_NAME_CONSTRAINT, ENTITY_CONSTRAINT};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: HashMap<UserId, User>,
    entities: BTreeSet<EntityId>,
    memberships: BTreeMap<(AccountId, EntityId), Rights>,
    api_keys: HashMap<String, ApiKey>,
    access_tokens: HashMap<String, AccessToken>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn get_user(&mut self, user_id: &UserId) -> Result<Option<User>, StoreError> {
        Ok(self.working.users.get(user_id).cloned())
    }

    async fn upsert_user(&mut self, user: &User) -> Result<(), StoreError> {
        self.working
            .users
            .insert(user.user_id.clone(), user.clone());
        Ok(())
    }

    async fn entity_exists(&mut self, entity: &EntityId) -> Result<bool, StoreError> {
        Ok(match entity {
            EntityId::User(user_id) => self.working.users.contains_key(user_id),
            other => self.working.entities.contains(other),
        })
    }

    async fn insert_entity(&mut self, entity: &EntityId) -> Result<(), StoreError> {
        if !self.working.entities.insert(entity.clone()) {
            return Err(StoreError::UniqueViolation(ENTITY_CONSTRAINT.to_string()));
        }
        Ok(())
    }

    async fn get_membership(
        &mut self,
        account: &AccountId,
        entity: &EntityId,
    ) -> Result<Option<Rights>, StoreError> {
        Ok(self
            .working
            .memberships
            .get(&(account.clone(), entity.clone()))
            .cloned())
    }

    async fn upsert_membership(
        &mut self,
        account: &AccountId,
        entity: &EntityId,
        rights: &Rights,
    ) -> Result<(), StoreError> {
        self.working
            .memberships
            .insert((account.clone(), entity.clone()), rights.clone());
        Ok(())
    }

    async fn delete_membership(
        &mut self,
        account: &AccountId,
        entity: &EntityId,
    ) -> Result<bool, StoreError> {
        Ok(self
            .working
            .memberships
            .remove(&(account.clone(), entity.clone()))
            .is_some())
    }

    async fn list_members(&mut self, entity: &EntityId) -> Result<Vec<Collaborator>, StoreError> {
        Ok(self
            .working
            .memberships
            .iter()
            .filter(|((_, e), _)| e == entity)
            .map(|((account, _), rights)| Collaborator::new(account.clone(), rights.clone()))
            .collect())
    }

    async fn list_memberships(
        &mut self,
        account: &AccountId,
    ) -> Result<Vec<(EntityId, Rights)>, StoreError> {
        let mut out: Vec<(EntityId, Rights)> = self
            .working
            .memberships
            .iter()
            .filter(|((a, _), _)| a == account)
            .map(|((_, entity), rights)| (entity.clone(), rights.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    async fn get_api_key(&mut self, key_id: &str) -> Result<Option<ApiKey>, StoreError> {
        Ok(self.working.api_keys.get(key_id).cloned())
    }

    async fn list_api_keys(&mut self, entity: &EntityId) -> Result<Vec<ApiKey>, StoreError> {
        let mut keys: Vec<ApiKey> = self
            .working
            .api_keys
            .values()
            .filter(|key| &key.entity == entity)
            .cloned()
            .collect();
        keys.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(keys)
    }

    async fn insert_api_key(&mut self, key: &ApiKey) -> Result<(), StoreError> {
        if self.working.api_keys.contains_key(&key.id) {
            return Err(StoreError::UniqueViolation("api_keys_pkey".to_string()));
        }
        self.ensure_unique_name(key)?;
        self.working.api_keys.insert(key.id.clone(), key.clone());
        Ok(())
    }

    async fn update_api_key(&mut self, key: &ApiKey) -> Result<(), StoreError> {
        self.ensure_unique_name(key)?;
        self.working.api_keys.insert(key.id.clone(), key.clone());
        Ok(())
    }

    async fn delete_api_key(&mut self, key_id: &str) -> Result<bool, StoreError> {
        Ok(self.working.api_keys.remove(key_id).is_some())
    }

    async fn get_access_token(
        &mut self,
        token_hash: &str,
    ) -> Result<Option<AccessToken>, StoreError> {
        Ok(self.working.access_tokens.get(token_hash).cloned())
    }

    async fn insert_access_token(&mut self, token: &AccessToken) -> Result<(), StoreError> {
        self.working
            .access_tokens
            .insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

impl MemoryTx {
    fn ensure_unique_name(&self, key: &ApiKey) -> Result<(), StoreError> {
        let taken = self
            .working
            .api_keys
            .values()
            .any(|other| {
                other.id != key.id && other.entity == key.entity && other.name == key.name
            });
        if taken {
            return Err(StoreError::UniqueViolation(
                API_KEY_NAME_CONSTRAINT.to_string(),
            ));
        }
        Ok(())
    }
}
