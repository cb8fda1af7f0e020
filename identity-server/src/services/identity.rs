//! Request shell: authorization, store transactions and event dispatch for
//! every rights, API key, collaborator and registration operation.
//!
//! Mutations follow one pipeline: open a transaction, evaluate policy on
//! state read inside it, apply the change, re-check the last-owner rule on
//! the post-image, commit, and only then dispatch events.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::dtos::{
    CreateApiKeyRequest, FieldMask, Page, Pagination, SetCollaboratorRequest, UpdateApiKeyRequest,
};
use crate::models::{
    validate_new_identifier, AccountId, ApiKey, Collaborator, EntityId, EntityKind, Event,
    EventType, NotificationRequest, NotificationType, Principal, Receiver, Right, Rights,
    SanitizedApiKey,
};
use crate::utils::{generate_key_id, generate_secret, hash_secret, ApiKeyToken, Secret};

use super::dispatcher::Dispatcher;
use super::error::ServiceError;
use super::evaluator;
use super::membership;
use super::policy::{PolicyService, RightsChange};
use super::resolver::PrincipalResolver;
use super::store::{Store, StoreTx};

/// Result of an API key update. Legacy clients delete keys by clearing
/// their rights.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    Updated(SanitizedApiKey),
    Deleted,
}

pub struct IdentityService {
    store: Arc<dyn Store>,
    resolver: PrincipalResolver,
    dispatcher: Dispatcher,
    legacy_delete_via_update: bool,
}

impl IdentityService {
    pub fn new(
        store: Arc<dyn Store>,
        resolver: PrincipalResolver,
        dispatcher: Dispatcher,
        legacy_delete_via_update: bool,
    ) -> Self {
        Self {
            store,
            resolver,
            dispatcher,
            legacy_delete_via_update,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub async fn authenticate(
        &self,
        authorization: Option<&str>,
        cluster_auth: Option<&str>,
    ) -> Result<Principal, ServiceError> {
        let mut tx = self.store.begin().await?;
        self.resolver
            .resolve(&mut *tx, authorization, cluster_auth, Utc::now())
            .await
    }

    pub async fn list_rights(
        &self,
        principal: &Principal,
        entity: &EntityId,
    ) -> Result<Rights, ServiceError> {
        require_authenticated(principal)?;
        let mut tx = self.store.begin().await?;
        ensure_exists(&mut *tx, entity).await?;
        evaluator::list_rights(&mut *tx, principal, entity).await
    }

    /// Rights on `entity`, provided the caller may see the entity at all.
    pub async fn get_entity(
        &self,
        principal: &Principal,
        entity: &EntityId,
    ) -> Result<Rights, ServiceError> {
        require_authenticated(principal)?;
        let mut tx = self.store.begin().await?;
        ensure_exists(&mut *tx, entity).await?;
        let info = Rights::from([PolicyService::info_right(entity.kind())]);
        evaluator::require(&mut *tx, principal, entity, &info).await
    }

    pub async fn register_entity(
        &self,
        principal: &Principal,
        entity: &EntityId,
        owner: &AccountId,
    ) -> Result<(), ServiceError> {
        require_authenticated(principal)?;
        let kind = entity.kind();
        if matches!(kind, EntityKind::User | EntityKind::EndDevice) {
            return Err(ServiceError::invalid_argument(
                "unsupported_entity_kind",
                format!("{} cannot be registered here", kind),
            ));
        }
        validate_new_identifier(&entity.id_string())?;
        PolicyService::check_collaborator_shape(owner, entity)?;
        let create_right = PolicyService::create_right(owner, kind).ok_or_else(|| {
            ServiceError::invalid_argument(
                "unsupported_owner",
                format!("{} cannot own {}", owner, kind.plural()),
            )
        })?;

        let mut tx = self.store.begin().await?;
        let owner_entity = EntityId::from(owner);
        ensure_exists(&mut *tx, &owner_entity).await?;
        evaluator::require(&mut *tx, principal, &owner_entity, &Rights::from([create_right]))
            .await?;

        tx.insert_entity(entity).await?;
        membership::set_member(&mut *tx, owner, entity, &Rights::from([Right::all_for(kind)]))
            .await?;
        tx.commit().await?;

        tracing::info!(entity = %entity, owner = %owner, "Entity registered");
        self.dispatcher.publish(Event::new(
            entity.clone(),
            EventType::Create,
            principal.actor(),
            json!({ "owner": owner }),
        ));
        Ok(())
    }

    /// Entities of `kind` that `account` is a member of.
    pub async fn list_memberships(
        &self,
        principal: &Principal,
        account: &AccountId,
        kind: EntityKind,
        include_indirect: bool,
        pagination: &Pagination,
    ) -> Result<Page<EntityId>, ServiceError> {
        require_authenticated(principal)?;
        pagination.validate()?;
        let list_right = PolicyService::list_right(account, kind).ok_or_else(|| {
            ServiceError::invalid_argument(
                "unsupported_entity_kind",
                format!("{} cannot be a member of {}", account, kind.plural()),
            )
        })?;

        let mut tx = self.store.begin().await?;
        let account_entity = EntityId::from(account);
        ensure_exists(&mut *tx, &account_entity).await?;
        evaluator::require(&mut *tx, principal, &account_entity, &Rights::from([list_right]))
            .await?;
        let entities =
            membership::find_memberships(&mut *tx, account, kind, include_indirect).await?;
        Ok(pagination.apply(entities))
    }

    pub async fn create_api_key(
        &self,
        principal: &Principal,
        entity: &EntityId,
        req: CreateApiKeyRequest,
    ) -> Result<SanitizedApiKey, ServiceError> {
        require_authenticated(principal)?;
        req.validate()?;
        let base = PolicyService::api_keys_right(entity.kind())?;
        PolicyService::check_rights_kind(entity.kind(), &req.rights)?;
        if req.rights.is_empty() {
            return Err(ServiceError::invalid_argument(
                "no_rights",
                "An API key needs at least one right",
            ));
        }
        check_not_expired(req.expires_at)?;

        let mut tx = self.store.begin().await?;
        ensure_exists(&mut *tx, entity).await?;
        let caller =
            evaluator::require(&mut *tx, principal, entity, &Rights::from([base])).await?;
        PolicyService::check_issue(&caller, &req.rights)?;

        let secret = generate_secret();
        let key = ApiKey::new(
            generate_key_id(),
            entity.clone(),
            req.name,
            hash_secret(&secret)?.into_string(),
            req.rights,
            req.expires_at,
        );
        tx.insert_api_key(&key).await?;
        tx.commit().await?;

        tracing::info!(entity = %entity, key_id = %key.id, "API key created");
        self.emit_api_key(
            principal,
            &key,
            EventType::ApiKeyCreate,
            NotificationType::ApiKeyCreated,
        );
        Ok(key.sanitized(Some(bearer(&key, secret))))
    }

    pub async fn list_api_keys(
        &self,
        principal: &Principal,
        entity: &EntityId,
        pagination: &Pagination,
    ) -> Result<Page<SanitizedApiKey>, ServiceError> {
        require_authenticated(principal)?;
        pagination.validate()?;
        let base = PolicyService::api_keys_right(entity.kind())?;

        let mut tx = self.store.begin().await?;
        ensure_exists(&mut *tx, entity).await?;
        evaluator::require(&mut *tx, principal, entity, &Rights::from([base])).await?;
        let keys = tx.list_api_keys(entity).await?;
        Ok(pagination.apply(keys.iter().map(|key| key.sanitized(None)).collect()))
    }

    pub async fn get_api_key(
        &self,
        principal: &Principal,
        entity: &EntityId,
        key_id: &str,
    ) -> Result<SanitizedApiKey, ServiceError> {
        require_authenticated(principal)?;
        let base = PolicyService::api_keys_right(entity.kind())?;

        let mut tx = self.store.begin().await?;
        ensure_exists(&mut *tx, entity).await?;
        evaluator::require(&mut *tx, principal, entity, &Rights::from([base])).await?;
        let key = load_api_key(&mut *tx, entity, key_id).await?;
        Ok(key.sanitized(None))
    }

    pub async fn update_api_key(
        &self,
        principal: &Principal,
        entity: &EntityId,
        key_id: &str,
        req: UpdateApiKeyRequest,
    ) -> Result<UpdateOutcome, ServiceError> {
        require_authenticated(principal)?;
        req.api_key.validate()?;
        let base = PolicyService::api_keys_right(entity.kind())?;
        let mask = &req.field_mask;
        if let Some(path) = mask.unknown_path() {
            return Err(ServiceError::invalid_argument(
                "invalid_field_mask",
                format!("Unknown field mask path `{}`", path),
            ));
        }
        let legacy = mask.paths.is_empty();

        let mut tx = self.store.begin().await?;
        ensure_exists(&mut *tx, entity).await?;
        let key = load_api_key(&mut *tx, entity, key_id).await?;

        let mut updated = key.clone();
        if legacy || mask.contains(FieldMask::NAME) {
            match (&req.api_key.name, legacy) {
                (Some(name), _) => updated.name = name.clone(),
                (None, true) => {}
                (None, false) => {
                    return Err(ServiceError::invalid_argument(
                        "validation_failed",
                        "Name is in the field mask but missing",
                    ))
                }
            }
        }
        if legacy || mask.contains(FieldMask::RIGHTS) {
            updated.rights = req.api_key.rights.clone();
        }
        if mask.contains(FieldMask::EXPIRES_AT) {
            check_not_expired(req.api_key.expires_at)?;
            updated.expires_at = req.api_key.expires_at;
        }
        PolicyService::check_rights_kind(entity.kind(), &updated.rights)?;

        let caller = evaluator::list_rights(&mut *tx, principal, entity).await?;
        let change = RightsChange::between(&key.rights, &updated.rights);
        // A key may only narrow its own rights; renames and expiry changes
        // need the settings right like any other update.
        let own_key = principal.key_id.as_deref() == Some(key.id.as_str());
        let rights_only = updated.name == key.name && updated.expires_at == key.expires_at;
        if !(own_key && rights_only && change.is_scope_down()) {
            authorize_change(principal, entity, &caller, base, &key.rights, &updated.rights)?;
        }

        if updated.rights.is_empty() {
            if !self.legacy_delete_via_update {
                return Err(ServiceError::invalid_argument(
                    "no_rights",
                    "An API key needs at least one right; use delete instead",
                ));
            }
            tx.delete_api_key(&key.id).await?;
            tx.commit().await?;

            tracing::info!(entity = %entity, key_id = %key.id, "API key deleted through update");
            self.emit_api_key(
                principal,
                &key,
                EventType::ApiKeyDelete,
                NotificationType::ApiKeyChanged,
            );
            return Ok(UpdateOutcome::Deleted);
        }

        updated.updated_at = Utc::now();
        tx.update_api_key(&updated).await?;
        tx.commit().await?;

        tracing::info!(entity = %entity, key_id = %updated.id, "API key updated");
        self.emit_api_key(
            principal,
            &updated,
            EventType::ApiKeyUpdate,
            NotificationType::ApiKeyChanged,
        );
        Ok(UpdateOutcome::Updated(updated.sanitized(None)))
    }

    /// Issues a new secret for an existing key.
    pub async fn rotate_api_key(
        &self,
        principal: &Principal,
        entity: &EntityId,
        key_id: &str,
    ) -> Result<SanitizedApiKey, ServiceError> {
        require_authenticated(principal)?;
        let base = PolicyService::api_keys_right(entity.kind())?;

        let mut tx = self.store.begin().await?;
        ensure_exists(&mut *tx, entity).await?;
        let mut key = load_api_key(&mut *tx, entity, key_id).await?;
        let mut needed = key.rights.clone();
        needed.insert(base);
        evaluator::require(&mut *tx, principal, entity, &needed).await?;

        let secret = generate_secret();
        key.secret_hash = hash_secret(&secret)?.into_string();
        key.updated_at = Utc::now();
        tx.update_api_key(&key).await?;
        tx.commit().await?;

        tracing::info!(entity = %entity, key_id = %key.id, "API key rotated");
        self.emit_api_key(
            principal,
            &key,
            EventType::ApiKeyUpdate,
            NotificationType::ApiKeyChanged,
        );
        Ok(key.sanitized(Some(bearer(&key, secret))))
    }

    pub async fn delete_api_key(
        &self,
        principal: &Principal,
        entity: &EntityId,
        key_id: &str,
    ) -> Result<(), ServiceError> {
        require_authenticated(principal)?;
        let base = PolicyService::api_keys_right(entity.kind())?;

        let mut tx = self.store.begin().await?;
        ensure_exists(&mut *tx, entity).await?;
        let key = load_api_key(&mut *tx, entity, key_id).await?;
        if principal.key_id.as_deref() != Some(key.id.as_str()) {
            let caller = evaluator::list_rights(&mut *tx, principal, entity).await?;
            authorize_change(principal, entity, &caller, base, &key.rights, &Rights::new())?;
        }

        tx.delete_api_key(&key.id).await?;
        tx.commit().await?;

        tracing::info!(entity = %entity, key_id = %key.id, "API key deleted");
        self.emit_api_key(
            principal,
            &key,
            EventType::ApiKeyDelete,
            NotificationType::ApiKeyChanged,
        );
        Ok(())
    }

    pub async fn get_collaborator(
        &self,
        principal: &Principal,
        entity: &EntityId,
        account: &AccountId,
    ) -> Result<Collaborator, ServiceError> {
        require_authenticated(principal)?;
        let base = PolicyService::collaborators_right(entity.kind())?;

        let mut tx = self.store.begin().await?;
        ensure_exists(&mut *tx, entity).await?;
        if !principal.is_account(account) {
            evaluator::require(&mut *tx, principal, entity, &Rights::from([base])).await?;
        }
        let rights = membership::get_member(&mut *tx, account, entity).await?;
        if rights.is_empty() {
            return Err(collaborator_not_found(entity, account));
        }
        Ok(Collaborator::new(account.clone(), rights))
    }

    /// Members of `entity`. Callers without the collaborator settings right
    /// only see who the members are, not their rights.
    pub async fn list_collaborators(
        &self,
        principal: &Principal,
        entity: &EntityId,
        pagination: &Pagination,
    ) -> Result<Page<Collaborator>, ServiceError> {
        require_authenticated(principal)?;
        pagination.validate()?;
        let base = PolicyService::collaborators_right(entity.kind())?;

        let mut tx = self.store.begin().await?;
        ensure_exists(&mut *tx, entity).await?;
        let info = Rights::from([PolicyService::info_right(entity.kind())]);
        let caller = evaluator::require(&mut *tx, principal, entity, &info).await?;
        let members = membership::find_members(&mut *tx, entity).await?;

        let members = if caller.includes(base) {
            members
        } else {
            members.iter().map(Collaborator::public).collect()
        };
        Ok(pagination.apply(members))
    }

    pub async fn set_collaborator(
        &self,
        principal: &Principal,
        entity: &EntityId,
        req: SetCollaboratorRequest,
    ) -> Result<(), ServiceError> {
        require_authenticated(principal)?;
        let Collaborator { account, rights } = req.collaborator;
        let base = PolicyService::collaborators_right(entity.kind())?;
        PolicyService::check_collaborator_shape(&account, entity)?;
        PolicyService::check_rights_kind(entity.kind(), &rights)?;

        let mut tx = self.store.begin().await?;
        ensure_exists(&mut *tx, entity).await?;
        ensure_exists(&mut *tx, &EntityId::from(&account)).await?;

        let caller = evaluator::list_rights(&mut *tx, principal, entity).await?;
        let old = membership::get_member(&mut *tx, &account, entity).await?;
        let change = RightsChange::between(&old, &rights);
        if !(principal.is_account(&account) && change.is_scope_down()) {
            authorize_change(principal, entity, &caller, base, &old, &rights)?;
        }
        if let AccountId::Organization(organization) = &account {
            if old.is_empty() && !rights.is_empty() {
                evaluator::require(
                    &mut *tx,
                    principal,
                    &EntityId::Organization(organization.clone()),
                    &Rights::from([Right::OrganizationAddAsCollaborator]),
                )
                .await?;
            }
        }

        membership::set_member(&mut *tx, &account, entity, &rights).await?;
        membership::ensure_has_owner(&mut *tx, entity).await?;
        tx.commit().await?;

        tracing::info!(entity = %entity, account = %account, rights = %rights, "Collaborator set");
        let event_type = if rights.is_empty() {
            EventType::CollaboratorDelete
        } else {
            EventType::CollaboratorUpdate
        };
        self.emit_collaborator(principal, entity, &Collaborator::new(account, rights), event_type);
        Ok(())
    }

    pub async fn delete_collaborator(
        &self,
        principal: &Principal,
        entity: &EntityId,
        account: &AccountId,
    ) -> Result<(), ServiceError> {
        require_authenticated(principal)?;
        let base = PolicyService::collaborators_right(entity.kind())?;

        let mut tx = self.store.begin().await?;
        ensure_exists(&mut *tx, entity).await?;
        let old = membership::get_member(&mut *tx, account, entity).await?;
        if old.is_empty() {
            return Err(collaborator_not_found(entity, account));
        }
        if !principal.is_account(account) {
            let caller = evaluator::list_rights(&mut *tx, principal, entity).await?;
            authorize_change(principal, entity, &caller, base, &old, &Rights::new())?;
        }

        membership::delete_member(&mut *tx, account, entity).await?;
        membership::ensure_has_owner(&mut *tx, entity).await?;
        tx.commit().await?;

        tracing::info!(entity = %entity, account = %account, "Collaborator deleted");
        self.emit_collaborator(
            principal,
            entity,
            &Collaborator::new(account.clone(), Rights::new()),
            EventType::CollaboratorDelete,
        );
        Ok(())
    }

    fn emit_api_key(
        &self,
        principal: &Principal,
        key: &ApiKey,
        event_type: EventType,
        notification_type: NotificationType,
    ) {
        let data = json!({
            "key_id": key.id,
            "name": key.name,
            "rights": key.rights,
        });
        self.dispatcher.publish(Event::new(
            key.entity.clone(),
            event_type,
            principal.actor(),
            data.clone(),
        ));
        self.dispatcher.notify(NotificationRequest::new(
            key.entity.clone(),
            notification_type,
            vec![Receiver::AdministrativeContact, Receiver::TechnicalContact],
            data,
            principal.actor(),
        ));
    }

    fn emit_collaborator(
        &self,
        principal: &Principal,
        entity: &EntityId,
        collaborator: &Collaborator,
        event_type: EventType,
    ) {
        let data = json!({
            "account": collaborator.account,
            "rights": collaborator.rights,
        });
        self.dispatcher.publish(Event::new(
            entity.clone(),
            event_type,
            principal.actor(),
            data.clone(),
        ));
        self.dispatcher.notify(NotificationRequest::new(
            entity.clone(),
            NotificationType::CollaboratorChanged,
            vec![Receiver::AdministrativeContact, Receiver::Collaborator],
            data,
            principal.actor(),
        ));
    }
}

fn require_authenticated(principal: &Principal) -> Result<(), ServiceError> {
    if principal.is_authenticated() {
        Ok(())
    } else {
        Err(ServiceError::Unauthenticated)
    }
}

async fn ensure_exists(tx: &mut dyn StoreTx, entity: &EntityId) -> Result<(), ServiceError> {
    if tx.entity_exists(&entity.rights_scope()).await? {
        Ok(())
    } else {
        Err(ServiceError::not_found(
            "entity_not_found",
            format!("{} not found", entity),
        ))
    }
}

async fn load_api_key(
    tx: &mut dyn StoreTx,
    entity: &EntityId,
    key_id: &str,
) -> Result<ApiKey, ServiceError> {
    match tx.get_api_key(key_id).await? {
        Some(key) if &key.entity == entity => Ok(key),
        _ => Err(ServiceError::not_found(
            "api_key_not_found",
            format!("API key {} not found on {}", key_id, entity),
        )),
    }
}

fn collaborator_not_found(entity: &EntityId, account: &AccountId) -> ServiceError {
    ServiceError::not_found(
        "collaborator_not_found",
        format!("{} is not a collaborator of {}", account, entity),
    )
}

fn check_not_expired(expires_at: Option<chrono::DateTime<Utc>>) -> Result<(), ServiceError> {
    match expires_at {
        Some(at) if at <= Utc::now() => Err(ServiceError::invalid_argument(
            "expires_in_past",
            "Expiry must be in the future",
        )),
        _ => Ok(()),
    }
}

/// Exact-rights rule first, then the base right of the operation.
fn authorize_change(
    principal: &Principal,
    entity: &EntityId,
    caller: &Rights,
    base: Right,
    old: &Rights,
    new: &Rights,
) -> Result<(), ServiceError> {
    PolicyService::check_delegation(caller, old, new)
        .and_then(|()| PolicyService::check_issue(caller, &Rights::from([base])))
        .map_err(|err| {
            tracing::warn!(
                source = ?principal.source,
                subject = %principal.actor(),
                entity = %entity,
                error = %err,
                "Change denied"
            );
            err.into()
        })
}

fn bearer(key: &ApiKey, secret: Secret) -> String {
    ApiKeyToken::new(key.entity.kind(), key.id.clone(), secret).encode()
}
