//! Membership graph.
//!
//! Only direct edges `(account -> entity, rights)` are stored. Transitivity
//! is computed at query time and is at most two hops deep: a user reaches an
//! entity through an organization only when the user holds every
//! [`ORG_ALL_NON_ADMIN`](crate::models::ORG_ALL_NON_ADMIN) right on that
//! organization.

use std::collections::{BTreeSet, HashMap};

use crate::models::{AccountId, Collaborator, EntityId, EntityKind, Right, Rights};

use super::error::ServiceError;
use super::policy::PolicyService;
use super::store::StoreTx;

/// Effective rights per target entity, already closed under implication.
#[derive(Debug, Clone, Default)]
pub struct MembershipChains(HashMap<EntityId, Rights>);

impl MembershipChains {
    pub fn get(&self, entity: &EntityId) -> Rights {
        self.0.get(entity).cloned().unwrap_or_default()
    }
}

pub async fn get_member(
    tx: &mut dyn StoreTx,
    account: &AccountId,
    entity: &EntityId,
) -> Result<Rights, ServiceError> {
    Ok(tx.get_membership(account, entity).await?.unwrap_or_default())
}

/// Upsert a direct membership. An empty set deletes the row.
pub async fn set_member(
    tx: &mut dyn StoreTx,
    account: &AccountId,
    entity: &EntityId,
    rights: &Rights,
) -> Result<(), ServiceError> {
    PolicyService::check_collaborator_shape(account, entity)?;
    if rights.is_empty() {
        tx.delete_membership(account, entity).await?;
        return Ok(());
    }
    tx.upsert_membership(account, entity, rights).await?;
    Ok(())
}

pub async fn delete_member(
    tx: &mut dyn StoreTx,
    account: &AccountId,
    entity: &EntityId,
) -> Result<bool, ServiceError> {
    Ok(tx.delete_membership(account, entity).await?)
}

pub async fn find_members(
    tx: &mut dyn StoreTx,
    entity: &EntityId,
) -> Result<Vec<Collaborator>, ServiceError> {
    Ok(tx.list_members(entity).await?)
}

/// Organizations through which `direct` lets a user inherit rights.
fn delegating_organizations(direct: &[(EntityId, Rights)]) -> Vec<AccountId> {
    let threshold = Rights::org_all_non_admin();
    direct
        .iter()
        .filter(|(entity, rights)| {
            entity.kind() == EntityKind::Organization && rights.includes_all(&threshold)
        })
        .filter_map(|(entity, _)| entity.as_account())
        .collect()
}

/// Entities of `kind` that `account` is a member of, sorted.
pub async fn find_memberships(
    tx: &mut dyn StoreTx,
    account: &AccountId,
    kind: EntityKind,
    include_indirect: bool,
) -> Result<Vec<EntityId>, ServiceError> {
    let direct = tx.list_memberships(account).await?;
    let mut entities: BTreeSet<EntityId> = direct
        .iter()
        .filter(|(entity, _)| entity.kind() == kind)
        .map(|(entity, _)| entity.clone())
        .collect();

    if include_indirect && matches!(account, AccountId::User(_)) {
        for organization in delegating_organizations(&direct) {
            entities.extend(
                tx.list_memberships(&organization)
                    .await?
                    .into_iter()
                    .filter(|(entity, _)| entity.kind() == kind)
                    .map(|(entity, _)| entity),
            );
        }
    }

    Ok(entities.into_iter().collect())
}

/// Rights `account` holds on each of `entity_ids`, directly or through an
/// organization. Targets of another kind yield nothing.
pub async fn membership_chains(
    tx: &mut dyn StoreTx,
    account: &AccountId,
    kind: EntityKind,
    entity_ids: &[EntityId],
) -> Result<MembershipChains, ServiceError> {
    let direct = tx.list_memberships(account).await?;
    let organizations = match account {
        AccountId::User(_) => delegating_organizations(&direct),
        AccountId::Organization(_) => Vec::new(),
    };

    let mut chains = HashMap::new();
    for target in entity_ids.iter().filter(|e| e.kind() == kind) {
        let mut rights = direct
            .iter()
            .find(|(entity, _)| entity == target)
            .map(|(_, rights)| rights.clone())
            .unwrap_or_default();

        for organization in &organizations {
            if let Some(org_rights) = tx.get_membership(organization, target).await? {
                rights = rights.union(&org_rights);
            }
        }

        chains.insert(target.clone(), rights.implied());
    }

    Ok(MembershipChains(chains))
}

/// Whether some user reaches `entity` with its kind's `*_ALL` right.
pub async fn has_owner(tx: &mut dyn StoreTx, entity: &EntityId) -> Result<bool, ServiceError> {
    let kind_all = Right::all_for(entity.kind());
    let threshold = Rights::org_all_non_admin();

    for member in tx.list_members(entity).await? {
        if !member.rights.includes(kind_all) {
            continue;
        }
        match &member.account {
            AccountId::User(_) => return Ok(true),
            AccountId::Organization(organization) => {
                let org_entity = EntityId::Organization(organization.clone());
                let owned_through = tx.list_members(&org_entity).await?.into_iter().any(|m| {
                    matches!(m.account, AccountId::User(_)) && m.rights.includes_all(&threshold)
                });
                if owned_through {
                    return Ok(true);
                }
            }
        }
    }

    Ok(false)
}

/// Last-owner rule, checked on the post-image of a mutation.
pub async fn ensure_has_owner(tx: &mut dyn StoreTx, entity: &EntityId) -> Result<(), ServiceError> {
    if matches!(entity.kind(), EntityKind::User | EntityKind::EndDevice) {
        return Ok(());
    }
    if !has_owner(tx, entity).await? {
        return Err(ServiceError::EntityNeedsCollaborator(entity.clone()));
    }
    Ok(())
}
