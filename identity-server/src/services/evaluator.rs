//! Rights evaluation for a principal on an entity.

use crate::models::{AccountId, EntityId, Principal, PrincipalSource, Right, Rights};

use super::error::ServiceError;
use super::membership::membership_chains;
use super::metrics::record_rights_check;
use super::store::StoreTx;

/// Rights `principal` holds on `entity`, closed under implication.
///
/// End devices are evaluated against their application.
pub async fn list_rights(
    tx: &mut dyn StoreTx,
    principal: &Principal,
    entity: &EntityId,
) -> Result<Rights, ServiceError> {
    let scope = entity.rights_scope();
    let kind = scope.kind();
    let kind_rights = Rights::kind_rights(kind);
    let universal = principal.universal.implied();

    if universal.includes(Right::all_for(kind)) {
        return Ok(kind_rights.implied());
    }

    let granted = principal.granted.implied();
    let held = match principal.source {
        PrincipalSource::Anonymous | PrincipalSource::ClusterAuth => Rights::new(),
        PrincipalSource::ApiKey => {
            if principal.subject.as_ref() == Some(&scope) {
                granted.intersect(&kind_rights)
            } else {
                Rights::new()
            }
        }
        PrincipalSource::AccessToken => match principal.subject_user() {
            Some(user_id) if scope == EntityId::User(user_id.clone()) => {
                granted.intersect(&kind_rights)
            }
            Some(user_id) => {
                let chains = membership_chains(
                    tx,
                    &AccountId::User(user_id.clone()),
                    kind,
                    std::slice::from_ref(&scope),
                )
                .await?;
                granted.intersect(&chains.get(&scope)).intersect(&kind_rights)
            }
            None => Rights::new(),
        },
    };

    let held = held.union(&universal.intersect(&kind_rights));
    let held = principal
        .restrictions
        .restrict(held, &scope, principal.subject.as_ref());
    Ok(held.implied())
}

/// Fails with the rights in `needed` that the principal lacks on `entity`.
pub async fn require(
    tx: &mut dyn StoreTx,
    principal: &Principal,
    entity: &EntityId,
    needed: &Rights,
) -> Result<Rights, ServiceError> {
    let have = list_rights(tx, principal, entity).await?;
    let missing = needed.implied().sub(&have);
    if missing.is_empty() {
        record_rights_check("granted");
        return Ok(have);
    }

    record_rights_check("denied");
    tracing::warn!(
        source = ?principal.source,
        subject = %principal.actor(),
        entity = %entity,
        missing = %missing,
        "Rights check denied"
    );
    Err(ServiceError::missing_rights(missing))
}
