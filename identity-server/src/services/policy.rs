//! Access policy for credential and membership changes.
//!
//! Checks here are pure; callers feed them state read inside the same
//! transaction that applies the change.

use crate::models::{AccountId, EntityId, EntityKind, Right, Rights};

use super::error::ServiceError;

/// Errors related to delegation policy.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyError {
    /// Caller lacks rights it is adding or removing.
    MissingRights { missing: Rights },
    /// Requested rights belong to another entity kind.
    ForeignRights { kind: EntityKind, rights: Rights },
    /// Organizations cannot join organizations.
    NestedOrganization,
    /// Entity kind has no collaborators.
    UnsupportedCollaborator { kind: EntityKind },
    /// Entity kind has no API keys.
    UnsupportedApiKeys { kind: EntityKind },
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyError::MissingRights { missing } => {
                write!(f, "Caller does not hold {}", missing)
            }
            PolicyError::ForeignRights { kind, rights } => {
                write!(f, "Rights {} do not apply to {}", rights, kind)
            }
            PolicyError::NestedOrganization => {
                write!(f, "Organizations cannot be members of organizations")
            }
            PolicyError::UnsupportedCollaborator { kind } => {
                write!(f, "{} cannot have collaborators", kind)
            }
            PolicyError::UnsupportedApiKeys { kind } => {
                write!(f, "{} cannot have API keys", kind)
            }
        }
    }
}

impl std::error::Error for PolicyError {}

impl From<PolicyError> for ServiceError {
    fn from(err: PolicyError) -> Self {
        let message = err.to_string();
        match err {
            PolicyError::MissingRights { missing } => ServiceError::missing_rights(missing),
            PolicyError::ForeignRights { .. } => {
                ServiceError::invalid_argument("foreign_rights", message)
            }
            PolicyError::NestedOrganization => {
                ServiceError::invalid_argument("nested_organization", message)
            }
            PolicyError::UnsupportedCollaborator { .. } => {
                ServiceError::invalid_argument("unsupported_collaborator", message)
            }
            PolicyError::UnsupportedApiKeys { .. } => {
                ServiceError::invalid_argument("unsupported_api_keys", message)
            }
        }
    }
}

/// Difference between an existing and a requested grant, both implied.
#[derive(Debug, Clone, PartialEq)]
pub struct RightsChange {
    pub added: Rights,
    pub removed: Rights,
}

impl RightsChange {
    pub fn between(old: &Rights, new: &Rights) -> Self {
        let old = old.implied();
        let new = new.implied();
        Self {
            added: new.sub(&old),
            removed: old.sub(&new),
        }
    }

    /// Nothing is added; the grant stays the same or shrinks.
    pub fn is_scope_down(&self) -> bool {
        self.added.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct PolicyService;

impl PolicyService {
    /// Exact-rights rule: the caller must hold everything added and
    /// everything removed. Deleting the whole grant only checks `added`,
    /// which is then empty.
    pub fn check_delegation(
        caller: &Rights,
        old: &Rights,
        new: &Rights,
    ) -> Result<(), PolicyError> {
        let change = RightsChange::between(old, new);
        let needed = if new.is_empty() {
            change.added
        } else {
            change.added.union(&change.removed)
        };
        Self::check_holds(caller, &needed)
    }

    /// Issuing a key can only hand out rights the caller holds.
    pub fn check_issue(caller: &Rights, requested: &Rights) -> Result<(), PolicyError> {
        Self::check_holds(caller, requested)
    }

    fn check_holds(caller: &Rights, needed: &Rights) -> Result<(), PolicyError> {
        let missing = needed.implied().sub(&caller.implied());
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PolicyError::MissingRights { missing })
        }
    }

    pub fn check_rights_kind(kind: EntityKind, rights: &Rights) -> Result<(), PolicyError> {
        let foreign = rights.foreign_to(kind);
        if foreign.is_empty() {
            Ok(())
        } else {
            Err(PolicyError::ForeignRights {
                kind: kind.rights_kind(),
                rights: foreign,
            })
        }
    }

    pub fn check_collaborator_shape(
        account: &AccountId,
        entity: &EntityId,
    ) -> Result<(), PolicyError> {
        match (account, entity.kind()) {
            (_, kind @ (EntityKind::User | EntityKind::EndDevice)) => {
                Err(PolicyError::UnsupportedCollaborator { kind })
            }
            (AccountId::Organization(_), EntityKind::Organization) => {
                Err(PolicyError::NestedOrganization)
            }
            _ => Ok(()),
        }
    }

    /// Right needed to manage API keys of `kind`.
    pub fn api_keys_right(kind: EntityKind) -> Result<Right, PolicyError> {
        match kind {
            EntityKind::User => Ok(Right::UserSettingsApiKeys),
            EntityKind::Application => Ok(Right::ApplicationSettingsApiKeys),
            EntityKind::Gateway => Ok(Right::GatewaySettingsApiKeys),
            EntityKind::Organization => Ok(Right::OrganizationSettingsApiKeys),
            EntityKind::Client | EntityKind::EndDevice => {
                Err(PolicyError::UnsupportedApiKeys { kind })
            }
        }
    }

    /// Right needed to change collaborators of `kind`.
    pub fn collaborators_right(kind: EntityKind) -> Result<Right, PolicyError> {
        match kind {
            EntityKind::Application => Ok(Right::ApplicationSettingsCollaborators),
            EntityKind::Gateway => Ok(Right::GatewaySettingsCollaborators),
            EntityKind::Organization => Ok(Right::OrganizationSettingsMembers),
            EntityKind::Client => Ok(Right::ClientSettingsCollaborators),
            EntityKind::User | EntityKind::EndDevice => {
                Err(PolicyError::UnsupportedCollaborator { kind })
            }
        }
    }

    pub fn info_right(kind: EntityKind) -> Right {
        match kind.rights_kind() {
            EntityKind::User => Right::UserInfo,
            EntityKind::Gateway => Right::GatewayInfo,
            EntityKind::Organization => Right::OrganizationInfo,
            EntityKind::Client => Right::ClientInfo,
            EntityKind::Application | EntityKind::EndDevice => Right::ApplicationInfo,
        }
    }

    /// Right an owner needs to create an entity of `kind`.
    pub fn create_right(owner: &AccountId, kind: EntityKind) -> Option<Right> {
        match (owner, kind) {
            (AccountId::User(_), EntityKind::Application) => Some(Right::UserCreateApplications),
            (AccountId::User(_), EntityKind::Gateway) => Some(Right::UserCreateGateways),
            (AccountId::User(_), EntityKind::Client) => Some(Right::UserCreateClients),
            (AccountId::User(_), EntityKind::Organization) => {
                Some(Right::UserCreateOrganizations)
            }
            (AccountId::Organization(_), EntityKind::Application) => {
                Some(Right::OrganizationCreateApplications)
            }
            (AccountId::Organization(_), EntityKind::Gateway) => {
                Some(Right::OrganizationCreateGateways)
            }
            (AccountId::Organization(_), EntityKind::Client) => {
                Some(Right::OrganizationCreateClients)
            }
            _ => None,
        }
    }

    /// Right an account needs on itself to list its memberships of `kind`.
    pub fn list_right(account: &AccountId, kind: EntityKind) -> Option<Right> {
        match (account, kind) {
            (AccountId::User(_), EntityKind::Application) => Some(Right::UserListApplications),
            (AccountId::User(_), EntityKind::Gateway) => Some(Right::UserListGateways),
            (AccountId::User(_), EntityKind::Client) => Some(Right::UserListClients),
            (AccountId::User(_), EntityKind::Organization) => Some(Right::UserListOrganizations),
            (AccountId::Organization(_), EntityKind::Application) => {
                Some(Right::OrganizationListApplications)
            }
            (AccountId::Organization(_), EntityKind::Gateway) => {
                Some(Right::OrganizationListGateways)
            }
            (AccountId::Organization(_), EntityKind::Client) => {
                Some(Right::OrganizationListClients)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApplicationId, OrganizationId, UserId};

    fn rights<const N: usize>(r: [Right; N]) -> Rights {
        Rights::from(r)
    }

    #[test]
    fn test_adding_unheld_right_denied() {
        let caller = rights([Right::ApplicationInfo, Right::ApplicationDevicesRead]);
        let result = PolicyService::check_delegation(
            &caller,
            &Rights::new(),
            &rights([Right::ApplicationInfo, Right::ApplicationDelete]),
        );
        assert_eq!(
            result,
            Err(PolicyError::MissingRights {
                missing: rights([Right::ApplicationDelete])
            })
        );
    }

    #[test]
    fn test_removing_unheld_right_denied() {
        let caller = rights([Right::ApplicationInfo]);
        let result = PolicyService::check_delegation(
            &caller,
            &rights([Right::ApplicationInfo, Right::ApplicationLink]),
            &rights([Right::ApplicationInfo]),
        );
        assert_eq!(
            result,
            Err(PolicyError::MissingRights {
                missing: rights([Right::ApplicationLink])
            })
        );
    }

    #[test]
    fn test_full_delete_only_checks_added() {
        let caller = rights([Right::ApplicationInfo]);
        assert!(PolicyService::check_delegation(
            &caller,
            &rights([Right::ApplicationAll]),
            &Rights::new()
        )
        .is_ok());
    }

    #[test]
    fn test_all_expands_before_diffing() {
        let change = RightsChange::between(
            &rights([Right::GatewayAll]),
            &rights([Right::GatewayInfo]),
        );
        assert!(change.is_scope_down());
        assert!(change.removed.includes(Right::GatewayDelete));
        assert!(!change.removed.includes(Right::GatewayInfo));
    }

    #[test]
    fn test_rights_kind() {
        assert!(PolicyService::check_rights_kind(
            EntityKind::Gateway,
            &rights([Right::GatewayInfo])
        )
        .is_ok());
        let err = PolicyService::check_rights_kind(
            EntityKind::Gateway,
            &rights([Right::GatewayInfo, Right::ApplicationInfo]),
        )
        .unwrap_err();
        assert_eq!(
            err,
            PolicyError::ForeignRights {
                kind: EntityKind::Gateway,
                rights: rights([Right::ApplicationInfo])
            }
        );
    }

    #[test]
    fn test_collaborator_shape() {
        let acme = AccountId::Organization(OrganizationId::new("acme"));
        let org = EntityId::Organization(OrganizationId::new("other"));
        let app = EntityId::Application(ApplicationId::new("app-a"));
        let user = EntityId::User(UserId::new("alice"));

        assert_eq!(
            PolicyService::check_collaborator_shape(&acme, &org),
            Err(PolicyError::NestedOrganization)
        );
        assert!(PolicyService::check_collaborator_shape(&acme, &app).is_ok());
        assert!(PolicyService::check_collaborator_shape(
            &AccountId::User(UserId::new("bob")),
            &user
        )
        .is_err());
    }

    #[test]
    fn test_create_rights() {
        let alice = AccountId::User(UserId::new("alice"));
        let acme = AccountId::Organization(OrganizationId::new("acme"));
        assert_eq!(
            PolicyService::create_right(&alice, EntityKind::Gateway),
            Some(Right::UserCreateGateways)
        );
        assert_eq!(PolicyService::create_right(&acme, EntityKind::Organization), None);
        assert_eq!(PolicyService::create_right(&alice, EntityKind::User), None);
    }

    #[test]
    fn test_policy_error_names() {
        let err: ServiceError = PolicyError::NestedOrganization.into();
        assert_eq!(err.name(), "nested_organization");
        let err: ServiceError = PolicyError::MissingRights {
            missing: rights([Right::GatewayDelete]),
        }
        .into();
        assert_eq!(err.name(), "missing_rights");
    }
}
