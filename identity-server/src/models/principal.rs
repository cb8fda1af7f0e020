//! Request-scoped identity of a caller.

use serde::Serialize;
use std::collections::BTreeSet;

use super::ids::{AccountId, EntityId, UserId};
use super::rights::{Right, Rights};
use super::user::UserState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalSource {
    ApiKey,
    AccessToken,
    ClusterAuth,
    Anonymous,
}

/// Limits derived from the state of the user behind a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Restriction {
    PendingValidation,
    Suspended,
    Rejected,
}

impl Restriction {
    pub fn from_user_state(state: UserState) -> Option<Self> {
        match state {
            UserState::Requested => Some(Restriction::PendingValidation),
            UserState::Suspended => Some(Restriction::Suspended),
            UserState::Rejected => Some(Restriction::Rejected),
            UserState::Approved => None,
        }
    }

    /// What a restricted user keeps on their own user entity.
    pub fn own_user_rights(&self) -> Rights {
        match self {
            Restriction::PendingValidation | Restriction::Rejected => {
                Rights::from([Right::UserInfo, Right::UserSettingsBasic, Right::UserDelete])
            }
            Restriction::Suspended => Rights::from([Right::UserInfo]),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RestrictionSet(BTreeSet<Restriction>);

impl RestrictionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, restriction: Restriction) {
        self.0.insert(restriction);
    }

    pub fn contains(&self, restriction: Restriction) -> bool {
        self.0.contains(&restriction)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Narrow `rights` held on `entity`. A restricted principal keeps at
    /// most the intersection of every restriction's allowance, and only on
    /// its own user.
    pub fn restrict(
        &self,
        rights: Rights,
        entity: &EntityId,
        subject: Option<&EntityId>,
    ) -> Rights {
        if self.is_empty() {
            return rights;
        }
        if !matches!(entity, EntityId::User(_)) || subject != Some(entity) {
            return Rights::new();
        }
        self.0
            .iter()
            .fold(rights.implied(), |acc, r| acc.intersect(&r.own_user_rights()))
    }
}

impl From<UserState> for RestrictionSet {
    fn from(state: UserState) -> Self {
        let mut set = RestrictionSet::new();
        if let Some(restriction) = Restriction::from_user_state(state) {
            set.insert(restriction);
        }
        set
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Principal {
    pub source: PrincipalSource,
    pub subject: Option<EntityId>,
    pub granted: Rights,
    pub universal: Rights,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    pub restrictions: RestrictionSet,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self {
            source: PrincipalSource::Anonymous,
            subject: None,
            granted: Rights::new(),
            universal: Rights::new(),
            key_id: None,
            restrictions: RestrictionSet::new(),
        }
    }

    pub fn cluster() -> Self {
        Self {
            source: PrincipalSource::ClusterAuth,
            subject: None,
            granted: Rights::all(),
            universal: Rights::all(),
            key_id: None,
            restrictions: RestrictionSet::new(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.source != PrincipalSource::Anonymous
    }

    pub fn subject_user(&self) -> Option<&UserId> {
        match &self.subject {
            Some(EntityId::User(user_id)) => Some(user_id),
            _ => None,
        }
    }

    /// True when the principal acts as `account` itself.
    pub fn is_account(&self, account: &AccountId) -> bool {
        self.subject
            .as_ref()
            .is_some_and(|subject| subject.as_account().as_ref() == Some(account))
    }

    /// Label recorded as the actor of events.
    pub fn actor(&self) -> String {
        match (&self.source, &self.subject) {
            (PrincipalSource::ClusterAuth, _) => "cluster".to_string(),
            (_, Some(subject)) => subject.to_string(),
            (_, None) => "anonymous".to_string(),
        }
    }
}
