//! Rights and the rights-set algebra.
//!
//! A [`Right`] is an atomic capability tied to one entity kind. Every kind
//! has a synthetic `*_ALL` right which implies every other right of that
//! kind. [`Rights`] is a canonical (sorted, deduplicated) set of rights;
//! two sets compare equal when their implication closures are equal.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::ids::EntityKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown right `{0}`")]
pub struct UnknownRight(pub String);

macro_rules! rights_catalogue {
    ($($variant:ident => $name:literal, $kind:ident;)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Right {
            $($variant,)*
        }

        impl Right {
            /// Every right, in declaration order.
            pub const VARIANTS: &'static [Right] = &[$(Right::$variant,)*];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Right::$variant => $name,)*
                }
            }

            pub fn kind(self) -> EntityKind {
                match self {
                    $(Right::$variant => EntityKind::$kind,)*
                }
            }
        }

        impl FromStr for Right {
            type Err = UnknownRight;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Right::$variant),)*
                    _ => Err(UnknownRight(s.to_string())),
                }
            }
        }
    };
}

rights_catalogue! {
    UserInfo => "USER_INFO", User;
    UserSettingsBasic => "USER_SETTINGS_BASIC", User;
    UserListApplications => "USER_LIST_APPLICATIONS", User;
    UserCreateApplications => "USER_CREATE_APPLICATIONS", User;
    UserListGateways => "USER_LIST_GATEWAYS", User;
    UserCreateGateways => "USER_CREATE_GATEWAYS", User;
    UserListClients => "USER_LIST_CLIENTS", User;
    UserCreateClients => "USER_CREATE_CLIENTS", User;
    UserListOrganizations => "USER_LIST_ORGANIZATIONS", User;
    UserCreateOrganizations => "USER_CREATE_ORGANIZATIONS", User;
    UserNotificationsRead => "USER_NOTIFICATIONS_READ", User;
    UserSettingsApiKeys => "USER_SETTINGS_API_KEYS", User;
    UserAuthorizedClients => "USER_AUTHORIZED_CLIENTS", User;
    UserDelete => "USER_DELETE", User;
    UserAll => "USER_ALL", User;

    ApplicationInfo => "APPLICATION_INFO", Application;
    ApplicationSettingsBasic => "APPLICATION_SETTINGS_BASIC", Application;
    ApplicationSettingsApiKeys => "APPLICATION_SETTINGS_API_KEYS", Application;
    ApplicationSettingsCollaborators => "APPLICATION_SETTINGS_COLLABORATORS", Application;
    ApplicationSettingsPackages => "APPLICATION_SETTINGS_PACKAGES", Application;
    ApplicationDelete => "APPLICATION_DELETE", Application;
    ApplicationDevicesRead => "APPLICATION_DEVICES_READ", Application;
    ApplicationDevicesWrite => "APPLICATION_DEVICES_WRITE", Application;
    ApplicationDevicesReadKeys => "APPLICATION_DEVICES_READ_KEYS", Application;
    ApplicationDevicesWriteKeys => "APPLICATION_DEVICES_WRITE_KEYS", Application;
    ApplicationTrafficRead => "APPLICATION_TRAFFIC_READ", Application;
    ApplicationTrafficUpWrite => "APPLICATION_TRAFFIC_UP_WRITE", Application;
    ApplicationTrafficDownWrite => "APPLICATION_TRAFFIC_DOWN_WRITE", Application;
    ApplicationLink => "APPLICATION_LINK", Application;
    ApplicationAll => "APPLICATION_ALL", Application;

    GatewayInfo => "GATEWAY_INFO", Gateway;
    GatewaySettingsBasic => "GATEWAY_SETTINGS_BASIC", Gateway;
    GatewaySettingsApiKeys => "GATEWAY_SETTINGS_API_KEYS", Gateway;
    GatewaySettingsCollaborators => "GATEWAY_SETTINGS_COLLABORATORS", Gateway;
    GatewayDelete => "GATEWAY_DELETE", Gateway;
    GatewayTrafficRead => "GATEWAY_TRAFFIC_READ", Gateway;
    GatewayTrafficDownWrite => "GATEWAY_TRAFFIC_DOWN_WRITE", Gateway;
    GatewayLink => "GATEWAY_LINK", Gateway;
    GatewayStatusRead => "GATEWAY_STATUS_READ", Gateway;
    GatewayLocationRead => "GATEWAY_LOCATION_READ", Gateway;
    GatewayWriteSecrets => "GATEWAY_WRITE_SECRETS", Gateway;
    GatewayReadSecrets => "GATEWAY_READ_SECRETS", Gateway;
    GatewayAll => "GATEWAY_ALL", Gateway;

    OrganizationInfo => "ORGANIZATION_INFO", Organization;
    OrganizationSettingsBasic => "ORGANIZATION_SETTINGS_BASIC", Organization;
    OrganizationSettingsApiKeys => "ORGANIZATION_SETTINGS_API_KEYS", Organization;
    OrganizationSettingsMembers => "ORGANIZATION_SETTINGS_MEMBERS", Organization;
    OrganizationDelete => "ORGANIZATION_DELETE", Organization;
    OrganizationListApplications => "ORGANIZATION_LIST_APPLICATIONS", Organization;
    OrganizationCreateApplications => "ORGANIZATION_CREATE_APPLICATIONS", Organization;
    OrganizationListGateways => "ORGANIZATION_LIST_GATEWAYS", Organization;
    OrganizationCreateGateways => "ORGANIZATION_CREATE_GATEWAYS", Organization;
    OrganizationListClients => "ORGANIZATION_LIST_CLIENTS", Organization;
    OrganizationCreateClients => "ORGANIZATION_CREATE_CLIENTS", Organization;
    OrganizationAddAsCollaborator => "ORGANIZATION_ADD_AS_COLLABORATOR", Organization;
    OrganizationAll => "ORGANIZATION_ALL", Organization;

    ClientInfo => "CLIENT_INFO", Client;
    ClientSettingsBasic => "CLIENT_SETTINGS_BASIC", Client;
    ClientSettingsCollaborators => "CLIENT_SETTINGS_COLLABORATORS", Client;
    ClientDelete => "CLIENT_DELETE", Client;
    ClientAll => "CLIENT_ALL", Client;
}

impl Right {
    pub fn is_all(self) -> bool {
        matches!(
            self,
            Right::UserAll
                | Right::ApplicationAll
                | Right::GatewayAll
                | Right::OrganizationAll
                | Right::ClientAll
        )
    }

    /// The synthetic right that implies every right of `kind`.
    pub fn all_for(kind: EntityKind) -> Right {
        match kind.rights_kind() {
            EntityKind::User => Right::UserAll,
            EntityKind::Application | EntityKind::EndDevice => Right::ApplicationAll,
            EntityKind::Gateway => Right::GatewayAll,
            EntityKind::Organization => Right::OrganizationAll,
            EntityKind::Client => Right::ClientAll,
        }
    }
}

impl fmt::Display for Right {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Right {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Right {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Organization rights a user must hold for the organization's own
/// memberships to flow through to them.
pub const ORG_ALL_NON_ADMIN: &[Right] = &[
    Right::OrganizationInfo,
    Right::OrganizationListApplications,
    Right::OrganizationCreateApplications,
    Right::OrganizationListGateways,
    Right::OrganizationCreateGateways,
    Right::OrganizationListClients,
    Right::OrganizationCreateClients,
];

/// Canonical set of rights.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rights(BTreeSet<Right>);

impl Rights {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Every right of every kind.
    pub fn all() -> Self {
        Right::VARIANTS.iter().copied().collect()
    }

    /// Every right of the kind governing `kind`, including its `*_ALL`.
    pub fn kind_rights(kind: EntityKind) -> Self {
        let kind = kind.rights_kind();
        Right::VARIANTS
            .iter()
            .copied()
            .filter(|right| right.kind() == kind)
            .collect()
    }

    pub fn org_all_non_admin() -> Self {
        ORG_ALL_NON_ADMIN.iter().copied().collect()
    }

    pub fn union(&self, other: &Rights) -> Rights {
        Rights(self.0.union(&other.0).copied().collect())
    }

    pub fn intersect(&self, other: &Rights) -> Rights {
        Rights(self.0.intersection(&other.0).copied().collect())
    }

    pub fn sub(&self, other: &Rights) -> Rights {
        Rights(self.0.difference(&other.0).copied().collect())
    }

    /// Closure under implication: each `*_ALL` pulls in its kind.
    pub fn implied(&self) -> Rights {
        let mut out = self.0.clone();
        for right in self.0.iter().filter(|r| r.is_all()) {
            out.extend(
                Right::VARIANTS
                    .iter()
                    .copied()
                    .filter(|candidate| candidate.kind() == right.kind()),
            );
        }
        Rights(out)
    }

    pub fn includes(&self, right: Right) -> bool {
        self.implied().0.contains(&right)
    }

    pub fn includes_all(&self, other: &Rights) -> bool {
        other.implied().sub(&self.implied()).is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Right> + '_ {
        self.0.iter().copied()
    }

    pub fn insert(&mut self, right: Right) {
        self.0.insert(right);
    }

    /// Rights that do not belong to `kind`.
    pub fn foreign_to(&self, kind: EntityKind) -> Rights {
        let kind = kind.rights_kind();
        Rights(self.0.iter().copied().filter(|r| r.kind() != kind).collect())
    }

    /// Canonical names, in canonical order.
    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|r| r.as_str().to_string()).collect()
    }

    /// Parses names as stored or sent by clients; any unknown name fails.
    pub fn parse_names<I, S>(names: I) -> Result<Rights, UnknownRight>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .map(|name| name.as_ref().parse::<Right>())
            .collect()
    }
}

impl PartialEq for Rights {
    fn eq(&self, other: &Self) -> bool {
        self.implied().0 == other.implied().0
    }
}

impl Eq for Rights {}

impl FromIterator<Right> for Rights {
    fn from_iter<T: IntoIterator<Item = Right>>(iter: T) -> Self {
        Rights(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[Right; N]> for Rights {
    fn from(value: [Right; N]) -> Self {
        value.into_iter().collect()
    }
}

impl fmt::Display for Rights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.names().join(", "))
    }
}
