//! Typed identifiers for entities and accounts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MIN_ID_LENGTH: usize = 2;
const MAX_ID_LENGTH: usize = 36;

/// Identifiers that can never be registered because they collide with
/// routes or reserved names.
const BLACKLISTED_IDS: &[&str] = &[
    "admin",
    "administrator",
    "all",
    "api",
    "cluster",
    "me",
    "null",
    "root",
    "self",
    "system",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("identifier must not be empty")]
    Empty,
    #[error("invalid identifier `{0}`")]
    Invalid(String),
    #[error("identifier `{0}` is reserved")]
    Blacklisted(String),
    #[error("unknown entity kind `{0}`")]
    UnknownKind(String),
    #[error("entity kind `{0}` cannot be a member of anything")]
    NotAnAccount(String),
}

/// Checks the identifier grammar: lowercase alphanumerics separated by
/// single dashes.
pub fn validate_identifier(id: &str) -> Result<(), IdError> {
    if id.is_empty() {
        return Err(IdError::Empty);
    }
    let valid_chars = id
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
    if !valid_chars
        || id.len() < MIN_ID_LENGTH
        || id.len() > MAX_ID_LENGTH
        || id.starts_with('-')
        || id.ends_with('-')
        || id.contains("--")
    {
        return Err(IdError::Invalid(id.to_string()));
    }
    Ok(())
}

/// Like [`validate_identifier`] but also rejects reserved names. Only
/// applied when new identifiers are registered.
pub fn validate_new_identifier(id: &str) -> Result<(), IdError> {
    validate_identifier(id)?;
    if BLACKLISTED_IDS.contains(&id) {
        return Err(IdError::Blacklisted(id.to_string()));
    }
    Ok(())
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(UserId);
string_id!(OrganizationId);
string_id!(ApplicationId);
string_id!(GatewayId);
string_id!(ClientId);

/// End devices are scoped by their application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndDeviceId {
    pub application_id: ApplicationId,
    pub device_id: String,
}

impl fmt::Display for EndDeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.application_id, self.device_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Application,
    Gateway,
    Organization,
    Client,
    EndDevice,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Application => "application",
            EntityKind::Gateway => "gateway",
            EntityKind::Organization => "organization",
            EntityKind::Client => "client",
            EntityKind::EndDevice => "end_device",
        }
    }

    /// Collection name used in HTTP paths.
    pub fn plural(&self) -> &'static str {
        match self {
            EntityKind::User => "users",
            EntityKind::Application => "applications",
            EntityKind::Gateway => "gateways",
            EntityKind::Organization => "organizations",
            EntityKind::Client => "clients",
            EntityKind::EndDevice => "end_devices",
        }
    }

    pub fn from_plural(s: &str) -> Result<Self, IdError> {
        match s {
            "users" => Ok(EntityKind::User),
            "applications" => Ok(EntityKind::Application),
            "gateways" => Ok(EntityKind::Gateway),
            "organizations" => Ok(EntityKind::Organization),
            "clients" => Ok(EntityKind::Client),
            "end_devices" => Ok(EntityKind::EndDevice),
            _ => Err(IdError::UnknownKind(s.to_string())),
        }
    }

    /// Kind whose rights govern this kind. End devices inherit from
    /// their application.
    pub fn rights_kind(&self) -> EntityKind {
        match self {
            EntityKind::EndDevice => EntityKind::Application,
            other => *other,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(EntityKind::User),
            "application" => Ok(EntityKind::Application),
            "gateway" => Ok(EntityKind::Gateway),
            "organization" => Ok(EntityKind::Organization),
            "client" => Ok(EntityKind::Client),
            "end_device" => Ok(EntityKind::EndDevice),
            _ => Err(IdError::UnknownKind(s.to_string())),
        }
    }
}

/// Anything that can be the target of an access-control decision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "EntityRef", into = "EntityRef")]
pub enum EntityId {
    User(UserId),
    Application(ApplicationId),
    Gateway(GatewayId),
    Organization(OrganizationId),
    Client(ClientId),
    EndDevice(EndDeviceId),
}

impl EntityId {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityId::User(_) => EntityKind::User,
            EntityId::Application(_) => EntityKind::Application,
            EntityId::Gateway(_) => EntityKind::Gateway,
            EntityId::Organization(_) => EntityKind::Organization,
            EntityId::Client(_) => EntityKind::Client,
            EntityId::EndDevice(_) => EntityKind::EndDevice,
        }
    }

    /// String form of the identifier without the kind tag. End devices
    /// render as `application/device`.
    pub fn id_string(&self) -> String {
        match self {
            EntityId::User(id) => id.to_string(),
            EntityId::Application(id) => id.to_string(),
            EntityId::Gateway(id) => id.to_string(),
            EntityId::Organization(id) => id.to_string(),
            EntityId::Client(id) => id.to_string(),
            EntityId::EndDevice(id) => id.to_string(),
        }
    }

    /// Parses an identifier of the given kind, checking its grammar.
    pub fn parse(kind: EntityKind, id: &str) -> Result<Self, IdError> {
        if kind != EntityKind::EndDevice {
            validate_identifier(id)?;
        }
        Ok(match kind {
            EntityKind::User => EntityId::User(UserId::new(id)),
            EntityKind::Application => EntityId::Application(ApplicationId::new(id)),
            EntityKind::Gateway => EntityId::Gateway(GatewayId::new(id)),
            EntityKind::Organization => EntityId::Organization(OrganizationId::new(id)),
            EntityKind::Client => EntityId::Client(ClientId::new(id)),
            EntityKind::EndDevice => {
                let (application_id, device_id) = id
                    .split_once('/')
                    .ok_or_else(|| IdError::Invalid(id.to_string()))?;
                validate_identifier(application_id)?;
                validate_identifier(device_id)?;
                EntityId::EndDevice(EndDeviceId {
                    application_id: ApplicationId::new(application_id),
                    device_id: device_id.to_string(),
                })
            }
        })
    }

    /// The entity whose memberships govern this one.
    pub fn rights_scope(&self) -> EntityId {
        match self {
            EntityId::EndDevice(id) => EntityId::Application(id.application_id.clone()),
            other => other.clone(),
        }
    }

    /// Users and organizations double as accounts.
    pub fn as_account(&self) -> Option<AccountId> {
        match self {
            EntityId::User(id) => Some(AccountId::User(id.clone())),
            EntityId::Organization(id) => Some(AccountId::Organization(id.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id_string())
    }
}

/// Wire form of [`EntityId`] and [`AccountId`]: `{"kind": "...", "id": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

impl TryFrom<EntityRef> for EntityId {
    type Error = IdError;

    fn try_from(value: EntityRef) -> Result<Self, Self::Error> {
        EntityId::parse(value.kind, &value.id)
    }
}

impl From<EntityId> for EntityRef {
    fn from(value: EntityId) -> Self {
        EntityRef {
            kind: value.kind(),
            id: value.id_string(),
        }
    }
}

/// A principal that can be a member of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "EntityRef", into = "EntityRef")]
pub enum AccountId {
    User(UserId),
    Organization(OrganizationId),
}

impl AccountId {
    pub fn kind(&self) -> EntityKind {
        match self {
            AccountId::User(_) => EntityKind::User,
            AccountId::Organization(_) => EntityKind::Organization,
        }
    }

    pub fn id_str(&self) -> &str {
        match self {
            AccountId::User(id) => id.as_str(),
            AccountId::Organization(id) => id.as_str(),
        }
    }

    pub fn parse(kind: EntityKind, id: &str) -> Result<Self, IdError> {
        EntityId::parse(kind, id)?
            .as_account()
            .ok_or_else(|| IdError::NotAnAccount(kind.to_string()))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id_str())
    }
}

impl From<AccountId> for EntityId {
    fn from(value: AccountId) -> Self {
        match value {
            AccountId::User(id) => EntityId::User(id),
            AccountId::Organization(id) => EntityId::Organization(id),
        }
    }
}

impl From<&AccountId> for EntityId {
    fn from(value: &AccountId) -> Self {
        value.clone().into()
    }
}

impl TryFrom<EntityRef> for AccountId {
    type Error = IdError;

    fn try_from(value: EntityRef) -> Result<Self, Self::Error> {
        AccountId::parse(value.kind, &value.id)
    }
}

impl From<AccountId> for EntityRef {
    fn from(value: AccountId) -> Self {
        EntityRef {
            kind: value.kind(),
            id: value.id_str().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_grammar() {
        assert!(validate_identifier("app-a").is_ok());
        assert!(validate_identifier("gtw-1").is_ok());
        assert_eq!(validate_identifier(""), Err(IdError::Empty));
        assert!(validate_identifier("App").is_err());
        assert!(validate_identifier("-app").is_err());
        assert!(validate_identifier("app-").is_err());
        assert!(validate_identifier("a--b").is_err());
        assert!(validate_identifier("a").is_err());
        assert!(validate_identifier(&"a".repeat(37)).is_err());
        assert!(validate_identifier("has.dot").is_err());
    }

    #[test]
    fn test_blacklisted_identifiers() {
        assert!(validate_identifier("admin").is_ok());
        assert_eq!(
            validate_new_identifier("admin"),
            Err(IdError::Blacklisted("admin".to_string()))
        );
        assert!(validate_new_identifier("acme").is_ok());
    }

    #[test]
    fn test_end_device_rights_scope() {
        let device = EntityId::parse(EntityKind::EndDevice, "app-a/dev-1").unwrap();
        assert_eq!(device.kind(), EntityKind::EndDevice);
        assert_eq!(
            device.rights_scope(),
            EntityId::Application(ApplicationId::new("app-a"))
        );
        assert_eq!(device.to_string(), "end_device:app-a/dev-1");
        assert!(EntityId::parse(EntityKind::EndDevice, "dev-1").is_err());
    }

    #[test]
    fn test_account_conversion() {
        let org = EntityId::Organization(OrganizationId::new("acme"));
        assert_eq!(
            org.as_account(),
            Some(AccountId::Organization(OrganizationId::new("acme")))
        );
        assert_eq!(
            EntityId::Gateway(GatewayId::new("gtw-1")).as_account(),
            None
        );
        assert_eq!(
            AccountId::parse(EntityKind::Application, "app-a"),
            Err(IdError::NotAnAccount("application".to_string()))
        );
    }

    #[test]
    fn test_wire_format() {
        let id = EntityId::Application(ApplicationId::new("app-a"));
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "application", "id": "app-a"}));

        let parsed: AccountId =
            serde_json::from_value(serde_json::json!({"kind": "user", "id": "alice"})).unwrap();
        assert_eq!(parsed, AccountId::User(UserId::new("alice")));

        let invalid: Result<AccountId, _> =
            serde_json::from_value(serde_json::json!({"kind": "gateway", "id": "gtw-1"}));
        assert!(invalid.is_err());
    }

    #[test]
    fn test_plural_kinds() {
        for kind in [
            EntityKind::User,
            EntityKind::Application,
            EntityKind::Gateway,
            EntityKind::Organization,
            EntityKind::Client,
        ] {
            assert_eq!(EntityKind::from_plural(kind.plural()), Ok(kind));
            assert_eq!(kind.as_str().parse::<EntityKind>(), Ok(kind));
        }
    }
}
