pub mod access_token;
pub mod api_key;
pub mod collaborator;
pub mod event;
pub mod ids;
pub mod principal;
pub mod rights;
pub mod user;

pub use access_token::AccessToken;
pub use api_key::{ApiKey, SanitizedApiKey};
pub use collaborator::Collaborator;
pub use event::{Event, EventType, NotificationRequest, NotificationType, Receiver};
pub use ids::{
    AccountId, ApplicationId, ClientId, EndDeviceId, EntityId, EntityKind, EntityRef, GatewayId,
    IdError, OrganizationId, UserId, validate_identifier, validate_new_identifier,
};
pub use principal::{Principal, PrincipalSource, Restriction, RestrictionSet};
pub use rights::{Right, Rights, UnknownRight, ORG_ALL_NON_ADMIN};
pub use user::{User, UserState};
