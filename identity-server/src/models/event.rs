//! Events and notification requests emitted after committed mutations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::EntityId;

/// Operation part of an event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Create,
    ApiKeyCreate,
    ApiKeyUpdate,
    ApiKeyDelete,
    CollaboratorUpdate,
    CollaboratorDelete,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Create => "create",
            EventType::ApiKeyCreate => "api-key.create",
            EventType::ApiKeyUpdate => "api-key.update",
            EventType::ApiKeyDelete => "api-key.delete",
            EventType::CollaboratorUpdate => "collaborator.update",
            EventType::CollaboratorDelete => "collaborator.delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// `{entity_kind}.{operation}`, e.g. `gateway.api-key.delete`.
    pub name: String,
    pub entity: EntityId,
    pub actor: String,
    pub data: serde_json::Value,
    pub time: DateTime<Utc>,
}

impl Event {
    pub fn new(
        entity: EntityId,
        event_type: EventType,
        actor: String,
        data: serde_json::Value,
    ) -> Self {
        Self {
            name: format!("{}.{}", entity.kind(), event_type.as_str()),
            entity,
            actor,
            data,
            time: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    ApiKeyCreated,
    ApiKeyChanged,
    CollaboratorChanged,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::ApiKeyCreated => "api_key_created",
            NotificationType::ApiKeyChanged => "api_key_changed",
            NotificationType::CollaboratorChanged => "collaborator_changed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Receiver {
    AdministrativeContact,
    TechnicalContact,
    Collaborator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub entity: EntityId,
    pub notification_type: NotificationType,
    pub receivers: Vec<Receiver>,
    pub payload: serde_json::Value,
    pub actor: String,
}

impl NotificationRequest {
    pub fn new(
        entity: EntityId,
        notification_type: NotificationType,
        receivers: Vec<Receiver>,
        payload: serde_json::Value,
        actor: String,
    ) -> Self {
        Self {
            entity,
            notification_type,
            receivers,
            payload,
            actor,
        }
    }
}
