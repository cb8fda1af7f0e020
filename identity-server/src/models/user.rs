//! User model - the account behind access tokens and user API keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::ids::UserId;

/// User state codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserState {
    Requested,
    Approved,
    Rejected,
    Suspended,
}

impl UserState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserState::Requested => "requested",
            UserState::Approved => "approved",
            UserState::Rejected => "rejected",
            UserState::Suspended => "suspended",
        }
    }
}

impl FromStr for UserState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(UserState::Requested),
            "approved" => Ok(UserState::Approved),
            "rejected" => Ok(UserState::Rejected),
            "suspended" => Ok(UserState::Suspended),
            _ => Err(format!("Invalid user state: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub admin: bool,
    pub state: UserState,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new approved, non-admin user.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            admin: false,
            state: UserState::Approved,
            created_at: Utc::now(),
        }
    }

    pub fn with_admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }

    pub fn with_state(mut self, state: UserState) -> Self {
        self.state = state;
        self
    }
}
