use chrono::{DateTime, Utc};
use serde::Deserialize;
use validator::Validate;

use crate::models::Rights;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateApiKeyRequest {
    #[validate(length(min = 1, max = 50, message = "Name must be 1 to 50 characters"))]
    pub name: String,

    pub rights: Rights,

    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Key fields as sent on update. Which of them apply is decided by the
/// field mask.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ApiKeyFields {
    #[validate(length(min = 1, max = 50, message = "Name must be 1 to 50 characters"))]
    pub name: Option<String>,

    #[serde(default)]
    pub rights: Rights,

    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldMask {
    #[serde(default)]
    pub paths: Vec<String>,
}

impl FieldMask {
    pub const NAME: &'static str = "name";
    pub const RIGHTS: &'static str = "rights";
    pub const EXPIRES_AT: &'static str = "expires_at";

    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    /// First path this mask does not know about.
    pub fn unknown_path(&self) -> Option<&str> {
        self.paths
            .iter()
            .map(String::as_str)
            .find(|p| ![Self::NAME, Self::RIGHTS, Self::EXPIRES_AT].contains(p))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateApiKeyRequest {
    #[serde(default)]
    pub api_key: ApiKeyFields,

    #[serde(default)]
    pub field_mask: FieldMask,
}
