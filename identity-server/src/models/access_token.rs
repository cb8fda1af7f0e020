use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::ids::{ClientId, UserId};
use super::rights::Rights;

/// OAuth access token issued elsewhere. The token value itself is never
/// stored; rows are keyed by its SHA-256.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessToken {
    pub token_hash: String,
    pub user_id: UserId,
    pub client_id: ClientId,
    pub scope: Rights,
    pub created_at: DateTime<Utc>,
    /// Lifetime in seconds.
    pub expires_in: i64,
    pub redirect_uri: String,
}

impl AccessToken {
    pub fn new(
        token: &str,
        user_id: UserId,
        client_id: ClientId,
        scope: Rights,
        expires_in: i64,
        redirect_uri: String,
    ) -> Self {
        Self {
            token_hash: Self::calculate_lookup_hash(token),
            user_id,
            client_id,
            scope,
            created_at: Utc::now(),
            expires_in,
            redirect_uri,
        }
    }

    pub fn calculate_lookup_hash(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + Duration::seconds(self.expires_in)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rights::Right;

    #[test]
    fn test_lookup_hash_is_stable_hex() {
        let a = AccessToken::calculate_lookup_hash("opaque-token");
        let b = AccessToken::calculate_lookup_hash("opaque-token");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, AccessToken::calculate_lookup_hash("other-token"));
    }

    #[test]
    fn test_expiry() {
        let mut token = AccessToken::new(
            "opaque-token",
            UserId::new("alice"),
            ClientId::new("console"),
            Rights::from([Right::ApplicationInfo]),
            3600,
            "https://console.example.com/oauth/callback".to_string(),
        );
        assert!(!token.is_expired(Utc::now()));

        token.created_at = Utc::now() - Duration::hours(2);
        assert!(token.is_expired(Utc::now()));
    }
}
