//! Turns request credentials into a [`Principal`].

use chrono::{DateTime, Utc};

use crate::models::{
    AccessToken, EntityId, Principal, PrincipalSource, RestrictionSet, Rights, User,
};
use crate::utils::{
    constant_time_eq, credential::parse_authorization, verify_secret, ApiKeyToken, Credential,
    Secret, SecretHash,
};

use super::error::ServiceError;
use super::store::StoreTx;

/// Header carrying the shared key of a cluster peer.
pub const CLUSTER_AUTH_HEADER: &str = "x-cluster-auth";

#[derive(Clone, Default)]
pub struct PrincipalResolver {
    cluster_keys: Vec<Secret>,
}

impl PrincipalResolver {
    pub fn new(cluster_keys: Vec<String>) -> Self {
        Self {
            cluster_keys: cluster_keys.into_iter().map(Secret::new).collect(),
        }
    }

    fn is_cluster_peer(&self, presented: &str) -> bool {
        // Check every key so timing does not reveal which one matched.
        self.cluster_keys
            .iter()
            .fold(false, |found, key| constant_time_eq(key.as_str(), presented) | found)
    }

    /// Resolve the caller. No credential at all is an anonymous principal,
    /// not an error.
    pub async fn resolve(
        &self,
        tx: &mut dyn StoreTx,
        authorization: Option<&str>,
        cluster_auth: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Principal, ServiceError> {
        if let Some(presented) = cluster_auth {
            if self.is_cluster_peer(presented) {
                return Ok(Principal::cluster());
            }
            tracing::warn!("Rejected cluster credential");
            return Err(ServiceError::Unauthenticated);
        }

        let Some(value) = authorization else {
            return Ok(Principal::anonymous());
        };

        match parse_authorization(value)? {
            Credential::ApiKey(token) => resolve_api_key(tx, token, now).await,
            Credential::AccessToken(token) => resolve_access_token(tx, &token, now).await,
        }
    }
}

async fn resolve_api_key(
    tx: &mut dyn StoreTx,
    token: ApiKeyToken,
    now: DateTime<Utc>,
) -> Result<Principal, ServiceError> {
    let Some(key) = tx.get_api_key(&token.key_id).await? else {
        tracing::debug!(key_id = %token.key_id, "Unknown API key");
        return Err(ServiceError::Unauthenticated);
    };

    if verify_secret(&token.secret, &SecretHash::new(key.secret_hash.clone())).is_err() {
        tracing::warn!(key_id = %key.id, "API key secret mismatch");
        return Err(ServiceError::Unauthenticated);
    }
    if key.entity.kind() != token.kind {
        tracing::warn!(key_id = %key.id, presented = %token.kind, "API key kind mismatch");
        return Err(ServiceError::Unauthenticated);
    }
    if key.is_expired(now) {
        return Err(ServiceError::CredentialExpired);
    }

    let mut principal = Principal {
        source: PrincipalSource::ApiKey,
        subject: Some(key.entity.clone()),
        granted: key.rights.clone(),
        universal: Rights::new(),
        key_id: Some(key.id.clone()),
        restrictions: RestrictionSet::new(),
    };

    if let EntityId::User(user_id) = &key.entity {
        let Some(user) = tx.get_user(user_id).await? else {
            tracing::warn!(key_id = %key.id, user = %user_id, "API key of missing user");
            return Err(ServiceError::Unauthenticated);
        };
        apply_user(&mut principal, &user);
    }

    Ok(principal)
}

async fn resolve_access_token(
    tx: &mut dyn StoreTx,
    token: &Secret,
    now: DateTime<Utc>,
) -> Result<Principal, ServiceError> {
    let lookup_hash = AccessToken::calculate_lookup_hash(token.as_str());
    let Some(stored) = tx.get_access_token(&lookup_hash).await? else {
        return Err(ServiceError::Unauthenticated);
    };
    if stored.is_expired(now) {
        return Err(ServiceError::TokenExpired);
    }
    let Some(user) = tx.get_user(&stored.user_id).await? else {
        tracing::warn!(user = %stored.user_id, "Access token of missing user");
        return Err(ServiceError::Unauthenticated);
    };

    let mut principal = Principal {
        source: PrincipalSource::AccessToken,
        subject: Some(EntityId::User(stored.user_id.clone())),
        granted: stored.scope.clone(),
        universal: Rights::new(),
        key_id: None,
        restrictions: RestrictionSet::new(),
    };
    apply_user(&mut principal, &user);
    Ok(principal)
}

fn apply_user(principal: &mut Principal, user: &User) {
    principal.restrictions = RestrictionSet::from(user.state);
    if user.admin && principal.restrictions.is_empty() {
        principal.universal = Rights::all().intersect(&principal.granted.implied());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ApiKey, ApplicationId, ClientId, EntityKind, Restriction, Right, UserId, UserState,
    };
    use crate::services::memory::MemoryStore;
    use crate::services::store::Store;
    use crate::utils::{generate_key_id, generate_secret, hash_secret};
    use chrono::Duration;

    async fn issue_key(store: &MemoryStore, entity: EntityId, rights: Rights) -> String {
        let secret = generate_secret();
        let key = ApiKey::new(
            generate_key_id(),
            entity.clone(),
            "test".to_string(),
            hash_secret(&secret).unwrap().into_string(),
            rights,
            None,
        );
        let mut tx = store.begin().await.unwrap();
        tx.insert_api_key(&key).await.unwrap();
        tx.commit().await.unwrap();
        format!("Bearer {}", ApiKeyToken::new(entity.kind(), key.id, secret).encode())
    }

    #[tokio::test]
    async fn test_missing_header_is_anonymous() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let principal = PrincipalResolver::default()
            .resolve(&mut *tx, None, None, Utc::now())
            .await
            .unwrap();
        assert_eq!(principal.source, PrincipalSource::Anonymous);
        assert!(principal.granted.is_empty());
    }

    #[tokio::test]
    async fn test_api_key_round_trip() {
        let store = MemoryStore::new();
        let app = EntityId::Application(ApplicationId::new("app-a"));
        let rights = Rights::from([Right::ApplicationInfo, Right::ApplicationDevicesRead]);
        let bearer = issue_key(&store, app.clone(), rights.clone()).await;

        let mut tx = store.begin().await.unwrap();
        let principal = PrincipalResolver::default()
            .resolve(&mut *tx, Some(&bearer), None, Utc::now())
            .await
            .unwrap();
        assert_eq!(principal.source, PrincipalSource::ApiKey);
        assert_eq!(principal.subject, Some(app));
        assert_eq!(principal.granted, rights);
    }

    #[tokio::test]
    async fn test_wrong_secret_and_kind() {
        let store = MemoryStore::new();
        let app = EntityId::Application(ApplicationId::new("app-a"));
        let bearer = issue_key(&store, app, Rights::from([Right::ApplicationInfo])).await;
        let resolver = PrincipalResolver::default();

        let mut tampered = bearer.clone();
        tampered.pop();
        tampered.push(if bearer.ends_with('A') { 'B' } else { 'A' });
        let mut tx = store.begin().await.unwrap();
        let err = resolver
            .resolve(&mut *tx, Some(&tampered), None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthenticated));

        let as_gateway = bearer.replacen("application.", "gateway.", 1);
        let err = resolver
            .resolve(&mut *tx, Some(&as_gateway), None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_expired_api_key() {
        let store = MemoryStore::new();
        let secret = generate_secret();
        let entity = EntityId::Application(ApplicationId::new("app-a"));
        let key = ApiKey::new(
            generate_key_id(),
            entity,
            "old".to_string(),
            hash_secret(&secret).unwrap().into_string(),
            Rights::from([Right::ApplicationInfo]),
            Some(Utc::now() - Duration::minutes(1)),
        );
        let mut tx = store.begin().await.unwrap();
        tx.insert_api_key(&key).await.unwrap();
        let bearer = format!(
            "Bearer {}",
            ApiKeyToken::new(EntityKind::Application, key.id.clone(), secret).encode()
        );

        let err = PrincipalResolver::default()
            .resolve(&mut *tx, Some(&bearer), None, Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.name(), "credential_expired");
    }

    #[tokio::test]
    async fn test_access_token_of_admin() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let alice = UserId::new("alice");
        tx.upsert_user(&User::new(alice.clone()).with_admin(true)).await.unwrap();
        let scope = Rights::from([Right::ApplicationAll, Right::UserInfo]);
        tx.insert_access_token(&AccessToken::new(
            "opaque-token",
            alice.clone(),
            ClientId::new("console"),
            scope.clone(),
            3600,
            String::new(),
        ))
        .await
        .unwrap();

        let principal = PrincipalResolver::default()
            .resolve(&mut *tx, Some("Bearer opaque-token"), None, Utc::now())
            .await
            .unwrap();
        assert_eq!(principal.source, PrincipalSource::AccessToken);
        assert_eq!(principal.subject, Some(EntityId::User(alice)));
        assert_eq!(principal.granted, scope);
        assert_eq!(principal.universal, scope.implied());
    }

    #[tokio::test]
    async fn test_expired_token_and_restrictions() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let bob = UserId::new("bob");
        tx.upsert_user(&User::new(bob.clone()).with_admin(true).with_state(UserState::Suspended))
            .await
            .unwrap();
        let mut expired = AccessToken::new(
            "stale",
            bob.clone(),
            ClientId::new("console"),
            Rights::from([Right::UserAll]),
            60,
            String::new(),
        );
        expired.created_at = Utc::now() - Duration::hours(1);
        tx.insert_access_token(&expired).await.unwrap();
        tx.insert_access_token(&AccessToken::new(
            "fresh",
            bob,
            ClientId::new("console"),
            Rights::from([Right::UserAll]),
            3600,
            String::new(),
        ))
        .await
        .unwrap();

        let resolver = PrincipalResolver::default();
        let err = resolver
            .resolve(&mut *tx, Some("Bearer stale"), None, Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.name(), "token_expired");

        let principal = resolver
            .resolve(&mut *tx, Some("Bearer fresh"), None, Utc::now())
            .await
            .unwrap();
        assert!(principal.restrictions.contains(Restriction::Suspended));
        assert!(principal.universal.is_empty());
    }

    #[tokio::test]
    async fn test_cluster_keys() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let resolver = PrincipalResolver::new(vec!["peer-secret".to_string()]);

        let principal = resolver
            .resolve(&mut *tx, None, Some("peer-secret"), Utc::now())
            .await
            .unwrap();
        assert_eq!(principal.source, PrincipalSource::ClusterAuth);
        assert_eq!(principal.universal, Rights::all());

        assert!(resolver
            .resolve(&mut *tx, None, Some("guess"), Utc::now())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_malformed_bearer() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = PrincipalResolver::default()
            .resolve(&mut *tx, Some("Basic Zm9vOmJhcg=="), None, Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.name(), "malformed_credential");
    }
}
