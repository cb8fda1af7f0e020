//! Test helper module for identity-server integration tests.
//!
//! Provides an in-memory application with capturing event sinks and
//! seeding helpers for users, entities, memberships and access tokens.

#![allow(dead_code)]

use identity_server::{
    build_router,
    config::IdentityConfig,
    models::{
        AccessToken, AccountId, ClientId, EntityId, Event, NotificationRequest, Principal, Rights,
        User, UserId, UserState,
    },
    services::{
        membership, Dispatcher, IdentityService, MemorySink, MemoryStore, PrincipalResolver, Store,
    },
    AppState,
};
use service_core::axum::Router;
use service_core::config::Config;
use std::sync::Arc;
use std::time::Duration;

pub const CLUSTER_KEY: &str = "test-cluster-key-0123456789";

/// Test application over the in-memory store.
pub struct TestApp {
    pub store: Arc<dyn Store>,
    pub sink: MemorySink,
    pub identity: Arc<IdentityService>,
    pub dispatcher: Dispatcher,
    pub state: AppState,
}

impl TestApp {
    /// Must be called inside a tokio runtime; the dispatcher spawns its
    /// delivery task.
    pub fn spawn() -> Self {
        Self::spawn_with(true)
    }

    pub fn spawn_with(legacy_delete_via_update: bool) -> Self {
        let legacy = legacy_delete_via_update.to_string();
        let config = IdentityConfig::from_lookup(Config::default(), |key| match key {
            "SERVICE_NAME" => Some("identity-server-test".to_string()),
            "STORE_BACKEND" => Some("memory".to_string()),
            "CLUSTER_KEYS" => Some(CLUSTER_KEY.to_string()),
            "LEGACY_API_KEY_DELETE_VIA_UPDATE" => Some(legacy.clone()),
            _ => None,
        })
        .expect("Failed to build test config");

        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let sink = MemorySink::new();
        let (dispatcher, _handle) = Dispatcher::start(
            Arc::new(sink.clone()),
            Arc::new(sink.clone()),
            config.events.queue_size,
        );
        let identity = Arc::new(IdentityService::new(
            store.clone(),
            PrincipalResolver::new(config.security.cluster_keys.clone()),
            dispatcher.clone(),
            config.legacy_api_key_delete_via_update,
        ));

        let state = AppState {
            config,
            identity: identity.clone(),
        };

        Self {
            store,
            sink,
            identity,
            dispatcher,
            state,
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone()).expect("Failed to build router")
    }

    pub async fn user(&self, id: &str) -> AccountId {
        self.put_user(User::new(UserId::new(id))).await
    }

    pub async fn admin(&self, id: &str) -> AccountId {
        let mut user = User::new(UserId::new(id));
        user.admin = true;
        self.put_user(user).await
    }

    pub async fn user_in_state(&self, id: &str, state: UserState) -> AccountId {
        let mut user = User::new(UserId::new(id));
        user.state = state;
        self.put_user(user).await
    }

    async fn put_user(&self, user: User) -> AccountId {
        let account = AccountId::User(user.user_id.clone());
        let mut tx = self.store.begin().await.unwrap();
        tx.upsert_user(&user).await.unwrap();
        tx.commit().await.unwrap();
        account
    }

    /// Registers an entity without any members.
    pub async fn entity(&self, entity: &EntityId) {
        let mut tx = self.store.begin().await.unwrap();
        tx.insert_entity(entity).await.unwrap();
        tx.commit().await.unwrap();
    }

    pub async fn member(&self, account: &AccountId, entity: &EntityId, rights: Rights) {
        let mut tx = self.store.begin().await.unwrap();
        tx.upsert_membership(account, entity, &rights).await.unwrap();
        tx.commit().await.unwrap();
    }

    pub async fn rights_of(&self, account: &AccountId, entity: &EntityId) -> Option<Rights> {
        let mut tx = self.store.begin().await.unwrap();
        tx.get_membership(account, entity).await.unwrap()
    }

    /// Last-owner rule as seen by a fresh transaction.
    pub async fn has_owner(&self, entity: &EntityId) -> bool {
        let mut tx = self.store.begin().await.unwrap();
        membership::has_owner(&mut *tx, entity).await.unwrap()
    }

    pub async fn api_key_exists(&self, key_id: &str) -> bool {
        let mut tx = self.store.begin().await.unwrap();
        tx.get_api_key(key_id).await.unwrap().is_some()
    }

    /// Stores an access token for `user` and returns the `Authorization`
    /// header value that presents it.
    pub async fn token(&self, user: &str, scope: Rights) -> String {
        self.token_expiring_in(user, scope, 3600).await
    }

    pub async fn token_expiring_in(&self, user: &str, scope: Rights, expires_in: i64) -> String {
        let token = format!("tok-{}", uuid::Uuid::new_v4().simple());
        let access_token = AccessToken::new(
            &token,
            UserId::new(user),
            ClientId::new("console"),
            scope,
            expires_in,
            "https://console.example.com/oauth/callback".to_string(),
        );
        let mut tx = self.store.begin().await.unwrap();
        tx.insert_access_token(&access_token).await.unwrap();
        tx.commit().await.unwrap();
        format!("Bearer {}", token)
    }

    /// Principal of `user` through an access token with full scope.
    pub async fn login(&self, user: &str) -> Principal {
        let authorization = self.token(user, Rights::all()).await;
        self.authenticate(&authorization).await
    }

    pub async fn authenticate(&self, authorization: &str) -> Principal {
        self.identity
            .authenticate(Some(authorization), None)
            .await
            .expect("Failed to authenticate")
    }

    pub fn cluster(&self) -> Principal {
        Principal::cluster()
    }

    /// Waits until at least `count` events have been delivered.
    pub async fn wait_for_events(&self, count: usize) -> Vec<Event> {
        for _ in 0..200 {
            let events = self.sink.events().await;
            if events.len() >= count {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("Timed out waiting for {} events", count);
    }

    pub async fn wait_for_notifications(&self, count: usize) -> Vec<NotificationRequest> {
        for _ in 0..200 {
            let notifications = self.sink.notifications().await;
            if notifications.len() >= count {
                return notifications;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("Timed out waiting for {} notifications", count);
    }
}
