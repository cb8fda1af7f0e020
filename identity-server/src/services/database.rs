//! PostgreSQL store.
//!
//! Every transaction runs at SERIALIZABLE isolation so the policy checks
//! and the mutation they guard see one consistent snapshot. Conflicting
//! transactions fail with SQLSTATE 40001 and surface as
//! [`StoreError::SerializationFailure`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, Postgres};
use sqlx::{FromRow, Transaction};
use std::time::Duration;

use crate::config::DatabaseConfig;

use crate::models::{
    AccessToken, AccountId, ApiKey, ClientId, Collaborator, EntityId, EntityKind, Rights, User,
    UserId,
};

use super::store::{Store, StoreError, StoreTx};

const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const UNIQUE_VIOLATION: &str = "23505";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.code().as_deref() {
                Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) => {
                    return StoreError::SerializationFailure;
                }
                Some(UNIQUE_VIOLATION) => {
                    return StoreError::UniqueViolation(
                        db_err.constraint().unwrap_or_default().to_string(),
                    );
                }
                _ => {}
            }
        }
        StoreError::Database(anyhow::anyhow!(err))
    }
}

/// PostgreSQL-backed [`Store`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool sized by `config`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(&config.url)
            .await?;

        tracing::info!("Successfully connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(anyhow::anyhow!(e)))?;
        tracing::info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                StoreError::from(e)
            })?;
        Ok(())
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[derive(FromRow)]
struct UserRow {
    user_id: String,
    admin: bool,
    state: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            user_id: UserId::new(row.user_id),
            admin: row.admin,
            state: row.state.parse().map_err(StoreError::Corrupt)?,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct MembershipRow {
    account_kind: String,
    account_id: String,
    entity_kind: String,
    entity_id: String,
    rights: Vec<String>,
}

#[derive(FromRow)]
struct ApiKeyRow {
    key_id: String,
    entity_kind: String,
    entity_id: String,
    name: String,
    secret_hash: String,
    rights: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<ApiKeyRow> for ApiKey {
    type Error = StoreError;

    fn try_from(row: ApiKeyRow) -> Result<Self, Self::Error> {
        Ok(ApiKey {
            id: row.key_id,
            entity: parse_entity(&row.entity_kind, &row.entity_id)?,
            name: row.name,
            secret_hash: row.secret_hash,
            rights: parse_rights(&row.rights)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            expires_at: row.expires_at,
        })
    }
}

#[derive(FromRow)]
struct AccessTokenRow {
    token_hash: String,
    user_id: String,
    client_id: String,
    scope: Vec<String>,
    created_at: DateTime<Utc>,
    expires_in: i64,
    redirect_uri: String,
}

impl TryFrom<AccessTokenRow> for AccessToken {
    type Error = StoreError;

    fn try_from(row: AccessTokenRow) -> Result<Self, Self::Error> {
        Ok(AccessToken {
            token_hash: row.token_hash,
            user_id: UserId::new(row.user_id),
            client_id: ClientId::new(row.client_id),
            scope: parse_rights(&row.scope)?,
            created_at: row.created_at,
            expires_in: row.expires_in,
            redirect_uri: row.redirect_uri,
        })
    }
}

fn parse_entity(kind: &str, id: &str) -> Result<EntityId, StoreError> {
    let kind: EntityKind = kind
        .parse()
        .map_err(|e| StoreError::Corrupt(format!("{}", e)))?;
    EntityId::parse(kind, id).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn parse_account(kind: &str, id: &str) -> Result<AccountId, StoreError> {
    let kind: EntityKind = kind
        .parse()
        .map_err(|e| StoreError::Corrupt(format!("{}", e)))?;
    AccountId::parse(kind, id).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn parse_rights(names: &[String]) -> Result<Rights, StoreError> {
    Rights::parse_names(names).map_err(|e| StoreError::Corrupt(e.to_string()))
}

#[async_trait]
impl StoreTx for PgTx {
    async fn get_user(&mut self, user_id: &UserId) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>(
            "SELECT user_id, admin, state, created_at FROM users WHERE user_id = $1",
        )
        .bind(user_id.as_str())
        .fetch_optional(&mut *self.tx)
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn upsert_user(&mut self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, admin, state, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE SET admin = EXCLUDED.admin, state = EXCLUDED.state
            "#,
        )
        .bind(user.user_id.as_str())
        .bind(user.admin)
        .bind(user.state.as_str())
        .bind(user.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn entity_exists(&mut self, entity: &EntityId) -> Result<bool, StoreError> {
        let exists = match entity {
            EntityId::User(user_id) => {
                sqlx::query_scalar::<_, bool>(
                    "SELECT EXISTS (SELECT 1 FROM users WHERE user_id = $1)",
                )
                .bind(user_id.as_str())
                .fetch_one(&mut *self.tx)
                .await?
            }
            other => {
                sqlx::query_scalar::<_, bool>(
                    "SELECT EXISTS (SELECT 1 FROM entities \
                     WHERE entity_kind = $1 AND entity_id = $2)",
                )
                .bind(other.kind().as_str())
                .bind(other.id_string())
                .fetch_one(&mut *self.tx)
                .await?
            }
        };
        Ok(exists)
    }

    async fn insert_entity(&mut self, entity: &EntityId) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO entities (entity_kind, entity_id) VALUES ($1, $2)")
            .bind(entity.kind().as_str())
            .bind(entity.id_string())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn get_membership(
        &mut self,
        account: &AccountId,
        entity: &EntityId,
    ) -> Result<Option<Rights>, StoreError> {
        let rights = sqlx::query_scalar::<_, Vec<String>>(
            r#"
            SELECT rights FROM memberships
            WHERE account_kind = $1 AND account_id = $2 AND entity_kind = $3 AND entity_id = $4
            "#,
        )
        .bind(account.kind().as_str())
        .bind(account.id_str())
        .bind(entity.kind().as_str())
        .bind(entity.id_string())
        .fetch_optional(&mut *self.tx)
        .await?;

        rights.map(|names| parse_rights(&names)).transpose()
    }

    async fn upsert_membership(
        &mut self,
        account: &AccountId,
        entity: &EntityId,
        rights: &Rights,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO memberships (account_kind, account_id, entity_kind, entity_id, rights)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (account_kind, account_id, entity_kind, entity_id)
            DO UPDATE SET rights = EXCLUDED.rights
            "#,
        )
        .bind(account.kind().as_str())
        .bind(account.id_str())
        .bind(entity.kind().as_str())
        .bind(entity.id_string())
        .bind(rights.names())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_membership(
        &mut self,
        account: &AccountId,
        entity: &EntityId,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM memberships
            WHERE account_kind = $1 AND account_id = $2 AND entity_kind = $3 AND entity_id = $4
            "#,
        )
        .bind(account.kind().as_str())
        .bind(account.id_str())
        .bind(entity.kind().as_str())
        .bind(entity.id_string())
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_members(&mut self, entity: &EntityId) -> Result<Vec<Collaborator>, StoreError> {
        let rows = sqlx::query_as::<_, MembershipRow>(
            r#"
            SELECT account_kind, account_id, entity_kind, entity_id, rights FROM memberships
            WHERE entity_kind = $1 AND entity_id = $2
            ORDER BY account_kind DESC, account_id
            "#,
        )
        .bind(entity.kind().as_str())
        .bind(entity.id_string())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(Collaborator::new(
                    parse_account(&row.account_kind, &row.account_id)?,
                    parse_rights(&row.rights)?,
                ))
            })
            .collect()
    }

    async fn list_memberships(
        &mut self,
        account: &AccountId,
    ) -> Result<Vec<(EntityId, Rights)>, StoreError> {
        let rows = sqlx::query_as::<_, MembershipRow>(
            r#"
            SELECT account_kind, account_id, entity_kind, entity_id, rights FROM memberships
            WHERE account_kind = $1 AND account_id = $2
            "#,
        )
        .bind(account.kind().as_str())
        .bind(account.id_str())
        .fetch_all(&mut *self.tx)
        .await?;

        let mut memberships = rows
            .into_iter()
            .map(|row| {
                Ok((
                    parse_entity(&row.entity_kind, &row.entity_id)?,
                    parse_rights(&row.rights)?,
                ))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        memberships.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(memberships)
    }

    async fn get_api_key(&mut self, key_id: &str) -> Result<Option<ApiKey>, StoreError> {
        sqlx::query_as::<_, ApiKeyRow>(
            r#"
            SELECT key_id, entity_kind, entity_id, name, secret_hash, rights,
                   created_at, updated_at, expires_at
            FROM api_keys WHERE key_id = $1
            "#,
        )
        .bind(key_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .map(ApiKey::try_from)
        .transpose()
    }

    async fn list_api_keys(&mut self, entity: &EntityId) -> Result<Vec<ApiKey>, StoreError> {
        let rows = sqlx::query_as::<_, ApiKeyRow>(
            r#"
            SELECT key_id, entity_kind, entity_id, name, secret_hash, rights,
                   created_at, updated_at, expires_at
            FROM api_keys WHERE entity_kind = $1 AND entity_id = $2
            ORDER BY created_at, key_id
            "#,
        )
        .bind(entity.kind().as_str())
        .bind(entity.id_string())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(ApiKey::try_from).collect()
    }

    async fn insert_api_key(&mut self, key: &ApiKey) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO api_keys (key_id, entity_kind, entity_id, name, secret_hash, rights,
                                  created_at, updated_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&key.id)
        .bind(key.entity.kind().as_str())
        .bind(key.entity.id_string())
        .bind(&key.name)
        .bind(&key.secret_hash)
        .bind(key.rights.names())
        .bind(key.created_at)
        .bind(key.updated_at)
        .bind(key.expires_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_api_key(&mut self, key: &ApiKey) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE api_keys
            SET name = $2, secret_hash = $3, rights = $4, updated_at = $5, expires_at = $6
            WHERE key_id = $1
            "#,
        )
        .bind(&key.id)
        .bind(&key.name)
        .bind(&key.secret_hash)
        .bind(key.rights.names())
        .bind(key.updated_at)
        .bind(key.expires_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_api_key(&mut self, key_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM api_keys WHERE key_id = $1")
            .bind(key_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_access_token(
        &mut self,
        token_hash: &str,
    ) -> Result<Option<AccessToken>, StoreError> {
        sqlx::query_as::<_, AccessTokenRow>(
            r#"
            SELECT token_hash, user_id, client_id, scope, created_at, expires_in, redirect_uri
            FROM access_tokens WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&mut *self.tx)
        .await?
        .map(AccessToken::try_from)
        .transpose()
    }

    async fn insert_access_token(&mut self, token: &AccessToken) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO access_tokens (token_hash, user_id, client_id, scope, created_at,
                                       expires_in, redirect_uri)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&token.token_hash)
        .bind(token.user_id.as_str())
        .bind(token.client_id.as_str())
        .bind(token.scope.names())
        .bind(token.created_at)
        .bind(token.expires_in)
        .bind(&token.redirect_uri)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PgTx { tx } = *self;
        tx.commit().await?;
        Ok(())
    }
}
