use std::{sync::Arc, time::Duration};

use crate::{
    domain::{
        error::DomainError,
        id::ShortCode,
        models::{NewShortLink, NewUser, ShortLink, User},
        repository::{ShortLinkRepository, Store, UserRepository},
    },
    postgres::config::Config,
};
use anyhow::{Context, Result, anyhow};
use backon::{ExponentialBuilder, Retryable};
use chrono::{DateTime, Utc};
use const_format::formatcp;
use deadpool_postgres::{Client, Pool, PoolConfig, Runtime};
use serde::Deserialize;
use tokio_pg_mapper::FromTokioPostgresRow;
use tokio_pg_mapper_derive::PostgresMapper;
use tokio_postgres::{NoTls, error::SqlState};
use uuid::Uuid;

const USERS_TABLE_NAME: &str = "users";
const USER_COLUMNS: &str = "id, email, full_name, password_hash, refresh_token, created_at";
const SHORT_LINKS_TABLE_NAME: &str = "short_links";
const SHORT_LINK_COLUMNS: &str =
    "id, original_link, short_link, creation_date, expiry_date, user_id, visits";
const SHORT_LINK_SEQ_NAME: &str = "short_link_seq";

const CREATE_SCHEMA_QUERY: &str = formatcp!(
    r#"
    CREATE TABLE IF NOT EXISTS {USERS_TABLE_NAME} (
        id uuid PRIMARY KEY,
        email text NOT NULL UNIQUE,
        full_name text NOT NULL,
        password_hash text NOT NULL,
        refresh_token text,
        created_at timestamptz NOT NULL
    );
    CREATE SEQUENCE IF NOT EXISTS {SHORT_LINK_SEQ_NAME};
    CREATE TABLE IF NOT EXISTS {SHORT_LINKS_TABLE_NAME} (
        id uuid PRIMARY KEY,
        original_link text NOT NULL,
        short_link text NOT NULL UNIQUE,
        creation_date timestamptz NOT NULL,
        expiry_date timestamptz,
        user_id uuid NOT NULL REFERENCES {USERS_TABLE_NAME} (id) ON DELETE CASCADE,
        visits bigint NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS short_links_user_id_idx ON {SHORT_LINKS_TABLE_NAME} (user_id);
"#,
);

const INSERT_USER_QUERY: &str = formatcp!(
    r#"
    INSERT INTO {USERS_TABLE_NAME} (id, email, full_name, password_hash, created_at)
    VALUES ($1, $2, $3, $4, $5)
    RETURNING {USER_COLUMNS}
"#,
);
const FIND_USER_BY_ID_QUERY: &str =
    formatcp!("SELECT {USER_COLUMNS} FROM {USERS_TABLE_NAME} WHERE id = $1");
const FIND_USER_BY_EMAIL_QUERY: &str =
    formatcp!("SELECT {USER_COLUMNS} FROM {USERS_TABLE_NAME} WHERE email = $1");
const SET_REFRESH_TOKEN_QUERY: &str =
    formatcp!("UPDATE {USERS_TABLE_NAME} SET refresh_token = $2 WHERE id = $1");
const ROTATE_REFRESH_TOKEN_QUERY: &str = formatcp!(
    "UPDATE {USERS_TABLE_NAME} SET refresh_token = $3 WHERE id = $1 AND refresh_token = $2"
);

const NEXT_SEQUENCE_QUERY: &str = formatcp!("SELECT nextval('{SHORT_LINK_SEQ_NAME}')");
const INSERT_LINK_QUERY: &str = formatcp!(
    r#"
    INSERT INTO {SHORT_LINKS_TABLE_NAME} (id, original_link, short_link, creation_date, expiry_date, user_id)
    VALUES ($1, $2, $3, $4, $5, $6)
    RETURNING {SHORT_LINK_COLUMNS}
"#,
);
const FIND_LINK_BY_ID_QUERY: &str =
    formatcp!("SELECT {SHORT_LINK_COLUMNS} FROM {SHORT_LINKS_TABLE_NAME} WHERE id = $1");
const FIND_LINK_BY_CODE_QUERY: &str =
    formatcp!("SELECT {SHORT_LINK_COLUMNS} FROM {SHORT_LINKS_TABLE_NAME} WHERE short_link = $1");
const LIST_LINKS_BY_OWNER_QUERY: &str = formatcp!(
    "SELECT {SHORT_LINK_COLUMNS} FROM {SHORT_LINKS_TABLE_NAME} WHERE user_id = $1 ORDER BY creation_date DESC"
);
const DELETE_LINK_QUERY: &str = formatcp!(
    "DELETE FROM {SHORT_LINKS_TABLE_NAME} WHERE id = $1 RETURNING {SHORT_LINK_COLUMNS}"
);
const INCREMENT_VISITS_QUERY: &str =
    formatcp!("UPDATE {SHORT_LINKS_TABLE_NAME} SET visits = visits + 1 WHERE id = $1");

#[derive(Deserialize, PostgresMapper)]
#[pg_mapper(table = "users")]
struct UserRow {
    id: Uuid,
    email: String,
    full_name: String,
    password_hash: String,
    refresh_token: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            email: row.email,
            full_name: row.full_name,
            password_hash: row.password_hash,
            refresh_token: row.refresh_token,
            created_at: row.created_at,
        }
    }
}

#[derive(Deserialize, PostgresMapper)]
#[pg_mapper(table = "short_links")]
struct ShortLinkRow {
    id: Uuid,
    original_link: String,
    short_link: String,
    creation_date: DateTime<Utc>,
    expiry_date: Option<DateTime<Utc>>,
    user_id: Uuid,
    visits: i64,
}

impl From<ShortLinkRow> for ShortLink {
    fn from(row: ShortLinkRow) -> Self {
        ShortLink {
            id: row.id,
            original_link: row.original_link,
            short_link: ShortCode(row.short_link),
            creation_date: row.creation_date,
            expiry_date: row.expiry_date,
            user_id: row.user_id,
            visits: row.visits,
        }
    }
}

fn conflict_for(code: Option<&SqlState>, what: &str) -> Option<DomainError> {
    (code == Some(&SqlState::UNIQUE_VIOLATION))
        .then(|| DomainError::Conflict(format!("{} already exists", what)))
}

fn map_insert_error(err: tokio_postgres::Error, what: &str) -> DomainError {
    conflict_for(err.code(), what).unwrap_or_else(|| {
        DomainError::Internal(anyhow::Error::new(err).context(format!("Failed to insert {}", what)))
    })
}

pub struct DB {
    pub pool: Pool,
}

impl DB {
    pub async fn new(config: Config) -> Result<Self> {
        let Some(dsn) = config.dsn else {
            return Err(anyhow!("POSTGRES_DSN must be set for the postgres storage backend"));
        };

        let mut pg = deadpool_postgres::Config::new();
        pg.url = Some(dsn);
        pg.pool = Some(PoolConfig::new(config.pool_size));
        let pool = pg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .context("Failed to create Postgres pool")?;
        let db = DB { pool };

        let retry_policy = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(5))
            .with_factor(2.0)
            .with_jitter()
            .with_max_times(8);

        let migrate = || async { db.migrate().await };
        migrate
            .retry(retry_policy)
            .sleep(tokio::time::sleep)
            .notify(|err: &anyhow::Error, dur: Duration| {
                tracing::warn!(error = %err, retry_in = ?dur, "Postgres not ready, retrying");
            })
            .await?;

        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        let client = self.client().await?;
        client
            .batch_execute(CREATE_SCHEMA_QUERY)
            .await
            .context("Failed to create schema")?;
        Ok(())
    }

    async fn client(&self) -> Result<Client> {
        self.pool
            .get()
            .await
            .context("Failed to acquire Postgres connection")
    }

    async fn query_user(&self, query: &str, param: &(dyn tokio_postgres::types::ToSql + Sync)) -> Result<Option<User>> {
        let client = self.client().await?;
        let stmt = client.prepare_cached(query).await?;
        let row = client.query_opt(&stmt, &[param]).await?;
        row.map(|r| UserRow::from_row(r).map(User::from))
            .transpose()
            .map_err(Into::into)
    }

    async fn query_link(&self, query: &str, param: &(dyn tokio_postgres::types::ToSql + Sync)) -> Result<Option<ShortLink>> {
        let client = self.client().await?;
        let stmt = client.prepare_cached(query).await?;
        let row = client.query_opt(&stmt, &[param]).await?;
        row.map(|r| ShortLinkRow::from_row(r).map(ShortLink::from))
            .transpose()
            .map_err(Into::into)
    }
}

impl UserRepository for Arc<DB> {
    async fn create_user(&self, user: NewUser) -> Result<User, DomainError> {
        let client = self.client().await?;
        let stmt = client
            .prepare_cached(INSERT_USER_QUERY)
            .await
            .context("Failed to prepare user insert")?;
        let row = client
            .query_one(
                &stmt,
                &[
                    &Uuid::new_v4(),
                    &user.email,
                    &user.full_name,
                    &user.password_hash,
                    &Utc::now(),
                ],
            )
            .await
            .map_err(|e| map_insert_error(e, "user"))?;
        let row = UserRow::from_row(row).context("Failed to map user row")?;
        Ok(row.into())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, DomainError> {
        Ok(self.query_user(FIND_USER_BY_ID_QUERY, &id).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DomainError> {
        Ok(self.query_user(FIND_USER_BY_EMAIL_QUERY, &email).await?)
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<(), DomainError> {
        let client = self.client().await?;
        client
            .execute(SET_REFRESH_TOKEN_QUERY, &[&id, &token])
            .await
            .context("Failed to store refresh token")?;
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        current: &str,
        next: &str,
    ) -> Result<bool, DomainError> {
        let client = self.client().await?;
        let updated = client
            .execute(ROTATE_REFRESH_TOKEN_QUERY, &[&id, &current, &next])
            .await
            .context("Failed to rotate refresh token")?;
        Ok(updated == 1)
    }
}

impl ShortLinkRepository for Arc<DB> {
    async fn next_sequence(&self) -> Result<u64, DomainError> {
        let client = self.client().await?;
        let row = client
            .query_one(NEXT_SEQUENCE_QUERY, &[])
            .await
            .context("Failed to advance short link sequence")?;
        let seq: i64 = row.try_get(0).context("Failed to read sequence value")?;
        Ok(seq as u64)
    }

    async fn create_link(&self, link: NewShortLink) -> Result<ShortLink, DomainError> {
        let client = self.client().await?;
        let stmt = client
            .prepare_cached(INSERT_LINK_QUERY)
            .await
            .context("Failed to prepare link insert")?;
        let row = client
            .query_one(
                &stmt,
                &[
                    &Uuid::new_v4(),
                    &link.original_link,
                    &link.short_link.as_str(),
                    &link.creation_date,
                    &link.expiry_date,
                    &link.user_id,
                ],
            )
            .await
            .map_err(|e| map_insert_error(e, "short link"))?;
        let row = ShortLinkRow::from_row(row).context("Failed to map short link row")?;
        Ok(row.into())
    }

    async fn find_link_by_id(&self, id: Uuid) -> Result<Option<ShortLink>, DomainError> {
        Ok(self.query_link(FIND_LINK_BY_ID_QUERY, &id).await?)
    }

    async fn find_link_by_code(&self, code: &ShortCode) -> Result<Option<ShortLink>, DomainError> {
        Ok(self.query_link(FIND_LINK_BY_CODE_QUERY, &code.as_str()).await?)
    }

    async fn list_links_by_owner(&self, owner: Uuid) -> Result<Vec<ShortLink>, DomainError> {
        let client = self.client().await?;
        let stmt = client
            .prepare_cached(LIST_LINKS_BY_OWNER_QUERY)
            .await
            .context("Failed to prepare link listing")?;
        let rows = client
            .query(&stmt, &[&owner])
            .await
            .context("Failed to list links")?;
        let links = rows
            .into_iter()
            .map(|r| ShortLinkRow::from_row(r).map(ShortLink::from))
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to map short link row")?;
        Ok(links)
    }

    async fn delete_link(&self, id: Uuid) -> Result<Option<ShortLink>, DomainError> {
        Ok(self.query_link(DELETE_LINK_QUERY, &id).await?)
    }

    async fn increment_visits(&self, id: Uuid) -> Result<(), DomainError> {
        let client = self.client().await?;
        client
            .execute(INCREMENT_VISITS_QUERY, &[&id])
            .await
            .context("Failed to record visit")?;
        Ok(())
    }
}

impl Store for Arc<DB> {
    async fn ping(&self) -> Result<(), DomainError> {
        let client = self.client().await?;
        client
            .simple_query("SELECT 1")
            .await
            .context("Postgres ping failed")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unique_violation_conflicts() {
        assert!(matches!(
            conflict_for(Some(&SqlState::UNIQUE_VIOLATION), "user"),
            Some(DomainError::Conflict(msg)) if msg == "user already exists"
        ));
        assert!(conflict_for(Some(&SqlState::FOREIGN_KEY_VIOLATION), "user").is_none());
        assert!(conflict_for(None, "user").is_none());
    }

    #[test]
    fn test_rotation_is_conditional() {
        assert!(ROTATE_REFRESH_TOKEN_QUERY.contains("WHERE id = $1 AND refresh_token = $2"));
        assert!(CREATE_SCHEMA_QUERY.contains("short_link text NOT NULL UNIQUE"));
    }

    /// Connects to the database named by `POSTGRES_TEST_DSN`. Live tests
    /// return early when it is unset.
    async fn live_db() -> Option<Arc<DB>> {
        let dsn = std::env::var("POSTGRES_TEST_DSN").ok()?;
        let config = Config {
            dsn: Some(dsn),
            pool_size: 2,
        };
        Some(Arc::new(DB::new(config).await.unwrap()))
    }

    fn new_user() -> NewUser {
        NewUser {
            email: format!("{}@example.com", Uuid::new_v4()),
            full_name: "Ada".to_string(),
            password_hash: "h".to_string(),
        }
    }

    #[actix_web::test]
    async fn test_live_duplicate_email_conflicts() {
        let Some(db) = live_db().await else { return };
        let user = new_user();
        db.create_user(user.clone()).await.unwrap();
        assert!(matches!(
            db.create_user(user).await,
            Err(DomainError::Conflict(_))
        ));
        db.ping().await.unwrap();
    }

    #[actix_web::test]
    async fn test_live_duplicate_code_conflicts() {
        let Some(db) = live_db().await else { return };
        let owner = db.create_user(new_user()).await.unwrap();
        let seq = db.next_sequence().await.unwrap();
        let link = NewShortLink {
            original_link: "https://example.com/".to_string(),
            short_link: ShortCode::generate(seq).unwrap(),
            creation_date: Utc::now(),
            expiry_date: None,
            user_id: owner.id,
        };
        let created = db.create_link(link.clone()).await.unwrap();
        assert!(matches!(
            db.create_link(link).await,
            Err(DomainError::Conflict(_))
        ));

        db.increment_visits(created.id).await.unwrap();
        let found = db.find_link_by_code(&created.short_link).await.unwrap().unwrap();
        assert_eq!(found.visits, 1);
        assert_eq!(db.list_links_by_owner(owner.id).await.unwrap().len(), 1);
        assert!(db.delete_link(created.id).await.unwrap().is_some());
        assert!(db.find_link_by_id(created.id).await.unwrap().is_none());
    }

    #[actix_web::test]
    async fn test_live_rotate_refresh_token() {
        let Some(db) = live_db().await else { return };
        let user = db.create_user(new_user()).await.unwrap();
        db.set_refresh_token(user.id, Some("r0")).await.unwrap();
        assert!(db.rotate_refresh_token(user.id, "r0", "r1").await.unwrap());
        assert!(!db.rotate_refresh_token(user.id, "r0", "r2").await.unwrap());
        let stored = db.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some("r1"));
    }
}
