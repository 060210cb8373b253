use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{RepoError, UserFetcher, UsersWriteRepo},
    domain::entities::UserRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    auth: String,
    created_at: OffsetDateTime,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            auth: row.auth,
            timestamp: row.created_at,
        }
    }
}

#[async_trait]
impl UserFetcher for PostgresRepositories {
    async fn fetch_user(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, auth, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(UserRecord::from))
    }

    async fn fetch_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, auth, created_at
            FROM users
            WHERE username = $1
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(username)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(UserRecord::from))
    }

    async fn fetch_user_by_secret(&self, secret: &str) -> Result<Option<UserRecord>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, auth, created_at
            FROM users
            WHERE auth = $1
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(secret)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(UserRecord::from))
    }

    async fn max_user_id(&self) -> Result<Option<i64>, RepoError> {
        sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(id) FROM users")
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl UsersWriteRepo for PostgresRepositories {
    async fn upsert_user(&self, user: &UserRecord, now: OffsetDateTime) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, auth, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (id) DO UPDATE SET
                username = EXCLUDED.username,
                auth = EXCLUDED.auth,
                updated_at = $5
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.auth)
        .bind(user.timestamp)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete_user(&self, id: i64) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}
