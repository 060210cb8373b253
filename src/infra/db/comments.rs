use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{CommentFetcher, CommentsWriteRepo, RepoError},
    domain::entities::CommentRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: i64,
    comment: String,
    user_id: i64,
    username: String,
    number_likes: i64,
    created_at: OffsetDateTime,
}

impl From<CommentRow> for CommentRecord {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            comment: row.comment,
            user_id: row.user_id,
            username: row.username,
            likes: row.number_likes,
            timestamp: row.created_at,
        }
    }
}

#[async_trait]
impl CommentFetcher for PostgresRepositories {
    async fn fetch_comment(&self, id: i64) -> Result<Option<CommentRecord>, RepoError> {
        let row = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT id, comment, user_id, username, number_likes, created_at
            FROM comments
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(CommentRecord::from))
    }

    async fn liked_by(&self, comment_id: i64) -> Result<Vec<i64>, RepoError> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT user_id
            FROM comment_like
            WHERE comment_id = $1
            ORDER BY user_id
            "#,
        )
        .bind(comment_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn max_comment_id(&self) -> Result<Option<i64>, RepoError> {
        sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(id) FROM comments")
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl CommentsWriteRepo for PostgresRepositories {
    async fn upsert_comment(
        &self,
        comment: &CommentRecord,
        liked_by: &[i64],
        now: OffsetDateTime,
    ) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO comments (id, comment, user_id, username, number_likes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (id) DO UPDATE SET
                comment = EXCLUDED.comment,
                user_id = EXCLUDED.user_id,
                username = EXCLUDED.username,
                number_likes = EXCLUDED.number_likes,
                updated_at = $7
            "#,
        )
        .bind(comment.id)
        .bind(&comment.comment)
        .bind(comment.user_id)
        .bind(&comment.username)
        .bind(comment.likes)
        .bind(comment.timestamp)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        // Likers may not be synced yet; the association only needs the comment.
        sqlx::query(
            r#"
            INSERT INTO comment_like (comment_id, user_id)
            SELECT $1, liker FROM UNNEST($2::BIGINT[]) AS liker
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(comment.id)
        .bind(liked_by)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn delete_comment(&self, id: i64) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}
