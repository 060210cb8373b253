//! Durable store capabilities consumed by the cache engine.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entities::{CommentRecord, UserRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Read-through source for users missing from the hot store.
#[async_trait]
pub trait UserFetcher: Send + Sync {
    /// The durable row mapped onto a user record, its timestamp taken from
    /// the row's creation time.
    async fn fetch_user(&self, id: i64) -> Result<Option<UserRecord>, RepoError>;

    /// Newest row registered under `username`.
    async fn fetch_user_by_username(&self, username: &str)
    -> Result<Option<UserRecord>, RepoError>;

    /// Newest row holding the authentication secret `secret`.
    async fn fetch_user_by_secret(&self, secret: &str) -> Result<Option<UserRecord>, RepoError>;

    /// Highest stored user id, if any.
    async fn max_user_id(&self) -> Result<Option<i64>, RepoError>;
}

/// Read-through source for comments missing from the hot store.
#[async_trait]
pub trait CommentFetcher: Send + Sync {
    async fn fetch_comment(&self, id: i64) -> Result<Option<CommentRecord>, RepoError>;

    async fn liked_by(&self, comment_id: i64) -> Result<Vec<i64>, RepoError>;

    /// Highest stored comment id, if any.
    async fn max_comment_id(&self) -> Result<Option<i64>, RepoError>;
}

#[async_trait]
pub trait UsersWriteRepo: Send + Sync {
    /// Create-or-update by id. A new row takes both timestamps from the
    /// record; an existing row only has `updated_at` moved to `now`.
    async fn upsert_user(&self, user: &UserRecord, now: OffsetDateTime) -> Result<(), RepoError>;

    async fn delete_user(&self, id: i64) -> Result<(), RepoError>;
}

#[async_trait]
pub trait CommentsWriteRepo: Send + Sync {
    /// Create-or-update by id, then insert every missing like association.
    /// Both happen atomically.
    async fn upsert_comment(
        &self,
        comment: &CommentRecord,
        liked_by: &[i64],
        now: OffsetDateTime,
    ) -> Result<(), RepoError>;

    /// Delete the comment row and its like associations.
    async fn delete_comment(&self, id: i64) -> Result<(), RepoError>;
}

#[async_trait]
pub trait DurableAdminRepo: Send + Sync {
    /// Remove every user, comment and like row.
    async fn truncate_all(&self) -> Result<(), RepoError>;
}
