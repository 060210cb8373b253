//! In-process durable store used by tests and local demos.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use time::OffsetDateTime;

use crate::application::repos::{
    CommentFetcher, CommentsWriteRepo, DurableAdminRepo, RepoError, UserFetcher, UsersWriteRepo,
};
use crate::domain::entities::{CommentRecord, UserRecord};

#[derive(Debug, Clone)]
struct Row<R> {
    record: R,
    updated_at: OffsetDateTime,
}

/// Mirrors the Postgres adapter: upserts keep the original creation time
/// and comment likes are only ever added.
#[derive(Debug, Default)]
pub struct MemoryDurableStore {
    users: DashMap<i64, Row<UserRecord>>,
    comments: DashMap<i64, Row<CommentRecord>>,
    likes: DashMap<i64, BTreeSet<i64>>,
    failing: DashSet<i64>,
    upserts: AtomicU64,
    fetches: AtomicU64,
}

impl MemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write touching `id` fails until [`clear_failures`](Self::clear_failures).
    pub fn fail_writes_for(&self, id: i64) {
        self.failing.insert(id);
    }

    pub fn clear_failures(&self) {
        self.failing.clear();
    }

    pub fn user(&self, id: i64) -> Option<UserRecord> {
        self.users.get(&id).map(|row| row.record.clone())
    }

    pub fn comment(&self, id: i64) -> Option<CommentRecord> {
        self.comments.get(&id).map(|row| row.record.clone())
    }

    pub fn user_updated_at(&self, id: i64) -> Option<OffsetDateTime> {
        self.users.get(&id).map(|row| row.updated_at)
    }

    pub fn likes(&self, comment_id: i64) -> Vec<i64> {
        self.likes
            .get(&comment_id)
            .map(|likes| likes.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn insert_user(&self, user: UserRecord) {
        let updated_at = user.timestamp;
        self.users.insert(user.id, Row { record: user, updated_at });
    }

    pub fn insert_comment(&self, comment: CommentRecord, liked_by: &[i64]) {
        let updated_at = comment.timestamp;
        self.likes
            .insert(comment.id, liked_by.iter().copied().collect());
        self.comments.insert(
            comment.id,
            Row {
                record: comment,
                updated_at,
            },
        );
    }

    /// Successful upserts so far, users and comments together.
    pub fn upsert_count(&self) -> u64 {
        self.upserts.load(Ordering::Relaxed)
    }

    /// Fallback reads by id so far, users and comments together.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    fn newest_user(&self, matches: impl Fn(&UserRecord) -> bool) -> Option<UserRecord> {
        self.users
            .iter()
            .filter(|row| matches(&row.record))
            .max_by_key(|row| row.record.id)
            .map(|row| row.record.clone())
    }

    fn check(&self, id: i64) -> Result<(), RepoError> {
        if self.failing.contains(&id) {
            Err(RepoError::from_persistence(format!(
                "injected failure for id {id}"
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl UserFetcher for MemoryDurableStore {
    async fn fetch_user(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        Ok(self.user(id))
    }

    async fn fetch_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.newest_user(|user| user.username == username))
    }

    async fn fetch_user_by_secret(&self, secret: &str) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.newest_user(|user| user.auth == secret))
    }

    async fn max_user_id(&self) -> Result<Option<i64>, RepoError> {
        Ok(self.users.iter().map(|row| *row.key()).max())
    }
}

#[async_trait]
impl CommentFetcher for MemoryDurableStore {
    async fn fetch_comment(&self, id: i64) -> Result<Option<CommentRecord>, RepoError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        Ok(self.comment(id))
    }

    async fn liked_by(&self, comment_id: i64) -> Result<Vec<i64>, RepoError> {
        Ok(self.likes(comment_id))
    }

    async fn max_comment_id(&self) -> Result<Option<i64>, RepoError> {
        Ok(self.comments.iter().map(|row| *row.key()).max())
    }
}

#[async_trait]
impl UsersWriteRepo for MemoryDurableStore {
    async fn upsert_user(&self, user: &UserRecord, now: OffsetDateTime) -> Result<(), RepoError> {
        self.check(user.id)?;
        self.users
            .entry(user.id)
            .and_modify(|row| {
                row.record = UserRecord {
                    timestamp: row.record.timestamp,
                    ..user.clone()
                };
                row.updated_at = now;
            })
            .or_insert_with(|| Row {
                record: user.clone(),
                updated_at: user.timestamp,
            });
        self.upserts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete_user(&self, id: i64) -> Result<(), RepoError> {
        self.check(id)?;
        self.users.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl CommentsWriteRepo for MemoryDurableStore {
    async fn upsert_comment(
        &self,
        comment: &CommentRecord,
        liked_by: &[i64],
        now: OffsetDateTime,
    ) -> Result<(), RepoError> {
        self.check(comment.id)?;
        self.comments
            .entry(comment.id)
            .and_modify(|row| {
                row.record = CommentRecord {
                    timestamp: row.record.timestamp,
                    ..comment.clone()
                };
                row.updated_at = now;
            })
            .or_insert_with(|| Row {
                record: comment.clone(),
                updated_at: comment.timestamp,
            });
        self.likes
            .entry(comment.id)
            .or_default()
            .extend(liked_by.iter().copied());
        self.upserts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete_comment(&self, id: i64) -> Result<(), RepoError> {
        self.check(id)?;
        self.comments.remove(&id);
        self.likes.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl DurableAdminRepo for MemoryDurableStore {
    async fn truncate_all(&self) -> Result<(), RepoError> {
        self.users.clear();
        self.comments.clear();
        self.likes.clear();
        Ok(())
    }
}
