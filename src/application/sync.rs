//! Write-back sync from the hot store into the durable store.
//!
//! Each id is pushed on its own. A failing id is logged, left unsynced (or
//! its tombstone kept) and retried on the next run; the rest of the batch
//! carries on.

use std::sync::Arc;
use std::time::Instant;

use futures::{StreamExt, stream};
use metrics::{counter, histogram};
use serde::Serialize;
use thiserror::Error;
use time::Duration;
use tracing::{info, instrument, warn};

use crate::application::clock::Clock;
use crate::application::repos::{CommentsWriteRepo, RepoError, UsersWriteRepo};
use crate::cache::{CacheLifecycle, CommentRepository, RepositoryError, UserRepository};
use crate::domain::entities::{CommentRecord, UserRecord};
use crate::domain::types::EntityKind;

const METRIC_UPSERTED: &str = "murmur_sync_upserted_total";
const METRIC_DELETED: &str = "murmur_sync_deleted_total";
const METRIC_FAILED: &str = "murmur_sync_failed_total";
const METRIC_RUN_MS: &str = "murmur_sync_run_ms";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to list pending records: {0}")]
    Listing(#[from] RepositoryError),
}

#[derive(Debug, Error)]
enum PushError {
    #[error(transparent)]
    Cache(#[from] RepositoryError),
    #[error(transparent)]
    Durable(#[from] RepoError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindSyncReport {
    pub upserted: u64,
    pub failed: u64,
    pub deleted: u64,
    pub delete_failed: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub users: KindSyncReport,
    pub comments: KindSyncReport,
}

impl SyncReport {
    pub fn failures(&self) -> u64 {
        self.users.failed + self.users.delete_failed + self.comments.failed + self.comments.delete_failed
    }
}

pub struct SyncService {
    users: Arc<UserRepository>,
    comments: Arc<CommentRepository>,
    user_writer: Arc<dyn UsersWriteRepo>,
    comment_writer: Arc<dyn CommentsWriteRepo>,
    clock: Arc<dyn Clock>,
    concurrency: usize,
}

impl SyncService {
    pub fn new(
        users: Arc<UserRepository>,
        comments: Arc<CommentRepository>,
        user_writer: Arc<dyn UsersWriteRepo>,
        comment_writer: Arc<dyn CommentsWriteRepo>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            comments,
            user_writer,
            comment_writer,
            clock,
            concurrency: 1,
        }
    }

    /// Number of ids pushed at the same time within one run.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Push every unsynced record last written at least `grace_minutes` ago,
    /// then reconcile tombstones.
    #[instrument(skip(self))]
    pub async fn run(&self, grace_minutes: u32) -> Result<SyncReport, SyncError> {
        let started = Instant::now();
        let cutoff = self.clock.now() - Duration::minutes(grace_minutes.into());
        let mut report = SyncReport::default();

        let users = self.users.fetch_updated_between(None, Some(cutoff)).await?;
        let outcomes: Vec<_> = stream::iter(users)
            .map(|user| self.push_user(user))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        tally_upserts(&mut report.users, &outcomes);

        let comments = self
            .comments
            .fetch_updated_between(None, Some(cutoff))
            .await?;
        let outcomes: Vec<_> = stream::iter(comments)
            .map(|comment| self.push_comment(comment))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        tally_upserts(&mut report.comments, &outcomes);

        let tombstones = self.comments.fetch_deleted_ids().await?;
        let outcomes: Vec<_> = stream::iter(tombstones)
            .map(|id| self.reconcile_comment(id))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        tally_deletes(&mut report.comments, &outcomes);

        let tombstones = self.users.fetch_deleted_ids().await?;
        let outcomes: Vec<_> = stream::iter(tombstones)
            .map(|id| self.reconcile_user(id))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        tally_deletes(&mut report.users, &outcomes);

        record_metrics(EntityKind::User, &report.users);
        record_metrics(EntityKind::Comment, &report.comments);
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_RUN_MS).record(elapsed_ms);

        info!(
            grace_minutes,
            users_upserted = report.users.upserted,
            users_deleted = report.users.deleted,
            comments_upserted = report.comments.upserted,
            comments_deleted = report.comments.deleted,
            failures = report.failures(),
            elapsed_ms,
            "sync run finished"
        );
        Ok(report)
    }

    async fn push_user(&self, user: UserRecord) -> Result<bool, PushError> {
        let id = user.id;
        let result = self.try_push_user(user).await;
        if let Err(err) = &result {
            warn!(kind = "user", id, error = %err, "sync upsert failed");
        }
        result
    }

    async fn try_push_user(&self, user: UserRecord) -> Result<bool, PushError> {
        if self.users.is_synced(user.id).await? {
            return Ok(false);
        }
        self.user_writer
            .upsert_user(&user, self.clock.now())
            .await?;
        self.users.mark_as_synced(user.id).await?;
        Ok(true)
    }

    async fn push_comment(&self, comment: CommentRecord) -> Result<bool, PushError> {
        let id = comment.id;
        let result = self.try_push_comment(comment).await;
        if let Err(err) = &result {
            warn!(kind = "comment", id, error = %err, "sync upsert failed");
        }
        result
    }

    async fn try_push_comment(&self, comment: CommentRecord) -> Result<bool, PushError> {
        if self.comments.is_synced(comment.id).await? {
            return Ok(false);
        }
        let liked_by = self.comments.liked_by(comment.id).await?;
        self.comment_writer
            .upsert_comment(&comment, &liked_by, self.clock.now())
            .await?;
        self.comments.mark_as_synced(comment.id).await?;
        Ok(true)
    }

    async fn reconcile_comment(&self, id: i64) -> Result<(), PushError> {
        let result = async {
            self.comment_writer.delete_comment(id).await?;
            self.comments.remove_deleted_flag(id).await?;
            Ok::<(), PushError>(())
        }
        .await;
        if let Err(err) = &result {
            warn!(kind = "comment", id, error = %err, "sync delete failed");
        }
        result
    }

    async fn reconcile_user(&self, id: i64) -> Result<(), PushError> {
        let result = async {
            self.user_writer.delete_user(id).await?;
            self.users.remove_deleted_flag(id).await?;
            Ok::<(), PushError>(())
        }
        .await;
        if let Err(err) = &result {
            warn!(kind = "user", id, error = %err, "sync delete failed");
        }
        result
    }
}

fn tally_upserts(report: &mut KindSyncReport, outcomes: &[Result<bool, PushError>]) {
    for outcome in outcomes {
        match outcome {
            Ok(true) => report.upserted += 1,
            Ok(false) => {}
            Err(_) => report.failed += 1,
        }
    }
}

fn tally_deletes(report: &mut KindSyncReport, outcomes: &[Result<(), PushError>]) {
    for outcome in outcomes {
        match outcome {
            Ok(()) => report.deleted += 1,
            Err(_) => report.delete_failed += 1,
        }
    }
}

fn record_metrics(kind: EntityKind, report: &KindSyncReport) {
    let kind = kind.as_str();
    counter!(METRIC_UPSERTED, "kind" => kind).increment(report.upserted);
    counter!(METRIC_DELETED, "kind" => kind).increment(report.deleted);
    counter!(METRIC_FAILED, "kind" => kind, "stage" => "upsert").increment(report.failed);
    counter!(METRIC_FAILED, "kind" => kind, "stage" => "delete").increment(report.delete_failed);
}
