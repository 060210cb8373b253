//! Comment repository: feed order, likes and read-through refills.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

use crate::application::clock::Clock;
use crate::application::repos::CommentFetcher;
use crate::domain::entities::{CommentRecord, NewComment};
use crate::domain::error::DomainError;
use crate::domain::types::EntityKind;

use super::codec::{FIELD_LIKES, parse_id};
use super::config::CacheConfig;
use super::error::RepositoryError;
use super::keys::{COMMENT_FEED, COMMENTS, comment_likes};
use super::lifecycle::{CacheLifecycle, EntityIndex};
use super::store::HotStore;

const METRIC_FALLBACK: &str = "murmur_fallback_total";

pub struct CommentRepository {
    index: EntityIndex,
    fallback: Option<Arc<dyn CommentFetcher>>,
    home_size: usize,
}

impl CommentRepository {
    pub fn new(store: Arc<dyn HotStore>, clock: Arc<dyn Clock>, config: &CacheConfig) -> Self {
        Self {
            index: EntityIndex::new(store, clock, COMMENTS, config.sequence_start),
            fallback: None,
            home_size: config.home_size,
        }
    }

    /// Read misses go to `fetcher` before failing with `NotFound`.
    pub fn with_fallback_fetcher(mut self, fetcher: Arc<dyn CommentFetcher>) -> Self {
        self.fallback = Some(fetcher);
        self
    }

    /// Store a new comment and append it to the feed.
    #[instrument(skip(self, comment), fields(user_id = comment.user_id))]
    pub async fn post(&self, comment: NewComment) -> Result<i64, RepositoryError> {
        if comment.comment.trim().is_empty() {
            return Err(DomainError::validation("comment must not be empty").into());
        }

        let id = self.next_id().await?;
        let record = CommentRecord {
            id,
            comment: comment.comment,
            user_id: comment.user_id,
            username: comment.username,
            likes: 0,
            timestamp: self.index.clock().now_truncated(),
        };
        self.index.write(&record).await?;
        self.index
            .store()
            .rpush(COMMENT_FEED, &id.to_string())
            .await?;
        debug!(id, "comment posted");
        Ok(id)
    }

    pub async fn find(&self, id: i64) -> Result<CommentRecord, RepositoryError> {
        if let Some(comment) = self.index.load::<CommentRecord>(id).await? {
            self.index.touch(id).await?;
            return Ok(comment);
        }

        let Some(fetcher) = self.fallback.as_ref() else {
            return Err(self.index.not_found(id));
        };
        // Deleted here; the durable row only waits for the next sync.
        if self.index.is_tombstoned(id).await? {
            return Err(self.index.not_found(id));
        }

        let Some(durable) = fetcher.fetch_comment(id).await? else {
            counter!(METRIC_FALLBACK, "kind" => "comment", "result" => "miss").increment(1);
            return Err(self.index.not_found(id));
        };
        let liked_by = fetcher.liked_by(id).await?;

        // The counter always matches the restored like set.
        let comment = CommentRecord {
            likes: liked_by.len() as i64,
            ..durable
        };
        let store = self.index.store();
        let likes_key = comment_likes(id);
        for user_id in &liked_by {
            store.sadd(&likes_key, &user_id.to_string()).await?;
        }
        self.index.write(&comment).await?;
        self.index.mark_refilled(id).await?;
        counter!(METRIC_FALLBACK, "kind" => "comment", "result" => "refilled").increment(1);
        Ok(comment)
    }

    async fn next_id(&self) -> Result<i64, RepositoryError> {
        if !self.index.sequence_started().await? {
            let durable_max = match self.fallback.as_ref() {
                Some(fetcher) => fetcher.max_comment_id().await?,
                None => None,
            };
            self.index.start_sequence(durable_max).await?;
        }
        self.index.next_id().await
    }

    /// Record that `user_id` likes the comment. Returns whether this changed
    /// anything; liking twice leaves the counter untouched.
    pub async fn like(&self, comment_id: i64, user_id: i64) -> Result<bool, RepositoryError> {
        self.find(comment_id).await?;

        let store = self.index.store();
        if !store
            .sadd(&comment_likes(comment_id), &user_id.to_string())
            .await?
        {
            return Ok(false);
        }
        store
            .hincr_by(&self.index.record_key(comment_id), FIELD_LIKES, 1)
            .await?;
        self.index.record_mutation(comment_id).await?;
        Ok(true)
    }

    pub async fn number_likes(&self, comment_id: i64) -> Result<u64, RepositoryError> {
        Ok(self
            .index
            .store()
            .scard(&comment_likes(comment_id))
            .await?)
    }

    /// Ids of the users who liked the comment, ascending.
    pub async fn liked_by(&self, comment_id: i64) -> Result<Vec<i64>, RepositoryError> {
        let key = comment_likes(comment_id);
        let mut users = self
            .index
            .store()
            .smembers(&key)
            .await?
            .iter()
            .map(|member| parse_id(&key, member))
            .collect::<Result<Vec<_>, _>>()?;
        users.sort_unstable();
        Ok(users)
    }

    /// The first comments of the feed.
    pub async fn fetch_home(&self) -> Result<Vec<CommentRecord>, RepositoryError> {
        self.fetch_page(0, self.home_size).await
    }

    /// A window of the feed, in posting order.
    pub async fn fetch_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<CommentRecord>, RepositoryError> {
        let members = self
            .index
            .store()
            .lrange(COMMENT_FEED, offset, limit)
            .await?;

        let mut comments = Vec::with_capacity(members.len());
        for member in members {
            let id = parse_id(COMMENT_FEED, &member)?;
            match self.find(id).await {
                Ok(comment) => comments.push(comment),
                Err(RepositoryError::NotFound { .. }) => {
                    warn!(id, "feed entry has no record in either store");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(comments)
    }

    /// Remove a comment from the hot store. A comment known to the durable
    /// store leaves a tombstone for the next sync. Unknown ids are ignored.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<(), RepositoryError> {
        match self.find(id).await {
            Ok(_) => {}
            Err(RepositoryError::NotFound { .. }) => return Ok(()),
            Err(err) => return Err(err),
        }

        let store = self.index.store();
        if self.index.has_sync_marker(id).await? {
            self.index.tombstone(id).await?;
        }
        self.index.evict(id).await?;
        store.lrem(COMMENT_FEED, &id.to_string()).await?;
        store.del(&comment_likes(id)).await?;
        self.index.clear_sync_marker(id).await?;
        debug!(id, "comment deleted");
        Ok(())
    }

    /// Comments whose update time lies in `[start, end]`, oldest first.
    pub async fn fetch_updated_between(
        &self,
        start: Option<OffsetDateTime>,
        end: Option<OffsetDateTime>,
    ) -> Result<Vec<CommentRecord>, RepositoryError> {
        let ids = self.index.ids_updated_between(start, end).await?;
        let mut comments = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(comment) = self.index.load::<CommentRecord>(id).await? {
                comments.push(comment);
            }
        }
        Ok(comments)
    }
}

#[async_trait]
impl CacheLifecycle for CommentRepository {
    fn kind(&self) -> EntityKind {
        EntityKind::Comment
    }

    async fn mark_as_synced(&self, id: i64) -> Result<(), RepositoryError> {
        self.index.mark_as_synced(id).await
    }

    async fn is_synced(&self, id: i64) -> Result<bool, RepositoryError> {
        self.index.is_synced(id).await
    }

    async fn fetch_stalled_ids(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<Vec<i64>, RepositoryError> {
        self.index.stalled_ids(cutoff).await
    }

    async fn fetch_deleted_ids(&self) -> Result<Vec<i64>, RepositoryError> {
        self.index.deleted_ids().await
    }

    async fn remove_deleted_flag(&self, id: i64) -> Result<(), RepositoryError> {
        self.index.remove_deleted_flag(id).await
    }

    /// The feed entry stays so listings refill the comment on demand.
    async fn purge(&self, id: i64) -> Result<(), RepositoryError> {
        self.index.ensure_purgeable(id).await?;
        self.index.evict(id).await?;
        self.index.store().del(&comment_likes(id)).await?;
        self.index.clear_sync_marker(id).await?;
        Ok(())
    }
}
