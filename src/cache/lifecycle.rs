//! Per-kind index bookkeeping shared by the user and comment repositories.
//!
//! A record id appears in up to four indices besides its hash:
//!
//! - update index: score is the last write time; refills keep the record's
//!   own timestamp.
//! - access index: score is the last read or write time; drives purging.
//! - sync marker: score is when the durable copy was written. A marker older
//!   than the update score means the durable copy exists but lags.
//! - tombstones: ids deleted from the hot store whose durable row still
//!   has to go.

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::clock::Clock;
use crate::domain::types::EntityKind;

use super::codec::{HashRecord, parse_id};
use super::error::RepositoryError;
use super::keys::Keyspace;
use super::store::{HotStore, ScoreRange};

/// Operations the sync and purge engines need from every repository.
#[async_trait]
pub trait CacheLifecycle: Send + Sync {
    fn kind(&self) -> EntityKind;

    async fn mark_as_synced(&self, id: i64) -> Result<(), RepositoryError>;

    /// Whether the durable copy matches the hot copy. A marker older than
    /// the latest write (an effective `like`, for instance) reads as `false`
    /// even though a durable row exists.
    async fn is_synced(&self, id: i64) -> Result<bool, RepositoryError>;

    /// Ids last accessed at or before `cutoff`, oldest first.
    async fn fetch_stalled_ids(&self, cutoff: OffsetDateTime)
    -> Result<Vec<i64>, RepositoryError>;

    async fn fetch_deleted_ids(&self) -> Result<Vec<i64>, RepositoryError>;

    async fn remove_deleted_flag(&self, id: i64) -> Result<(), RepositoryError>;

    /// Evict a synced record and its sync marker from the hot store, keeping
    /// the durable copy. A later refill writes the marker again.
    async fn purge(&self, id: i64) -> Result<(), RepositoryError>;
}

pub(crate) struct EntityIndex {
    store: Arc<dyn HotStore>,
    clock: Arc<dyn Clock>,
    keys: Keyspace,
    sequence_start: i64,
}

impl EntityIndex {
    pub(crate) fn new(
        store: Arc<dyn HotStore>,
        clock: Arc<dyn Clock>,
        keys: Keyspace,
        sequence_start: i64,
    ) -> Self {
        Self {
            store,
            clock,
            keys,
            sequence_start,
        }
    }

    pub(crate) fn store(&self) -> &dyn HotStore {
        self.store.as_ref()
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub(crate) fn kind(&self) -> EntityKind {
        self.keys.kind()
    }

    pub(crate) fn record_key(&self, id: i64) -> String {
        self.keys.record(id)
    }

    pub(crate) fn not_found(&self, id: impl ToString) -> RepositoryError {
        RepositoryError::not_found(self.kind(), id)
    }

    pub(crate) async fn sequence_started(&self) -> Result<bool, RepositoryError> {
        Ok(self.store.exists(self.keys.sequence()).await?)
    }

    /// Start the sequence above both the configured floor and the highest id
    /// already in the durable store. An existing sequence is left alone.
    pub(crate) async fn start_sequence(
        &self,
        durable_max: Option<i64>,
    ) -> Result<(), RepositoryError> {
        let start = durable_max.map_or(self.sequence_start, |max| max.max(self.sequence_start));
        self.store.init_counter(self.keys.sequence(), start).await?;
        Ok(())
    }

    pub(crate) async fn next_id(&self) -> Result<i64, RepositoryError> {
        let sequence = self.keys.sequence();
        self.store
            .init_counter(sequence, self.sequence_start)
            .await?;
        Ok(self.store.incr(sequence).await?)
    }

    pub(crate) async fn load<R: HashRecord>(&self, id: i64) -> Result<Option<R>, RepositoryError> {
        let key = self.keys.record(id);
        let fields = self.store.hget_all(&key).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(R::from_fields(id, &key, &fields)?))
    }

    /// Write the hash, score the update index with the record's own
    /// timestamp and the access index with now.
    pub(crate) async fn write<R: HashRecord>(&self, record: &R) -> Result<(), RepositoryError> {
        let id = record.id();
        self.store
            .hset_all(&self.keys.record(id), &record.to_fields())
            .await?;
        self.store
            .zadd(
                self.keys.update_index(),
                &id.to_string(),
                record.timestamp().unix_timestamp(),
            )
            .await?;
        self.touch(id).await
    }

    pub(crate) async fn touch(&self, id: i64) -> Result<(), RepositoryError> {
        self.store
            .zadd(
                self.keys.access_index(),
                &id.to_string(),
                self.clock.unix_now(),
            )
            .await?;
        Ok(())
    }

    /// Record a field mutation: the update index moves to now and any sync
    /// marker is demoted below it so the record syncs again.
    pub(crate) async fn record_mutation(&self, id: i64) -> Result<(), RepositoryError> {
        let now = self.clock.unix_now();
        let member = id.to_string();
        self.store
            .zadd(self.keys.update_index(), &member, now)
            .await?;
        let synced_at = self.store.zscore(self.keys.sync_marker(), &member).await?;
        if synced_at.is_some_and(|synced_at| synced_at >= now) {
            self.store
                .zadd(self.keys.sync_marker(), &member, now - 1)
                .await?;
        }
        self.touch(id).await
    }

    pub(crate) async fn ids_updated_between(
        &self,
        start: Option<OffsetDateTime>,
        end: Option<OffsetDateTime>,
    ) -> Result<Vec<i64>, RepositoryError> {
        let range = ScoreRange::new(
            start.map(OffsetDateTime::unix_timestamp),
            end.map(OffsetDateTime::unix_timestamp),
        );
        self.scored_ids(self.keys.update_index(), range).await
    }

    pub(crate) async fn stalled_ids(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<Vec<i64>, RepositoryError> {
        self.scored_ids(
            self.keys.access_index(),
            ScoreRange::up_to(cutoff.unix_timestamp()),
        )
        .await
    }

    async fn scored_ids(
        &self,
        key: &str,
        range: ScoreRange,
    ) -> Result<Vec<i64>, RepositoryError> {
        let members = self.store.zrange_by_score(key, range).await?;
        let mut scored = members
            .into_iter()
            .map(|(member, score)| Ok((score, parse_id(key, &member)?)))
            .collect::<Result<Vec<_>, RepositoryError>>()?;
        scored.sort_unstable();
        Ok(scored.into_iter().map(|(_, id)| id).collect())
    }

    pub(crate) async fn mark_as_synced(&self, id: i64) -> Result<(), RepositoryError> {
        self.store
            .zadd(
                self.keys.sync_marker(),
                &id.to_string(),
                self.clock.unix_now(),
            )
            .await?;
        Ok(())
    }

    /// Mark a record read back from the durable store, unless a marker exists.
    pub(crate) async fn mark_refilled(&self, id: i64) -> Result<(), RepositoryError> {
        if !self.has_sync_marker(id).await? {
            self.mark_as_synced(id).await?;
        }
        Ok(())
    }

    pub(crate) async fn has_sync_marker(&self, id: i64) -> Result<bool, RepositoryError> {
        Ok(self
            .store
            .zscore(self.keys.sync_marker(), &id.to_string())
            .await?
            .is_some())
    }

    pub(crate) async fn is_synced(&self, id: i64) -> Result<bool, RepositoryError> {
        let member = id.to_string();
        let Some(synced_at) = self
            .store
            .zscore(self.keys.sync_marker(), &member)
            .await?
        else {
            return Ok(false);
        };
        let updated_at = self
            .store
            .zscore(self.keys.update_index(), &member)
            .await?;
        Ok(updated_at.is_none_or(|updated_at| updated_at <= synced_at))
    }

    pub(crate) async fn clear_sync_marker(&self, id: i64) -> Result<(), RepositoryError> {
        self.store
            .zrem(self.keys.sync_marker(), &id.to_string())
            .await?;
        Ok(())
    }

    pub(crate) async fn tombstone(&self, id: i64) -> Result<(), RepositoryError> {
        self.store
            .sadd(self.keys.tombstones(), &id.to_string())
            .await?;
        Ok(())
    }

    pub(crate) async fn is_tombstoned(&self, id: i64) -> Result<bool, RepositoryError> {
        Ok(self
            .store
            .sismember(self.keys.tombstones(), &id.to_string())
            .await?)
    }

    pub(crate) async fn deleted_ids(&self) -> Result<Vec<i64>, RepositoryError> {
        let key = self.keys.tombstones();
        let mut ids = self
            .store
            .smembers(key)
            .await?
            .iter()
            .map(|member| parse_id(key, member))
            .collect::<Result<Vec<_>, _>>()?;
        ids.sort_unstable();
        Ok(ids)
    }

    pub(crate) async fn remove_deleted_flag(&self, id: i64) -> Result<(), RepositoryError> {
        self.store
            .srem(self.keys.tombstones(), &id.to_string())
            .await?;
        Ok(())
    }

    /// Drop the hash and its update and access entries.
    pub(crate) async fn evict(&self, id: i64) -> Result<bool, RepositoryError> {
        let member = id.to_string();
        let existed = self.store.del(&self.keys.record(id)).await?;
        self.store
            .zrem(self.keys.update_index(), &member)
            .await?;
        self.store
            .zrem(self.keys.access_index(), &member)
            .await?;
        Ok(existed)
    }

    pub(crate) async fn ensure_purgeable(&self, id: i64) -> Result<(), RepositoryError> {
        if self.is_synced(id).await? {
            Ok(())
        } else {
            Err(RepositoryError::CannotPurgeNotSynced {
                kind: self.kind(),
                id,
            })
        }
    }
}
