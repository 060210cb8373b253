//! User repository: hot-store users with read-through from the durable store.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::application::clock::Clock;
use crate::application::repos::UserFetcher;
use crate::domain::entities::{NewUser, UserRecord};
use crate::domain::error::DomainError;
use crate::domain::types::EntityKind;

use super::codec::parse_id;
use super::config::CacheConfig;
use super::error::RepositoryError;
use super::keys::{SECRETS, USERNAMES, USERS};
use super::lifecycle::{CacheLifecycle, EntityIndex};
use super::store::HotStore;

const METRIC_FALLBACK: &str = "murmur_fallback_total";

/// A uniqueness key held by at most one live user.
#[derive(Debug, Clone, Copy)]
enum Credential<'a> {
    Username(&'a str),
    Secret(&'a str),
}

impl Credential<'_> {
    fn map(&self) -> &'static str {
        match self {
            Credential::Username(_) => USERNAMES,
            Credential::Secret(_) => SECRETS,
        }
    }

    fn value(&self) -> &str {
        match self {
            Credential::Username(value) | Credential::Secret(value) => value,
        }
    }
}

pub struct UserRepository {
    index: EntityIndex,
    fallback: Option<Arc<dyn UserFetcher>>,
}

impl UserRepository {
    pub fn new(store: Arc<dyn HotStore>, clock: Arc<dyn Clock>, config: &CacheConfig) -> Self {
        Self {
            index: EntityIndex::new(store, clock, USERS, config.sequence_start),
            fallback: None,
        }
    }

    /// Read misses go to `fetcher` before failing with `NotFound`.
    pub fn with_fallback_fetcher(mut self, fetcher: Arc<dyn UserFetcher>) -> Self {
        self.fallback = Some(fetcher);
        self
    }

    /// Register a user. Both the username and the secret must be unused.
    #[instrument(skip(self, user), fields(username = %user.username))]
    pub async fn add_user(&self, user: NewUser) -> Result<i64, RepositoryError> {
        if user.username.trim().is_empty() {
            return Err(DomainError::validation("username must not be empty").into());
        }
        if user.auth.is_empty() {
            return Err(DomainError::validation("auth secret must not be empty").into());
        }

        if self.owner(Credential::Username(&user.username)).await?.is_some() {
            return Err(RepositoryError::already_registered(user.username));
        }
        if self.owner(Credential::Secret(&user.auth)).await?.is_some() {
            return Err(RepositoryError::already_registered("auth secret"));
        }

        let store = self.index.store();
        let id = self.next_id().await?;
        let member = id.to_string();

        if !store.hset_nx(USERNAMES, &user.username, &member).await? {
            return Err(RepositoryError::already_registered(user.username));
        }
        if !store.hset_nx(SECRETS, &user.auth, &member).await? {
            store.hdel(USERNAMES, &user.username).await?;
            return Err(RepositoryError::already_registered("auth secret"));
        }

        let record = UserRecord {
            id,
            username: user.username,
            auth: user.auth,
            timestamp: self.index.clock().now_truncated(),
        };
        self.index.write(&record).await?;
        debug!(id, "user registered");
        Ok(id)
    }

    pub async fn find(&self, id: i64) -> Result<UserRecord, RepositoryError> {
        if let Some(user) = self.index.load::<UserRecord>(id).await? {
            self.index.touch(id).await?;
            return Ok(user);
        }

        let Some(fetcher) = self.fallback.as_ref() else {
            return Err(self.index.not_found(id));
        };
        // Deleted here; the durable row only waits for the next sync.
        if self.index.is_tombstoned(id).await? {
            return Err(self.index.not_found(id));
        }

        match fetcher.fetch_user(id).await? {
            Some(user) => {
                self.refill(&user).await?;
                counter!(METRIC_FALLBACK, "kind" => "user", "result" => "refilled").increment(1);
                Ok(user)
            }
            None => {
                counter!(METRIC_FALLBACK, "kind" => "user", "result" => "miss").increment(1);
                Err(self.index.not_found(id))
            }
        }
    }

    async fn next_id(&self) -> Result<i64, RepositoryError> {
        if !self.index.sequence_started().await? {
            let durable_max = match self.fallback.as_ref() {
                Some(fetcher) => fetcher.max_user_id().await?,
                None => None,
            };
            self.index.start_sequence(durable_max).await?;
        }
        self.index.next_id().await
    }

    /// Id of the live user holding `credential`, looking in the durable store
    /// when the hot map has no entry. A durable owner is refilled.
    async fn owner(&self, credential: Credential<'_>) -> Result<Option<i64>, RepositoryError> {
        let map = credential.map();
        if let Some(raw) = self.index.store().hget(map, credential.value()).await? {
            return Ok(Some(parse_id(map, &raw)?));
        }

        let Some(fetcher) = self.fallback.as_ref() else {
            return Ok(None);
        };
        let durable = match credential {
            Credential::Username(username) => fetcher.fetch_user_by_username(username).await?,
            Credential::Secret(secret) => fetcher.fetch_user_by_secret(secret).await?,
        };
        let Some(user) = durable else {
            return Ok(None);
        };
        if self.index.is_tombstoned(user.id).await? {
            return Ok(None);
        }
        if self.index.load::<UserRecord>(user.id).await?.is_none() {
            self.refill(&user).await?;
            counter!(METRIC_FALLBACK, "kind" => "user", "result" => "refilled").increment(1);
        }
        Ok(Some(user.id))
    }

    async fn refill(&self, user: &UserRecord) -> Result<(), RepositoryError> {
        let store = self.index.store();
        let member = user.id.to_string();
        store.hset_nx(USERNAMES, &user.username, &member).await?;
        store.hset_nx(SECRETS, &user.auth, &member).await?;
        self.index.write(user).await?;
        self.index.mark_refilled(user.id).await
    }

    /// Remove a user from the hot store. A user known to the durable store
    /// leaves a tombstone for the next sync. Unknown ids are ignored.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<(), RepositoryError> {
        let user = match self.find(id).await {
            Ok(user) => user,
            Err(RepositoryError::NotFound { .. }) => return Ok(()),
            Err(err) => return Err(err),
        };

        if self.index.has_sync_marker(id).await? {
            self.index.tombstone(id).await?;
        }
        self.index.evict(id).await?;
        self.release(USERNAMES, &user.username, id).await?;
        self.release(SECRETS, &user.auth, id).await?;
        self.index.clear_sync_marker(id).await?;
        debug!(id, "user deleted");
        Ok(())
    }

    async fn release(&self, map: &str, field: &str, id: i64) -> Result<(), RepositoryError> {
        let store = self.index.store();
        if store.hget(map, field).await?.as_deref() == Some(id.to_string().as_str()) {
            store.hdel(map, field).await?;
        }
        Ok(())
    }

    /// Users whose update time lies in `[start, end]`, oldest first.
    pub async fn fetch_updated_between(
        &self,
        start: Option<OffsetDateTime>,
        end: Option<OffsetDateTime>,
    ) -> Result<Vec<UserRecord>, RepositoryError> {
        let ids = self.index.ids_updated_between(start, end).await?;
        let mut users = Vec::with_capacity(ids.len());
        for id in ids {
            // Deleted or purged between the index read and the load.
            if let Some(user) = self.index.load::<UserRecord>(id).await? {
                users.push(user);
            }
        }
        Ok(users)
    }

    pub async fn is_registered(&self, username: &str) -> Result<bool, RepositoryError> {
        Ok(self.owner(Credential::Username(username)).await?.is_some())
    }

    pub async fn user_id(&self, username: &str) -> Result<i64, RepositoryError> {
        self.owner(Credential::Username(username))
            .await?
            .ok_or_else(|| self.index.not_found(username))
    }

    pub async fn user_id_by_secret(&self, secret: &str) -> Result<i64, RepositoryError> {
        self.owner(Credential::Secret(secret))
            .await?
            .ok_or(RepositoryError::InvalidCredential)
    }

    pub async fn username(&self, id: i64) -> Result<String, RepositoryError> {
        Ok(self.find(id).await?.username)
    }

    pub async fn auth_secret(&self, id: i64) -> Result<String, RepositoryError> {
        Ok(self.find(id).await?.auth)
    }
}

#[async_trait]
impl CacheLifecycle for UserRepository {
    fn kind(&self) -> EntityKind {
        EntityKind::User
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

    /// The username and secret lookups stay, so a purged user can still
    /// authenticate and is refilled on the next read.
    async fn purge(&self, id: i64) -> Result<(), RepositoryError> {
        self.index.ensure_purgeable(id).await?;
        self.index.evict(id).await?;
        self.index.clear_sync_marker(id).await?;
        Ok(())
    }
}
