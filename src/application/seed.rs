//! Reset both stores and fill the hot store with backdated demo data.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use time::Duration;
use tracing::info;

use crate::application::clock::{Clock, ManualClock};
use crate::application::repos::{DurableAdminRepo, RepoError};
use crate::cache::{
    CacheConfig, CommentRepository, HotStore, HotStoreError, RepositoryError, UserRepository,
};
use crate::domain::entities::{NewComment, NewUser};
use crate::util::since;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("cannot seed comments without users")]
    NoAuthors,
    #[error("failed to flush the hot store: {0}")]
    Flush(#[from] HotStoreError),
    #[error("failed to truncate the durable store: {0}")]
    Truncate(#[from] RepoError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// How much data to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedPlan {
    pub number_users: usize,
    pub number_comments: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub user_ids: Vec<i64>,
    pub comment_ids: Vec<i64>,
}

pub struct SeedService {
    store: Arc<dyn HotStore>,
    admin: Arc<dyn DurableAdminRepo>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
}

impl SeedService {
    pub fn new(
        store: Arc<dyn HotStore>,
        admin: Arc<dyn DurableAdminRepo>,
        clock: Arc<dyn Clock>,
        config: CacheConfig,
    ) -> Self {
        Self {
            store,
            admin,
            clock,
            config,
        }
    }

    /// User `n` is created `n` days ago with username `user{n}` and secret
    /// `secret{n}`. Comment `n` is posted `n + sync_minutes` minutes ago so
    /// the next sync picks it up.
    pub async fn run(&self, plan: SeedPlan) -> Result<SeedReport, SeedError> {
        if plan.number_users == 0 && plan.number_comments > 0 {
            return Err(SeedError::NoAuthors);
        }

        self.store.flush().await?;
        self.admin.truncate_all().await?;

        let now = self.clock.now_truncated();
        let backdated = Arc::new(ManualClock::new(now));
        let users = UserRepository::new(self.store.clone(), backdated.clone(), &self.config);
        let comments = CommentRepository::new(self.store.clone(), backdated.clone(), &self.config);

        info!(count = plan.number_users, "seeding users");
        let mut authors = Vec::with_capacity(plan.number_users);
        for n in 1..=plan.number_users {
            backdated.set(now - Duration::days(n as i64));
            let username = format!("user{n}");
            let id = users
                .add_user(NewUser {
                    username: username.clone(),
                    auth: format!("secret{n}"),
                })
                .await?;
            authors.push((id, username));
        }

        info!(count = plan.number_comments, "seeding comments");
        let sync_minutes = i64::from(self.config.sync_minutes);
        let mut comment_ids = Vec::with_capacity(plan.number_comments);
        for n in 1..=plan.number_comments {
            backdated.set(now - Duration::minutes(n as i64 + sync_minutes));
            let (user_id, username) = &authors[(n - 1) % authors.len()];
            let id = comments
                .post(NewComment {
                    comment: format!("Seeded comment #{n} by {username}."),
                    user_id: *user_id,
                    username: username.clone(),
                })
                .await?;
            comment_ids.push(id);
        }

        let oldest = now - Duration::days(plan.number_users as i64);
        info!(
            users = authors.len(),
            comments = comment_ids.len(),
            oldest_user = %since(now, oldest),
            "seeded"
        );
        Ok(SeedReport {
            user_ids: authors.into_iter().map(|(id, _)| id).collect(),
            comment_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheLifecycle, MemoryHotStore};
    use crate::infra::memory::MemoryDurableStore;

    const T0: i64 = 1_700_000_000;

    #[tokio::test]
    async fn seeds_backdated_users_and_comments() {
        let clock = Arc::new(ManualClock::at_unix(T0));
        let store = Arc::new(MemoryHotStore::new());
        let durable = Arc::new(MemoryDurableStore::new());
        let config = CacheConfig::default();
        let seed = SeedService::new(store.clone(), durable, clock.clone(), config.clone());

        let report = seed
            .run(SeedPlan {
                number_users: 3,
                number_comments: 4,
            })
            .await
            .unwrap();
        assert_eq!(report.user_ids, vec![1, 2, 3]);
        assert_eq!(report.comment_ids, vec![1, 2, 3, 4]);

        let users = UserRepository::new(store.clone(), clock.clone(), &config);
        let comments = CommentRepository::new(store, clock.clone(), &config);

        let second = users.find(2).await.unwrap();
        assert_eq!(second.username, "user2");
        assert_eq!(second.auth, "secret2");
        assert_eq!(second.timestamp.unix_timestamp(), T0 - 2 * 86_400);
        assert_eq!(users.user_id_by_secret("secret3").await.unwrap(), 3);

        let fourth = comments.find(4).await.unwrap();
        assert_eq!(fourth.user_id, 1);
        assert_eq!(fourth.username, "user1");
        assert_eq!(fourth.timestamp.unix_timestamp(), T0 - 9 * 60);

        let cutoff = clock.now() - config.sync_grace();
        assert_eq!(
            comments
                .fetch_updated_between(None, Some(cutoff))
                .await
                .unwrap()
                .len(),
            4
        );
        assert!(!comments.is_synced(1).await.unwrap());
    }

    #[tokio::test]
    async fn reseeding_starts_from_a_clean_slate() {
        let clock = Arc::new(ManualClock::at_unix(T0));
        let store = Arc::new(MemoryHotStore::new());
        let durable = Arc::new(MemoryDurableStore::new());
        let seed = SeedService::new(store, durable, clock, CacheConfig::default());
        let plan = SeedPlan {
            number_users: 2,
            number_comments: 1,
        };

        seed.run(plan).await.unwrap();
        let again = seed.run(plan).await.unwrap();
        assert_eq!(again.user_ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn comments_need_at_least_one_author() {
        let clock = Arc::new(ManualClock::at_unix(T0));
        let seed = SeedService::new(
            Arc::new(MemoryHotStore::new()),
            Arc::new(MemoryDurableStore::new()),
            clock,
            CacheConfig::default(),
        );
        let err = seed
            .run(SeedPlan {
                number_users: 0,
                number_comments: 1,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SeedError::NoAuthors));
    }
}
