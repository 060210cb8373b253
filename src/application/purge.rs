//! Eviction of synced hot-store copies nobody has read for a while.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use serde::Serialize;
use thiserror::Error;
use time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::application::clock::Clock;
use crate::cache::{CacheLifecycle, RepositoryError};
use crate::domain::types::EntityKind;

const METRIC_EVICTED: &str = "murmur_purge_evicted_total";
const METRIC_FAILED: &str = "murmur_purge_failed_total";
const METRIC_RUN_MS: &str = "murmur_purge_run_ms";

#[derive(Debug, Error)]
pub enum PurgeError {
    #[error("failed to list stalled {kind} ids: {source}")]
    Listing {
        kind: EntityKind,
        #[source]
        source: RepositoryError,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindPurgeReport {
    pub evicted: u64,
    /// Written again after the stalled listing; left for a later run.
    pub skipped_unsynced: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub users: KindPurgeReport,
    pub comments: KindPurgeReport,
}

impl PurgeReport {
    fn slot(&mut self, kind: EntityKind) -> &mut KindPurgeReport {
        match kind {
            EntityKind::User => &mut self.users,
            EntityKind::Comment => &mut self.comments,
        }
    }

    pub fn evicted(&self) -> u64 {
        self.users.evicted + self.comments.evicted
    }
}

pub struct PurgeService {
    repositories: Vec<Arc<dyn CacheLifecycle>>,
    clock: Arc<dyn Clock>,
}

impl PurgeService {
    /// Repositories are purged in the order given.
    pub fn new(repositories: Vec<Arc<dyn CacheLifecycle>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repositories,
            clock,
        }
    }

    /// Evict every record not accessed within the last `stale_minutes`.
    #[instrument(skip(self))]
    pub async fn run(&self, stale_minutes: u32) -> Result<PurgeReport, PurgeError> {
        let started = Instant::now();
        let cutoff = self.clock.now() - Duration::minutes(stale_minutes.into());
        let mut report = PurgeReport::default();

        for repository in &self.repositories {
            let kind = repository.kind();
            let ids = repository
                .fetch_stalled_ids(cutoff)
                .await
                .map_err(|source| PurgeError::Listing { kind, source })?;

            let slot = report.slot(kind);
            for id in ids {
                match repository.purge(id).await {
                    Ok(()) => slot.evicted += 1,
                    Err(RepositoryError::CannotPurgeNotSynced { .. }) => {
                        debug!(kind = kind.as_str(), id, "skipping unsynced record");
                        slot.skipped_unsynced += 1;
                    }
                    Err(err) => {
                        warn!(kind = kind.as_str(), id, error = %err, "purge failed");
                        slot.failed += 1;
                    }
                }
            }

            counter!(METRIC_EVICTED, "kind" => kind.as_str()).increment(slot.evicted);
            counter!(METRIC_FAILED, "kind" => kind.as_str()).increment(slot.failed);
        }

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_RUN_MS).record(elapsed_ms);
        info!(
            stale_minutes,
            users_evicted = report.users.evicted,
            comments_evicted = report.comments.evicted,
            skipped = report.users.skipped_unsynced + report.comments.skipped_unsynced,
            elapsed_ms,
            "purge run finished"
        );
        Ok(report)
    }
}
