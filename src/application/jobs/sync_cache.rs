//! Cron job pushing pending hot-store writes into the durable store.

use std::str::FromStr;

use apalis::prelude::*;
use apalis_cron::Schedule;

use super::context::CacheJobContext;
use crate::infra::error::InfraError;

pub const SYNC_CACHE_WORKER: &str = "sync-cache";

/// Must implement `From<chrono::DateTime<chrono::Utc>>` for apalis-cron.
#[derive(Default, Debug, Clone)]
pub struct SyncCacheJob;

impl From<chrono::DateTime<chrono::Utc>> for SyncCacheJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

/// Failures are logged and never stop the worker; pending records are
/// picked up again on the next tick.
pub async fn process_sync_cache_job(
    _job: SyncCacheJob,
    ctx: Data<CacheJobContext>,
) -> Result<(), apalis::prelude::Error> {
    match ctx.sync.run(ctx.sync_minutes).await {
        Ok(report) if report.failures() > 0 => {
            tracing::warn!(failures = report.failures(), "Sync run left records pending");
        }
        Err(err) => {
            tracing::warn!(error = %err, "Sync run aborted");
        }
        _ => {}
    }
    Ok(())
}

pub fn sync_cache_schedule(expression: &str) -> Result<Schedule, InfraError> {
    Schedule::from_str(expression)
        .map_err(|err| InfraError::schedule(SYNC_CACHE_WORKER, expression, err))
}
