//! Cron job evicting stale synced records from the hot store.

use std::str::FromStr;

use apalis::prelude::*;
use apalis_cron::Schedule;

use super::context::CacheJobContext;
use crate::infra::error::InfraError;

pub const PURGE_CACHE_WORKER: &str = "purge-cache";

#[derive(Default, Debug, Clone)]
pub struct PurgeCacheJob;

impl From<chrono::DateTime<chrono::Utc>> for PurgeCacheJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

pub async fn process_purge_cache_job(
    _job: PurgeCacheJob,
    ctx: Data<CacheJobContext>,
) -> Result<(), apalis::prelude::Error> {
    match ctx.purge.run(ctx.purge_minutes).await {
        Ok(report) if report.evicted() > 0 => {
            tracing::info!(evicted = report.evicted(), "Purged stale records");
        }
        Err(err) => {
            tracing::warn!(error = %err, "Purge run aborted");
        }
        _ => {}
    }
    Ok(())
}

pub fn purge_cache_schedule(expression: &str) -> Result<Schedule, InfraError> {
    Schedule::from_str(expression)
        .map_err(|err| InfraError::schedule(PURGE_CACHE_WORKER, expression, err))
}
