mod context;
mod purge_cache;
mod sync_cache;

pub use context::CacheJobContext;
pub use purge_cache::{
    PURGE_CACHE_WORKER, PurgeCacheJob, process_purge_cache_job, purge_cache_schedule,
};
pub use sync_cache::{SYNC_CACHE_WORKER, SyncCacheJob, process_sync_cache_job, sync_cache_schedule};
