use std::sync::Arc;

use crate::application::{purge::PurgeService, sync::SyncService};

/// Shared context passed to the cache workers.
#[derive(Clone)]
pub struct CacheJobContext {
    pub sync: Arc<SyncService>,
    pub purge: Arc<PurgeService>,
    pub sync_minutes: u32,
    pub purge_minutes: u32,
}
