//! Cache engine configuration.
//!
//! Controls the sync grace window, the purge staleness window and id
//! allocation via the `[cache]` section of `murmur.toml`.

use serde::Deserialize;
use time::Duration;

const DEFAULT_SYNC_MINUTES: u32 = 5;
const DEFAULT_PURGE_MINUTES: u32 = 10;
const DEFAULT_SEQUENCE_START: i64 = 0;
const DEFAULT_HOME_SIZE: usize = 100;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Minutes a write must age before it becomes sync-eligible.
    pub sync_minutes: u32,
    /// Minutes without access before a synced record becomes purge-eligible.
    pub purge_minutes: u32,
    /// Ids are allocated from `sequence_start + 1` upwards.
    pub sequence_start: i64,
    /// Number of comments listed on the home feed.
    pub home_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sync_minutes: DEFAULT_SYNC_MINUTES,
            purge_minutes: DEFAULT_PURGE_MINUTES,
            sequence_start: DEFAULT_SEQUENCE_START,
            home_size: DEFAULT_HOME_SIZE,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            sync_minutes: settings.sync_minutes,
            purge_minutes: settings.purge_minutes,
            sequence_start: settings.sequence_start,
            home_size: settings.home_size.get(),
        }
    }
}

impl CacheConfig {
    pub fn sync_grace(&self) -> Duration {
        Duration::minutes(self.sync_minutes.into())
    }

    pub fn purge_staleness(&self) -> Duration {
        Duration::minutes(self.purge_minutes.into())
    }
}
