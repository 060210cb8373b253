//! Murmur cache engine.
//!
//! New users and comments land in the hot store first. The sync engine later
//! copies them into Postgres and the purge engine evicts hot copies that are
//! both durable and stale. Reads that miss the hot store fall back to the
//! durable store and repopulate it.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! sync_minutes = 5
//! purge_minutes = 10
//! sequence_start = 0
//! ```

mod codec;
mod comments;
mod config;
mod error;
mod keys;
mod lifecycle;
mod memory;
mod store;
mod users;

pub use codec::HashRecord;
pub use comments::CommentRepository;
pub use config::CacheConfig;
pub use error::RepositoryError;
pub use keys::{COMMENT_FEED, COMMENTS, Keyspace, SECRETS, USERNAMES, USERS, comment_likes};
pub use lifecycle::CacheLifecycle;
pub use memory::MemoryHotStore;
pub use store::{HotStore, HotStoreError, ScoreRange};
pub use users::UserRepository;
