//! Hot store capability.
//!
//! A key-value backend with counters, hashes, sorted sets, plain sets and
//! lists. Every primitive is atomic for the single key it touches; the
//! repositories layer all business rules on top.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HotStoreError {
    #[error("key `{key}` holds a {found} value, expected {expected}")]
    WrongType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("value at `{key}` is not an integer")]
    NotAnInteger { key: String },
    #[error("hot store backend error: {0}")]
    Backend(String),
}

impl HotStoreError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Score-ordered range bound. `None` on either side means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreRange {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl ScoreRange {
    pub fn new(min: Option<i64>, max: Option<i64>) -> Self {
        Self { min, max }
    }

    pub fn up_to(max: i64) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }

    pub fn contains(&self, score: i64) -> bool {
        self.min.is_none_or(|min| score >= min) && self.max.is_none_or(|max| score <= max)
    }
}

#[async_trait]
pub trait HotStore: Send + Sync {
    /// Increment the counter at `key` by one and return the new value.
    async fn incr(&self, key: &str) -> Result<i64, HotStoreError>;

    /// Set the counter at `key` only when it does not exist yet.
    async fn init_counter(&self, key: &str, value: i64) -> Result<bool, HotStoreError>;

    async fn exists(&self, key: &str) -> Result<bool, HotStoreError>;

    /// Remove `key` of any type. Returns whether something was removed.
    async fn del(&self, key: &str) -> Result<bool, HotStoreError>;

    async fn hset_all(&self, key: &str, fields: &[(&str, String)]) -> Result<(), HotStoreError>;

    /// All fields of the hash at `key`; empty when absent.
    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>, HotStoreError>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, HotStoreError>;

    /// Set `field` only when absent. Returns whether the write happened.
    async fn hset_nx(&self, key: &str, field: &str, value: &str) -> Result<bool, HotStoreError>;

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, HotStoreError>;

    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> Result<i64, HotStoreError>;

    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), HotStoreError>;

    async fn zrem(&self, key: &str, member: &str) -> Result<bool, HotStoreError>;

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>, HotStoreError>;

    /// Members whose score falls in `range` (inclusive), ordered by score.
    async fn zrange_by_score(
        &self,
        key: &str,
        range: ScoreRange,
    ) -> Result<Vec<(String, i64)>, HotStoreError>;

    /// Add `member`; returns whether membership changed.
    async fn sadd(&self, key: &str, member: &str) -> Result<bool, HotStoreError>;

    async fn srem(&self, key: &str, member: &str) -> Result<bool, HotStoreError>;

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, HotStoreError>;

    async fn smembers(&self, key: &str) -> Result<Vec<String>, HotStoreError>;

    async fn scard(&self, key: &str) -> Result<u64, HotStoreError>;

    async fn rpush(&self, key: &str, value: &str) -> Result<u64, HotStoreError>;

    /// Remove every occurrence of `value`; returns the number removed.
    async fn lrem(&self, key: &str, value: &str) -> Result<u64, HotStoreError>;

    /// Elements `start..start + count` of the list at `key`.
    async fn lrange(
        &self,
        key: &str,
        start: usize,
        count: usize,
    ) -> Result<Vec<String>, HotStoreError>;

    async fn llen(&self, key: &str) -> Result<u64, HotStoreError>;

    /// Drop every key.
    async fn flush(&self) -> Result<(), HotStoreError>;
}
