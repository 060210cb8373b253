//! In-process hot store backed by a sharded concurrent map.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::ops::Bound;

use async_trait::async_trait;
use dashmap::DashMap;

use super::store::{HotStore, HotStoreError, ScoreRange};

#[derive(Debug, Clone)]
enum Value {
    Counter(i64),
    Hash(HashMap<String, String>),
    SortedSet(SortedSet),
    Set(HashSet<String>),
    List(VecDeque<String>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Counter(_) => "counter",
            Value::Hash(_) => "hash",
            Value::SortedSet(_) => "sorted set",
            Value::Set(_) => "set",
            Value::List(_) => "list",
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Value::Counter(_) => false,
            Value::Hash(map) => map.is_empty(),
            Value::SortedSet(set) => set.scores.is_empty(),
            Value::Set(set) => set.is_empty(),
            Value::List(list) => list.is_empty(),
        }
    }
}

macro_rules! typed {
    ($value:expr, $key:expr, $variant:ident, $expected:literal) => {
        match $value {
            Value::$variant(inner) => Ok(inner),
            other => Err(HotStoreError::WrongType {
                key: $key.to_string(),
                expected: $expected,
                found: other.type_name(),
            }),
        }
    };
}

#[derive(Debug, Clone, Default)]
struct SortedSet {
    scores: HashMap<String, i64>,
    ordered: BTreeSet<(i64, String)>,
}

impl SortedSet {
    fn insert(&mut self, member: &str, score: i64) {
        if let Some(previous) = self.scores.insert(member.to_string(), score) {
            self.ordered.remove(&(previous, member.to_string()));
        }
        self.ordered.insert((score, member.to_string()));
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(previous) => {
                self.ordered.remove(&(previous, member.to_string()));
                true
            }
            None => false,
        }
    }

    fn range(&self, range: ScoreRange) -> Vec<(String, i64)> {
        let lower = match range.min {
            Some(min) => Bound::Included((min, String::new())),
            None => Bound::Unbounded,
        };

        self.ordered
            .range((lower, Bound::Unbounded))
            .take_while(|(score, _)| range.max.is_none_or(|max| *score <= max))
            .map(|(score, member)| (member.clone(), *score))
            .collect()
    }
}

/// Hot store living in the current process.
///
/// Each key lives in one shard of a [`DashMap`], so every primitive runs
/// under that shard's lock and is atomic for its key.
#[derive(Debug, Default)]
pub struct MemoryHotStore {
    entries: DashMap<String, Value>,
}

impl MemoryHotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn drop_if_empty(&self, key: &str) {
        self.entries.remove_if(key, |_, value| value.is_empty());
    }
}

#[async_trait]
impl HotStore for MemoryHotStore {
    async fn incr(&self, key: &str) -> Result<i64, HotStoreError> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Value::Counter(0));
        let counter = typed!(&mut *entry, key, Counter, "counter")?;
        *counter += 1;
        Ok(*counter)
    }

    async fn init_counter(&self, key: &str, value: i64) -> Result<bool, HotStoreError> {
        match self.entries.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                typed!(entry.get(), key, Counter, "counter")?;
                Ok(false)
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Value::Counter(value));
                Ok(true)
            }
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, HotStoreError> {
        Ok(self.entries.contains_key(key))
    }

    async fn del(&self, key: &str) -> Result<bool, HotStoreError> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn hset_all(&self, key: &str, fields: &[(&str, String)]) -> Result<(), HotStoreError> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Value::Hash(HashMap::new()));
        let hash = typed!(&mut *entry, key, Hash, "hash")?;
        for (field, value) in fields {
            hash.insert((*field).to_string(), value.clone());
        }
        Ok(())
    }

    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>, HotStoreError> {
        match self.entries.get(key) {
            Some(entry) => Ok(typed!(&*entry, key, Hash, "hash")?.clone()),
            None => Ok(HashMap::new()),
        }
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, HotStoreError> {
        match self.entries.get(key) {
            Some(entry) => Ok(typed!(&*entry, key, Hash, "hash")?.get(field).cloned()),
            None => Ok(None),
        }
    }

    async fn hset_nx(&self, key: &str, field: &str, value: &str) -> Result<bool, HotStoreError> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Value::Hash(HashMap::new()));
        let hash = typed!(&mut *entry, key, Hash, "hash")?;
        if hash.contains_key(field) {
            return Ok(false);
        }
        hash.insert(field.to_string(), value.to_string());
        Ok(true)
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, HotStoreError> {
        let removed = match self.entries.get_mut(key) {
            Some(mut entry) => typed!(&mut *entry, key, Hash, "hash")?
                .remove(field)
                .is_some(),
            None => false,
        };
        self.drop_if_empty(key);
        Ok(removed)
    }

    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> Result<i64, HotStoreError> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Value::Hash(HashMap::new()));
        let hash = typed!(&mut *entry, key, Hash, "hash")?;
        let current = match hash.get(field) {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| HotStoreError::NotAnInteger {
                    key: format!("{key}.{field}"),
                })?,
            None => 0,
        };
        let next = current + delta;
        hash.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), HotStoreError> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Value::SortedSet(SortedSet::default()));
        typed!(&mut *entry, key, SortedSet, "sorted set")?.insert(member, score);
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool, HotStoreError> {
        let removed = match self.entries.get_mut(key) {
            Some(mut entry) => typed!(&mut *entry, key, SortedSet, "sorted set")?.remove(member),
            None => false,
        };
        self.drop_if_empty(key);
        Ok(removed)
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>, HotStoreError> {
        match self.entries.get(key) {
            Some(entry) => Ok(typed!(&*entry, key, SortedSet, "sorted set")?
                .scores
                .get(member)
                .copied()),
            None => Ok(None),
        }
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        range: ScoreRange,
    ) -> Result<Vec<(String, i64)>, HotStoreError> {
        match self.entries.get(key) {
            Some(entry) => Ok(typed!(&*entry, key, SortedSet, "sorted set")?.range(range)),
            None => Ok(Vec::new()),
        }
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, HotStoreError> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Value::Set(HashSet::new()));
        Ok(typed!(&mut *entry, key, Set, "set")?.insert(member.to_string()))
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, HotStoreError> {
        let removed = match self.entries.get_mut(key) {
            Some(mut entry) => typed!(&mut *entry, key, Set, "set")?.remove(member),
            None => false,
        };
        self.drop_if_empty(key);
        Ok(removed)
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, HotStoreError> {
        match self.entries.get(key) {
            Some(entry) => Ok(typed!(&*entry, key, Set, "set")?.contains(member)),
            None => Ok(false),
        }
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, HotStoreError> {
        match self.entries.get(key) {
            Some(entry) => Ok(typed!(&*entry, key, Set, "set")?.iter().cloned().collect()),
            None => Ok(Vec::new()),
        }
    }

    async fn scard(&self, key: &str) -> Result<u64, HotStoreError> {
        match self.entries.get(key) {
            Some(entry) => Ok(typed!(&*entry, key, Set, "set")?.len() as u64),
            None => Ok(0),
        }
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<u64, HotStoreError> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Value::List(VecDeque::new()));
        let list = typed!(&mut *entry, key, List, "list")?;
        list.push_back(value.to_string());
        Ok(list.len() as u64)
    }

    async fn lrem(&self, key: &str, value: &str) -> Result<u64, HotStoreError> {
        let removed = match self.entries.get_mut(key) {
            Some(mut entry) => {
                let list = typed!(&mut *entry, key, List, "list")?;
                let before = list.len();
                list.retain(|item| item != value);
                (before - list.len()) as u64
            }
            None => 0,
        };
        self.drop_if_empty(key);
        Ok(removed)
    }

    async fn lrange(
        &self,
        key: &str,
        start: usize,
        count: usize,
    ) -> Result<Vec<String>, HotStoreError> {
        match self.entries.get(key) {
            Some(entry) => Ok(typed!(&*entry, key, List, "list")?
                .iter()
                .skip(start)
                .take(count)
                .cloned()
                .collect()),
            None => Ok(Vec::new()),
        }
    }

    async fn llen(&self, key: &str) -> Result<u64, HotStoreError> {
        match self.entries.get(key) {
            Some(entry) => Ok(typed!(&*entry, key, List, "list")?.len() as u64),
            None => Ok(0),
        }
    }

    async fn flush(&self) -> Result<(), HotStoreError> {
        self.entries.clear();
        Ok(())
    }
}
