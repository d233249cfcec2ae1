//! In-process store backend.
//!
//! Mirrors the Redis list and TTL semantics closely enough that the monitor
//! behaves the same against either backend.

use async_trait::async_trait;
use queuewatch_core::{MetricsStore, StoreResult};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
enum Entry {
    List(VecDeque<String>),
    Value {
        value: String,
        expires_at: Instant,
    },
}

/// Thread-safe in-memory [`MetricsStore`]
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys, expired values excluded
    pub async fn key_count(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| match entry {
                Entry::List(_) => true,
                Entry::Value { expires_at, .. } => *expires_at > now,
            })
            .count()
    }

    pub async fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        match self.entries.read().await.get(key) {
            Some(Entry::List(_)) => true,
            Some(Entry::Value { expires_at, .. }) => *expires_at > now,
            None => false,
        }
    }

    /// Length of the list at `key`, 0 when absent
    pub async fn list_len(&self, key: &str) -> usize {
        match self.entries.read().await.get(key) {
            Some(Entry::List(list)) => list.len(),
            _ => 0,
        }
    }
}

/// Resolve Redis-style inclusive indices against a list length
fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len || stop < 0 {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[async_trait]
impl MetricsStore for InMemoryStore {
    async fn push_front(&self, key: &str, value: String, max_len: usize) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::List(VecDeque::new()));
        if !matches!(entry, Entry::List(_)) {
            *entry = Entry::List(VecDeque::new());
        }
        if let Entry::List(list) = entry {
            list.push_front(value);
            list.truncate(max_len.max(1));
        }
        Ok(())
    }

    async fn range(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>> {
        let entries = self.entries.read().await;
        let Some(Entry::List(list)) = entries.get(key) else {
            return Ok(Vec::new());
        };
        Ok(match resolve_range(list.len(), start, stop) {
            Some((from, to)) => list.range(from..=to).cloned().collect(),
            None => Vec::new(),
        })
    }

    async fn trim(&self, key: &str, len: usize) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        if len == 0 {
            entries.remove(key);
            return Ok(());
        }
        if let Some(Entry::List(list)) = entries.get_mut(key) {
            list.truncate(len);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()> {
        self.entries.write().await.insert(
            key.to_string(),
            Entry::Value {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        Ok(match self.entries.read().await.get(key) {
            Some(Entry::Value { value, expires_at }) if *expires_at > now => Some(value.clone()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_front_keeps_most_recent_first() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store.push_front("list", i.to_string(), 3).await.unwrap();
        }
        let items = store.range("list", 0, -1).await.unwrap();
        assert_eq!(items, vec!["4", "3", "2"]);
    }

    #[tokio::test]
    async fn test_range_bounds() {
        let store = InMemoryStore::new();
        for i in 0..4 {
            store.push_front("list", i.to_string(), 10).await.unwrap();
        }
        assert_eq!(store.range("list", 0, 1).await.unwrap(), vec!["3", "2"]);
        assert_eq!(store.range("list", -2, -1).await.unwrap(), vec!["1", "0"]);
        assert_eq!(store.range("list", 0, 100).await.unwrap().len(), 4);
        assert!(store.range("list", 5, 10).await.unwrap().is_empty());
        assert!(store.range("missing", 0, -1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_trim_to_zero_removes_key() {
        let store = InMemoryStore::new();
        store.push_front("list", "a".into(), 10).await.unwrap();
        store.push_front("list", "b".into(), 10).await.unwrap();

        store.trim("list", 1).await.unwrap();
        assert_eq!(store.list_len("list").await, 1);

        store.trim("list", 0).await.unwrap();
        assert!(!store.contains_key("list").await);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let store = InMemoryStore::new();
        store
            .set_with_ttl("summary", "{}".into(), Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(store.get("summary").await.unwrap().as_deref(), Some("{}"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("summary").await.unwrap(), None);
        assert_eq!(store.key_count().await, 0);
    }

    #[test]
    fn test_resolve_range() {
        assert_eq!(resolve_range(0, 0, -1), None);
        assert_eq!(resolve_range(5, 0, -1), Some((0, 4)));
        assert_eq!(resolve_range(5, -10, 2), Some((0, 2)));
        assert_eq!(resolve_range(5, 3, 1), None);
    }
}
