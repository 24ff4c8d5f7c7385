//! In-process backing client

use anyhow::bail;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::entry::MemoryEntry;
use super::hub::{MemorySubscriber, PubSubHub};
use super::{BackingClient, SubscriberConnection};

/// Backing client that keeps everything in process memory.
///
/// Expired keys are dropped lazily on access; [`MemoryClient::evict_expired`]
/// sweeps the rest. Clones share the same data and pub/sub hub, the way
/// several connections to one server would.
#[derive(Clone, Default)]
pub struct MemoryClient {
  inner: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
  data: RwLock<HashMap<String, MemoryEntry>>,
  hub: Arc<PubSubHub>,
  expired: AtomicU64,
}

impl MemoryClient {
  pub fn new() -> Self {
    Self::default()
  }

  /// The pub/sub hub shared with duplicated connections
  pub fn hub(&self) -> Arc<PubSubHub> {
    self.inner.hub.clone()
  }

  /// Remove every expired key, returning how many were dropped
  pub fn evict_expired(&self) -> usize {
    let mut data = self.inner.data.write();
    let before = data.len();
    data.retain(|_, entry| !entry.is_expired());
    let count = before - data.len();
    self
      .inner
      .expired
      .fetch_add(count as u64, Ordering::Relaxed);
    count
  }

  /// Seconds left before `key` expires. `-2` if missing, `-1` if persistent.
  pub fn ttl(&self, key: &str) -> i64 {
    let data = self.inner.data.read();
    match data.get(key) {
      Some(entry) if !entry.is_expired() => entry
        .ttl_remaining()
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(-1),
      _ => -2,
    }
  }

  /// Number of live keys
  pub fn dbsize(&self) -> usize {
    let data = self.inner.data.read();
    data.values().filter(|e| !e.is_expired()).count()
  }

  /// Total keys dropped because their TTL ran out
  pub fn expired_count(&self) -> u64 {
    self.inner.expired.load(Ordering::Relaxed)
  }

  fn drop_if_expired(&self, data: &mut HashMap<String, MemoryEntry>, key: &str) {
    if data.get(key).is_some_and(|e| e.is_expired()) {
      data.remove(key);
      self.inner.expired.fetch_add(1, Ordering::Relaxed);
    }
  }
}

#[async_trait]
impl BackingClient for MemoryClient {
  async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
    let mut data = self.inner.data.write();
    self.drop_if_expired(&mut data, key);
    Ok(data.get(key).map(|e| e.value.clone()))
  }

  async fn set(&self, key: &str, value: String, ttl: Option<u64>) -> Result<(), anyhow::Error> {
    if ttl == Some(0) {
      bail!("invalid expire time in 'set' command");
    }
    let entry = MemoryEntry::new(value, ttl.map(Duration::from_secs));
    self.inner.data.write().insert(key.to_string(), entry);
    Ok(())
  }

  async fn del(&self, key: &str) -> Result<u64, anyhow::Error> {
    let mut data = self.inner.data.write();
    self.drop_if_expired(&mut data, key);
    Ok(data.remove(key).map(|_| 1).unwrap_or(0))
  }

  async fn exists(&self, key: &str) -> Result<bool, anyhow::Error> {
    let data = self.inner.data.read();
    Ok(data.get(key).map(|e| !e.is_expired()).unwrap_or(false))
  }

  async fn incr(&self, key: &str) -> Result<i64, anyhow::Error> {
    let mut data = self.inner.data.write();
    self.drop_if_expired(&mut data, key);

    let entry = match data.entry(key.to_string()) {
      Entry::Vacant(slot) => {
        slot.insert(MemoryEntry::new("1".to_string(), None));
        return Ok(1);
      }
      Entry::Occupied(slot) => slot.into_mut(),
    };

    let Ok(current) = entry.value.parse::<i64>() else {
      bail!("value is not an integer or out of range");
    };
    let Some(next) = current.checked_add(1) else {
      bail!("increment or decrement would overflow");
    };
    // TTL is kept, matching Redis INCR.
    entry.value = next.to_string();
    Ok(next)
  }

  async fn expire(&self, key: &str, ttl: u64) -> Result<bool, anyhow::Error> {
    let mut data = self.inner.data.write();
    self.drop_if_expired(&mut data, key);
    match data.get_mut(key) {
      Some(entry) => {
        entry.update_ttl(Some(Duration::from_secs(ttl)));
        Ok(true)
      }
      None => Ok(false),
    }
  }

  async fn publish(&self, channel: &str, message: String) -> Result<u64, anyhow::Error> {
    Ok(self.inner.hub.publish(channel, &message) as u64)
  }

  async fn duplicate(&self) -> Result<Box<dyn SubscriberConnection>, anyhow::Error> {
    Ok(Box::new(MemorySubscriber::new(self.inner.hub.clone())))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_set_get_del() {
    let client = MemoryClient::new();
    client.set("k", "v".to_string(), None).await.unwrap();
    assert_eq!(client.get("k").await.unwrap().as_deref(), Some("v"));
    assert!(client.exists("k").await.unwrap());
    assert_eq!(client.del("k").await.unwrap(), 1);
    assert_eq!(client.del("k").await.unwrap(), 0);
    assert_eq!(client.get("k").await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_incr_rejects_non_integer() {
    let client = MemoryClient::new();
    client.set("k", "\"text\"".to_string(), None).await.unwrap();
    assert!(client.incr("k").await.is_err());
  }

  #[tokio::test]
  async fn test_incr_keeps_ttl() {
    let client = MemoryClient::new();
    client.set("n", "5".to_string(), Some(100)).await.unwrap();
    assert_eq!(client.incr("n").await.unwrap(), 6);
    assert!(client.ttl("n") > 90);
  }

  #[tokio::test]
  async fn test_set_rejects_zero_ttl() {
    let client = MemoryClient::new();
    assert!(client.set("k", "v".to_string(), Some(0)).await.is_err());
  }

  #[tokio::test]
  async fn test_expire_missing_key() {
    let client = MemoryClient::new();
    assert!(!client.expire("missing", 10).await.unwrap());
    assert_eq!(client.ttl("missing"), -2);
  }

  #[tokio::test]
  async fn test_expire_zero_removes_key() {
    let client = MemoryClient::new();
    client.set("k", "1".to_string(), None).await.unwrap();
    assert_eq!(client.ttl("k"), -1);
    assert!(client.expire("k", 0).await.unwrap());
    assert!(!client.exists("k").await.unwrap());
    assert_eq!(client.evict_expired(), 1);
    assert_eq!(client.dbsize(), 0);
  }

  #[tokio::test]
  async fn test_set_with_huge_ttl_keeps_key() {
    let client = MemoryClient::new();
    client.set("k", "v".to_string(), Some(u64::MAX)).await.unwrap();
    assert!(client.exists("k").await.unwrap());
    assert_eq!(client.get("k").await.unwrap().as_deref(), Some("v"));
  }

  #[tokio::test]
  async fn test_expire_with_huge_ttl_keeps_key() {
    let client = MemoryClient::new();
    client.set("k", "v".to_string(), None).await.unwrap();
    assert!(client.expire("k", u64::MAX).await.unwrap());
    assert!(client.exists("k").await.unwrap());
    assert_eq!(client.ttl("k"), -1);
  }

  #[tokio::test]
  async fn test_ttl_reports_large_remaining_time() {
    let client = MemoryClient::new();
    let ttl = 10 * 365 * 24 * 60 * 60;
    client.set("k", "v".to_string(), Some(ttl)).await.unwrap();
    let remaining = client.ttl("k");
    assert!(remaining > 0 && remaining <= ttl as i64, "ttl was {}", remaining);
  }

  #[tokio::test]
  async fn test_clones_share_data() {
    let a = MemoryClient::new();
    let b = a.clone();
    a.set("shared", "1".to_string(), None).await.unwrap();
    assert!(b.exists("shared").await.unwrap());
  }
}
