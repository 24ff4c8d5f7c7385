//! Stored entry with expiry metadata

use std::time::{Duration, Instant};

/// A value held by [`MemoryClient`](super::MemoryClient)
#[derive(Debug, Clone)]
pub struct MemoryEntry {
  pub value: String,
  pub created_at: Instant,
  pub expires_at: Option<Instant>,
}

impl MemoryEntry {
  pub fn new(value: String, ttl: Option<Duration>) -> Self {
    let now = Instant::now();
    Self {
      value,
      created_at: now,
      expires_at: expiry_from(now, ttl),
    }
  }

  pub fn is_expired(&self) -> bool {
    self
      .expires_at
      .map(|exp| Instant::now() >= exp)
      .unwrap_or(false)
  }

  pub fn ttl_remaining(&self) -> Option<Duration> {
    self
      .expires_at
      .map(|exp| exp.saturating_duration_since(Instant::now()))
  }

  pub fn update_ttl(&mut self, ttl: Option<Duration>) {
    self.expires_at = expiry_from(Instant::now(), ttl);
  }
}

/// A TTL too large to represent as an `Instant` never expires.
fn expiry_from(now: Instant, ttl: Option<Duration>) -> Option<Instant> {
  ttl.and_then(|d| now.checked_add(d))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_entry_without_ttl_never_expires() {
    let entry = MemoryEntry::new("v".to_string(), None);
    assert!(!entry.is_expired());
    assert!(entry.ttl_remaining().is_none());
  }

  #[test]
  fn test_zero_ttl_expires_immediately() {
    let entry = MemoryEntry::new("v".to_string(), Some(Duration::ZERO));
    assert!(entry.is_expired());
  }

  #[test]
  fn test_unrepresentable_ttl_never_expires() {
    let mut entry = MemoryEntry::new("v".to_string(), Some(Duration::MAX));
    assert!(entry.expires_at.is_none());
    entry.update_ttl(Some(Duration::from_secs(u64::MAX)));
    assert!(!entry.is_expired());
  }

  #[test]
  fn test_update_ttl() {
    let mut entry = MemoryEntry::new("v".to_string(), None);
    entry.update_ttl(Some(Duration::from_secs(60)));
    let remaining = entry.ttl_remaining().unwrap();
    assert!(remaining > Duration::from_secs(58));
    entry.update_ttl(None);
    assert!(entry.expires_at.is_none());
  }
}
