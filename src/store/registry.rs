//! Channel -> listener registry and the central message dispatcher

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use uuid::Uuid;

use super::codec;

/// Callback invoked with the decoded payload of every message on a channel
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Handle identifying one registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
  pub(crate) fn new() -> Self {
    Self(Uuid::new_v4())
  }
}

impl std::fmt::Display for ListenerId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

struct ListenerEntry {
  id: ListenerId,
  listener: Listener,
}

/// Outcome of removing listeners from a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Removal {
  /// Channel had no entry
  Unknown,
  /// Channel still has listeners
  Remaining,
  /// Last listener removed; the entry is gone
  Emptied,
}

/// Channel registry.
///
/// A channel has an entry only while at least one listener is registered.
/// Dispatch snapshots the listener list under the read lock and runs the
/// listeners after releasing it, so listeners may (un)subscribe freely.
#[derive(Default)]
pub(crate) struct ChannelRegistry {
  channels: RwLock<HashMap<String, Vec<ListenerEntry>>>,
}

impl ChannelRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a listener. Returns its id and whether it created the channel
  /// entry. Registering the same `Arc` twice returns the existing id.
  pub fn add(&self, channel: &str, listener: Listener) -> (ListenerId, bool) {
    let mut channels = self.channels.write();
    let created = !channels.contains_key(channel);
    let entries = channels.entry(channel.to_string()).or_default();

    if let Some(existing) = entries.iter().find(|e| same_listener(&e.listener, &listener)) {
      return (existing.id, false);
    }

    let id = ListenerId::new();
    entries.push(ListenerEntry { id, listener });
    (id, created)
  }

  /// Remove one listener, or every listener when `id` is `None`
  pub fn remove(&self, channel: &str, id: Option<ListenerId>) -> Removal {
    let mut channels = self.channels.write();
    let Some(entries) = channels.get_mut(channel) else {
      return Removal::Unknown;
    };

    match id {
      Some(id) => entries.retain(|e| e.id != id),
      None => entries.clear(),
    }

    if entries.is_empty() {
      channels.remove(channel);
      Removal::Emptied
    } else {
      Removal::Remaining
    }
  }

  /// Snapshot of the listeners currently registered on a channel
  pub fn listeners(&self, channel: &str) -> Vec<Listener> {
    self
      .channels
      .read()
      .get(channel)
      .map(|entries| entries.iter().map(|e| e.listener.clone()).collect())
      .unwrap_or_default()
  }

  #[cfg(test)]
  fn contains(&self, channel: &str) -> bool {
    self.channels.read().contains_key(channel)
  }

  pub fn channels(&self) -> Vec<String> {
    let mut names: Vec<String> = self.channels.read().keys().cloned().collect();
    names.sort();
    names
  }

  pub fn listener_count(&self, channel: &str) -> usize {
    self
      .channels
      .read()
      .get(channel)
      .map(|entries| entries.len())
      .unwrap_or(0)
  }

  /// Decode one inbound message and fan it out to the channel's listeners.
  ///
  /// Never panics: an undecodable payload is logged and dropped for every
  /// listener, and a panicking listener is logged without affecting its
  /// siblings. Returns how many listeners completed.
  pub fn dispatch(&self, channel: &str, raw: &str) -> usize {
    let listeners = self.listeners(channel);
    if listeners.is_empty() {
      return 0;
    }

    let payload = match codec::decode_message(raw) {
      Ok(payload) => payload,
      Err(e) => {
        tracing::warn!("Dropping undecodable message on '{}': {}", channel, e);
        return 0;
      }
    };

    let mut delivered = 0;
    for listener in listeners {
      match catch_unwind(AssertUnwindSafe(|| listener(&payload))) {
        Ok(()) => delivered += 1,
        Err(_) => tracing::warn!("Listener on '{}' panicked", channel),
      }
    }
    delivered
  }
}

fn same_listener(a: &Listener, b: &Listener) -> bool {
  std::ptr::eq(
    Arc::as_ptr(a) as *const (),
    Arc::as_ptr(b) as *const (),
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use parking_lot::Mutex;
  use serde_json::json;

  fn counter() -> (Listener, Arc<Mutex<Vec<Value>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let listener: Listener = Arc::new(move |v: &Value| sink.lock().push(v.clone()));
    (listener, seen)
  }

  #[test]
  fn test_first_listener_creates_entry() {
    let registry = ChannelRegistry::new();
    let (a, _) = counter();
    let (b, _) = counter();
    assert!(registry.add("ch", a).1);
    assert!(!registry.add("ch", b).1);
    assert_eq!(registry.listener_count("ch"), 2);
  }

  #[test]
  fn test_same_listener_is_registered_once() {
    let registry = ChannelRegistry::new();
    let (a, seen) = counter();
    let (first, _) = registry.add("ch", a.clone());
    let (second, created) = registry.add("ch", a);
    assert_eq!(first, second);
    assert!(!created);
    registry.dispatch("ch", "1");
    assert_eq!(seen.lock().len(), 1);
  }

  #[test]
  fn test_remove_last_listener_deletes_entry() {
    let registry = ChannelRegistry::new();
    let (a, _) = counter();
    let (b, _) = counter();
    let (id_a, _) = registry.add("ch", a);
    let (id_b, _) = registry.add("ch", b);
    assert_eq!(registry.remove("ch", Some(id_a)), Removal::Remaining);
    assert_eq!(registry.remove("ch", Some(id_b)), Removal::Emptied);
    assert!(!registry.contains("ch"));
    assert_eq!(registry.remove("ch", None), Removal::Unknown);
  }

  #[test]
  fn test_dispatch_drops_undecodable_payload() {
    let registry = ChannelRegistry::new();
    let (a, seen) = counter();
    registry.add("ch", a);
    assert_eq!(registry.dispatch("ch", "{not json"), 0);
    assert_eq!(registry.dispatch("ch", r#"{"ok":true}"#), 1);
    assert_eq!(seen.lock().as_slice(), &[json!({"ok": true})]);
  }

  #[test]
  fn test_panicking_listener_does_not_block_siblings() {
    let registry = ChannelRegistry::new();
    let boom: Listener = Arc::new(|_: &Value| panic!("listener failure"));
    let (ok, seen) = counter();
    registry.add("ch", boom);
    registry.add("ch", ok);
    assert_eq!(registry.dispatch("ch", "\"hi\""), 1);
    assert_eq!(seen.lock().len(), 1);
  }

  #[test]
  fn test_listener_may_unsubscribe_during_dispatch() {
    let registry = Arc::new(ChannelRegistry::new());
    let inner = registry.clone();
    let listener: Listener = Arc::new(move |_: &Value| {
      inner.remove("ch", None);
    });
    registry.add("ch", listener);
    assert_eq!(registry.dispatch("ch", "1"), 1);
    assert!(!registry.contains("ch"));
  }
}
