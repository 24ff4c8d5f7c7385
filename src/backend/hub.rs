//! In-process pub/sub hub shared by a [`MemoryClient`](super::MemoryClient)
//! and the subscriber connections duplicated from it

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{MessageHandler, SubscriberConnection};

/// Routes published messages to subscriber connections.
///
/// Delivery is synchronous: `publish` returns after every subscribed
/// connection's handler has run.
pub struct PubSubHub {
  /// Channel -> subscribed connection ids
  channels: RwLock<HashMap<String, Vec<Uuid>>>,
  /// Connection id -> installed message handler
  handlers: RwLock<HashMap<Uuid, MessageHandler>>,
}

impl Default for PubSubHub {
  fn default() -> Self {
    Self::new()
  }
}

impl PubSubHub {
  pub fn new() -> Self {
    Self {
      channels: RwLock::new(HashMap::new()),
      handlers: RwLock::new(HashMap::new()),
    }
  }

  /// Subscribe a connection to a channel. Returns `false` if it already was.
  pub fn subscribe(&self, connection: Uuid, channel: &str) -> bool {
    let mut channels = self.channels.write();
    let subscribers = channels.entry(channel.to_string()).or_default();
    if subscribers.contains(&connection) {
      return false;
    }
    subscribers.push(connection);
    true
  }

  /// Unsubscribe a connection from a channel. Returns `false` if it was not
  /// subscribed.
  pub fn unsubscribe(&self, connection: Uuid, channel: &str) -> bool {
    let mut channels = self.channels.write();
    let Some(subscribers) = channels.get_mut(channel) else {
      return false;
    };
    let before = subscribers.len();
    subscribers.retain(|c| *c != connection);
    let removed = subscribers.len() != before;
    if subscribers.is_empty() {
      channels.remove(channel);
    }
    removed
  }

  pub fn set_handler(&self, connection: Uuid, handler: MessageHandler) {
    self.handlers.write().insert(connection, handler);
  }

  /// Drop every subscription and the handler of a connection
  pub fn remove_connection(&self, connection: Uuid) {
    let mut channels = self.channels.write();
    channels.retain(|_, subscribers| {
      subscribers.retain(|c| *c != connection);
      !subscribers.is_empty()
    });
    self.handlers.write().remove(&connection);
  }

  /// Deliver a message to every connection subscribed to `channel`.
  /// Returns the number of receiving connections.
  pub fn publish(&self, channel: &str, message: &str) -> usize {
    let targets: Vec<Uuid> = match self.channels.read().get(channel) {
      Some(subscribers) => subscribers.clone(),
      None => return 0,
    };

    // Handlers run outside the locks so they may publish or subscribe.
    let handlers: Vec<MessageHandler> = {
      let handlers = self.handlers.read();
      targets
        .iter()
        .filter_map(|id| handlers.get(id).cloned())
        .collect()
    };

    for handler in handlers {
      handler(channel, message);
    }
    targets.len()
  }

  /// Number of connections subscribed to a channel
  pub fn subscriber_count(&self, channel: &str) -> usize {
    self
      .channels
      .read()
      .get(channel)
      .map(|s| s.len())
      .unwrap_or(0)
  }
}

/// Subscriber connection attached to a [`PubSubHub`]
pub struct MemorySubscriber {
  id: Uuid,
  hub: Arc<PubSubHub>,
}

impl MemorySubscriber {
  pub fn new(hub: Arc<PubSubHub>) -> Self {
    Self {
      id: Uuid::new_v4(),
      hub,
    }
  }

  pub fn id(&self) -> Uuid {
    self.id
  }
}

#[async_trait]
impl SubscriberConnection for MemorySubscriber {
  async fn subscribe(&self, channel: &str) -> Result<(), anyhow::Error> {
    self.hub.subscribe(self.id, channel);
    Ok(())
  }

  async fn unsubscribe(&self, channel: &str) -> Result<(), anyhow::Error> {
    self.hub.unsubscribe(self.id, channel);
    Ok(())
  }

  fn on_message(&self, handler: MessageHandler) {
    self.hub.set_handler(self.id, handler);
  }
}

impl Drop for MemorySubscriber {
  fn drop(&mut self) {
    self.hub.remove_connection(self.id);
  }
}
