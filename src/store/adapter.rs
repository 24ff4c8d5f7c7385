//! Store adapter: key-value and pub/sub operations over a backing client

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::codec;
use super::registry::{ChannelRegistry, Listener, ListenerId, Removal};
use crate::backend::{BackingClient, MessageHandler, SubscriberConnection};
use crate::error::Result;

/// Construction options for [`StoreAdapter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterOptions {
  /// When `false` the adapter is inert: it opens no subscriber connection
  /// and every method returns an empty success without touching the backend.
  pub server_environment: bool,
}

impl Default for AdapterOptions {
  fn default() -> Self {
    Self {
      server_environment: true,
    }
  }
}

/// Per-write options for [`StoreAdapter::set`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
  /// Expiry in seconds. `None` or `Some(0)` stores without expiry.
  pub ttl: Option<u64>,
}

impl SetOptions {
  pub fn ttl(seconds: u64) -> Self {
    Self { ttl: Some(seconds) }
  }
}

struct Active {
  client: Arc<dyn BackingClient>,
  subscriber: Box<dyn SubscriberConnection>,
  registry: Arc<ChannelRegistry>,
  /// Serializes channel membership changes so SUBSCRIBE/UNSUBSCRIBE reach the
  /// subscriber connection in the same order the registry saw them.
  membership: Mutex<()>,
}

/// Uniform key-value/pub-sub interface over a [`BackingClient`].
///
/// Values are stored as JSON. Subscriptions share one dedicated subscriber
/// connection, duplicated from the backing client at construction, and a
/// single dispatcher fans inbound messages out to local listeners.
pub struct StoreAdapter {
  active: Option<Active>,
}

impl StoreAdapter {
  /// Wrap a connected backing client.
  ///
  /// Outside a server environment this returns an inert adapter and never
  /// touches `client`. Otherwise the client is duplicated into the
  /// subscriber connection, and a failure to open it is returned.
  pub async fn new(client: Arc<dyn BackingClient>, options: AdapterOptions) -> Result<Self> {
    if !options.server_environment {
      tracing::debug!("Store adapter created outside a server environment; running inert");
      return Ok(Self::inert());
    }

    let subscriber = client.duplicate().await?;
    let registry = Arc::new(ChannelRegistry::new());

    let dispatch_registry = registry.clone();
    let handler: MessageHandler = Arc::new(move |channel: &str, raw: &str| {
      dispatch_registry.dispatch(channel, raw);
    });
    subscriber.on_message(handler);

    Ok(Self {
      active: Some(Active {
        client,
        subscriber,
        registry,
        membership: Mutex::new(()),
      }),
    })
  }

  /// An adapter with no backend at all; every operation is a no-op
  pub fn inert() -> Self {
    Self { active: None }
  }

  /// Whether operations reach a backend
  pub fn is_active(&self) -> bool {
    self.active.is_some()
  }

  /// Fetch a value. Non-JSON values come back as a JSON string.
  pub async fn get(&self, key: &str) -> Result<Option<Value>> {
    let Some(active) = &self.active else {
      return Ok(None);
    };
    let raw = active.client.get(key).await?;
    Ok(raw.map(codec::decode))
  }

  /// Fetch a value as `T`. A raw non-JSON value is offered to `T` as a
  /// string; only a value that fits neither form is an error.
  pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
    let Some(active) = &self.active else {
      return Ok(None);
    };
    match active.client.get(key).await? {
      Some(raw) => codec::decode_as(key, raw).map(Some),
      None => Ok(None),
    }
  }

  /// Store a value as JSON. Encoding fails before any I/O.
  pub async fn set<T: Serialize + ?Sized>(
    &self,
    key: &str,
    value: &T,
    options: SetOptions,
  ) -> Result<()> {
    let Some(active) = &self.active else {
      return Ok(());
    };
    let encoded = codec::encode(value)?;
    let ttl = options.ttl.filter(|t| *t > 0);
    active.client.set(key, encoded, ttl).await?;
    Ok(())
  }

  /// Remove a key. Returns whether it existed.
  pub async fn delete(&self, key: &str) -> Result<bool> {
    let Some(active) = &self.active else {
      return Ok(false);
    };
    Ok(active.client.del(key).await? > 0)
  }

  pub async fn has(&self, key: &str) -> Result<bool> {
    let Some(active) = &self.active else {
      return Ok(false);
    };
    Ok(active.client.exists(key).await?)
  }

  /// Atomically add one to the counter at `key` (absent counts as 0)
  pub async fn increment(&self, key: &str) -> Result<i64> {
    let Some(active) = &self.active else {
      return Ok(0);
    };
    Ok(active.client.incr(key).await?)
  }

  /// Set or refresh the TTL of an existing key. Returns `false` if the key
  /// does not exist.
  pub async fn expire(&self, key: &str, ttl: u64) -> Result<bool> {
    let Some(active) = &self.active else {
      return Ok(false);
    };
    Ok(active.client.expire(key, ttl).await?)
  }

  /// Publish a JSON-encoded message. Returns the backend's receiver count;
  /// delivery is not acknowledged.
  pub async fn publish<T: Serialize + ?Sized>(&self, channel: &str, message: &T) -> Result<u64> {
    let Some(active) = &self.active else {
      return Ok(0);
    };
    let encoded = codec::encode(message)?;
    Ok(active.client.publish(channel, encoded).await?)
  }

  /// Register a listener on a channel. The first listener subscribes the
  /// subscriber connection. Registering the same `Arc` again is a no-op that
  /// returns the existing id.
  pub async fn subscribe(&self, channel: &str, listener: Listener) -> Result<ListenerId> {
    let Some(active) = &self.active else {
      return Ok(ListenerId::new());
    };

    let _membership = active.membership.lock().await;
    let (id, created) = active.registry.add(channel, listener);
    if created {
      if let Err(e) = active.subscriber.subscribe(channel).await {
        active.registry.remove(channel, Some(id));
        return Err(e.into());
      }
      tracing::debug!("Subscribed to channel '{}'", channel);
    }
    Ok(id)
  }

  /// Remove one listener, or all of them when `listener` is `None`. When the
  /// channel has no listeners left the subscriber connection unsubscribes.
  /// Unknown channels are a no-op.
  pub async fn unsubscribe(&self, channel: &str, listener: Option<ListenerId>) -> Result<()> {
    let Some(active) = &self.active else {
      return Ok(());
    };

    let _membership = active.membership.lock().await;
    if active.registry.remove(channel, listener) == Removal::Emptied {
      active.subscriber.unsubscribe(channel).await?;
      tracing::debug!("Unsubscribed from channel '{}'", channel);
    }
    Ok(())
  }

  /// Channels that currently have listeners
  pub fn channels(&self) -> Vec<String> {
    self
      .active
      .as_ref()
      .map(|a| a.registry.channels())
      .unwrap_or_default()
  }

  pub fn listener_count(&self, channel: &str) -> usize {
    self
      .active
      .as_ref()
      .map(|a| a.registry.listener_count(channel))
      .unwrap_or(0)
  }
}
