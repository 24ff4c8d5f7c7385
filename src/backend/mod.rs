//! Backing client contract and implementations
//!
//! The adapter only talks to a backend through [`BackingClient`] (commands)
//! and [`SubscriberConnection`] (pushed messages). Two implementations ship
//! with the crate:
//! - [`MemoryClient`]: in-process store with TTLs and a local pub/sub hub
//! - [`RedisClient`]: external Redis server (feature `server`)

mod entry;
mod hub;
mod memory;
#[cfg(feature = "server")]
mod redis_client;

use async_trait::async_trait;
use std::sync::Arc;

pub use entry::MemoryEntry;
pub use hub::{MemorySubscriber, PubSubHub};
pub use memory::MemoryClient;
#[cfg(feature = "server")]
pub use redis_client::{RedisClient, RedisSubscriber};

/// Handler invoked for every inbound `(channel, payload)` pair.
pub type MessageHandler = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Command side of a key-value/pub-sub engine.
///
/// Implementations are already connected when handed to the adapter and
/// their lifetime belongs to the caller.
#[async_trait]
pub trait BackingClient: Send + Sync {
  async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error>;

  /// Write `value`; `ttl` is in seconds.
  async fn set(&self, key: &str, value: String, ttl: Option<u64>) -> Result<(), anyhow::Error>;

  /// Returns the number of keys removed.
  async fn del(&self, key: &str) -> Result<u64, anyhow::Error>;

  async fn exists(&self, key: &str) -> Result<bool, anyhow::Error>;

  /// Atomically add one, treating an absent key as 0.
  async fn incr(&self, key: &str) -> Result<i64, anyhow::Error>;

  /// Returns `false` when the key does not exist.
  async fn expire(&self, key: &str, ttl: u64) -> Result<bool, anyhow::Error>;

  /// Returns the number of connections that received the message.
  async fn publish(&self, channel: &str, message: String) -> Result<u64, anyhow::Error>;

  /// Open a new connection with the same configuration, dedicated to
  /// receiving pushed messages.
  async fn duplicate(&self) -> Result<Box<dyn SubscriberConnection>, anyhow::Error>;
}

/// Receive side of a pub/sub engine.
#[async_trait]
pub trait SubscriberConnection: Send + Sync {
  async fn subscribe(&self, channel: &str) -> Result<(), anyhow::Error>;

  async fn unsubscribe(&self, channel: &str) -> Result<(), anyhow::Error>;

  /// Install the handler for inbound messages, replacing any previous one.
  fn on_message(&self, handler: MessageHandler);
}
