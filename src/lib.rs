//! Key-value and publish/subscribe store adapter.
//!
//! [`StoreAdapter`] wraps any [`BackingClient`] (in-memory, or Redis with the
//! `server` feature) and exposes JSON get/set with TTLs, counters and
//! channel subscriptions with local listener fan-out.

pub mod backend;
pub mod config;
pub mod error;
pub mod store;

pub use backend::{BackingClient, MemoryClient, MessageHandler, SubscriberConnection};
#[cfg(feature = "server")]
pub use backend::RedisClient;
pub use config::{BackendMode, RedisConfig, StoreConfig};
pub use error::{Result, StoreError};
pub use store::{AdapterOptions, Listener, ListenerId, SetOptions, StoreAdapter};
