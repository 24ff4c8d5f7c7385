//! Store adapter
//!
//! Unifies caching, atomic counters, TTL expiry and publish/subscribe over a
//! [`BackingClient`](crate::backend::BackingClient):
//! - JSON values with a raw-string fallback on read
//! - one dedicated subscriber connection per adapter
//! - reference-counted channel subscriptions with local fan-out

mod adapter;
pub mod codec;
mod registry;

pub use adapter::{AdapterOptions, SetOptions, StoreAdapter};
pub use registry::{Listener, ListenerId};
