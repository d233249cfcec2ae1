//! # Queuewatch Store
//!
//! Backends for the [`MetricsStore`](queuewatch_core::MetricsStore) port:
//!
//! - [`InMemoryStore`] - process-local, always available
//! - `RedisStore` - pooled Redis client (feature `redis`)

pub mod in_memory;

#[cfg(feature = "redis")]
pub mod redis;

pub use in_memory::InMemoryStore;

#[cfg(feature = "redis")]
pub use self::redis::{RedisStore, RedisStoreConfig};
