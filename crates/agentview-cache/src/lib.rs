//! agentview cache
//!
//! Process-wide keyed store of resource snapshots with lazy TTL expiry.
//! One `CacheStore` is constructed at application start and handed to every
//! fetch and mutation controller; tests construct isolated instances.
//!
//! # Example
//!
//! ```rust
//! use agentview_cache::CacheStore;
//! use std::time::Duration;
//!
//! let cache = CacheStore::with_ttl(Duration::from_secs(30));
//! cache.set("leads", vec!["acme".to_string()]);
//! assert_eq!(cache.get::<Vec<String>>("leads").map(|v| v.len()), Some(1));
//!
//! cache.invalidate(Some("leads"));
//! assert!(!cache.contains("leads"));
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod store;

pub use store::{CacheEntry, CacheStats, CacheStore, DEFAULT_TTL};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
