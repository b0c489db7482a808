//! In-memory cache backend.
//!
//! Entries live in a HashMap behind a read-write lock and carry their expiry
//! deadline. Reads treat expired entries as misses and leave removal to the
//! periodic sweep, so a read lock is all a lookup needs.

use crate::{CacheError, CacheInterface};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct Entry {
	value: Vec<u8>,
	expires_at: Option<Instant>,
}

impl Entry {
	fn is_expired(&self, now: Instant) -> bool {
		self.expires_at.map_or(false, |deadline| now >= deadline)
	}
}

/// In-memory cache implementation with per-entry TTL.
pub struct MemoryCache {
	entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCache {
	/// Creates an empty MemoryCache.
	pub fn new() -> Self {
		Self {
			entries: RwLock::new(HashMap::new()),
		}
	}
}

impl Default for MemoryCache {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl CacheInterface for MemoryCache {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, CacheError> {
		let entries = self.entries.read().await;
		match entries.get(key) {
			Some(entry) if !entry.is_expired(Instant::now()) => Ok(entry.value.clone()),
			_ => Err(CacheError::Miss),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
		let expires_at = if ttl.is_zero() {
			None
		} else {
			Some(Instant::now() + ttl)
		};
		let mut entries = self.entries.write().await;
		entries.insert(key.to_string(), Entry { value, expires_at });
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), CacheError> {
		let mut entries = self.entries.write().await;
		entries.remove(key);
		Ok(())
	}

	async fn cleanup_expired(&self) -> Result<usize, CacheError> {
		let now = Instant::now();
		let mut entries = self.entries.write().await;
		let before = entries.len();
		entries.retain(|_, entry| !entry.is_expired(now));
		Ok(before - entries.len())
	}
}

/// Factory function to create a memory cache backend from configuration.
///
/// Configuration parameters: none required.
pub fn create_cache(_config: &toml::Value) -> Result<Box<dyn CacheInterface>, CacheError> {
	Ok(Box::new(MemoryCache::new()))
}
