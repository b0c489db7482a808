//! Read-cache module for the TradeFlow pipeline.
//!
//! The cache holds per-user snapshots of open orders with a bounded
//! time-to-live. It is never authoritative: writers invalidate by delete,
//! readers repopulate on miss, and every failure degrades to a store read
//! rather than a caller-visible error.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod memory;
}

/// Errors that can occur during cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
	/// The key is absent or its entry has expired.
	#[error("cache miss")]
	Miss,
	/// Error that occurs during snapshot serialization/deserialization.
	#[error("serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the cache backend.
	#[error("backend error: {0}")]
	Backend(String),
	/// Error that occurs when a cache call exceeds its time bound.
	#[error("cache operation timed out")]
	Timeout,
}

/// Trait defining the low-level interface for cache backends.
#[async_trait]
pub trait CacheInterface: Send + Sync {
	/// Retrieves raw bytes for the given key; expired entries are misses.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, CacheError>;

	/// Stores raw bytes under the given key with a time-to-live.
	///
	/// A zero TTL stores the entry without expiry.
	async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

	/// Deletes the value associated with the given key, if present.
	async fn delete(&self, key: &str) -> Result<(), CacheError>;

	/// Removes expired entries from the cache (optional operation).
	/// Returns the number of entries removed.
	async fn cleanup_expired(&self) -> Result<usize, CacheError> {
		Ok(0) // Default for backends that expire server-side
	}
}

/// Type alias for cache factory functions.
pub type CacheFactory = fn(&toml::Value) -> Result<Box<dyn CacheInterface>, CacheError>;

/// Cache key for a user's open-order snapshot.
pub fn user_orders_key(user_id: i64) -> String {
	format!("user:{}:orders", user_id)
}

/// High-level cache service providing typed snapshot operations.
///
/// Wraps a backend with JSON serialization, the configured snapshot TTL,
/// and a per-call time bound.
pub struct CacheService {
	/// The underlying cache backend implementation.
	backend: Box<dyn CacheInterface>,
	/// Time-to-live applied to stored snapshots.
	ttl: Duration,
	/// Upper bound applied to each backend call.
	op_timeout: Duration,
}

impl CacheService {
	/// Creates a new CacheService with the specified backend, snapshot TTL,
	/// and call bound.
	pub fn new(backend: Box<dyn CacheInterface>, ttl: Duration, op_timeout: Duration) -> Self {
		Self {
			backend,
			ttl,
			op_timeout,
		}
	}

	async fn bounded<T, F>(&self, call: F) -> Result<T, CacheError>
	where
		F: Future<Output = Result<T, CacheError>>,
	{
		match tokio::time::timeout(self.op_timeout, call).await {
			Ok(result) => result,
			Err(_) => Err(CacheError::Timeout),
		}
	}

	/// Retrieves and deserializes a snapshot.
	pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, CacheError> {
		let bytes = self.bounded(self.backend.get_bytes(key)).await?;
		serde_json::from_slice(&bytes).map_err(|e| CacheError::Serialization(e.to_string()))
	}

	/// Serializes and stores a snapshot with the configured TTL.
	pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
		let bytes =
			serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
		self.bounded(self.backend.set_bytes(key, bytes, self.ttl)).await
	}

	/// Removes a snapshot. Deleting an absent key is a success.
	pub async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
		self.bounded(self.backend.delete(key)).await
	}

	/// Removes expired entries from the backend.
	pub async fn cleanup_expired(&self) -> Result<usize, CacheError> {
		self.bounded(self.backend.cleanup_expired()).await
	}
}
