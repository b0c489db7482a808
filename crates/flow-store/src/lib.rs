//! Order store module for the TradeFlow pipeline.
//!
//! The store is the system of record for orders. This module defines the
//! store contract, its error taxonomy, and a service wrapper that bounds
//! every call with a timeout; concrete backends live under
//! `implementations`.

use async_trait::async_trait;
use flow_types::{Order, OrderRequest, OrderStatus, RequestError};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod memory;
}

/// Errors that can occur during order store operations.
#[derive(Debug, Error)]
pub enum StoreError {
	/// Error that occurs when an order request fails the intake rules.
	#[error("invalid order request: {0}")]
	Validation(#[from] RequestError),
	/// Error that occurs when the requested order does not exist.
	#[error("order not found")]
	NotFound,
	/// Error that occurs when a status change would move backwards or leave
	/// a terminal state.
	#[error("invalid status transition from {from} to {to}")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
	/// Error that occurs in the storage backend.
	#[error("backend error: {0}")]
	Backend(String),
	/// Error that occurs when a store call exceeds its time bound.
	#[error("store operation timed out")]
	Timeout,
}

/// Trait defining the low-level interface for order store backends.
///
/// Backends must assign ids monotonically, keep orders forever (no deletes),
/// and apply each mutation atomically per order so concurrent readers never
/// observe partial updates.
#[async_trait]
pub trait OrderStoreInterface: Send + Sync {
	/// Validates and records a new order, assigning its id and stamping it
	/// `Open`.
	async fn insert(&self, request: OrderRequest) -> Result<Order, StoreError>;

	/// Retrieves a single order by id.
	async fn get(&self, id: i64) -> Result<Order, StoreError>;

	/// Lists a user's orders, optionally filtered by status, ascending by id.
	async fn list_by_user(
		&self,
		user_id: i64,
		status: Option<OrderStatus>,
	) -> Result<Vec<Order>, StoreError>;

	/// Lists every order, ascending by id.
	async fn list_all(&self) -> Result<Vec<Order>, StoreError>;

	/// Moves an order forward in its lifecycle.
	///
	/// Allowed transitions are `Open` to either terminal state. Requesting
	/// the terminal state an order already holds is a no-op success, which is
	/// what makes redelivered settlement events safe.
	async fn update_status(&self, id: i64, status: OrderStatus) -> Result<Order, StoreError>;
}

/// Type alias for store factory functions.
pub type StoreFactory = fn(&toml::Value) -> Result<Box<dyn OrderStoreInterface>, StoreError>;

/// Store service that bounds every backend call with a timeout.
///
/// The backend is reached over the network in production deployments, so no
/// call may wait indefinitely; an elapsed timer surfaces as
/// `StoreError::Timeout`.
pub struct StoreService {
	/// The underlying store backend implementation.
	backend: Box<dyn OrderStoreInterface>,
	/// Upper bound applied to each backend call.
	op_timeout: Duration,
}

impl StoreService {
	/// Creates a new StoreService with the specified backend and call bound.
	pub fn new(backend: Box<dyn OrderStoreInterface>, op_timeout: Duration) -> Self {
		Self {
			backend,
			op_timeout,
		}
	}

	async fn bounded<T, F>(&self, call: F) -> Result<T, StoreError>
	where
		F: Future<Output = Result<T, StoreError>>,
	{
		match tokio::time::timeout(self.op_timeout, call).await {
			Ok(result) => result,
			Err(_) => Err(StoreError::Timeout),
		}
	}

	/// Validates and records a new order.
	pub async fn insert(&self, request: OrderRequest) -> Result<Order, StoreError> {
		self.bounded(self.backend.insert(request)).await
	}

	/// Retrieves a single order by id.
	pub async fn get(&self, id: i64) -> Result<Order, StoreError> {
		self.bounded(self.backend.get(id)).await
	}

	/// Lists a user's orders, optionally filtered by status.
	pub async fn list_by_user(
		&self,
		user_id: i64,
		status: Option<OrderStatus>,
	) -> Result<Vec<Order>, StoreError> {
		self.bounded(self.backend.list_by_user(user_id, status)).await
	}

	/// Lists every order.
	pub async fn list_all(&self) -> Result<Vec<Order>, StoreError> {
		self.bounded(self.backend.list_all()).await
	}

	/// Moves an order forward in its lifecycle.
	pub async fn update_status(&self, id: i64, status: OrderStatus) -> Result<Order, StoreError> {
		self.bounded(self.backend.update_status(id, status)).await
	}
}
