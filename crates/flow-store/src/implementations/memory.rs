//! In-memory order store backend.
//!
//! This backend keeps orders in a `BTreeMap` behind a read-write lock, which
//! gives id-ascending iteration for free and makes each mutation atomic per
//! order. Useful for tests and single-process deployments; production
//! deployments swap in a relational backend behind the same trait.

use crate::{OrderStoreInterface, StoreError};
use async_trait::async_trait;
use flow_types::{Order, OrderRequest, OrderStatus};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

fn now_secs() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or_default()
}

#[derive(Default)]
struct MemoryStoreInner {
	orders: BTreeMap<i64, Order>,
	next_id: i64,
}

/// In-memory order store implementation.
pub struct MemoryStore {
	inner: RwLock<MemoryStoreInner>,
}

impl MemoryStore {
	/// Creates an empty MemoryStore.
	pub fn new() -> Self {
		Self {
			inner: RwLock::new(MemoryStoreInner::default()),
		}
	}
}

impl Default for MemoryStore {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl OrderStoreInterface for MemoryStore {
	async fn insert(&self, request: OrderRequest) -> Result<Order, StoreError> {
		request.validate()?;

		let amount = request.normalized_amount();
		let now = now_secs();

		let mut inner = self.inner.write().await;
		inner.next_id += 1;
		let order = Order {
			id: inner.next_id,
			user_id: request.user_id,
			item: request.item,
			amount,
			status: OrderStatus::Open,
			created_at: now,
			updated_at: now,
		};
		inner.orders.insert(order.id, order.clone());
		Ok(order)
	}

	async fn get(&self, id: i64) -> Result<Order, StoreError> {
		let inner = self.inner.read().await;
		inner.orders.get(&id).cloned().ok_or(StoreError::NotFound)
	}

	async fn list_by_user(
		&self,
		user_id: i64,
		status: Option<OrderStatus>,
	) -> Result<Vec<Order>, StoreError> {
		let inner = self.inner.read().await;
		Ok(inner
			.orders
			.values()
			.filter(|order| order.user_id == user_id)
			.filter(|order| status.map_or(true, |wanted| order.status == wanted))
			.cloned()
			.collect())
	}

	async fn list_all(&self) -> Result<Vec<Order>, StoreError> {
		let inner = self.inner.read().await;
		Ok(inner.orders.values().cloned().collect())
	}

	async fn update_status(&self, id: i64, status: OrderStatus) -> Result<Order, StoreError> {
		let mut inner = self.inner.write().await;
		let order = inner.orders.get_mut(&id).ok_or(StoreError::NotFound)?;

		// Redelivered settlement of an already-terminal order is a no-op.
		if order.status == status && status.is_terminal() {
			return Ok(order.clone());
		}
		if order.status != OrderStatus::Open || !status.is_terminal() {
			return Err(StoreError::InvalidTransition {
				from: order.status,
				to: status,
			});
		}

		order.status = status;
		order.updated_at = now_secs();
		Ok(order.clone())
	}
}

/// Factory function to create a memory store backend from configuration.
///
/// Configuration parameters: none required.
pub fn create_store(_config: &toml::Value) -> Result<Box<dyn OrderStoreInterface>, StoreError> {
	Ok(Box::new(MemoryStore::new()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use flow_types::RequestError;
	use rust_decimal_macros::dec;

	fn request(user_id: i64, item: &str, amount: rust_decimal::Decimal) -> OrderRequest {
		OrderRequest {
			user_id,
			item: item.to_string(),
			amount,
		}
	}

	#[tokio::test]
	async fn insert_assigns_increasing_ids_and_open_status() {
		let store = MemoryStore::new();

		let first = store.insert(request(7, "Widget", dec!(9.99))).await.unwrap();
		let second = store.insert(request(7, "Gadget", dec!(1.50))).await.unwrap();

		assert_eq!(first.id, 1);
		assert_eq!(second.id, 2);
		assert_eq!(first.status, OrderStatus::Open);
		assert_eq!(second.status, OrderStatus::Open);
	}

	#[tokio::test]
	async fn insert_normalizes_amount_scale() {
		let store = MemoryStore::new();
		let order = store.insert(request(1, "Widget", dec!(2.005))).await.unwrap();
		assert_eq!(order.amount, dec!(2.01));
	}

	#[tokio::test]
	async fn insert_rejects_invalid_requests_without_a_row() {
		let store = MemoryStore::new();

		let result = store.insert(request(0, "Widget", dec!(1))).await;
		assert!(matches!(
			result,
			Err(StoreError::Validation(RequestError::NonPositiveUserId))
		));

		let result = store.insert(request(1, "", dec!(1))).await;
		assert!(matches!(
			result,
			Err(StoreError::Validation(RequestError::EmptyItem))
		));

		let result = store.insert(request(1, "Widget", dec!(-1))).await;
		assert!(matches!(
			result,
			Err(StoreError::Validation(RequestError::NonPositiveAmount))
		));

		assert!(store.list_all().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn get_unknown_id_is_not_found() {
		let store = MemoryStore::new();
		assert!(matches!(store.get(99).await, Err(StoreError::NotFound)));
	}

	#[tokio::test]
	async fn list_by_user_filters_and_orders_by_id() {
		let store = MemoryStore::new();
		let a = store.insert(request(3, "Widget", dec!(1))).await.unwrap();
		store.insert(request(4, "Other", dec!(1))).await.unwrap();
		let b = store.insert(request(3, "Gadget", dec!(2))).await.unwrap();
		store.update_status(b.id, OrderStatus::Filled).await.unwrap();

		let all = store.list_by_user(3, None).await.unwrap();
		assert_eq!(
			all.iter().map(|o| o.id).collect::<Vec<_>>(),
			vec![a.id, b.id]
		);

		let open = store
			.list_by_user(3, Some(OrderStatus::Open))
			.await
			.unwrap();
		assert_eq!(open.iter().map(|o| o.id).collect::<Vec<_>>(), vec![a.id]);
	}

	#[tokio::test]
	async fn open_order_can_fill_or_cancel() {
		let store = MemoryStore::new();
		let a = store.insert(request(1, "Widget", dec!(1))).await.unwrap();
		let b = store.insert(request(1, "Gadget", dec!(1))).await.unwrap();

		let filled = store.update_status(a.id, OrderStatus::Filled).await.unwrap();
		assert_eq!(filled.status, OrderStatus::Filled);

		let cancelled = store
			.update_status(b.id, OrderStatus::Cancelled)
			.await
			.unwrap();
		assert_eq!(cancelled.status, OrderStatus::Cancelled);
	}

	#[tokio::test]
	async fn repeated_terminal_update_is_idempotent() {
		let store = MemoryStore::new();
		let order = store.insert(request(1, "Widget", dec!(1))).await.unwrap();

		store
			.update_status(order.id, OrderStatus::Filled)
			.await
			.unwrap();
		let again = store
			.update_status(order.id, OrderStatus::Filled)
			.await
			.unwrap();
		assert_eq!(again.status, OrderStatus::Filled);
	}

	#[tokio::test]
	async fn backward_and_cross_terminal_transitions_are_rejected() {
		let store = MemoryStore::new();
		let order = store.insert(request(1, "Widget", dec!(1))).await.unwrap();
		store
			.update_status(order.id, OrderStatus::Filled)
			.await
			.unwrap();

		let back = store.update_status(order.id, OrderStatus::Open).await;
		assert!(matches!(
			back,
			Err(StoreError::InvalidTransition {
				from: OrderStatus::Filled,
				to: OrderStatus::Open,
			})
		));

		let cross = store.update_status(order.id, OrderStatus::Cancelled).await;
		assert!(matches!(cross, Err(StoreError::InvalidTransition { .. })));
	}

	#[tokio::test]
	async fn open_to_open_is_rejected() {
		let store = MemoryStore::new();
		let order = store.insert(request(1, "Widget", dec!(1))).await.unwrap();

		let result = store.update_status(order.id, OrderStatus::Open).await;
		assert!(matches!(result, Err(StoreError::InvalidTransition { .. })));
	}

	#[tokio::test]
	async fn update_status_on_unknown_id_is_not_found() {
		let store = MemoryStore::new();
		let result = store.update_status(12, OrderStatus::Filled).await;
		assert!(matches!(result, Err(StoreError::NotFound)));
	}
}
