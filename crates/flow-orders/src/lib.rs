//! Order intake and query paths for the TradeFlow pipeline.
//!
//! `OrderService` is the synchronous face of the pipeline: it validates and
//! persists new orders, publishes their placement events, keeps the per-user
//! cache honest by deleting stale snapshots, and serves reads through the
//! cache. Settlement happens elsewhere, asynchronously, off the event log.

use flow_cache::{user_orders_key, CacheError, CacheService};
use flow_events::EventLogService;
use flow_store::{StoreError, StoreService};
use flow_types::{Order, OrderEvent, OrderRequest, OrderStatus, RequestError};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors that can occur during order intake and queries.
#[derive(Debug, Error)]
pub enum OrderError {
	/// Error that occurs when the request fails the intake rules. Never
	/// retried, surfaced to the caller.
	#[error("invalid order request: {0}")]
	Validation(#[from] RequestError),
	/// Error from the order store; surfaced as-is.
	#[error(transparent)]
	Store(#[from] StoreError),
	/// The order was durably recorded but its placement event was not
	/// published. The order inside is committed; settlement will not trigger
	/// until the event is republished out-of-band.
	#[error("order {} persisted but event publish failed: {reason}", .order.id)]
	Publish { order: Order, reason: String },
}

/// Service handling order submission and order queries.
pub struct OrderService {
	store: Arc<StoreService>,
	cache: Arc<CacheService>,
	events: Arc<EventLogService>,
	topic: String,
}

impl OrderService {
	/// Creates a new OrderService publishing to the given topic.
	pub fn new(
		store: Arc<StoreService>,
		cache: Arc<CacheService>,
		events: Arc<EventLogService>,
		topic: impl Into<String>,
	) -> Self {
		Self {
			store,
			cache,
			events,
			topic: topic.into(),
		}
	}

	/// Validates, persists, and announces a new order.
	///
	/// Effects are strictly ordered: store insert, then event publish, then
	/// cache invalidation. The request is durable once the insert commits;
	/// a publish failure is surfaced as [`OrderError::Publish`] with the
	/// committed order attached, and a cache failure is only logged since
	/// the snapshot expires by TTL anyway.
	#[instrument(skip_all, fields(user_id = request.user_id))]
	pub async fn submit_order(&self, request: OrderRequest) -> Result<Order, OrderError> {
		request.validate()?;

		let order = self.store.insert(request).await?;
		tracing::info!(order_id = order.id, "order accepted");

		let publish_failure = match OrderEvent::placed(&order).encode() {
			Ok(payload) => self
				.events
				.publish(&self.topic, payload)
				.await
				.err()
				.map(|e| e.to_string()),
			Err(e) => Some(e.to_string()),
		};

		self.invalidate_user_cache(order.user_id).await;

		match publish_failure {
			None => Ok(order),
			Some(reason) => {
				tracing::error!(
					order_id = order.id,
					error = %reason,
					"order persisted but placement event was not published"
				);
				Err(OrderError::Publish { order, reason })
			},
		}
	}

	/// Returns the user's open orders, reading through the cache.
	///
	/// Cache failures of any kind degrade to a store read; only a store
	/// failure surfaces. Snapshots served from the cache may lag the store
	/// by up to the configured TTL.
	#[instrument(skip_all, fields(user_id = user_id))]
	pub async fn get_user_orders(&self, user_id: i64) -> Result<Vec<Order>, OrderError> {
		let key = user_orders_key(user_id);

		match self.cache.get::<Vec<Order>>(&key).await {
			Ok(orders) => return Ok(orders),
			Err(CacheError::Miss) => {},
			Err(e) => {
				tracing::debug!(error = %e, "cache read failed, falling back to store");
			},
		}

		let orders = self
			.store
			.list_by_user(user_id, Some(OrderStatus::Open))
			.await?;

		if let Err(e) = self.cache.set(&key, &orders).await {
			tracing::debug!(error = %e, "cache repopulation failed");
		}

		Ok(orders)
	}

	/// Retrieves a single order by id.
	pub async fn get_order(&self, id: i64) -> Result<Order, OrderError> {
		Ok(self.store.get(id).await?)
	}

	/// Lists every order, unfiltered. Administrative.
	pub async fn list_orders(&self) -> Result<Vec<Order>, OrderError> {
		Ok(self.store.list_all().await?)
	}

	async fn invalidate_user_cache(&self, user_id: i64) {
		let key = user_orders_key(user_id);
		if let Err(e) = self.cache.invalidate(&key).await {
			tracing::warn!(
				user_id,
				error = %e,
				"cache invalidation failed, snapshot expires by ttl"
			);
		}
	}
}
