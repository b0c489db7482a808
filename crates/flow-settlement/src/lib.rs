//! Settlement worker for the TradeFlow pipeline.
//!
//! The worker is the pipeline's only consumer of placement events. It pulls
//! one delivery at a time, waits the simulated settlement latency, then
//! moves the order to FILLED. Acknowledgement happens strictly after the
//! store write, so a crash mid-settlement redelivers the event instead of
//! losing it; the store's idempotent terminal handling makes that redelivery
//! harmless.

use flow_cache::{user_orders_key, CacheService};
use flow_events::{Delivery, EventLogService, EventSubscription};
use flow_store::{StoreError, StoreService};
use flow_types::{OrderEvent, OrderStatus};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::instrument;

/// Pause before re-opening the subscription after a store failure, so a
/// down store is not hammered with redeliveries.
const REDELIVERY_PAUSE: Duration = Duration::from_millis(500);

/// Errors that can occur while running the settlement worker.
#[derive(Debug, Error)]
pub enum SettlementError {
	/// Error that occurs when the event subscription cannot be opened.
	#[error("subscription error: {0}")]
	Subscription(String),
}

/// What to do with a delivery after processing it.
enum Disposition {
	/// Side effects are durable (or the event is a dead letter); commit it.
	Ack,
	/// Side effects did not apply; leave it uncommitted for redelivery.
	Retry,
}

/// Consumer that settles orders off the event log.
pub struct SettlementWorker {
	store: Arc<StoreService>,
	cache: Arc<CacheService>,
	events: Arc<EventLogService>,
	topic: String,
	group: String,
	settle_delay: Duration,
}

impl SettlementWorker {
	/// Creates a new SettlementWorker consuming the given topic under the
	/// given group.
	pub fn new(
		store: Arc<StoreService>,
		cache: Arc<CacheService>,
		events: Arc<EventLogService>,
		topic: impl Into<String>,
		group: impl Into<String>,
		settle_delay: Duration,
	) -> Self {
		Self {
			store,
			cache,
			events,
			topic: topic.into(),
			group: group.into(),
			settle_delay,
		}
	}

	/// Runs the consumer loop until the shutdown flag flips.
	///
	/// Shutdown is graceful: the in-flight delivery, including its settle
	/// delay, finishes before the loop exits. A single event's failure never
	/// takes the worker down; the event is either dead-lettered (ack) or
	/// left for redelivery (no ack).
	pub async fn run(
		&self,
		mut shutdown: watch::Receiver<bool>,
	) -> Result<(), SettlementError> {
		tracing::info!(topic = %self.topic, group = %self.group, "settlement worker started");

		let mut subscription = self.open_subscription().await?;

		loop {
			tokio::select! {
				changed = shutdown.changed() => {
					if changed.is_err() || *shutdown.borrow() {
						break;
					}
				}

				delivery = subscription.next() => {
					match delivery {
						Ok(delivery) => match self.process(&delivery).await {
							Disposition::Ack => {
								if let Err(e) = subscription.ack(&delivery).await {
									tracing::warn!(
										offset = delivery.offset,
										error = %e,
										"failed to commit read position"
									);
								}
							}
							Disposition::Retry => {
								// Re-open the subscription so the uncommitted
								// delivery comes back.
								tokio::time::sleep(REDELIVERY_PAUSE).await;
								subscription = self.open_subscription().await?;
							}
						},
						Err(e) => {
							tracing::error!(error = %e, "event pull failed, re-subscribing");
							tokio::time::sleep(REDELIVERY_PAUSE).await;
							subscription = self.open_subscription().await?;
						}
					}
				}
			}
		}

		tracing::info!("settlement worker stopped");
		Ok(())
	}

	async fn open_subscription(&self) -> Result<Box<dyn EventSubscription>, SettlementError> {
		self.events
			.subscribe(&self.topic, &self.group)
			.await
			.map_err(|e| SettlementError::Subscription(e.to_string()))
	}

	async fn process(&self, delivery: &Delivery) -> Disposition {
		let event = match OrderEvent::decode(&delivery.payload) {
			Ok(event) => event,
			Err(e) => {
				// Poison message: committing it is the only way to keep the
				// loop moving, so it is logged and dropped.
				tracing::warn!(
					offset = delivery.offset,
					error = %e,
					"discarding undecodable event"
				);
				return Disposition::Ack;
			},
		};

		match event {
			OrderEvent::OrderPlaced {
				order_id, user_id, ..
			} => self.settle(order_id, user_id).await,
		}
	}

	#[instrument(skip(self))]
	async fn settle(&self, order_id: i64, user_id: i64) -> Disposition {
		tracing::info!("settling order");

		// Simulated matching latency; deliberately not cancellable.
		tokio::time::sleep(self.settle_delay).await;

		match self.store.update_status(order_id, OrderStatus::Filled).await {
			Ok(order) => {
				tracing::info!(status = %order.status, "order filled");
				self.invalidate_user_cache(user_id).await;
				Disposition::Ack
			},
			Err(StoreError::NotFound) => {
				// The order may have been removed out-of-band; report, drop.
				tracing::warn!("order missing, dropping settlement event");
				Disposition::Ack
			},
			Err(StoreError::InvalidTransition { from, .. }) => {
				// Redelivery of an order that already reached a terminal
				// state through another path.
				tracing::debug!(status = %from, "order already terminal, nothing to settle");
				Disposition::Ack
			},
			Err(e) => {
				tracing::error!(error = %e, "store unavailable, leaving event for redelivery");
				Disposition::Retry
			},
		}
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
