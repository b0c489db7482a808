//! Event log module for the TradeFlow pipeline.
//!
//! The event log is an ordered, append-only, at-least-once delivery channel.
//! Consumers pull deliveries one at a time and acknowledge only after their
//! side effects are durably applied; anything unacknowledged comes back on
//! the next subscription, so a crash between effect and ack means
//! redelivery, never loss.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod memory;
}

/// Errors that can occur during event log operations.
#[derive(Debug, Error)]
pub enum EventLogError {
	/// Error that occurs when publishing an event fails.
	#[error("publish failed: {0}")]
	Publish(String),
	/// Error that occurs when opening a subscription fails.
	#[error("subscribe failed: {0}")]
	Subscribe(String),
	/// Error that occurs when committing a read position fails.
	#[error("commit failed: {0}")]
	Commit(String),
	/// Error that occurs when a bounded event-log call exceeds its time bound.
	#[error("event log operation timed out")]
	Timeout,
}

/// A single delivery handed to a consumer.
///
/// The offset identifies the event's position within its topic and is what
/// `ack` commits.
#[derive(Debug, Clone)]
pub struct Delivery {
	pub offset: u64,
	pub payload: Vec<u8>,
}

/// Trait defining the interface for event log backends.
#[async_trait]
pub trait EventLogInterface: Send + Sync {
	/// Appends an event to the topic. Order of publishes is the order of
	/// delivery within the topic.
	async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), EventLogError>;

	/// Opens a subscription for a consumer group, resuming from the group's
	/// committed position. Events past that position are (re)delivered in
	/// order.
	async fn subscribe(
		&self,
		topic: &str,
		group: &str,
	) -> Result<Box<dyn EventSubscription>, EventLogError>;
}

/// A consumer-group subscription over one topic.
#[async_trait]
pub trait EventSubscription: Send {
	/// Pulls the next delivery, waiting as long as it takes for one to
	/// arrive. The wait is deliberately unbounded; consumers run forever.
	async fn next(&mut self) -> Result<Delivery, EventLogError>;

	/// Commits the delivery's position for this group. Must only be called
	/// after the consumer's side effects for the delivery are durable.
	async fn ack(&mut self, delivery: &Delivery) -> Result<(), EventLogError>;
}

/// Type alias for event log factory functions.
pub type EventLogFactory = fn(&toml::Value) -> Result<Box<dyn EventLogInterface>, EventLogError>;

/// Event log service that bounds publish and subscribe calls with a timeout.
///
/// `next` on the returned subscription stays unbounded: the blocking pull is
/// the consumption model, not a fault.
pub struct EventLogService {
	/// The underlying event log backend implementation.
	backend: Box<dyn EventLogInterface>,
	/// Upper bound applied to publish/subscribe calls.
	op_timeout: Duration,
}

impl EventLogService {
	/// Creates a new EventLogService with the specified backend and call
	/// bound.
	pub fn new(backend: Box<dyn EventLogInterface>, op_timeout: Duration) -> Self {
		Self {
			backend,
			op_timeout,
		}
	}

	async fn bounded<T, F>(&self, call: F) -> Result<T, EventLogError>
	where
		F: Future<Output = Result<T, EventLogError>>,
	{
		match tokio::time::timeout(self.op_timeout, call).await {
			Ok(result) => result,
			Err(_) => Err(EventLogError::Timeout),
		}
	}

	/// Appends an event to the topic.
	pub async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), EventLogError> {
		self.bounded(self.backend.publish(topic, payload)).await
	}

	/// Opens a subscription for a consumer group.
	pub async fn subscribe(
		&self,
		topic: &str,
		group: &str,
	) -> Result<Box<dyn EventSubscription>, EventLogError> {
		self.bounded(self.backend.subscribe(topic, group)).await
	}
}
