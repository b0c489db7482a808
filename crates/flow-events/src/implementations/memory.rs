//! In-memory event log backend.
//!
//! Each topic is an append-only vector of payloads plus a committed offset
//! per consumer group. A subscription walks the vector from the group's
//! committed offset; only `ack` moves that offset, so deliveries that were
//! pulled but never acknowledged are replayed by the next subscription for
//! the same group.

use crate::{Delivery, EventLogError, EventLogInterface, EventSubscription};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

#[derive(Default)]
struct TopicState {
	entries: Mutex<Vec<Vec<u8>>>,
	committed: Mutex<HashMap<String, u64>>,
	arrival: Notify,
}

/// In-memory event log implementation.
pub struct MemoryEventLog {
	topics: Mutex<HashMap<String, Arc<TopicState>>>,
}

impl MemoryEventLog {
	/// Creates an empty MemoryEventLog.
	pub fn new() -> Self {
		Self {
			topics: Mutex::new(HashMap::new()),
		}
	}

	async fn topic(&self, name: &str) -> Arc<TopicState> {
		let mut topics = self.topics.lock().await;
		topics
			.entry(name.to_string())
			.or_insert_with(|| Arc::new(TopicState::default()))
			.clone()
	}
}

impl Default for MemoryEventLog {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl EventLogInterface for MemoryEventLog {
	async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), EventLogError> {
		let topic = self.topic(topic).await;
		let mut entries = topic.entries.lock().await;
		entries.push(payload);
		drop(entries);
		topic.arrival.notify_waiters();
		Ok(())
	}

	async fn subscribe(
		&self,
		topic: &str,
		group: &str,
	) -> Result<Box<dyn EventSubscription>, EventLogError> {
		let topic = self.topic(topic).await;
		let position = {
			let committed = topic.committed.lock().await;
			committed.get(group).copied().unwrap_or(0)
		};
		Ok(Box::new(MemorySubscription {
			topic,
			group: group.to_string(),
			position,
		}))
	}
}

/// A group subscription over one in-memory topic.
struct MemorySubscription {
	topic: Arc<TopicState>,
	group: String,
	position: u64,
}

#[async_trait]
impl EventSubscription for MemorySubscription {
	async fn next(&mut self) -> Result<Delivery, EventLogError> {
		loop {
			// Register for wakeup before checking, so a publish that lands
			// between the check and the wait is not missed.
			let arrival = self.topic.arrival.notified();
			tokio::pin!(arrival);
			arrival.as_mut().enable();

			{
				let entries = self.topic.entries.lock().await;
				if let Some(payload) = entries.get(self.position as usize) {
					let delivery = Delivery {
						offset: self.position,
						payload: payload.clone(),
					};
					self.position += 1;
					return Ok(delivery);
				}
			}

			arrival.await;
		}
	}

	async fn ack(&mut self, delivery: &Delivery) -> Result<(), EventLogError> {
		let mut committed = self.topic.committed.lock().await;
		let position = committed.entry(self.group.clone()).or_insert(0);
		*position = (*position).max(delivery.offset + 1);
		Ok(())
	}
}

/// Factory function to create a memory event log backend from configuration.
///
/// Configuration parameters: none required.
pub fn create_event_log(
	_config: &toml::Value,
) -> Result<Box<dyn EventLogInterface>, EventLogError> {
	Ok(Box::new(MemoryEventLog::new()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[tokio::test]
	async fn delivers_in_publish_order() {
		let log = MemoryEventLog::new();
		log.publish("t", b"first".to_vec()).await.unwrap();
		log.publish("t", b"second".to_vec()).await.unwrap();

		let mut sub = log.subscribe("t", "g").await.unwrap();
		assert_eq!(sub.next().await.unwrap().payload, b"first");
		assert_eq!(sub.next().await.unwrap().payload, b"second");
	}

	#[tokio::test]
	async fn unacked_deliveries_replay_on_resubscribe() {
		let log = MemoryEventLog::new();
		log.publish("t", b"first".to_vec()).await.unwrap();
		log.publish("t", b"second".to_vec()).await.unwrap();

		let mut sub = log.subscribe("t", "g").await.unwrap();
		let first = sub.next().await.unwrap();
		sub.ack(&first).await.unwrap();
		// Pull the second delivery but crash before acking it.
		let _ = sub.next().await.unwrap();
		drop(sub);

		let mut sub = log.subscribe("t", "g").await.unwrap();
		let redelivered = sub.next().await.unwrap();
		assert_eq!(redelivered.payload, b"second");
	}

	#[tokio::test]
	async fn acked_deliveries_do_not_replay() {
		let log = MemoryEventLog::new();
		log.publish("t", b"only".to_vec()).await.unwrap();

		let mut sub = log.subscribe("t", "g").await.unwrap();
		let delivery = sub.next().await.unwrap();
		sub.ack(&delivery).await.unwrap();
		drop(sub);

		let mut sub = log.subscribe("t", "g").await.unwrap();
		let pending = tokio::time::timeout(Duration::from_millis(50), sub.next()).await;
		assert!(pending.is_err(), "committed delivery must not replay");
	}

	#[tokio::test]
	async fn groups_track_positions_independently() {
		let log = MemoryEventLog::new();
		log.publish("t", b"event".to_vec()).await.unwrap();

		let mut first_group = log.subscribe("t", "a").await.unwrap();
		let delivery = first_group.next().await.unwrap();
		first_group.ack(&delivery).await.unwrap();

		let mut second_group = log.subscribe("t", "b").await.unwrap();
		assert_eq!(second_group.next().await.unwrap().payload, b"event");
	}

	#[tokio::test]
	async fn blocked_pull_wakes_on_publish() {
		let log = Arc::new(MemoryEventLog::new());
		let mut sub = log.subscribe("t", "g").await.unwrap();

		let publisher = {
			let log = log.clone();
			tokio::spawn(async move {
				tokio::time::sleep(Duration::from_millis(20)).await;
				log.publish("t", b"late".to_vec()).await.unwrap();
			})
		};

		let delivery = tokio::time::timeout(Duration::from_secs(1), sub.next())
			.await
			.expect("pull should wake on publish")
			.unwrap();
		assert_eq!(delivery.payload, b"late");
		publisher.await.unwrap();
	}
}
