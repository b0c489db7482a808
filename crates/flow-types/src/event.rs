//! Event types for the order lifecycle stream.
//!
//! Events are replayable facts, not commands: exactly one `ORDER_PLACED`
//! event is published per created order, and consumers must tolerate
//! redelivery. The wire format is JSON, tagged by an `event` field and
//! versioned by `schema_version` so producer and consumer can evolve
//! independently.

use crate::{Order, OrderStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current version of the event wire schema.
pub const EVENT_SCHEMA_VERSION: u16 = 1;

/// Errors that can occur while encoding or decoding event payloads.
#[derive(Debug, Error)]
pub enum EventCodecError {
	#[error("encode error: {0}")]
	Encode(String),
	#[error("decode error: {0}")]
	Decode(String),
}

/// Order lifecycle events as they appear on the event log.
///
/// The `event` tag carries the kind; payloads with a kind this build does
/// not know decode to an error and are skipped by consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum OrderEvent {
	/// A new order has been durably recorded.
	#[serde(rename = "ORDER_PLACED")]
	OrderPlaced {
		#[serde(default = "current_schema_version")]
		schema_version: u16,
		order_id: i64,
		user_id: i64,
		item: String,
		amount: Decimal,
		status_at_publish: OrderStatus,
	},
}

fn current_schema_version() -> u16 {
	EVENT_SCHEMA_VERSION
}

impl OrderEvent {
	/// Builds the placement event for a freshly inserted order.
	pub fn placed(order: &Order) -> Self {
		OrderEvent::OrderPlaced {
			schema_version: EVENT_SCHEMA_VERSION,
			order_id: order.id,
			user_id: order.user_id,
			item: order.item.clone(),
			amount: order.amount,
			status_at_publish: order.status,
		}
	}

	/// Serializes the event into its wire payload.
	pub fn encode(&self) -> Result<Vec<u8>, EventCodecError> {
		serde_json::to_vec(self).map_err(|e| EventCodecError::Encode(e.to_string()))
	}

	/// Deserializes an event from its wire payload.
	pub fn decode(payload: &[u8]) -> Result<Self, EventCodecError> {
		serde_json::from_slice(payload).map_err(|e| EventCodecError::Decode(e.to_string()))
	}
}
