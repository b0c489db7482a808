//! Order types for the TradeFlow pipeline.
//!
//! An order is created OPEN by the intake path and moves forward to exactly
//! one terminal status. The status machine lives in the store contract; this
//! module only defines the shapes and the request-level validation rules.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum length of an order item, in characters.
pub const MAX_ITEM_CHARS: usize = 255;

/// Number of fractional digits kept on order amounts.
pub const AMOUNT_SCALE: u32 = 2;

/// A durably recorded order.
///
/// Ids are server-assigned and monotonically increasing; orders are never
/// deleted, only transitioned forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
	/// Unique identifier, assigned by the store on insert.
	pub id: i64,
	/// Owner of the order.
	pub user_id: i64,
	/// What is being ordered.
	pub item: String,
	/// Order amount, normalized to two fractional digits.
	pub amount: Decimal,
	/// Current lifecycle status.
	pub status: OrderStatus,
	/// Unix timestamp (seconds) when this order was created.
	pub created_at: u64,
	/// Unix timestamp (seconds) when this order was last updated.
	pub updated_at: u64,
}

/// Status of an order in the pipeline.
///
/// Transitions only move forward: `Open` to one of the terminal states,
/// never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
	/// Order has been accepted and awaits settlement.
	Open,
	/// Order has been settled.
	Filled,
	/// Order was cancelled before settlement.
	Cancelled,
}

impl OrderStatus {
	/// Returns true for statuses an order can never leave.
	pub fn is_terminal(&self) -> bool {
		matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OrderStatus::Open => write!(f, "OPEN"),
			OrderStatus::Filled => write!(f, "FILLED"),
			OrderStatus::Cancelled => write!(f, "CANCELLED"),
		}
	}
}

/// Errors produced by order-request validation.
///
/// These are caller errors: they are surfaced directly and never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RequestError {
	#[error("user_id must be positive")]
	NonPositiveUserId,
	#[error("item must not be empty")]
	EmptyItem,
	#[error("item exceeds {MAX_ITEM_CHARS} characters")]
	ItemTooLong,
	#[error("amount must be positive")]
	NonPositiveAmount,
}

/// An order-placement request as handed to the intake path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
	pub user_id: i64,
	pub item: String,
	pub amount: Decimal,
}

impl OrderRequest {
	/// Checks the request against the intake rules.
	///
	/// This is a local, synchronous check; the store applies the same rules
	/// on insert so the contract holds regardless of the caller.
	pub fn validate(&self) -> Result<(), RequestError> {
		if self.user_id <= 0 {
			return Err(RequestError::NonPositiveUserId);
		}
		if self.item.is_empty() {
			return Err(RequestError::EmptyItem);
		}
		if self.item.chars().count() > MAX_ITEM_CHARS {
			return Err(RequestError::ItemTooLong);
		}
		if self.amount <= Decimal::ZERO {
			return Err(RequestError::NonPositiveAmount);
		}
		Ok(())
	}

	/// The request amount rescaled to the store's two fractional digits.
	pub fn normalized_amount(&self) -> Decimal {
		self.amount
			.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rust_decimal_macros::dec;

	fn request(user_id: i64, item: &str, amount: Decimal) -> OrderRequest {
		OrderRequest {
			user_id,
			item: item.to_string(),
			amount,
		}
	}

	#[test]
	fn valid_request_passes() {
		assert!(request(7, "Widget", dec!(9.99)).validate().is_ok());
	}

	#[test]
	fn rejects_non_positive_user() {
		assert_eq!(
			request(0, "Widget", dec!(1)).validate(),
			Err(RequestError::NonPositiveUserId)
		);
		assert_eq!(
			request(-3, "Widget", dec!(1)).validate(),
			Err(RequestError::NonPositiveUserId)
		);
	}

	#[test]
	fn rejects_bad_item() {
		assert_eq!(
			request(1, "", dec!(1)).validate(),
			Err(RequestError::EmptyItem)
		);
		let long = "x".repeat(MAX_ITEM_CHARS + 1);
		assert_eq!(
			request(1, &long, dec!(1)).validate(),
			Err(RequestError::ItemTooLong)
		);
		// Exactly at the limit is still fine.
		let at_limit = "x".repeat(MAX_ITEM_CHARS);
		assert!(request(1, &at_limit, dec!(1)).validate().is_ok());
	}

	#[test]
	fn rejects_non_positive_amount() {
		assert_eq!(
			request(1, "Widget", dec!(0)).validate(),
			Err(RequestError::NonPositiveAmount)
		);
		assert_eq!(
			request(1, "Widget", dec!(-9.99)).validate(),
			Err(RequestError::NonPositiveAmount)
		);
	}

	#[test]
	fn amount_is_rescaled_to_two_digits() {
		assert_eq!(request(1, "Widget", dec!(9.995)).normalized_amount(), dec!(10.00));
		assert_eq!(request(1, "Widget", dec!(9.99)).normalized_amount(), dec!(9.99));
	}

	#[test]
	fn status_serializes_screaming_snake() {
		let json = serde_json::to_string(&OrderStatus::Open).unwrap();
		assert_eq!(json, "\"OPEN\"");
		assert!(!OrderStatus::Open.is_terminal());
		assert!(OrderStatus::Filled.is_terminal());
		assert!(OrderStatus::Cancelled.is_terminal());
	}
}
