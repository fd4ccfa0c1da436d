//! Orders and their status state machine.
//!
//! ```text
//! awaiting_payment ─► pending ─► confirmed ─► preparing ─► ready ─► delivering ─► delivered
//!        │               │            │            │          │           │
//!        └───────────────┴────────────┴────────────┴──────────┴───────────┴─► cancelled
//! ```
//!
//! `awaiting_payment` is the pre-payment state. `pending` means the provider
//! approved the payment and the merchant has not yet accepted the order.
//! Transitions only ever move forward; `delivered` and `cancelled` absorb.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PaymentError;
use crate::money::round_cents;

/// Lifecycle status of an [`Order`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Placed, no approved payment observed yet.
    AwaitingPayment,
    /// Payment approved, waiting for the merchant to accept.
    Pending,
    /// Accepted by the merchant.
    Confirmed,
    /// In the kitchen.
    Preparing,
    /// Ready for pickup or dispatch.
    Ready,
    /// Out for delivery.
    Delivering,
    /// Handed over to the customer.
    Delivered,
    /// Cancelled at any point before delivery.
    Cancelled,
}

impl OrderStatus {
    const fn rank(self) -> u8 {
        match self {
            Self::AwaitingPayment => 0,
            Self::Pending => 1,
            Self::Confirmed => 2,
            Self::Preparing => 3,
            Self::Ready => 4,
            Self::Delivering => 5,
            Self::Delivered => 6,
            Self::Cancelled => 7,
        }
    }

    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingPayment => "awaiting_payment",
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Preparing => "preparing",
            Self::Ready => "ready",
            Self::Delivering => "delivering",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    /// No automated transition leaves a terminal status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Whether `next` is a forward step from `self`.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(next, Self::Cancelled) || next.rank() > self.rank()
    }

    /// Only orders still awaiting payment may start a checkout or charge.
    #[must_use]
    pub const fn accepts_payment(self) -> bool {
        matches!(self, Self::AwaitingPayment)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One cart line as submitted by the storefront.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    /// Display name of the product.
    pub title: String,
    /// Units ordered. Non-positive values are tolerated on input and
    /// filtered out when building a payment preference.
    pub quantity: i64,
    /// Price of a single unit.
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
}

/// How the order reaches the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Fulfillment {
    /// Delivered to an address.
    Delivery {
        /// Free-form delivery address.
        address: String,
    },
    /// Collected at the restaurant.
    Pickup,
}

/// Checkout payload creating a new [`Order`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    /// Merchant the order is placed with.
    pub merchant_id: String,
    /// Cart snapshot.
    pub items: Vec<LineItem>,
    /// Amount charged, delivery fee included.
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    /// Delivery address, required unless `pickup` is set.
    #[serde(default)]
    pub delivery_address: Option<String>,
    /// Customer collects the order.
    #[serde(default)]
    pub pickup: bool,
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Order identifier, also the provider-side external reference.
    pub id: String,
    /// Owning merchant.
    pub merchant_id: String,
    /// Items as they were at checkout time.
    pub items: Vec<LineItem>,
    /// Amount charged, delivery fee included.
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    /// Delivery or pickup.
    pub fulfillment: Fulfillment,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Checkout timestamp.
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Validates a checkout payload and creates an order awaiting payment.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::InvalidRequest`] when the merchant is blank,
    /// the cart is empty, the total is not positive, or a delivery order has
    /// no address.
    pub fn place(new: NewOrder) -> Result<Self, PaymentError> {
        if new.merchant_id.trim().is_empty() {
            return Err(PaymentError::InvalidRequest("merchantId is required".into()));
        }
        if new.items.is_empty() {
            return Err(PaymentError::InvalidRequest("order has no items".into()));
        }
        if new.total_amount <= Decimal::ZERO {
            return Err(PaymentError::InvalidRequest(
                "totalAmount must be positive".into(),
            ));
        }
        let fulfillment = if new.pickup {
            Fulfillment::Pickup
        } else {
            match new.delivery_address {
                Some(address) if !address.trim().is_empty() => Fulfillment::Delivery {
                    address: address.trim().to_owned(),
                },
                _ => {
                    return Err(PaymentError::InvalidRequest(
                        "deliveryAddress is required for delivery orders".into(),
                    ));
                }
            }
        };
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            merchant_id: new.merchant_id,
            items: new.items,
            total_amount: round_cents(new.total_amount),
            fulfillment,
            status: OrderStatus::AwaitingPayment,
            created_at: Utc::now(),
        })
    }
}
