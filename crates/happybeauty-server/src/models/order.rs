//! Payment order model.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// Possible states of a payment order.
///
/// The only transition is `Pending -> Paid`, and it happens once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "order_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Redirect URL issued, waiting for the provider's notification
    Pending,
    /// Provider confirmed payment, credits granted
    Paid,
}

/// A record of an intent to exchange a payment for credits.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    /// Externally visible order reference (`out_trade_no`).
    pub out_trade_no: String,
    /// Trade number assigned by the provider once paid.
    pub provider_trade_no: Option<String>,
    /// User who placed the order.
    pub user_id: Uuid,
    /// Amount charged, two decimal places.
    pub amount: BigDecimal,
    /// Credits granted when the order is paid.
    pub credits_to_add: i32,
    /// Current order status.
    pub status: OrderStatus,
    /// When this order was created.
    pub created_at: DateTime<Utc>,
    /// When the payment was confirmed.
    pub paid_at: Option<DateTime<Utc>>,
}

/// Data required to create a new order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub out_trade_no: String,
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub credits_to_add: i32,
}

impl Order {
    /// Builds the in-memory representation of a freshly persisted order.
    pub fn pending(new: NewOrder, created_at: DateTime<Utc>) -> Self {
        Self {
            out_trade_no: new.out_trade_no,
            provider_trade_no: None,
            user_id: new.user_id,
            amount: new.amount,
            credits_to_add: new.credits_to_add,
            status: OrderStatus::Pending,
            created_at,
            paid_at: None,
        }
    }

    /// Check if the order is still pending.
    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    /// Check if the order has been paid.
    pub fn is_paid(&self) -> bool {
        self.status == OrderStatus::Paid
    }

    /// Moves a pending order to `Paid`. Returns false (and changes nothing)
    /// if the order was already paid.
    pub fn mark_paid(&mut self, provider_trade_no: Option<String>, paid_at: DateTime<Utc>) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = OrderStatus::Paid;
        self.provider_trade_no = provider_trade_no;
        self.paid_at = Some(paid_at);
        true
    }
}
