//! Append-only log of credit balance changes.
//!
//! Every balance mutation writes one event in the same unit of work, so the
//! sum of `delta` for a user always equals their balance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// Why a balance changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "credit_reason", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CreditReason {
    /// Welcome grant for a device's first account.
    InitialGrant,
    /// Credit spent on a feature.
    Debit,
    /// Paid order applied.
    Payment,
    /// Reward for referring a new user.
    Referral,
    /// Redeem code applied.
    RedeemCode,
}

/// An immutable balance change.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CreditEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Signed change; negative for debits.
    pub delta: i32,
    pub reason: CreditReason,
    /// Order reference or redeem code that caused the change.
    pub reference: Option<String>,
    /// Balance right after this change.
    pub balance_after: i32,
    pub created_at: DateTime<Utc>,
}

/// Data required to append an event.
#[derive(Debug, Clone)]
pub struct NewCreditEvent {
    pub user_id: Uuid,
    pub delta: i32,
    pub reason: CreditReason,
    pub reference: Option<String>,
    pub balance_after: i32,
}

impl NewCreditEvent {
    pub fn new(
        user_id: Uuid,
        delta: i32,
        reason: CreditReason,
        reference: Option<String>,
        balance_after: i32,
    ) -> Self {
        Self {
            user_id,
            delta,
            reason,
            reference,
            balance_after,
        }
    }

    pub fn into_event(self, created_at: DateTime<Utc>) -> CreditEvent {
        CreditEvent {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            delta: self.delta,
            reason: self.reason,
            reference: self.reference,
            balance_after: self.balance_after,
            created_at,
        }
    }
}
