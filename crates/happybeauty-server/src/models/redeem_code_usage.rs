//! Redeem code usage model, one row per code ever redeemed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Records that a code has been consumed. The code is globally unique.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RedeemCodeUsage {
    pub code: String,
    pub user_id: Uuid,
    pub credits_added: i32,
    pub redeemed_at: DateTime<Utc>,
}

/// Data required to record a redemption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRedeemCodeUsage {
    pub code: String,
    pub user_id: Uuid,
    pub credits_added: i32,
}

impl NewRedeemCodeUsage {
    pub fn new(code: String, user_id: Uuid, credits_added: i32) -> Self {
        Self {
            code,
            user_id,
            credits_added,
        }
    }

    pub fn into_usage(self, redeemed_at: DateTime<Utc>) -> RedeemCodeUsage {
        RedeemCodeUsage {
            code: self.code,
            user_id: self.user_id,
            credits_added: self.credits_added,
            redeemed_at,
        }
    }
}
