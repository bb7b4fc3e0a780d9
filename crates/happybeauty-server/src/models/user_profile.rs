//! User profile model carrying the credit account.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::referral;

/// A user's profile and embedded credit account.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// User ID issued by the identity provider.
    pub id: Uuid,
    /// Display name.
    pub nickname: String,
    /// Identifier of the device the account was created on.
    pub device_id: String,
    /// Current credit balance, never negative.
    pub credits: i32,
    /// Referral grants on `last_referral_date`.
    pub referrals_today: i32,
    /// Day the referral counter refers to.
    pub last_referral_date: NaiveDate,
    /// Profile that referred this user, if a referral was granted.
    pub referrer_id: Option<Uuid>,
    /// Whether the user may change system config.
    pub is_admin: bool,
    /// When this profile was created.
    pub created_at: DateTime<Utc>,
}

/// Data required to create a new profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUserProfile {
    pub id: Uuid,
    pub nickname: String,
    pub device_id: String,
    pub today: NaiveDate,
}

impl UserProfile {
    /// Builds a profile with a zero balance; the device grant is applied by the store.
    pub fn from_new(new: NewUserProfile, created_at: DateTime<Utc>) -> Self {
        Self {
            id: new.id,
            nickname: new.nickname,
            device_id: new.device_id,
            credits: 0,
            referrals_today: 0,
            last_referral_date: new.today,
            referrer_id: None,
            is_admin: false,
            created_at,
        }
    }

    /// Returns true if the account can pay `amount` credits.
    pub fn has_sufficient_credits(&self, amount: i32) -> bool {
        self.credits >= amount
    }

    /// Referral grants already earned on `today`, with the lazy day reset applied.
    pub fn referrals_on(&self, today: NaiveDate) -> i32 {
        referral::referrals_today(self.referrals_today, self.last_referral_date, today)
    }
}
