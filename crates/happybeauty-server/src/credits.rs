//! Credit account operations: account creation with the device grant,
//! debits, referral rewards and balance reads.

use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{CreditEvent, NewUserProfile, UserProfile};
use crate::referral::DAILY_REFERRAL_CAP;
use crate::store::{LedgerError, LedgerStore, ReferralOutcome};

/// Welcome credits for the first account created on a device.
pub const INITIAL_DEVICE_GRANT: i32 = 3;

/// Credits charged per feature use when the caller does not say otherwise.
pub const DEFAULT_DEBIT: i32 = 1;

/// Input for [`CreditAccount::create_account`].
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub user_id: Uuid,
    pub nickname: String,
    pub device_id: String,
    /// Device of the user who shared the invite link.
    pub referrer_device_id: Option<String>,
}

#[derive(Clone)]
pub struct CreditAccount {
    store: Arc<dyn LedgerStore>,
}

impl CreditAccount {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Creates the profile, then rewards the referrer if one was named.
    ///
    /// Referral problems never fail registration: a self-referral, an
    /// unknown referrer device or a reached cap only leave `referrer_id` unset.
    pub async fn create_account(
        &self,
        account: NewAccount,
        today: NaiveDate,
    ) -> Result<UserProfile, LedgerError> {
        let mut profile = self
            .store
            .create_profile(
                NewUserProfile {
                    id: account.user_id,
                    nickname: account.nickname,
                    device_id: account.device_id,
                    today,
                },
                INITIAL_DEVICE_GRANT,
            )
            .await?;

        tracing::info!(
            user_id = %profile.id,
            device_id = %profile.device_id,
            credits = profile.credits,
            "Credit account created"
        );

        let Some(referrer_device) = account
            .referrer_device_id
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
        else {
            return Ok(profile);
        };

        match self.reward_referrer(&profile, referrer_device, today).await {
            Ok(Some(referrer_id)) => profile.referrer_id = Some(referrer_id),
            Ok(None) => {}
            Err(e) => {
                tracing::error!(user_id = %profile.id, error = %e, "Referral reward failed");
            }
        }

        Ok(profile)
    }

    async fn reward_referrer(
        &self,
        profile: &UserProfile,
        referrer_device: &str,
        today: NaiveDate,
    ) -> Result<Option<Uuid>, LedgerError> {
        if referrer_device == profile.device_id {
            tracing::info!(user_id = %profile.id, "Ignoring self-referral");
            return Ok(None);
        }

        let Some(referrer) = self.store.find_profile_by_device(referrer_device).await? else {
            tracing::info!(referrer_device, "Referrer device has no account");
            return Ok(None);
        };
        if referrer.id == profile.id {
            return Ok(None);
        }

        match self.apply_referral(referrer.id, today).await? {
            ReferralOutcome::Granted { .. } => {
                self.store.set_referrer(profile.id, referrer.id).await?;
                Ok(Some(referrer.id))
            }
            ReferralOutcome::CapReached => Ok(None),
        }
    }

    /// Spends `amount` credits.
    pub async fn debit(&self, user_id: Uuid, amount: i32) -> Result<i32, LedgerError> {
        let balance = self.store.debit(user_id, amount).await?;
        tracing::debug!(user_id = %user_id, amount, balance, "Credits debited");
        Ok(balance)
    }

    /// Grants the referral reward unless today's cap is reached.
    pub async fn apply_referral(
        &self,
        referrer_id: Uuid,
        today: NaiveDate,
    ) -> Result<ReferralOutcome, LedgerError> {
        let outcome = self
            .store
            .apply_referral(referrer_id, today, DAILY_REFERRAL_CAP)
            .await?;

        match outcome {
            ReferralOutcome::Granted {
                balance,
                referrals_today,
            } => tracing::info!(
                referrer_id = %referrer_id,
                balance,
                referrals_today,
                "Referral reward granted"
            ),
            ReferralOutcome::CapReached => {
                tracing::info!(referrer_id = %referrer_id, "Daily referral cap reached")
            }
        }
        Ok(outcome)
    }

    /// Current profile, with the referral counter as of `today`.
    pub async fn balance(&self, user_id: Uuid, today: NaiveDate) -> Result<UserProfile, LedgerError> {
        let mut profile = self
            .store
            .find_profile(user_id)
            .await?
            .ok_or(LedgerError::UserNotFound(user_id))?;

        profile.referrals_today = profile.referrals_on(today);
        Ok(profile)
    }

    pub async fn history(&self, user_id: Uuid, limit: i64) -> Result<Vec<CreditEvent>, LedgerError> {
        self.store.credit_history(user_id, limit).await
    }
}
