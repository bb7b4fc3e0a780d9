//! Redeem codes: the voucher grammar from `happybeauty-redeem` plus
//! single use against the ledger.

use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::NewRedeemCodeUsage;
use crate::store::{LedgerError, LedgerStore, RedeemOutcome};

pub use happybeauty_redeem::{
    mint, validate, RedeemRejection, MAX_CODE_CREDITS, VALIDITY_OFFSET_DAYS,
};

/// Errors from [`RedeemService::redeem`].
#[derive(Debug, thiserror::Error)]
pub enum RedeemError {
    #[error(transparent)]
    Rejected(#[from] RedeemRejection),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Applies redeem codes to credit accounts.
#[derive(Clone)]
pub struct RedeemService {
    store: Arc<dyn LedgerStore>,
}

impl RedeemService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Validates `code` and credits `user_id` once. Returns the credits added
    /// and the new balance.
    pub async fn redeem(
        &self,
        code: &str,
        user_id: Uuid,
        today: NaiveDate,
    ) -> Result<(i32, i32), RedeemError> {
        let code = code.trim();
        let credits = validate(code, today)?;

        if self.store.find_redemption(code).await?.is_some() {
            return Err(RedeemRejection::AlreadyUsed.into());
        }

        match self
            .store
            .redeem_code(NewRedeemCodeUsage::new(code.to_string(), user_id, credits))
            .await?
        {
            RedeemOutcome::Redeemed { usage, balance } => {
                tracing::info!(
                    code = %usage.code,
                    user_id = %user_id,
                    credits = usage.credits_added,
                    balance,
                    "Redeem code applied"
                );
                Ok((usage.credits_added, balance))
            }
            RedeemOutcome::AlreadyUsed => Err(RedeemRejection::AlreadyUsed.into()),
        }
    }
}
