//! In-memory ledger store.
//!
//! All state sits behind one `tokio::sync::Mutex`; every operation performs
//! its checks and writes inside a single critical section, which makes each
//! operation atomic and all operations linearizable. Used by tests and local
//! development without Postgres.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    ConfigRepository, ConfirmOutcome, LedgerError, LedgerStore, RedeemOutcome, ReferralOutcome,
};
use crate::models::{
    ConfigEntry, ConfigUpdate, CreditEvent, CreditReason, NewCreditEvent, NewOrder,
    NewRedeemCodeUsage, NewUserProfile, Order, RedeemCodeUsage, UserProfile,
};
use crate::referral::{self, ReferralDecision};

#[derive(Default)]
struct MemoryState {
    profiles: HashMap<Uuid, UserProfile>,
    claimed_devices: HashSet<String>,
    orders: HashMap<String, Order>,
    redemptions: HashMap<String, RedeemCodeUsage>,
    events: Vec<CreditEvent>,
    config: BTreeMap<String, ConfigEntry>,
}

impl MemoryState {
    fn profile_mut(&mut self, user_id: Uuid) -> Result<&mut UserProfile, LedgerError> {
        self.profiles
            .get_mut(&user_id)
            .ok_or(LedgerError::UserNotFound(user_id))
    }

    /// Balance after adding `amount`, without applying it.
    fn credited_balance(&self, user_id: Uuid, amount: i32) -> Result<i32, LedgerError> {
        let profile = self
            .profiles
            .get(&user_id)
            .ok_or(LedgerError::UserNotFound(user_id))?;
        profile
            .credits
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow(user_id))
    }

    fn log(&mut self, event: NewCreditEvent) {
        self.events.push(event.into_event(Utc::now()));
    }
}

/// Thread-safe in-memory implementation of [`LedgerStore`] and [`ConfigRepository`].
#[derive(Default, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    injected_failures: Arc<AtomicU32>,
}

impl MemoryStore {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` operations fail with a retryable
    /// `PoolTimedOut` error before touching any state.
    pub fn fail_next_operations(&self, count: u32) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    /// Flags a profile as admin. Admin status is managed outside the API.
    pub async fn set_admin(&self, user_id: Uuid, is_admin: bool) -> Result<(), LedgerError> {
        let mut state = self.state.lock().await;
        state.profile_mut(user_id)?.is_admin = is_admin;
        Ok(())
    }

    /// Overwrites the stored referral counter, for seeding scenarios.
    pub async fn set_referral_state(
        &self,
        user_id: Uuid,
        referrals_today: i32,
        last_referral_date: NaiveDate,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.lock().await;
        let profile = state.profile_mut(user_id)?;
        profile.referrals_today = referrals_today;
        profile.last_referral_date = last_referral_date;
        Ok(())
    }

    fn check_injected_failure(&self) -> Result<(), LedgerError> {
        let injected = self
            .injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(LedgerError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn create_profile(
        &self,
        new: NewUserProfile,
        initial_grant: i32,
    ) -> Result<UserProfile, LedgerError> {
        self.check_injected_failure()?;
        let mut state = self.state.lock().await;

        if state.profiles.contains_key(&new.id) {
            return Err(LedgerError::ProfileExists(new.id));
        }

        let mut profile = UserProfile::from_new(new, Utc::now());
        if initial_grant > 0 && state.claimed_devices.insert(profile.device_id.clone()) {
            profile.credits = initial_grant;
            state.log(NewCreditEvent::new(
                profile.id,
                initial_grant,
                CreditReason::InitialGrant,
                Some(profile.device_id.clone()),
                initial_grant,
            ));
        }

        state.profiles.insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn find_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, LedgerError> {
        self.check_injected_failure()?;
        let state = self.state.lock().await;
        Ok(state.profiles.get(&user_id).cloned())
    }

    async fn find_profile_by_device(
        &self,
        device_id: &str,
    ) -> Result<Option<UserProfile>, LedgerError> {
        self.check_injected_failure()?;
        let state = self.state.lock().await;
        Ok(state
            .profiles
            .values()
            .filter(|p| p.device_id == device_id)
            .min_by_key(|p| p.created_at)
            .cloned())
    }

    async fn set_referrer(&self, user_id: Uuid, referrer_id: Uuid) -> Result<(), LedgerError> {
        self.check_injected_failure()?;
        let mut state = self.state.lock().await;
        state.profile_mut(user_id)?.referrer_id = Some(referrer_id);
        Ok(())
    }

    async fn debit(&self, user_id: Uuid, amount: i32) -> Result<i32, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        self.check_injected_failure()?;
        let mut state = self.state.lock().await;

        let profile = state.profile_mut(user_id)?;
        if !profile.has_sufficient_credits(amount) {
            return Err(LedgerError::InsufficientCredit {
                balance: profile.credits,
                requested: amount,
            });
        }
        profile.credits -= amount;
        let balance = profile.credits;

        state.log(NewCreditEvent::new(
            user_id,
            -amount,
            CreditReason::Debit,
            None,
            balance,
        ));
        Ok(balance)
    }

    async fn apply_referral(
        &self,
        referrer_id: Uuid,
        today: NaiveDate,
        cap: i32,
    ) -> Result<ReferralOutcome, LedgerError> {
        self.check_injected_failure()?;
        let mut state = self.state.lock().await;

        let profile = state.profile_mut(referrer_id)?;
        let referrals_today =
            match referral::decide(profile.referrals_today, profile.last_referral_date, today, cap)
            {
                ReferralDecision::CapReached => return Ok(ReferralOutcome::CapReached),
                ReferralDecision::Grant { referrals_today } => referrals_today,
            };

        let balance = profile
            .credits
            .checked_add(referral::REFERRAL_REWARD)
            .ok_or(LedgerError::BalanceOverflow(referrer_id))?;
        profile.credits = balance;
        profile.referrals_today = referrals_today;
        profile.last_referral_date = today;

        state.log(NewCreditEvent::new(
            referrer_id,
            referral::REFERRAL_REWARD,
            CreditReason::Referral,
            None,
            balance,
        ));
        Ok(ReferralOutcome::Granted {
            balance,
            referrals_today,
        })
    }

    async fn insert_order(&self, new: NewOrder) -> Result<Order, LedgerError> {
        self.check_injected_failure()?;
        let mut state = self.state.lock().await;

        if state.orders.contains_key(&new.out_trade_no) {
            return Err(LedgerError::DuplicateOrder(new.out_trade_no));
        }
        let order = Order::pending(new, Utc::now());
        state.orders.insert(order.out_trade_no.clone(), order.clone());
        Ok(order)
    }

    async fn find_order(&self, out_trade_no: &str) -> Result<Option<Order>, LedgerError> {
        self.check_injected_failure()?;
        let state = self.state.lock().await;
        Ok(state.orders.get(out_trade_no).cloned())
    }

    async fn confirm_order(
        &self,
        out_trade_no: &str,
        provider_trade_no: Option<&str>,
    ) -> Result<ConfirmOutcome, LedgerError> {
        self.check_injected_failure()?;
        let mut state = self.state.lock().await;

        let order = match state.orders.get(out_trade_no) {
            None => return Ok(ConfirmOutcome::NotFound),
            Some(order) if order.is_paid() => {
                return Ok(ConfirmOutcome::AlreadyApplied {
                    order: order.clone(),
                })
            }
            Some(order) => order.clone(),
        };

        // Validate the credit step before anything is written.
        let balance = state.credited_balance(order.user_id, order.credits_to_add)?;

        let mut paid = order;
        paid.mark_paid(provider_trade_no.map(str::to_string), Utc::now());
        state.orders.insert(paid.out_trade_no.clone(), paid.clone());
        state.profile_mut(paid.user_id)?.credits = balance;
        state.log(NewCreditEvent::new(
            paid.user_id,
            paid.credits_to_add,
            CreditReason::Payment,
            Some(paid.out_trade_no.clone()),
            balance,
        ));

        Ok(ConfirmOutcome::Applied {
            order: paid,
            balance,
        })
    }

    async fn find_redemption(&self, code: &str) -> Result<Option<RedeemCodeUsage>, LedgerError> {
        self.check_injected_failure()?;
        let state = self.state.lock().await;
        Ok(state.redemptions.get(code).cloned())
    }

    async fn redeem_code(&self, usage: NewRedeemCodeUsage) -> Result<RedeemOutcome, LedgerError> {
        if usage.credits_added <= 0 {
            return Err(LedgerError::InvalidAmount(usage.credits_added));
        }
        self.check_injected_failure()?;
        let mut state = self.state.lock().await;

        if state.redemptions.contains_key(&usage.code) {
            return Ok(RedeemOutcome::AlreadyUsed);
        }
        let balance = state.credited_balance(usage.user_id, usage.credits_added)?;

        let usage = usage.into_usage(Utc::now());
        state.redemptions.insert(usage.code.clone(), usage.clone());
        state.profile_mut(usage.user_id)?.credits = balance;
        state.log(NewCreditEvent::new(
            usage.user_id,
            usage.credits_added,
            CreditReason::RedeemCode,
            Some(usage.code.clone()),
            balance,
        ));

        Ok(RedeemOutcome::Redeemed { usage, balance })
    }

    async fn credit_history(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<CreditEvent>, LedgerError> {
        self.check_injected_failure()?;
        let state = self.state.lock().await;
        Ok(state
            .events
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ConfigRepository for MemoryStore {
    async fn list_config(&self) -> Result<Vec<ConfigEntry>, LedgerError> {
        self.check_injected_failure()?;
        let state = self.state.lock().await;
        Ok(state.config.values().cloned().collect())
    }

    async fn upsert_config(&self, items: &[ConfigUpdate]) -> Result<(), LedgerError> {
        self.check_injected_failure()?;
        let mut state = self.state.lock().await;
        let now = Utc::now();
        for item in items {
            let mut entry = item.clone().into_entry(now);
            if entry.description.is_none() {
                entry.description = state
                    .config
                    .get(&item.key)
                    .and_then(|existing| existing.description.clone());
            }
            state.config.insert(item.key.clone(), entry);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 28).unwrap()
    }

    async fn store_with_user(credits: i32) -> (MemoryStore, Uuid) {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        store
            .create_profile(
                NewUserProfile {
                    id: user_id,
                    nickname: "tester".to_string(),
                    device_id: format!("dev-{}", user_id),
                    today: today(),
                },
                credits,
            )
            .await
            .unwrap();
        (store, user_id)
    }

    #[tokio::test]
    async fn test_device_grant_only_once() {
        let store = MemoryStore::new();
        let first = store
            .create_profile(
                NewUserProfile {
                    id: Uuid::new_v4(),
                    nickname: "a".to_string(),
                    device_id: "shared-device".to_string(),
                    today: today(),
                },
                3,
            )
            .await
            .unwrap();
        let second = store
            .create_profile(
                NewUserProfile {
                    id: Uuid::new_v4(),
                    nickname: "b".to_string(),
                    device_id: "shared-device".to_string(),
                    today: today(),
                },
                3,
            )
            .await
            .unwrap();

        assert_eq!(first.credits, 3);
        assert_eq!(second.credits, 0);
    }

    #[tokio::test]
    async fn test_duplicate_profile_rejected() {
        let (store, user_id) = store_with_user(3).await;
        let result = store
            .create_profile(
                NewUserProfile {
                    id: user_id,
                    nickname: "again".to_string(),
                    device_id: "other".to_string(),
                    today: today(),
                },
                3,
            )
            .await;
        assert!(matches!(result, Err(LedgerError::ProfileExists(id)) if id == user_id));
    }

    #[tokio::test]
    async fn test_debit_on_zero_balance() {
        let (store, user_id) = store_with_user(0).await;
        let result = store.debit(user_id, 1).await;
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientCredit {
                balance: 0,
                requested: 1
            })
        ));
        assert_eq!(store.find_profile(user_id).await.unwrap().unwrap().credits, 0);
    }

    #[tokio::test]
    async fn test_confirm_without_owner_leaves_order_pending() {
        let store = MemoryStore::new();
        store
            .insert_order(NewOrder {
                out_trade_no: "PAY_orphan".to_string(),
                user_id: Uuid::new_v4(),
                amount: BigDecimal::from_str("9.90").unwrap(),
                credits_to_add: 10,
            })
            .await
            .unwrap();

        let result = store.confirm_order("PAY_orphan", Some("T1")).await;
        assert!(matches!(result, Err(LedgerError::UserNotFound(_))));

        let order = store.find_order("PAY_orphan").await.unwrap().unwrap();
        assert!(order.is_pending());
        assert!(order.provider_trade_no.is_none());
    }

    #[tokio::test]
    async fn test_history_newest_first() {
        let (store, user_id) = store_with_user(3).await;
        store.debit(user_id, 1).await.unwrap();
        store.debit(user_id, 1).await.unwrap();

        let history = store.credit_history(user_id, 10).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].balance_after, 1);
        assert_eq!(history[2].reason, CreditReason::InitialGrant);

        let limited = store.credit_history(user_id, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failures_are_retryable_and_consumed() {
        let (store, user_id) = store_with_user(1).await;
        store.fail_next_operations(1);

        let err = store.find_profile(user_id).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(store.find_profile(user_id).await.unwrap().is_some());
    }
}
