//! Persistence ports for the credit ledger and system config.
//!
//! Every method that changes a balance is a single unit of work in the
//! backing store: either all of its writes become visible or none do.
//! Mutations of one user's balance are linearizable.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{
    ConfigEntry, ConfigUpdate, CreditEvent, NewOrder, NewRedeemCodeUsage,
    NewUserProfile, Order, RedeemCodeUsage, UserProfile,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors raised by ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("User profile not found: {0}")]
    UserNotFound(Uuid),

    #[error("Profile already exists for user {0}")]
    ProfileExists(Uuid),

    #[error("Insufficient credit: balance {balance}, requested {requested}")]
    InsufficientCredit { balance: i32, requested: i32 },

    #[error("Credit amount must be positive, got {0}")]
    InvalidAmount(i32),

    #[error("Order reference already exists: {0}")]
    DuplicateOrder(String),

    #[error("Balance overflow for user {0}")]
    BalanceOverflow(Uuid),
}

impl LedgerError {
    /// Transient storage failures that may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::Database(sqlx::Error::PoolTimedOut) | LedgerError::Database(sqlx::Error::Io(_))
        )
    }
}

/// Result of applying a provider payment confirmation.
#[derive(Debug, Clone)]
pub enum ConfirmOutcome {
    /// The order moved to PAID and its credits were granted.
    Applied { order: Order, balance: i32 },
    /// The order was already PAID; nothing changed.
    AlreadyApplied { order: Order },
    /// No order with that reference exists.
    NotFound,
}

/// Result of a referral grant attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferralOutcome {
    Granted { balance: i32, referrals_today: i32 },
    CapReached,
}

/// Result of recording a redeem code and crediting its owner.
#[derive(Debug, Clone)]
pub enum RedeemOutcome {
    Redeemed { usage: RedeemCodeUsage, balance: i32 },
    AlreadyUsed,
}

/// Storage for profiles, balances, orders and redeem codes.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Inserts a profile. The store claims the device's one-time welcome
    /// grant atomically with the insert: the profile starts with
    /// `initial_grant` credits if the device never claimed it, else 0.
    async fn create_profile(
        &self,
        new: NewUserProfile,
        initial_grant: i32,
    ) -> Result<UserProfile, LedgerError>;

    async fn find_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, LedgerError>;

    /// Oldest profile created on `device_id`.
    async fn find_profile_by_device(
        &self,
        device_id: &str,
    ) -> Result<Option<UserProfile>, LedgerError>;

    async fn set_referrer(&self, user_id: Uuid, referrer_id: Uuid) -> Result<(), LedgerError>;

    /// Subtracts `amount` if the balance covers it; fails with
    /// `InsufficientCredit` otherwise and leaves the balance unchanged.
    async fn debit(&self, user_id: Uuid, amount: i32) -> Result<i32, LedgerError>;

    /// Grants one referral reward under the daily cap (see [`crate::referral`]).
    async fn apply_referral(
        &self,
        referrer_id: Uuid,
        today: NaiveDate,
        cap: i32,
    ) -> Result<ReferralOutcome, LedgerError>;

    async fn insert_order(&self, new: NewOrder) -> Result<Order, LedgerError>;

    async fn find_order(&self, out_trade_no: &str) -> Result<Option<Order>, LedgerError>;

    /// Transitions PENDING -> PAID and credits the owner in one unit of work.
    async fn confirm_order(
        &self,
        out_trade_no: &str,
        provider_trade_no: Option<&str>,
    ) -> Result<ConfirmOutcome, LedgerError>;

    async fn find_redemption(&self, code: &str) -> Result<Option<RedeemCodeUsage>, LedgerError>;

    /// Records the usage and credits the user in one unit of work.
    async fn redeem_code(&self, usage: NewRedeemCodeUsage) -> Result<RedeemOutcome, LedgerError>;

    /// Most recent balance changes, newest first.
    async fn credit_history(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<CreditEvent>, LedgerError>;
}

/// Storage for persisted config overrides.
#[async_trait]
pub trait ConfigRepository: Send + Sync {
    async fn list_config(&self) -> Result<Vec<ConfigEntry>, LedgerError>;

    /// Upserts all items in one unit of work.
    async fn upsert_config(&self, items: &[ConfigUpdate]) -> Result<(), LedgerError>;
}
