//! Shared application state.

use std::sync::Arc;

use chrono::{Local, NaiveDate};

use crate::auth::TokenVerifier;
use crate::config_store::ConfigStore;
use crate::credits::CreditAccount;
use crate::orders::OrderLedger;
use crate::redeem::RedeemService;
use crate::retry::RetryPolicy;
use crate::store::LedgerStore;

/// Source of "today" for the referral cap and redeem-code windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clock {
    /// The server's local calendar date.
    System,
    Fixed(NaiveDate),
}

impl Clock {
    pub fn today(&self) -> NaiveDate {
        match self {
            Clock::System => Local::now().date_naive(),
            Clock::Fixed(date) => *date,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn LedgerStore>,
    pub config: Arc<ConfigStore>,
    pub tokens: Arc<TokenVerifier>,
    pub orders: OrderLedger,
    pub credits: CreditAccount,
    pub redeem: RedeemService,
    pub clock: Clock,
}

impl AppState {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        config: Arc<ConfigStore>,
        tokens: TokenVerifier,
        retry: RetryPolicy,
        clock: Clock,
    ) -> Self {
        Self {
            orders: OrderLedger::new(ledger.clone(), config.clone(), retry),
            credits: CreditAccount::new(ledger.clone()),
            redeem: RedeemService::new(ledger.clone()),
            ledger,
            config,
            tokens: Arc::new(tokens),
            clock,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }
}
