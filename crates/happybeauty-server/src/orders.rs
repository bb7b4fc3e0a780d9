//! Payment orders: creation with a signed redirect URL, owner-scoped
//! lookup, and application of provider payment notifications.

use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::Utc;
use happybeauty_crypto::CallbackParams;
use rand::rngs::OsRng;
use rand::Rng;
use uuid::Uuid;

use crate::config_store::ConfigStore;
use crate::gateway::{self, GatewayError, PAID_TRADE_STATUSES};
use crate::models::{NewOrder, Order};
use crate::retry::RetryPolicy;
use crate::store::{ConfirmOutcome, LedgerError, LedgerStore};

/// Prefix of every order reference.
pub const ORDER_REF_PREFIX: &str = "PAY_";

/// Largest accepted order amount.
pub const MAX_ORDER_AMOUNT: &str = "100000.00";

/// Largest number of credits a single order may grant.
pub const MAX_ORDER_CREDITS: i32 = 100_000;

/// Errors from order creation and lookup.
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid credits: {0}")]
    InvalidCredits(String),

    #[error("Failed to build payment request: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Failed to persist order: {0}")]
    Storage(#[from] LedgerError),
}

/// The plain-text acknowledgement returned to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyAck {
    /// Stop redelivering this notification.
    Success,
    /// Redeliver later.
    Failure,
}

impl NotifyAck {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyAck::Success => "success",
            NotifyAck::Failure => "failure",
        }
    }
}

/// A persisted PENDING order and where to send the buyer.
#[derive(Debug, Clone)]
pub struct CreatedOrder {
    pub order: Order,
    pub pay_url: String,
}

/// Generates `PAY_` followed by 32 lowercase hex chars from the OS RNG.
pub fn generate_order_ref() -> String {
    let bytes: [u8; 16] = OsRng.gen();
    format!("{}{}", ORDER_REF_PREFIX, hex::encode(bytes))
}

/// Checks an amount is positive, has at most two decimals and is within bounds.
pub fn validate_amount(amount: &BigDecimal) -> Result<(), OrderError> {
    if amount <= &BigDecimal::from(0) {
        return Err(OrderError::InvalidAmount("amount must be positive".to_string()));
    }
    if amount.with_scale(2) != *amount {
        return Err(OrderError::InvalidAmount(
            "amount must have at most two decimal places".to_string(),
        ));
    }
    let max = BigDecimal::from_str(MAX_ORDER_AMOUNT)
        .map_err(|e| OrderError::InvalidAmount(e.to_string()))?;
    if amount > &max {
        return Err(OrderError::InvalidAmount(format!(
            "amount must not exceed {}",
            MAX_ORDER_AMOUNT
        )));
    }
    Ok(())
}

pub fn validate_credits(credits: i32) -> Result<(), OrderError> {
    if credits <= 0 {
        return Err(OrderError::InvalidCredits("credits must be positive".to_string()));
    }
    if credits > MAX_ORDER_CREDITS {
        return Err(OrderError::InvalidCredits(format!(
            "credits must not exceed {}",
            MAX_ORDER_CREDITS
        )));
    }
    Ok(())
}

/// Order ledger over a [`LedgerStore`].
#[derive(Clone)]
pub struct OrderLedger {
    store: Arc<dyn LedgerStore>,
    config: Arc<ConfigStore>,
    retry: RetryPolicy,
}

impl OrderLedger {
    pub fn new(store: Arc<dyn LedgerStore>, config: Arc<ConfigStore>, retry: RetryPolicy) -> Self {
        Self {
            store,
            config,
            retry,
        }
    }

    /// Creates a PENDING order. The redirect URL is built before anything is
    /// persisted, so a failure leaves no order behind.
    pub async fn create_order(
        &self,
        user_id: Uuid,
        amount: BigDecimal,
        credits: i32,
    ) -> Result<CreatedOrder, OrderError> {
        validate_amount(&amount)?;
        validate_credits(credits)?;

        let out_trade_no = generate_order_ref();
        let settings = self.config.provider_settings().await;
        let pay_url =
            gateway::build_page_pay_url(&settings, &out_trade_no, &amount, credits, Utc::now())?;

        let order = self
            .store
            .insert_order(NewOrder {
                out_trade_no,
                user_id,
                amount,
                credits_to_add: credits,
            })
            .await?;

        tracing::info!(
            out_trade_no = %order.out_trade_no,
            user_id = %user_id,
            amount = %order.amount,
            credits,
            "Payment order created"
        );

        Ok(CreatedOrder { order, pay_url })
    }

    /// The order if it exists and belongs to `user_id`.
    pub async fn find_order(
        &self,
        out_trade_no: &str,
        user_id: Uuid,
    ) -> Result<Option<Order>, LedgerError> {
        let order = self.store.find_order(out_trade_no).await?;
        Ok(order.filter(|order| order.user_id == user_id))
    }

    /// PENDING -> PAID plus the payment credit, retried on transient failures.
    pub async fn confirm_payment(
        &self,
        out_trade_no: &str,
        provider_trade_no: Option<&str>,
    ) -> Result<ConfirmOutcome, LedgerError> {
        self.retry
            .run("confirm_order", || {
                self.store.confirm_order(out_trade_no, provider_trade_no)
            })
            .await
    }

    /// Processes a provider notification and decides the acknowledgement.
    /// Never fails: every problem maps to [`NotifyAck::Failure`] or is
    /// acknowledged with a log line.
    pub async fn handle_notification(&self, fields: CallbackParams) -> NotifyAck {
        let (params, signature) = fields.take_signature();
        let out_trade_no = params.get("out_trade_no").unwrap_or_default().to_string();

        let Some(signature) = signature.filter(|s| !s.trim().is_empty()) else {
            tracing::warn!(out_trade_no = %out_trade_no, "Payment notification without signature");
            return NotifyAck::Failure;
        };

        let settings = self.config.provider_settings().await;
        if !gateway::verify_notification(&settings, &params, &signature) {
            tracing::warn!(out_trade_no = %out_trade_no, "Payment notification signature invalid");
            return NotifyAck::Failure;
        }

        let trade_status = params.get("trade_status").unwrap_or_default();
        if !PAID_TRADE_STATUSES.contains(&trade_status) {
            tracing::info!(
                out_trade_no = %out_trade_no,
                trade_status,
                "Payment notification acknowledged without credit"
            );
            return NotifyAck::Success;
        }

        if out_trade_no.is_empty() {
            tracing::warn!("Paid notification without out_trade_no");
            return NotifyAck::Success;
        }

        if let Some(total_amount) = params.get("total_amount") {
            match self.amount_matches(&out_trade_no, total_amount).await {
                Ok(true) => {}
                Ok(false) => return NotifyAck::Failure,
                Err(e) => {
                    tracing::error!(out_trade_no = %out_trade_no, error = %e, "Order lookup failed");
                    return NotifyAck::Failure;
                }
            }
        }

        let provider_trade_no = params.get("trade_no").filter(|s| !s.is_empty());
        match self.confirm_payment(&out_trade_no, provider_trade_no).await {
            Ok(ConfirmOutcome::Applied { order, balance }) => {
                tracing::info!(
                    out_trade_no = %order.out_trade_no,
                    user_id = %order.user_id,
                    credits = order.credits_to_add,
                    balance,
                    "Payment applied"
                );
                NotifyAck::Success
            }
            Ok(ConfirmOutcome::AlreadyApplied { order }) => {
                tracing::info!(out_trade_no = %order.out_trade_no, "Payment already applied");
                NotifyAck::Success
            }
            Ok(ConfirmOutcome::NotFound) => {
                tracing::warn!(out_trade_no = %out_trade_no, "Payment notification for unknown order");
                NotifyAck::Success
            }
            Err(e) => {
                tracing::error!(out_trade_no = %out_trade_no, error = %e, "Failed to apply payment");
                NotifyAck::Failure
            }
        }
    }

    /// False (with a log line) when the notified amount differs from the
    /// stored one. Unknown orders pass; confirmation reports them.
    async fn amount_matches(&self, out_trade_no: &str, total_amount: &str) -> Result<bool, LedgerError> {
        let Ok(notified) = BigDecimal::from_str(total_amount.trim()) else {
            tracing::warn!(out_trade_no, total_amount, "Unparsable total_amount in notification");
            return Ok(false);
        };

        let order = self
            .retry
            .run("find_order", || self.store.find_order(out_trade_no))
            .await?;

        match order {
            Some(order) if order.amount != notified => {
                tracing::error!(
                    out_trade_no,
                    stored = %order.amount,
                    notified = %notified,
                    "Payment notification amount mismatch"
                );
                Ok(false)
            }
            _ => Ok(true),
        }
    }
}
