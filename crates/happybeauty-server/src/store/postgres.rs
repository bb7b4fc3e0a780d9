//! Postgres-backed ledger store.
//!
//! Balance mutations are either one conditional `UPDATE` or a transaction
//! holding a row lock on the profile, so concurrent requests for one user
//! serialize in the database. Dropping an uncommitted transaction rolls it back.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{
    ConfigRepository, ConfirmOutcome, LedgerError, LedgerStore, RedeemOutcome, ReferralOutcome,
};
use crate::models::{
    ConfigEntry, ConfigUpdate, CreditEvent, CreditReason, NewCreditEvent, NewOrder,
    NewRedeemCodeUsage, NewUserProfile, Order, OrderStatus, RedeemCodeUsage, UserProfile,
};
use crate::referral::{self, ReferralDecision};

const PROFILE_COLUMNS: &str = "id, nickname, device_id, credits, referrals_today, \
     last_referral_date, referrer_id, is_admin, created_at";

const ORDER_COLUMNS: &str =
    "out_trade_no, provider_trade_no, user_id, amount, credits_to_add, status, created_at, paid_at";

/// Postgres implementation of [`LedgerStore`] and [`ConfigRepository`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Maps a unique violation to `conflict`, everything else to a database error.
fn map_unique_violation(err: sqlx::Error, conflict: impl FnOnce() -> LedgerError) -> LedgerError {
    let unique = err
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation());
    if unique {
        conflict()
    } else {
        LedgerError::Database(err)
    }
}

/// Maps Postgres `numeric_value_out_of_range` on an INTEGER column to an overflow.
fn map_overflow(err: sqlx::Error, user_id: Uuid) -> LedgerError {
    let out_of_range = err
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "22003");
    if out_of_range {
        LedgerError::BalanceOverflow(user_id)
    } else {
        LedgerError::Database(err)
    }
}

async fn log_event(conn: &mut PgConnection, event: &NewCreditEvent) -> Result<(), LedgerError> {
    sqlx::query(
        r#"
        INSERT INTO credit_events (user_id, delta, reason, reference, balance_after)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(event.user_id)
    .bind(event.delta)
    .bind(event.reason)
    .bind(&event.reference)
    .bind(event.balance_after)
    .execute(conn)
    .await?;
    Ok(())
}

/// Adds `amount` to a balance and returns the new balance.
async fn credit(conn: &mut PgConnection, user_id: Uuid, amount: i32) -> Result<i32, LedgerError> {
    let balance: Option<i32> = sqlx::query_scalar(
        r#"
        UPDATE user_profiles
        SET credits = credits + $2
        WHERE id = $1
        RETURNING credits
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .fetch_optional(conn)
    .await
    .map_err(|e| map_overflow(e, user_id))?;

    balance.ok_or(LedgerError::UserNotFound(user_id))
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn create_profile(
        &self,
        new: NewUserProfile,
        initial_grant: i32,
    ) -> Result<UserProfile, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let profile: UserProfile = sqlx::query_as(&format!(
            r#"
            INSERT INTO user_profiles (id, nickname, device_id, credits, referrals_today, last_referral_date)
            VALUES ($1, $2, $3, 0, 0, $4)
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(new.id)
        .bind(&new.nickname)
        .bind(&new.device_id)
        .bind(new.today)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique_violation(e, || LedgerError::ProfileExists(new.id)))?;

        if initial_grant <= 0 {
            tx.commit().await?;
            return Ok(profile);
        }

        let claimed: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO device_grants (device_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (device_id) DO NOTHING
            RETURNING device_id
            "#,
        )
        .bind(&new.device_id)
        .bind(new.id)
        .fetch_optional(&mut *tx)
        .await?;

        let profile = match claimed {
            None => profile,
            Some(device_id) => {
                let granted: UserProfile = sqlx::query_as(&format!(
                    "UPDATE user_profiles SET credits = $2 WHERE id = $1 RETURNING {PROFILE_COLUMNS}"
                ))
                .bind(new.id)
                .bind(initial_grant)
                .fetch_one(&mut *tx)
                .await?;

                log_event(
                    &mut tx,
                    &NewCreditEvent::new(
                        new.id,
                        initial_grant,
                        CreditReason::InitialGrant,
                        Some(device_id),
                        granted.credits,
                    ),
                )
                .await?;
                granted
            }
        };

        tx.commit().await?;
        Ok(profile)
    }

    async fn find_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, LedgerError> {
        let profile = sqlx::query_as(&format!(
            "SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn find_profile_by_device(
        &self,
        device_id: &str,
    ) -> Result<Option<UserProfile>, LedgerError> {
        let profile = sqlx::query_as(&format!(
            r#"
            SELECT {PROFILE_COLUMNS} FROM user_profiles
            WHERE device_id = $1
            ORDER BY created_at ASC
            LIMIT 1
            "#
        ))
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn set_referrer(&self, user_id: Uuid, referrer_id: Uuid) -> Result<(), LedgerError> {
        let rows_affected = sqlx::query("UPDATE user_profiles SET referrer_id = $2 WHERE id = $1")
            .bind(user_id)
            .bind(referrer_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows_affected == 0 {
            return Err(LedgerError::UserNotFound(user_id));
        }
        Ok(())
    }

    async fn debit(&self, user_id: Uuid, amount: i32) -> Result<i32, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let mut tx = self.pool.begin().await?;

        let balance: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE user_profiles
            SET credits = credits - $2
            WHERE id = $1 AND credits >= $2
            RETURNING credits
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(balance) = balance else {
            let current: Option<i32> =
                sqlx::query_scalar("SELECT credits FROM user_profiles WHERE id = $1")
                    .bind(user_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            return match current {
                None => Err(LedgerError::UserNotFound(user_id)),
                Some(balance) => Err(LedgerError::InsufficientCredit {
                    balance,
                    requested: amount,
                }),
            };
        };

        log_event(
            &mut tx,
            &NewCreditEvent::new(user_id, -amount, CreditReason::Debit, None, balance),
        )
        .await?;

        tx.commit().await?;
        Ok(balance)
    }

    async fn apply_referral(
        &self,
        referrer_id: Uuid,
        today: NaiveDate,
        cap: i32,
    ) -> Result<ReferralOutcome, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(i32, NaiveDate)> = sqlx::query_as(
            r#"
            SELECT referrals_today, last_referral_date
            FROM user_profiles
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(referrer_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (stored, last_date) = row.ok_or(LedgerError::UserNotFound(referrer_id))?;

        let referrals_today = match referral::decide(stored, last_date, today, cap) {
            ReferralDecision::CapReached => return Ok(ReferralOutcome::CapReached),
            ReferralDecision::Grant { referrals_today } => referrals_today,
        };

        let balance: i32 = sqlx::query_scalar(
            r#"
            UPDATE user_profiles
            SET credits = credits + $2, referrals_today = $3, last_referral_date = $4
            WHERE id = $1
            RETURNING credits
            "#,
        )
        .bind(referrer_id)
        .bind(referral::REFERRAL_REWARD)
        .bind(referrals_today)
        .bind(today)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_overflow(e, referrer_id))?;

        log_event(
            &mut tx,
            &NewCreditEvent::new(
                referrer_id,
                referral::REFERRAL_REWARD,
                CreditReason::Referral,
                None,
                balance,
            ),
        )
        .await?;

        tx.commit().await?;
        Ok(ReferralOutcome::Granted {
            balance,
            referrals_today,
        })
    }

    async fn insert_order(&self, new: NewOrder) -> Result<Order, LedgerError> {
        let order = sqlx::query_as(&format!(
            r#"
            INSERT INTO orders (out_trade_no, user_id, amount, credits_to_add, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(&new.out_trade_no)
        .bind(new.user_id)
        .bind(&new.amount)
        .bind(new.credits_to_add)
        .bind(OrderStatus::Pending)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, || LedgerError::DuplicateOrder(new.out_trade_no.clone())))?;
        Ok(order)
    }

    async fn find_order(&self, out_trade_no: &str) -> Result<Option<Order>, LedgerError> {
        let order = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE out_trade_no = $1"
        ))
        .bind(out_trade_no)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    async fn confirm_order(
        &self,
        out_trade_no: &str,
        provider_trade_no: Option<&str>,
    ) -> Result<ConfirmOutcome, LedgerError> {
        let mut tx = self.pool.begin().await?;

        // Only one confirmation can match the PENDING row.
        let paid: Option<Order> = sqlx::query_as(&format!(
            r#"
            UPDATE orders
            SET status = $2, provider_trade_no = COALESCE($3, provider_trade_no), paid_at = NOW()
            WHERE out_trade_no = $1 AND status = $4
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(out_trade_no)
        .bind(OrderStatus::Paid)
        .bind(provider_trade_no)
        .bind(OrderStatus::Pending)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(order) = paid else {
            let existing: Option<Order> = sqlx::query_as(&format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE out_trade_no = $1"
            ))
            .bind(out_trade_no)
            .fetch_optional(&mut *tx)
            .await?;
            return Ok(match existing {
                Some(order) => ConfirmOutcome::AlreadyApplied { order },
                None => ConfirmOutcome::NotFound,
            });
        };

        let balance = credit(&mut tx, order.user_id, order.credits_to_add).await?;

        log_event(
            &mut tx,
            &NewCreditEvent::new(
                order.user_id,
                order.credits_to_add,
                CreditReason::Payment,
                Some(order.out_trade_no.clone()),
                balance,
            ),
        )
        .await?;

        tx.commit().await?;
        Ok(ConfirmOutcome::Applied { order, balance })
    }

    async fn find_redemption(&self, code: &str) -> Result<Option<RedeemCodeUsage>, LedgerError> {
        let usage = sqlx::query_as(
            r#"
            SELECT code, user_id, credits_added, redeemed_at
            FROM used_redeem_codes
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(usage)
    }

    async fn redeem_code(&self, usage: NewRedeemCodeUsage) -> Result<RedeemOutcome, LedgerError> {
        if usage.credits_added <= 0 {
            return Err(LedgerError::InvalidAmount(usage.credits_added));
        }

        let mut tx = self.pool.begin().await?;

        let recorded: Option<RedeemCodeUsage> = sqlx::query_as(
            r#"
            INSERT INTO used_redeem_codes (code, user_id, credits_added)
            VALUES ($1, $2, $3)
            ON CONFLICT (code) DO NOTHING
            RETURNING code, user_id, credits_added, redeemed_at
            "#,
        )
        .bind(&usage.code)
        .bind(usage.user_id)
        .bind(usage.credits_added)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(usage) = recorded else {
            return Ok(RedeemOutcome::AlreadyUsed);
        };

        let balance = credit(&mut tx, usage.user_id, usage.credits_added).await?;

        log_event(
            &mut tx,
            &NewCreditEvent::new(
                usage.user_id,
                usage.credits_added,
                CreditReason::RedeemCode,
                Some(usage.code.clone()),
                balance,
            ),
        )
        .await?;

        tx.commit().await?;
        Ok(RedeemOutcome::Redeemed { usage, balance })
    }

    async fn credit_history(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<CreditEvent>, LedgerError> {
        let events = sqlx::query_as(
            r#"
            SELECT id, user_id, delta, reason, reference, balance_after, created_at
            FROM credit_events
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }
}

#[async_trait]
impl ConfigRepository for PgStore {
    async fn list_config(&self) -> Result<Vec<ConfigEntry>, LedgerError> {
        let entries = sqlx::query_as(
            "SELECT key, value, description, updated_at FROM system_config ORDER BY key",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn upsert_config(&self, items: &[ConfigUpdate]) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO system_config (key, value, description, updated_at)
                VALUES ($1, $2, $3, NOW())
                ON CONFLICT (key)
                DO UPDATE SET
                    value = EXCLUDED.value,
                    description = COALESCE(EXCLUDED.description, system_config.description),
                    updated_at = NOW()
                "#,
            )
            .bind(&item.key)
            .bind(&item.value)
            .bind(&item.description)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
