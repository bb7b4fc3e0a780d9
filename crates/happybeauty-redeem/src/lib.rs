//! Redeem code grammar.
//!
//! A code is `DD` (today's day of month), the credit quantity, four
//! uppercase letters, `DD` (day of month 13 days from today) and two
//! lowercase letters, e.g. `2810ABCD10xy` on 2026-01-28 for 10 credits.
//! Only ASCII digits and letters are accepted.
//!
//! Single use is enforced by the server's ledger, not here.

use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate};
use rand::Rng;
use regex::Regex;
use serde::Serialize;

/// Largest quantity a single code may carry.
pub const MAX_CODE_CREDITS: i32 = 100_000;

/// Days between the leading and trailing date components.
pub const VALIDITY_OFFSET_DAYS: i64 = 13;

// `\d` would also match non-ASCII digits.
static CODE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]{2})([0-9]+)([A-Z]{4})([0-9]{2})([a-z]{2})$")
        .expect("redeem code pattern is valid")
});

/// Why a code was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RedeemRejection {
    #[error("Redeem code is malformed")]
    MalformedCode,

    #[error("Redeem code is not valid today")]
    ExpiredOrNotYetValid,

    #[error("Redeem code quantity is invalid")]
    InvalidQuantity,

    #[error("Redeem code has already been used")]
    AlreadyUsed,
}

impl RedeemRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedeemRejection::MalformedCode => "MALFORMED_CODE",
            RedeemRejection::ExpiredOrNotYetValid => "EXPIRED_OR_NOT_YET_VALID",
            RedeemRejection::InvalidQuantity => "INVALID_QUANTITY",
            RedeemRejection::AlreadyUsed => "ALREADY_USED",
        }
    }
}

fn day_of_month(date: NaiveDate) -> String {
    format!("{:02}", date.day())
}

fn expiry_day(today: NaiveDate) -> NaiveDate {
    today + Duration::days(VALIDITY_OFFSET_DAYS)
}

/// Credits carried by `code` if it is well-formed and valid on `today`.
pub fn validate(code: &str, today: NaiveDate) -> Result<i32, RedeemRejection> {
    let captures = CODE_PATTERN
        .captures(code.trim())
        .ok_or(RedeemRejection::MalformedCode)?;

    if captures[1] != day_of_month(today) || captures[4] != day_of_month(expiry_day(today)) {
        return Err(RedeemRejection::ExpiredOrNotYetValid);
    }

    let credits: i32 = captures[2]
        .parse()
        .map_err(|_| RedeemRejection::InvalidQuantity)?;
    if credits <= 0 || credits > MAX_CODE_CREDITS {
        return Err(RedeemRejection::InvalidQuantity);
    }

    Ok(credits)
}

/// Produces a code worth `credits` that validates on `today`.
pub fn mint(credits: i32, today: NaiveDate) -> Result<String, RedeemRejection> {
    if credits <= 0 || credits > MAX_CODE_CREDITS {
        return Err(RedeemRejection::InvalidQuantity);
    }

    let mut rng = rand::thread_rng();
    let upper: String = (0..4).map(|_| rng.gen_range(b'A'..=b'Z') as char).collect();
    let lower: String = (0..2).map(|_| rng.gen_range(b'a'..=b'z') as char).collect();

    Ok(format!(
        "{}{}{}{}{}",
        day_of_month(today),
        credits,
        upper,
        day_of_month(expiry_day(today)),
        lower
    ))
}
