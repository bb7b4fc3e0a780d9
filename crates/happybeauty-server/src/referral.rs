//! Daily referral cap.
//!
//! The stored counter belongs to `last_referral_date`; it is reset lazily
//! the first time it is read on a later day, and the reset is persisted
//! together with the next grant rather than by a maintenance job.

use chrono::NaiveDate;

/// Maximum referral grants a referrer can earn per calendar day.
pub const DAILY_REFERRAL_CAP: i32 = 5;

/// Credits granted to the referrer per successful referral.
pub const REFERRAL_REWARD: i32 = 1;

/// Outcome of deciding whether a referral may be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferralDecision {
    /// Grant the reward; persist `referrals_today` and `today` as the new date.
    Grant { referrals_today: i32 },
    /// Today's cap has been reached; persist nothing.
    CapReached,
}

/// Count of grants on `today`, given what is stored.
pub fn referrals_today(stored_count: i32, last_referral_date: NaiveDate, today: NaiveDate) -> i32 {
    if last_referral_date == today {
        stored_count
    } else {
        0
    }
}

/// Decides the next counter state for a referral attempt on `today`.
pub fn decide(
    stored_count: i32,
    last_referral_date: NaiveDate,
    today: NaiveDate,
    cap: i32,
) -> ReferralDecision {
    let current = referrals_today(stored_count, last_referral_date, today);
    if current >= cap {
        ReferralDecision::CapReached
    } else {
        ReferralDecision::Grant {
            referrals_today: current + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_cap_reached_today() {
        let today = date(2026, 1, 28);
        assert_eq!(
            decide(5, today, today, DAILY_REFERRAL_CAP),
            ReferralDecision::CapReached
        );
    }

    #[test]
    fn test_yesterday_resets_then_grants() {
        let today = date(2026, 1, 28);
        let yesterday = date(2026, 1, 27);
        assert_eq!(
            decide(5, yesterday, today, DAILY_REFERRAL_CAP),
            ReferralDecision::Grant { referrals_today: 1 }
        );
    }

    #[test]
    fn test_grant_increments_below_cap() {
        let today = date(2026, 1, 28);
        assert_eq!(
            decide(4, today, today, DAILY_REFERRAL_CAP),
            ReferralDecision::Grant { referrals_today: 5 }
        );
        assert_eq!(
            decide(0, today, today, DAILY_REFERRAL_CAP),
            ReferralDecision::Grant { referrals_today: 1 }
        );
    }

    #[test]
    fn test_stale_counter_reads_as_zero() {
        assert_eq!(referrals_today(3, date(2025, 12, 31), date(2026, 1, 1)), 0);
        assert_eq!(referrals_today(3, date(2026, 1, 1), date(2026, 1, 1)), 3);
    }

    #[test]
    fn test_future_dated_counter_also_resets() {
        // Clock skew between instances must not lock a referrer out.
        assert_eq!(
            decide(5, date(2026, 1, 29), date(2026, 1, 28), DAILY_REFERRAL_CAP),
            ReferralDecision::Grant { referrals_today: 1 }
        );
    }
}
