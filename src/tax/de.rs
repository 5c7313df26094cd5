//! German tax-year parameters for private crypto disposals and
//! miscellaneous income.

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Holding period after which a private disposal is tax-exempt (§23 EStG).
pub const SPECULATION_PERIOD_DAYS: i64 = 365;

/// German tax year; the calendar year, unlike the UK's April split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaxYear(pub i32);

impl TaxYear {
    pub fn from_timestamp(at: DateTime<Utc>) -> Self {
        TaxYear(at.year())
    }

    /// Annual all-or-nothing exemption threshold for net speculative gains
    /// (§23 (3) EStG). Below or at the threshold the whole gain is free;
    /// above it the whole gain is taxable.
    pub fn freigrenze(&self) -> Decimal {
        // Flat so far; becomes a per-year match once the statute changes.
        dec!(600)
    }

    /// Solidarity surcharge applied on top of the income-tax amount.
    pub fn soli_rate(&self) -> Decimal {
        dec!(0.055)
    }
}

impl std::fmt::Display for TaxYear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Days held between acquisition and disposal, floored to whole days.
pub fn holding_days(acquired_at: DateTime<Utc>, sold_at: DateTime<Utc>) -> i64 {
    (sold_at - acquired_at).num_days()
}

/// Disposals within the speculation period are taxable; from day 365 on
/// they are exempt.
pub fn is_speculative(days: i64) -> bool {
    days < SPECULATION_PERIOD_DAYS
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(s: &str) -> DateTime<Utc> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn tax_year_is_calendar_year() {
        assert_eq!(TaxYear::from_timestamp(at("2024-01-01")), TaxYear(2024));
        assert_eq!(TaxYear::from_timestamp(at("2024-12-31")), TaxYear(2024));
        assert_eq!(TaxYear::from_timestamp(at("2025-01-01")), TaxYear(2025));
    }

    #[test]
    fn holding_days_floors_partial_days() {
        let bought = at("2024-01-01");
        let sold = bought + chrono::Duration::hours(47);
        assert_eq!(holding_days(bought, sold), 1);
    }

    #[test]
    fn speculation_boundary() {
        // 2024 is a leap year: 2024-01-01 -> 2024-12-30 is 364 days,
        // 2024-01-01 -> 2025-01-01 is 366 days.
        let days_short = holding_days(at("2024-01-01"), at("2024-12-30"));
        assert_eq!(days_short, 364);
        assert!(is_speculative(days_short));

        let days_long = holding_days(at("2024-01-01"), at("2025-01-01"));
        assert_eq!(days_long, 366);
        assert!(!is_speculative(days_long));

        assert!(!is_speculative(365));
    }

    #[test]
    fn freigrenze_amount() {
        assert_eq!(TaxYear(2024).freigrenze(), dec!(600));
    }
}
