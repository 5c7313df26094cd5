//! Illustrative tax estimation.
//!
//! This is deliberately coarse: either the caller's own marginal rate, or
//! a three-bracket approximation of the progressive scale. The output is
//! an *estimate* for orientation, never a statutory computation.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::tax::de::TaxYear;

/// How the estimate was derived; carried on the result so no consumer can
/// mistake the bracket approximation for an assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EstimateMethod {
    /// Marginal rate supplied by the caller.
    PersonalRate,
    /// Built-in coarse bracket approximation.
    BracketApproximation,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaxEstimate {
    pub taxable_income_eur: Decimal,
    pub rate: Decimal,
    pub income_tax_eur: Decimal,
    pub solidarity_surcharge_eur: Decimal,
    pub total_eur: Decimal,
    pub method: EstimateMethod,
}

/// Estimate the tax on a year's taxable income.
///
/// With no `personal_rate`, picks ~14 % up to €10,000, ~25 % up to
/// €50,000, ~35 % above, then adds the solidarity surcharge on the
/// income-tax amount.
pub fn estimate(
    year: TaxYear,
    taxable_income_eur: Decimal,
    personal_rate: Option<Decimal>,
) -> TaxEstimate {
    let (rate, method) = match personal_rate {
        Some(rate) => (rate, EstimateMethod::PersonalRate),
        None => (bracket_rate(taxable_income_eur), EstimateMethod::BracketApproximation),
    };

    let income = taxable_income_eur.max(Decimal::ZERO);
    let income_tax = (income * rate).round_dp(2);
    let soli = (income_tax * year.soli_rate()).round_dp(2);

    TaxEstimate {
        taxable_income_eur,
        rate,
        income_tax_eur: income_tax,
        solidarity_surcharge_eur: soli,
        total_eur: income_tax + soli,
        method,
    }
}

fn bracket_rate(income: Decimal) -> Decimal {
    if income <= dec!(10000) {
        dec!(0.14)
    } else if income <= dec!(50000) {
        dec!(0.25)
    } else {
        dec!(0.35)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracket_selection() {
        assert_eq!(bracket_rate(dec!(9999)), dec!(0.14));
        assert_eq!(bracket_rate(dec!(10000)), dec!(0.14));
        assert_eq!(bracket_rate(dec!(10001)), dec!(0.25));
        assert_eq!(bracket_rate(dec!(50000)), dec!(0.25));
        assert_eq!(bracket_rate(dec!(50001)), dec!(0.35));
    }

    #[test]
    fn bracket_estimate_with_soli() {
        let estimate = estimate(TaxYear(2024), dec!(20000), None);
        assert_eq!(estimate.method, EstimateMethod::BracketApproximation);
        assert_eq!(estimate.income_tax_eur, dec!(5000.00));
        assert_eq!(estimate.solidarity_surcharge_eur, dec!(275.00));
        assert_eq!(estimate.total_eur, dec!(5275.00));
    }

    #[test]
    fn personal_rate_takes_precedence() {
        let estimate = estimate(TaxYear(2024), dec!(20000), Some(dec!(0.42)));
        assert_eq!(estimate.method, EstimateMethod::PersonalRate);
        assert_eq!(estimate.income_tax_eur, dec!(8400.00));
    }

    #[test]
    fn zero_and_negative_income_yield_no_tax() {
        let estimate = estimate(TaxYear(2024), Decimal::ZERO, None);
        assert_eq!(estimate.total_eur, Decimal::ZERO);

        let estimate = super::estimate(TaxYear(2024), dec!(-100), None);
        assert_eq!(estimate.income_tax_eur, Decimal::ZERO);
        assert_eq!(estimate.total_eur, Decimal::ZERO);
    }
}
