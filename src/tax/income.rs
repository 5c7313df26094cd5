//! Per-year aggregation of miscellaneous "ROI" income (§22 EStG).
//!
//! Staking, mining and airdrop receipts are taxable in full at their
//! receipt-date fiat value. There is no cost basis and no holding period;
//! later disposals of the received asset never change these totals.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::sources::RoiCategory;
use crate::tax::de::TaxYear;

#[derive(Debug, Clone)]
pub struct RoiIncomeAggregator {
    year: TaxYear,
    total: Decimal,
    by_category: BTreeMap<RoiCategory, Decimal>,
    event_count: usize,
}

/// Snapshot used by the report builder.
#[derive(Debug, Clone, Serialize)]
pub struct RoiIncomeSummary {
    pub year: TaxYear,
    pub total_eur: Decimal,
    pub by_category: BTreeMap<RoiCategory, Decimal>,
    pub event_count: usize,
}

impl RoiIncomeAggregator {
    pub fn new(year: TaxYear) -> Self {
        RoiIncomeAggregator {
            year,
            total: Decimal::ZERO,
            by_category: BTreeMap::new(),
            event_count: 0,
        }
    }

    pub fn year(&self) -> TaxYear {
        self.year
    }

    pub fn record(&mut self, value_eur: Decimal, category: RoiCategory) {
        self.total += value_eur;
        *self.by_category.entry(category).or_insert(Decimal::ZERO) += value_eur;
        self.event_count += 1;
        log::debug!(
            "ROI income {}: +{} ({}), year total {}",
            self.year,
            value_eur,
            category,
            self.total
        );
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    pub fn category_total(&self, category: RoiCategory) -> Decimal {
        self.by_category.get(&category).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn summary(&self) -> RoiIncomeSummary {
        RoiIncomeSummary {
            year: self.year,
            total_eur: self.total,
            by_category: self.by_category.clone(),
            event_count: self.event_count,
        }
    }
}
