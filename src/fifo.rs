//! Per-asset FIFO cost-basis ledger.
//!
//! Acquisitions append purchase lots; disposals drain the oldest open lot
//! first and report a per-lot breakdown of cost basis, gain and holding
//! period. Lots are never deleted: a fully consumed lot stays in the queue
//! with zero remaining as the audit trail.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use thiserror::Error;

use crate::tax::de::{holding_days, is_speculative};

/// Remaining amounts at or below `original * DUST_TOLERANCE` count as fully
/// consumed, so residue from scaled input can't keep a lot open forever.
const DUST_TOLERANCE: Decimal = dec!(0.000000001);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("invalid amount {0}: must be positive")]
    InvalidAmount(Decimal),
}

/// A single acquisition of an asset, owned by its asset's ledger.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseLot {
    pub asset_id: String,
    pub original_amount: Decimal,
    pub remaining: Decimal,
    pub unit_cost_eur: Decimal,
    pub acquired_at: DateTime<Utc>,
    pub source_tx: String,
}

impl PurchaseLot {
    pub fn fully_consumed(&self) -> bool {
        self.remaining <= self.original_amount * DUST_TOLERANCE
    }
}

/// One lot's share of a disposal.
#[derive(Debug, Clone, Serialize)]
pub struct LotConsumption {
    /// Index of the lot in the ledger's queue.
    pub lot_index: usize,
    pub source_tx: String,
    pub acquired_at: DateTime<Utc>,
    pub amount_used: Decimal,
    pub cost_basis_eur: Decimal,
    pub sale_value_eur: Decimal,
    pub gain_loss_eur: Decimal,
    pub holding_days: i64,
    pub speculative: bool,
}

/// Full breakdown of one disposal against the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct SaleConsumption {
    pub asset_id: String,
    pub sold_at: DateTime<Utc>,
    pub amount_requested: Decimal,
    pub consumptions: Vec<LotConsumption>,
    /// Portion of the sale with no recorded purchase history. Zero cost
    /// basis, flagged for manual review; not a fatal error.
    pub untracked_amount: Decimal,
    /// Sale value of the untracked portion, all of it gain.
    pub untracked_value_eur: Decimal,
}

impl SaleConsumption {
    pub fn total_cost_basis_eur(&self) -> Decimal {
        self.consumptions.iter().map(|c| c.cost_basis_eur).sum()
    }

    pub fn total_sale_value_eur(&self) -> Decimal {
        self.consumptions.iter().map(|c| c.sale_value_eur).sum::<Decimal>()
            + self.untracked_value_eur
    }

    /// Gain over the tracked portion only; the untracked remainder is
    /// surfaced separately rather than folded into a number that looks
    /// authoritative.
    pub fn total_gain_loss_eur(&self) -> Decimal {
        self.consumptions.iter().map(|c| c.gain_loss_eur).sum()
    }

    pub fn has_untracked(&self) -> bool {
        self.untracked_amount > Decimal::ZERO
    }
}

/// FIFO queue of purchase lots for one asset.
///
/// The caller feeds transactions in timestamp order; insertion order is
/// chronological acquisition order.
#[derive(Debug, Clone)]
pub struct FifoLedger {
    asset_id: String,
    lots: Vec<PurchaseLot>,
}

impl FifoLedger {
    pub fn new(asset_id: impl Into<String>) -> Self {
        FifoLedger { asset_id: asset_id.into(), lots: Vec::new() }
    }

    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    pub fn lots(&self) -> &[PurchaseLot] {
        &self.lots
    }

    /// Total amount still held across open lots.
    pub fn open_amount(&self) -> Decimal {
        self.lots.iter().filter(|l| !l.fully_consumed()).map(|l| l.remaining).sum()
    }

    /// Append an acquisition lot.
    pub fn add_lot(
        &mut self,
        amount: Decimal,
        unit_cost_eur: Decimal,
        acquired_at: DateTime<Utc>,
        source_tx: impl Into<String>,
    ) -> Result<(), LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let source_tx = source_tx.into();
        log::debug!(
            "Ledger {} ADD lot: amount={}, unit_cost={}, tx={}. Open total: {}",
            self.asset_id,
            amount,
            unit_cost_eur,
            source_tx,
            self.open_amount() + amount
        );
        self.lots.push(PurchaseLot {
            asset_id: self.asset_id.clone(),
            original_amount: amount,
            remaining: amount,
            unit_cost_eur,
            acquired_at,
            source_tx,
        });
        Ok(())
    }

    /// Consume `amount` against the queue, oldest open lot first.
    pub fn consume(
        &mut self,
        amount: Decimal,
        sale_unit_price_eur: Decimal,
        sold_at: DateTime<Utc>,
    ) -> Result<SaleConsumption, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let mut outstanding = amount;
        let mut consumptions = Vec::new();

        for (lot_index, lot) in self.lots.iter_mut().enumerate() {
            if outstanding <= Decimal::ZERO {
                break;
            }
            if lot.fully_consumed() {
                continue;
            }

            let used = lot.remaining.min(outstanding);
            let cost_basis = used * lot.unit_cost_eur;
            let sale_value = used * sale_unit_price_eur;
            let days = holding_days(lot.acquired_at, sold_at);

            lot.remaining -= used;
            if lot.fully_consumed() {
                // Close out dust so the queue can't accumulate open slivers.
                lot.remaining = Decimal::ZERO;
            }
            outstanding -= used;

            log::debug!(
                "Ledger {} CONSUME: used={} from lot #{} (tx={}), cost={}, held {} days. Lot remaining: {}",
                self.asset_id,
                used,
                lot_index,
                lot.source_tx,
                cost_basis,
                days,
                lot.remaining
            );

            consumptions.push(LotConsumption {
                lot_index,
                source_tx: lot.source_tx.clone(),
                acquired_at: lot.acquired_at,
                amount_used: used,
                cost_basis_eur: cost_basis,
                sale_value_eur: sale_value,
                gain_loss_eur: sale_value - cost_basis,
                holding_days: days,
                speculative: is_speculative(days),
            });
        }

        // Treat a dust-sized shortfall as fully matched.
        if outstanding <= amount * DUST_TOLERANCE {
            outstanding = Decimal::ZERO;
        }
        if outstanding > Decimal::ZERO {
            log::warn!(
                "Ledger {}: sale of {} exceeds recorded history by {}",
                self.asset_id,
                amount,
                outstanding
            );
        }

        Ok(SaleConsumption {
            asset_id: self.asset_id.clone(),
            sold_at,
            amount_requested: amount,
            consumptions,
            untracked_amount: outstanding,
            untracked_value_eur: outstanding * sale_unit_price_eur,
        })
    }
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

    fn ledger_with_three_lots() -> FifoLedger {
        let mut ledger = FifoLedger::new("token");
        ledger.add_lot(dec!(1000), dec!(0.04), at("2024-01-01"), "0x01").unwrap();
        ledger.add_lot(dec!(500), dec!(0.06), at("2024-01-15"), "0x02").unwrap();
        ledger.add_lot(dec!(800), dec!(0.05), at("2024-02-01"), "0x03").unwrap();
        ledger
    }

    #[test]
    fn sale_spans_lots_in_fifo_order() {
        // Scenario: sale of 1200 units at 0.07 against 1000@0.04 + 500@0.06 + 800@0.05.
        let mut ledger = ledger_with_three_lots();
        let sale = ledger.consume(dec!(1200), dec!(0.07), at("2024-03-01")).unwrap();

        assert_eq!(sale.consumptions.len(), 2);
        assert_eq!(sale.consumptions[0].amount_used, dec!(1000));
        assert_eq!(sale.consumptions[0].cost_basis_eur, dec!(40.00));
        assert_eq!(sale.consumptions[1].amount_used, dec!(200));
        assert_eq!(sale.consumptions[1].cost_basis_eur, dec!(12.00));

        assert_eq!(sale.total_cost_basis_eur(), dec!(52.00));
        assert_eq!(sale.total_sale_value_eur(), dec!(84.00));
        assert_eq!(sale.total_gain_loss_eur(), dec!(32.00));
        assert!(!sale.has_untracked());

        // Lot 1 drained, lot 2 partially consumed, lot 3 untouched.
        assert!(ledger.lots()[0].fully_consumed());
        assert_eq!(ledger.lots()[1].remaining, dec!(300));
        assert_eq!(ledger.lots()[2].remaining, dec!(800));
    }

    #[test]
    fn consumed_lots_are_a_timestamp_prefix() {
        let mut ledger = ledger_with_three_lots();
        let sale = ledger.consume(dec!(1600), dec!(0.07), at("2024-03-01")).unwrap();

        let acquired: Vec<_> = sale.consumptions.iter().map(|c| c.acquired_at).collect();
        let mut sorted = acquired.clone();
        sorted.sort();
        assert_eq!(acquired, sorted);
        assert_eq!(sale.consumptions[0].source_tx, "0x01");
        assert_eq!(sale.consumptions[1].source_tx, "0x02");
        assert_eq!(sale.consumptions[2].source_tx, "0x03");
    }

    #[test]
    fn conservation_of_amounts() {
        let mut ledger = ledger_with_three_lots();
        let before = ledger.open_amount();
        let sale = ledger.consume(dec!(777), dec!(0.07), at("2024-03-01")).unwrap();
        let consumed: Decimal = sale.consumptions.iter().map(|c| c.amount_used).sum();
        assert_eq!(ledger.open_amount() + consumed, before);
    }

    #[test]
    fn sale_beyond_history_reports_untracked() {
        let mut ledger = FifoLedger::new("token");
        ledger.add_lot(dec!(100), dec!(1), at("2024-01-01"), "0x01").unwrap();

        let sale = ledger.consume(dec!(150), dec!(2), at("2024-02-01")).unwrap();
        assert!(sale.has_untracked());
        assert_eq!(sale.untracked_amount, dec!(50));
        assert_eq!(sale.untracked_value_eur, dec!(100));
        // Tracked portion still has a proper basis.
        assert_eq!(sale.total_cost_basis_eur(), dec!(100));
        assert_eq!(sale.total_gain_loss_eur(), dec!(100));
    }

    #[test]
    fn sale_against_empty_ledger_is_fully_untracked() {
        let mut ledger = FifoLedger::new("token");
        let sale = ledger.consume(dec!(10), dec!(3), at("2024-02-01")).unwrap();
        assert!(sale.consumptions.is_empty());
        assert_eq!(sale.untracked_amount, dec!(10));
    }

    #[test]
    fn non_positive_amounts_rejected() {
        let mut ledger = FifoLedger::new("token");
        assert_eq!(
            ledger.add_lot(dec!(0), dec!(1), at("2024-01-01"), "0x01"),
            Err(LedgerError::InvalidAmount(dec!(0)))
        );
        assert_eq!(
            ledger.add_lot(dec!(-5), dec!(1), at("2024-01-01"), "0x01"),
            Err(LedgerError::InvalidAmount(dec!(-5)))
        );
        assert!(matches!(
            ledger.consume(dec!(0), dec!(1), at("2024-01-01")),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn lots_are_retained_after_full_consumption() {
        let mut ledger = FifoLedger::new("token");
        ledger.add_lot(dec!(100), dec!(1), at("2024-01-01"), "0x01").unwrap();
        ledger.consume(dec!(100), dec!(2), at("2024-02-01")).unwrap();

        assert_eq!(ledger.lots().len(), 1);
        assert!(ledger.lots()[0].fully_consumed());
        assert_eq!(ledger.lots()[0].remaining, Decimal::ZERO);
        assert_eq!(ledger.lots()[0].original_amount, dec!(100));
        assert_eq!(ledger.open_amount(), Decimal::ZERO);
    }

    #[test]
    fn dust_remainder_counts_as_consumed() {
        let mut ledger = FifoLedger::new("token");
        ledger.add_lot(dec!(1), dec!(1), at("2024-01-01"), "0x01").unwrap();
        ledger.consume(dec!(0.9999999999), dec!(1), at("2024-02-01")).unwrap();
        assert!(ledger.lots()[0].fully_consumed());
    }

    #[test]
    fn holding_period_boundary_per_lot() {
        let mut ledger = FifoLedger::new("token");
        ledger.add_lot(dec!(10), dec!(1), at("2024-01-01"), "0x01").unwrap();

        let short = ledger.consume(dec!(5), dec!(2), at("2024-12-30")).unwrap();
        assert_eq!(short.consumptions[0].holding_days, 364);
        assert!(short.consumptions[0].speculative);

        let long = ledger.consume(dec!(5), dec!(2), at("2025-01-01")).unwrap();
        assert_eq!(long.consumptions[0].holding_days, 366);
        assert!(!long.consumptions[0].speculative);
    }
}
