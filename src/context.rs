//! Per-computation context: one wallet-year run's ledgers and aggregators.
//!
//! The context is an explicit arena with a create -> use -> discard
//! lifecycle. Nothing is process-global, so independent wallets can be
//! computed in parallel by giving each its own context.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::classify::{ClassifiedTransaction, TaxEffect};
use crate::fifo::{FifoLedger, LedgerError, SaleConsumption};
use crate::report::{build_report, ProcessedTransaction, YearlyTaxReport};
use crate::sources::RoiCategory;
use crate::tax::de::TaxYear;
use crate::tax::estimate::estimate;
use crate::tax::income::RoiIncomeAggregator;
use crate::tax::speculation::{ExemptionMode, SpeculationAggregator};

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Feeding a same-asset transaction older than one already processed
    /// would corrupt the FIFO invariant; this is a caller bug.
    #[error("out-of-order transaction for asset {asset_id}: {current} after {previous}")]
    OutOfOrder {
        asset_id: String,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Options fixed for the lifetime of one computation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComputationOptions {
    pub exemption_mode: ExemptionMode,
    /// Marginal rate supplied by the user; otherwise the bracket
    /// approximation is used.
    pub personal_rate: Option<Decimal>,
}

pub struct TaxContext {
    options: ComputationOptions,
    ledgers: BTreeMap<String, FifoLedger>,
    speculation: BTreeMap<TaxYear, SpeculationAggregator>,
    roi: BTreeMap<TaxYear, RoiIncomeAggregator>,
    processed: Vec<ProcessedTransaction>,
    last_seen: BTreeMap<String, DateTime<Utc>>,
}

impl TaxContext {
    pub fn new(options: ComputationOptions) -> Self {
        TaxContext {
            options,
            ledgers: BTreeMap::new(),
            speculation: BTreeMap::new(),
            roi: BTreeMap::new(),
            processed: Vec::new(),
            last_seen: BTreeMap::new(),
        }
    }

    /// Feed one classified transaction, in chronological order per asset.
    pub fn process(&mut self, classified: ClassifiedTransaction) -> Result<(), PipelineError> {
        self.check_order(&classified)?;

        let year = TaxYear::from_timestamp(classified.tx.timestamp);
        let amount = classified.amount();
        let mut sale: Option<SaleConsumption> = None;

        match classified.effect {
            TaxEffect::Acquisition => {
                self.ledger_mut(&classified.tx.asset_id).add_lot(
                    amount,
                    classified.unit_price_eur,
                    classified.tx.timestamp,
                    classified.tx.tx_hash.clone(),
                )?;
            }
            TaxEffect::Disposal => {
                let consumption = self.ledger_mut(&classified.tx.asset_id).consume(
                    amount,
                    classified.unit_price_eur,
                    classified.tx.timestamp,
                )?;
                self.speculation_mut(year).record_sale(&consumption);
                sale = Some(consumption);
            }
            TaxEffect::Income => {
                let category = classified.roi_category.unwrap_or(RoiCategory::Other);
                self.roi_mut(year).record(classified.value_eur, category);
                // The receipt also opens a lot at its receipt-date value,
                // so a later disposal has a proper acquisition.
                self.ledger_mut(&classified.tx.asset_id).add_lot(
                    amount,
                    classified.unit_price_eur,
                    classified.tx.timestamp,
                    classified.tx.tx_hash.clone(),
                )?;
            }
            TaxEffect::Neutral => {}
        }

        self.processed.push(ProcessedTransaction { classified, sale });
        Ok(())
    }

    pub fn process_all<I>(&mut self, transactions: I) -> Result<(), PipelineError>
    where
        I: IntoIterator<Item = ClassifiedTransaction>,
    {
        for classified in transactions {
            self.process(classified)?;
        }
        Ok(())
    }

    /// One report per tax year observed, ascending, assembled without any
    /// recomputation.
    pub fn reports(&self) -> Vec<YearlyTaxReport> {
        let mut years: Vec<TaxYear> = self
            .speculation
            .keys()
            .chain(self.roi.keys())
            .copied()
            .collect();
        for processed in &self.processed {
            years.push(TaxYear::from_timestamp(processed.classified.tx.timestamp));
        }
        years.sort();
        years.dedup();

        years.into_iter().map(|year| self.report_for(year)).collect()
    }

    pub fn report_for(&self, year: TaxYear) -> YearlyTaxReport {
        let exemption_mode = self.options.exemption_mode;
        let speculation = self
            .speculation
            .get(&year)
            .cloned()
            .unwrap_or_else(|| SpeculationAggregator::new(year, exemption_mode));
        let roi = self
            .roi
            .get(&year)
            .cloned()
            .unwrap_or_else(|| RoiIncomeAggregator::new(year));

        let total_taxable = speculation.taxable_gain() + roi.total();
        let estimate = estimate(year, total_taxable, self.options.personal_rate);

        let transactions: Vec<&ProcessedTransaction> = self
            .processed
            .iter()
            .filter(|p| TaxYear::from_timestamp(p.classified.tx.timestamp) == year)
            .collect();

        build_report(year, &transactions, speculation.summary(), roi.summary(), estimate)
    }

    pub fn ledger(&self, asset_id: &str) -> Option<&FifoLedger> {
        self.ledgers.get(asset_id)
    }

    fn check_order(&mut self, classified: &ClassifiedTransaction) -> Result<(), PipelineError> {
        let asset_id = &classified.tx.asset_id;
        let current = classified.tx.timestamp;
        if let Some(&previous) = self.last_seen.get(asset_id) {
            if current < previous {
                return Err(PipelineError::OutOfOrder {
                    asset_id: asset_id.clone(),
                    previous,
                    current,
                });
            }
        }
        self.last_seen.insert(asset_id.clone(), current);
        Ok(())
    }

    fn ledger_mut(&mut self, asset_id: &str) -> &mut FifoLedger {
        self.ledgers
            .entry(asset_id.to_string())
            .or_insert_with(|| FifoLedger::new(asset_id))
    }

    fn speculation_mut(&mut self, year: TaxYear) -> &mut SpeculationAggregator {
        let mode = self.options.exemption_mode;
        self.speculation
            .entry(year)
            .or_insert_with(|| SpeculationAggregator::new(year, mode))
    }

    fn roi_mut(&mut self, year: TaxYear) -> &mut RoiIncomeAggregator {
        self.roi.entry(year).or_insert_with(|| RoiIncomeAggregator::new(year))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::TxCategory;
    use crate::transaction::RawTransaction;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn at(s: &str) -> DateTime<Utc> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
    }

    fn leg(
        hash: &str,
        asset: &str,
        units: Decimal,
        price: Decimal,
        date: &str,
        category: TxCategory,
        effect: TaxEffect,
    ) -> ClassifiedTransaction {
        ClassifiedTransaction {
            tx: RawTransaction {
                chain_id: 1,
                tx_hash: hash.to_string(),
                from: "0xbb".to_string(),
                to: "0xaa".to_string(),
                timestamp: at(date),
                asset_id: asset.to_string(),
                symbol: asset.to_ascii_uppercase(),
                decimals: 0,
                raw_amount: units,
                unit_price_eur: Some(price),
            },
            category,
            effect,
            unit_price_eur: price,
            value_eur: (units * price).round_dp(2),
            roi_category: None,
            confidence: None,
            needs_manual_review: false,
            note: None,
        }
    }

    fn purchase(hash: &str, asset: &str, units: Decimal, price: Decimal, date: &str) -> ClassifiedTransaction {
        leg(hash, asset, units, price, date, TxCategory::Purchase, TaxEffect::Acquisition)
    }

    fn sale(hash: &str, asset: &str, units: Decimal, price: Decimal, date: &str) -> ClassifiedTransaction {
        leg(hash, asset, units, price, date, TxCategory::Sale, TaxEffect::Disposal)
    }

    fn roi(hash: &str, asset: &str, units: Decimal, price: Decimal, date: &str) -> ClassifiedTransaction {
        let mut leg = leg(hash, asset, units, price, date, TxCategory::RoiIncome, TaxEffect::Income);
        leg.roi_category = Some(RoiCategory::Staking);
        leg
    }

    #[test]
    fn purchases_and_sales_flow_into_the_year_report() {
        let mut ctx = TaxContext::new(ComputationOptions::default());
        ctx.process(purchase("0x01", "token", dec!(1000), dec!(0.04), "2024-01-01")).unwrap();
        ctx.process(sale("0x02", "token", dec!(800), dec!(0.07), "2024-03-01")).unwrap();

        let reports = ctx.reports();
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.year, TaxYear(2024));
        // Gain 800 * (0.07 - 0.04) = 24, under the Freigrenze.
        assert_eq!(report.speculation.speculative_net_eur, dec!(24.00));
        assert_eq!(report.speculation.taxable_gain_eur, Decimal::ZERO);
        assert!(report.speculation.exemption_applied);
    }

    #[test]
    fn roi_opens_a_lot_and_counts_as_income() {
        let mut ctx = TaxContext::new(ComputationOptions::default());
        ctx.process(roi("0x01", "dot", dec!(10), dec!(5), "2024-02-01")).unwrap();

        let reports = ctx.reports();
        assert_eq!(reports[0].roi_income.total_eur, dec!(50.00));
        assert_eq!(ctx.ledger("dot").unwrap().open_amount(), dec!(10));
    }

    #[test]
    fn roi_income_survives_later_disposal() {
        let mut ctx = TaxContext::new(ComputationOptions::default());
        ctx.process(roi("0x01", "dot", dec!(10), dec!(5), "2024-02-01")).unwrap();
        ctx.process(sale("0x02", "dot", dec!(10), dec!(8), "2024-04-01")).unwrap();

        let report = &ctx.reports()[0];
        // Income total is untouched by the disposal...
        assert_eq!(report.roi_income.total_eur, dec!(50.00));
        // ...which is a normal speculative gain against the receipt basis.
        assert_eq!(report.speculation.speculative_net_eur, dec!(30.00));
    }

    #[test]
    fn neutral_legs_do_not_touch_ledgers() {
        let mut ctx = TaxContext::new(ComputationOptions::default());
        let wrap = leg("0x01", "eth", dec!(1), dec!(2500), "2024-02-01", TxCategory::Wrap, TaxEffect::Neutral);
        ctx.process(wrap).unwrap();
        assert!(ctx.ledger("eth").is_none());
        assert_eq!(ctx.reports()[0].transactions.len(), 1);
    }

    #[test]
    fn out_of_order_same_asset_is_rejected() {
        let mut ctx = TaxContext::new(ComputationOptions::default());
        ctx.process(purchase("0x01", "token", dec!(1), dec!(1), "2024-02-01")).unwrap();
        let err = ctx
            .process(purchase("0x02", "token", dec!(1), dec!(1), "2024-01-01"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::OutOfOrder { .. }));
    }

    #[test]
    fn other_assets_are_not_affected_by_ordering() {
        let mut ctx = TaxContext::new(ComputationOptions::default());
        ctx.process(purchase("0x01", "token", dec!(1), dec!(1), "2024-02-01")).unwrap();
        ctx.process(purchase("0x02", "other", dec!(1), dec!(1), "2024-01-01")).unwrap();
    }

    #[test]
    fn years_are_kept_separate() {
        let mut ctx = TaxContext::new(ComputationOptions::default());
        ctx.process(purchase("0x01", "token", dec!(100), dec!(1), "2023-06-01")).unwrap();
        ctx.process(sale("0x02", "token", dec!(50), dec!(2), "2023-12-01")).unwrap();
        ctx.process(sale("0x03", "token", dec!(50), dec!(3), "2024-03-01")).unwrap();

        let reports = ctx.reports();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].year, TaxYear(2023));
        assert_eq!(reports[0].speculation.speculative_net_eur, dec!(50.00));
        assert_eq!(reports[1].year, TaxYear(2024));
        assert_eq!(reports[1].speculation.speculative_net_eur, dec!(100.00));
    }
}
