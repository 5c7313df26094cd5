//! Per-year aggregation of speculative gains (§23 EStG) and the Freigrenze.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::fifo::SaleConsumption;
use crate::tax::de::TaxYear;

/// When the €600 Freigrenze is evaluated.
///
/// The two modes diverge when gains and losses interleave within a year:
/// a running net gain can exceed the threshold mid-year and drop back
/// under it by December.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExemptionMode {
    /// Evaluate once against the net annual total.
    #[default]
    YearEnd,
    /// Evaluate after every sale; once the running net gain has exceeded
    /// the threshold the exemption is forfeited for the year.
    PerSale,
}

/// Accumulates one tax year's private-disposal results.
#[derive(Debug, Clone)]
pub struct SpeculationAggregator {
    year: TaxYear,
    mode: ExemptionMode,
    /// Net speculative result: gains less losses within the period.
    speculative_net: Decimal,
    /// Gains realised past the speculation period; always exempt.
    long_term_gain: Decimal,
    /// Exemption capacity consumed so far; monotone, capped at the
    /// Freigrenze.
    exemption_used: Decimal,
    /// PerSale mode: set the moment the running net gain exceeds the
    /// threshold, and never cleared.
    threshold_breached: bool,
    sale_count: usize,
}

/// Snapshot used by the report builder.
#[derive(Debug, Clone, Serialize)]
pub struct SpeculationSummary {
    pub year: TaxYear,
    pub mode: ExemptionMode,
    pub speculative_net_eur: Decimal,
    pub long_term_gain_eur: Decimal,
    pub exemption_used_eur: Decimal,
    pub exemption_applied: bool,
    pub taxable_gain_eur: Decimal,
    pub sale_count: usize,
}

impl SpeculationAggregator {
    pub fn new(year: TaxYear, mode: ExemptionMode) -> Self {
        SpeculationAggregator {
            year,
            mode,
            speculative_net: Decimal::ZERO,
            long_term_gain: Decimal::ZERO,
            exemption_used: Decimal::ZERO,
            threshold_breached: false,
            sale_count: 0,
        }
    }

    pub fn year(&self) -> TaxYear {
        self.year
    }

    /// Route one disposal's per-lot results by holding period.
    pub fn record_sale(&mut self, sale: &SaleConsumption) {
        self.sale_count += 1;
        for consumption in &sale.consumptions {
            if consumption.speculative {
                self.speculative_net += consumption.gain_loss_eur;
            } else {
                self.long_term_gain += consumption.gain_loss_eur;
            }
        }
        // The untracked portion has no acquisition date, so no holding
        // period can exempt it; its full sale value counts as speculative.
        self.speculative_net += sale.untracked_value_eur;

        if self.mode == ExemptionMode::PerSale {
            if self.speculative_net > self.year.freigrenze() {
                self.threshold_breached = true;
            }
            self.exemption_used = self
                .exemption_used
                .max(self.speculative_net.clamp(Decimal::ZERO, self.year.freigrenze()));
        }
    }

    /// Net speculative result for the year so far.
    pub fn speculative_net(&self) -> Decimal {
        self.speculative_net
    }

    pub fn long_term_gain(&self) -> Decimal {
        self.long_term_gain
    }

    /// Taxable amount after applying the Freigrenze.
    ///
    /// All-or-nothing: a net gain within the threshold is entirely free;
    /// one cent above makes the whole net gain taxable. Net losses are
    /// never taxable (loss carry-over is the caller's concern).
    pub fn taxable_gain(&self) -> Decimal {
        if self.speculative_net <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let exempt = match self.mode {
            ExemptionMode::YearEnd => self.speculative_net <= self.year.freigrenze(),
            ExemptionMode::PerSale => {
                !self.threshold_breached && self.speculative_net <= self.year.freigrenze()
            }
        };
        if exempt {
            Decimal::ZERO
        } else {
            self.speculative_net
        }
    }

    /// Whether the year's net gain ended up fully exempt.
    pub fn exemption_applied(&self) -> bool {
        self.speculative_net > Decimal::ZERO && self.taxable_gain().is_zero()
    }

    pub fn summary(&self) -> SpeculationSummary {
        let exemption_used = match self.mode {
            ExemptionMode::PerSale => self.exemption_used,
            ExemptionMode::YearEnd => {
                self.speculative_net.clamp(Decimal::ZERO, self.year.freigrenze())
            }
        };
        SpeculationSummary {
            year: self.year,
            mode: self.mode,
            speculative_net_eur: self.speculative_net,
            long_term_gain_eur: self.long_term_gain,
            exemption_used_eur: exemption_used,
            exemption_applied: self.exemption_applied(),
            taxable_gain_eur: self.taxable_gain(),
            sale_count: self.sale_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fifo::LotConsumption;
    use chrono::{DateTime, NaiveDate, Utc};
    use rust_decimal_macros::dec;

    fn at(s: &str) -> DateTime<Utc> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
    }

    fn sale(gain: Decimal, speculative: bool) -> SaleConsumption {
        let sale_value = gain.max(Decimal::ZERO) + dec!(100);
        SaleConsumption {
            asset_id: "token".to_string(),
            sold_at: at("2024-06-01"),
            amount_requested: dec!(1),
            consumptions: vec![LotConsumption {
                lot_index: 0,
                source_tx: "0x01".to_string(),
                acquired_at: at("2024-01-01"),
                amount_used: dec!(1),
                cost_basis_eur: sale_value - gain,
                sale_value_eur: sale_value,
                gain_loss_eur: gain,
                holding_days: if speculative { 100 } else { 400 },
                speculative,
            }],
            untracked_amount: Decimal::ZERO,
            untracked_value_eur: Decimal::ZERO,
        }
    }

    #[test]
    fn gain_at_threshold_is_fully_exempt() {
        let mut agg = SpeculationAggregator::new(TaxYear(2024), ExemptionMode::YearEnd);
        agg.record_sale(&sale(dec!(600), true));
        assert_eq!(agg.taxable_gain(), Decimal::ZERO);
        assert!(agg.exemption_applied());
    }

    #[test]
    fn one_cent_over_threshold_is_fully_taxable() {
        let mut agg = SpeculationAggregator::new(TaxYear(2024), ExemptionMode::YearEnd);
        agg.record_sale(&sale(dec!(600.01), true));
        assert_eq!(agg.taxable_gain(), dec!(600.01));
        assert!(!agg.exemption_applied());
    }

    #[test]
    fn seven_hundred_net_gain_is_taxable_in_full() {
        // €700 net speculative gain, nothing used before.
        let mut agg = SpeculationAggregator::new(TaxYear(2024), ExemptionMode::YearEnd);
        agg.record_sale(&sale(dec!(700), true));
        assert!(!agg.exemption_applied());
        assert_eq!(agg.taxable_gain(), dec!(700));
    }

    #[test]
    fn long_term_gains_stay_exempt() {
        let mut agg = SpeculationAggregator::new(TaxYear(2024), ExemptionMode::YearEnd);
        agg.record_sale(&sale(dec!(5000), false));
        assert_eq!(agg.taxable_gain(), Decimal::ZERO);
        assert_eq!(agg.long_term_gain(), dec!(5000));
        assert_eq!(agg.speculative_net(), Decimal::ZERO);
    }

    #[test]
    fn losses_offset_speculative_gains() {
        let mut agg = SpeculationAggregator::new(TaxYear(2024), ExemptionMode::YearEnd);
        agg.record_sale(&sale(dec!(900), true));
        agg.record_sale(&sale(dec!(-400), true));
        assert_eq!(agg.speculative_net(), dec!(500));
        assert_eq!(agg.taxable_gain(), Decimal::ZERO);
    }

    #[test]
    fn net_loss_is_never_taxable() {
        let mut agg = SpeculationAggregator::new(TaxYear(2024), ExemptionMode::YearEnd);
        agg.record_sale(&sale(dec!(-300), true));
        assert_eq!(agg.taxable_gain(), Decimal::ZERO);
        assert!(!agg.exemption_applied());
    }

    #[test]
    fn exemption_modes_diverge_when_gains_and_losses_interleave() {
        // +700 then -200: the running net peaks above the threshold but the
        // year closes at 500.
        let mut year_end = SpeculationAggregator::new(TaxYear(2024), ExemptionMode::YearEnd);
        year_end.record_sale(&sale(dec!(700), true));
        year_end.record_sale(&sale(dec!(-200), true));
        assert_eq!(year_end.speculative_net(), dec!(500));
        assert_eq!(year_end.taxable_gain(), Decimal::ZERO);

        let mut per_sale = SpeculationAggregator::new(TaxYear(2024), ExemptionMode::PerSale);
        per_sale.record_sale(&sale(dec!(700), true));
        per_sale.record_sale(&sale(dec!(-200), true));
        assert_eq!(per_sale.speculative_net(), dec!(500));
        assert_eq!(per_sale.taxable_gain(), dec!(500));
        assert!(!per_sale.exemption_applied());
    }

    #[test]
    fn exemption_used_is_monotone_and_capped() {
        let mut agg = SpeculationAggregator::new(TaxYear(2024), ExemptionMode::PerSale);
        agg.record_sale(&sale(dec!(250), true));
        assert_eq!(agg.summary().exemption_used_eur, dec!(250));
        agg.record_sale(&sale(dec!(-100), true));
        // Losses don't hand exemption back.
        assert_eq!(agg.summary().exemption_used_eur, dec!(250));
        agg.record_sale(&sale(dec!(1000), true));
        assert_eq!(agg.summary().exemption_used_eur, dec!(600));
    }

    #[test]
    fn untracked_sale_value_counts_as_speculative() {
        let mut agg = SpeculationAggregator::new(TaxYear(2024), ExemptionMode::YearEnd);
        let mut s = sale(dec!(100), true);
        s.untracked_amount = dec!(10);
        s.untracked_value_eur = dec!(550);
        agg.record_sale(&s);
        assert_eq!(agg.speculative_net(), dec!(650));
        assert_eq!(agg.taxable_gain(), dec!(650));
    }
}
