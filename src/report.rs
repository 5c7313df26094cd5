//! Yearly report assembly.
//!
//! The builder only structures state the pipeline already computed;
//! nothing is recalculated here. The report carries enough detail (full
//! classified list, per-sale FIFO breakdowns) that export collaborators
//! can format it without recomputation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::classify::ClassifiedTransaction;
use crate::fifo::SaleConsumption;
use crate::tax::de::TaxYear;
use crate::tax::estimate::TaxEstimate;
use crate::tax::income::RoiIncomeSummary;
use crate::tax::speculation::SpeculationSummary;

/// A classified transaction together with its disposal breakdown, if any.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedTransaction {
    pub classified: ClassifiedTransaction,
    pub sale: Option<SaleConsumption>,
}

/// The final per-year report handed to export collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct YearlyTaxReport {
    pub year: TaxYear,
    pub speculation: SpeculationSummary,
    pub roi_income: RoiIncomeSummary,
    pub total_taxable_income_eur: Decimal,
    /// Illustrative only; the method marker says how it was derived.
    pub estimate: TaxEstimate,
    pub transactions: Vec<ProcessedTransaction>,
    pub notes: Vec<String>,
}

impl YearlyTaxReport {
    /// Deterministic JSON rendering: all maps are ordered and the
    /// transaction list keeps processing order.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write one CSV row per consumed lot (plus one for any untracked
    /// remainder), the flat shape downstream spreadsheets want.
    pub fn write_disposals_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut wtr = csv::Writer::from_writer(writer);
        for processed in &self.transactions {
            let Some(sale) = &processed.sale else {
                continue;
            };
            for consumption in &sale.consumptions {
                wtr.serialize(DisposalCsvRecord {
                    date: sale.sold_at.format("%Y-%m-%d").to_string(),
                    asset: sale.asset_id.clone(),
                    tx_hash: processed.classified.tx.tx_hash.clone(),
                    acquired: consumption.acquired_at.format("%Y-%m-%d").to_string(),
                    amount: consumption.amount_used.to_string(),
                    cost_basis_eur: consumption.cost_basis_eur.round_dp(2).to_string(),
                    sale_value_eur: consumption.sale_value_eur.round_dp(2).to_string(),
                    gain_loss_eur: consumption.gain_loss_eur.round_dp(2).to_string(),
                    holding_days: consumption.holding_days.to_string(),
                    speculative: consumption.speculative.to_string(),
                })?;
            }
            if sale.has_untracked() {
                wtr.serialize(DisposalCsvRecord {
                    date: sale.sold_at.format("%Y-%m-%d").to_string(),
                    asset: sale.asset_id.clone(),
                    tx_hash: processed.classified.tx.tx_hash.clone(),
                    acquired: String::new(),
                    amount: sale.untracked_amount.to_string(),
                    cost_basis_eur: "0".to_string(),
                    sale_value_eur: sale.untracked_value_eur.round_dp(2).to_string(),
                    gain_loss_eur: sale.untracked_value_eur.round_dp(2).to_string(),
                    holding_days: String::new(),
                    speculative: "true".to_string(),
                })?;
            }
        }
        wtr.flush()?;
        Ok(())
    }
}

/// CSV record for disposal output
#[derive(Debug, Serialize, Deserialize)]
struct DisposalCsvRecord {
    date: String,
    asset: String,
    tx_hash: String,
    acquired: String,
    amount: String,
    cost_basis_eur: String,
    sale_value_eur: String,
    gain_loss_eur: String,
    holding_days: String,
    speculative: String,
}

/// Assemble a year's report from aggregator snapshots. Pure structuring.
pub fn build_report(
    year: TaxYear,
    transactions: &[&ProcessedTransaction],
    speculation: SpeculationSummary,
    roi_income: RoiIncomeSummary,
    estimate: TaxEstimate,
) -> YearlyTaxReport {
    let mut notes = Vec::new();
    for processed in transactions {
        let tx = &processed.classified.tx;
        if processed.classified.needs_manual_review {
            let detail = processed.classified.note.as_deref().unwrap_or("needs manual review");
            notes.push(format!("tx {}: {}", tx.tx_hash, detail));
        }
        if let Some(sale) = &processed.sale {
            if sale.has_untracked() {
                notes.push(format!(
                    "tx {}: sale of {} {} exceeds recorded history by {} (zero cost basis assumed)",
                    tx.tx_hash, sale.amount_requested, sale.asset_id, sale.untracked_amount
                ));
            }
        }
    }

    let total_taxable_income_eur = speculation.taxable_gain_eur + roi_income.total_eur;

    YearlyTaxReport {
        year,
        speculation,
        roi_income,
        total_taxable_income_eur,
        estimate,
        transactions: transactions.iter().map(|p| (*p).clone()).collect(),
        notes,
    }
}
