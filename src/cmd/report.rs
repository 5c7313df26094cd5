//! Report command - per-year tax summary and export.

use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use std::fs::File;
use std::path::PathBuf;

use crate::classify::{ClassifierConfig, TransactionClassifier};
use crate::cmd::{read_prices, read_registry, read_transactions};
use crate::context::{ComputationOptions, TaxContext};
use crate::report::YearlyTaxReport;
use crate::tax::de::TaxYear;
use crate::tax::estimate::EstimateMethod;
use crate::tax::speculation::ExemptionMode;

#[derive(Args, Debug)]
pub struct ReportCommand {
    /// CSV or JSON file containing raw transfers
    #[arg(short, long)]
    transactions: PathBuf,

    /// Wallet address the history belongs to
    #[arg(short, long)]
    owner: String,

    /// Tax year to report (defaults to every year in the history)
    #[arg(short, long)]
    year: Option<i32>,

    /// JSON registry of known ROI-source address patterns
    #[arg(short, long)]
    sources: Option<PathBuf>,

    /// CSV file with pre-resolved EUR prices
    #[arg(short, long)]
    prices: Option<PathBuf>,

    /// How the €600 Freigrenze is checked
    #[arg(short = 'm', long, value_enum, default_value_t = ExemptionModeArg::YearEnd)]
    exemption_mode: ExemptionModeArg,

    /// Personal marginal tax rate (e.g. 0.42); bracket approximation otherwise
    #[arg(short = 'r', long)]
    personal_rate: Option<Decimal>,

    /// Write the per-lot disposal breakdown to this CSV file
    #[arg(long)]
    disposals_csv: Option<PathBuf>,

    /// Output as JSON instead of formatted text
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum ExemptionModeArg {
    #[default]
    YearEnd,
    PerSale,
}

impl From<ExemptionModeArg> for ExemptionMode {
    fn from(arg: ExemptionModeArg) -> Self {
        match arg {
            ExemptionModeArg::YearEnd => ExemptionMode::YearEnd,
            ExemptionModeArg::PerSale => ExemptionMode::PerSale,
        }
    }
}

impl ReportCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let transactions = read_transactions(&self.transactions)?;
        let registry = read_registry(self.sources.as_deref())?;
        let prices = read_prices(self.prices.as_deref())?;

        let classifier =
            TransactionClassifier::new(self.owner.clone(), ClassifierConfig::default(), registry);
        let classified = classifier.classify_all(&transactions, prices.as_ref());

        let options = ComputationOptions {
            exemption_mode: self.exemption_mode.into(),
            personal_rate: self.personal_rate,
        };
        let mut ctx = TaxContext::new(options);
        ctx.process_all(classified)?;

        let reports: Vec<YearlyTaxReport> = ctx
            .reports()
            .into_iter()
            .filter(|r| self.year.is_none_or(|y| r.year == TaxYear(y)))
            .collect();

        if reports.is_empty() {
            anyhow::bail!("no transactions found for the requested year");
        }

        if let Some(ref path) = self.disposals_csv {
            let file = File::create(path)?;
            for report in &reports {
                report.write_disposals_csv(&file)?;
            }
            log::info!("wrote disposal breakdown to {}", path.display());
        }

        if self.json {
            for report in &reports {
                println!("{}", report.to_json()?);
            }
        } else {
            for report in &reports {
                print_report(report);
            }
        }
        Ok(())
    }
}

fn print_report(report: &YearlyTaxReport) {
    println!();
    println!("TAX REPORT {}", report.year);
    println!();

    let spec = &report.speculation;
    println!("PRIVATE SALES (§23 EStG)");
    println!("  Sales: {}", spec.sale_count);
    println!(
        "  Speculative net: {} | Long-term (exempt): {}",
        format_eur_signed(spec.speculative_net_eur),
        format_eur_signed(spec.long_term_gain_eur)
    );
    if spec.exemption_applied {
        println!(
            "  Freigrenze applied ({} used), nothing taxable",
            format_eur(spec.exemption_used_eur)
        );
    } else {
        println!("  Freigrenze exceeded, full amount taxable");
    }
    println!("  Taxable gain: {}", format_eur(spec.taxable_gain_eur));
    println!();

    let roi = &report.roi_income;
    println!("OTHER INCOME (§22 EStG)");
    println!("  Events: {}", roi.event_count);
    for (category, total) in &roi.by_category {
        println!("  {}: {}", category, format_eur(*total));
    }
    println!("  Total: {}", format_eur(roi.total_eur));
    println!();

    let est = &report.estimate;
    let method = match est.method {
        EstimateMethod::PersonalRate => "personal rate",
        EstimateMethod::BracketApproximation => "bracket approximation",
    };
    println!("ESTIMATE ({})", method);
    println!(
        "  Taxable income: {} @ {:.0}%",
        format_eur(est.taxable_income_eur),
        est.rate * Decimal::ONE_HUNDRED
    );
    println!(
        "  Income tax: {} | Solidarity surcharge: {}",
        format_eur(est.income_tax_eur),
        format_eur(est.solidarity_surcharge_eur)
    );
    println!("  TOTAL ESTIMATED TAX: {}", format_eur(est.total_eur));

    if !report.notes.is_empty() {
        println!();
        println!("NOTES");
        for note in &report.notes {
            println!("  - {}", note);
        }
    }
    println!();
}

fn format_eur(amount: Decimal) -> String {
    format!("€{:.2}", amount)
}

fn format_eur_signed(amount: Decimal) -> String {
    if amount < Decimal::ZERO {
        format!("-€{:.2}", amount.abs())
    } else {
        format!("€{:.2}", amount)
    }
}
