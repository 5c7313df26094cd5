//! Transactions command - classified transfer view with filtering.

use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use std::io;
use std::path::PathBuf;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

use crate::classify::{ClassifiedTransaction, ClassifierConfig, TransactionClassifier, TxCategory};
use crate::cmd::{read_prices, read_registry, read_transactions};

#[derive(Args, Debug)]
pub struct TransactionsCommand {
    /// CSV or JSON file containing raw transfers
    #[arg(short, long)]
    transactions: PathBuf,

    /// Wallet address the history belongs to
    #[arg(short, long)]
    owner: String,

    /// JSON registry of known ROI-source address patterns
    #[arg(short, long)]
    sources: Option<PathBuf>,

    /// CSV file with pre-resolved EUR prices
    #[arg(short, long)]
    prices: Option<PathBuf>,

    /// Filter by category
    #[arg(short = 'c', long, value_enum)]
    category: Option<CategoryFilter>,

    /// Only show transfers flagged for manual review
    #[arg(long)]
    review_only: bool,

    /// Output as CSV instead of formatted table
    #[arg(long)]
    csv: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CategoryFilter {
    Purchase,
    Sale,
    Swap,
    Roi,
    Transfer,
    Wrap,
    Unwrap,
}

impl CategoryFilter {
    fn matches(&self, category: TxCategory) -> bool {
        matches!(
            (self, category),
            (CategoryFilter::Purchase, TxCategory::Purchase)
                | (CategoryFilter::Sale, TxCategory::Sale)
                | (CategoryFilter::Swap, TxCategory::Swap)
                | (CategoryFilter::Roi, TxCategory::RoiIncome)
                | (CategoryFilter::Transfer, TxCategory::Transfer)
                | (CategoryFilter::Wrap, TxCategory::Wrap)
                | (CategoryFilter::Unwrap, TxCategory::Unwrap)
        )
    }
}

impl TransactionsCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let transactions = read_transactions(&self.transactions)?;
        let registry = read_registry(self.sources.as_deref())?;
        let prices = read_prices(self.prices.as_deref())?;

        let classifier =
            TransactionClassifier::new(self.owner.clone(), ClassifierConfig::default(), registry);
        let classified = classifier.classify_all(&transactions, prices.as_ref());

        let rows: Vec<TransactionRow> = classified
            .iter()
            .filter(|c| self.category.is_none_or(|f| f.matches(c.category)))
            .filter(|c| !self.review_only || c.needs_manual_review)
            .map(TransactionRow::from)
            .collect();

        if self.csv {
            self.write_csv(&rows)
        } else {
            self.print_table(&rows);
            Ok(())
        }
    }

    fn print_table(&self, rows: &[TransactionRow]) {
        if rows.is_empty() {
            println!("No transfers found matching filters");
            return;
        }

        let table = Table::new(rows)
            .with(Style::rounded())
            .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
            .to_string();
        println!("{}", table);
    }

    fn write_csv(&self, rows: &[TransactionRow]) -> anyhow::Result<()> {
        let mut wtr = csv::Writer::from_writer(io::stdout());
        for row in rows {
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Row for the transactions table output
#[derive(Debug, Clone, Tabled, serde::Serialize)]
struct TransactionRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Tx")]
    tx_hash: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Asset")]
    asset: String,
    #[tabled(rename = "Amount")]
    amount: String,
    #[tabled(rename = "Value EUR")]
    value_eur: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Review")]
    review: String,
    #[tabled(rename = "Note")]
    note: String,
}

impl From<&ClassifiedTransaction> for TransactionRow {
    fn from(classified: &ClassifiedTransaction) -> Self {
        TransactionRow {
            date: classified.tx.timestamp.format("%Y-%m-%d").to_string(),
            tx_hash: shorten(&classified.tx.tx_hash),
            category: classified.category.display().to_string(),
            asset: classified.tx.symbol.clone(),
            amount: classified.amount().normalize().to_string(),
            value_eur: classified.value_eur.round_dp(2).to_string(),
            confidence: classified
                .confidence
                .map(|c: Decimal| c.to_string())
                .unwrap_or_else(|| "-".to_string()),
            review: if classified.needs_manual_review { "yes" } else { "" }.to_string(),
            note: classified.note.clone().unwrap_or_default(),
        }
    }
}

fn shorten(hash: &str) -> String {
    if hash.len() > 12 {
        format!("{}…{}", &hash[..6], &hash[hash.len() - 4..])
    } else {
        hash.to_string()
    }
}
