//! Raw on-chain transfer records and their CSV/JSON input formats.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::io::Read;
use thiserror::Error;

/// Errors raised for malformed input records.
///
/// Data *incompleteness* (unknown prices, missing purchase history) is never
/// an error; only impossible inputs are.
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("invalid amount {amount} in tx {tx_hash}: must not be negative")]
    InvalidAmount { tx_hash: String, amount: Decimal },
    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// A single transfer leg as delivered by the blockchain-data collaborator.
///
/// Amounts are carried in the asset's smallest unit together with the
/// decimals needed to scale them; prices may already be resolved upstream.
#[derive(Debug, Clone, Serialize)]
pub struct RawTransaction {
    pub chain_id: u64,
    pub tx_hash: String,
    pub from: String,
    pub to: String,
    pub timestamp: DateTime<Utc>,
    pub asset_id: String,
    pub symbol: String,
    pub decimals: u32,
    pub raw_amount: Decimal,
    /// Fiat unit price resolved upstream, if any.
    pub unit_price_eur: Option<Decimal>,
}

impl RawTransaction {
    /// Amount in whole asset units.
    pub fn units(&self) -> Decimal {
        // Decimal::new(1, s) == 10^-s; scale is capped at Decimal's max.
        self.raw_amount * Decimal::new(1, self.decimals.min(28))
    }

    pub fn is_from(&self, address: &str) -> bool {
        self.from.eq_ignore_ascii_case(address)
    }

    pub fn is_to(&self, address: &str) -> bool {
        self.to.eq_ignore_ascii_case(address)
    }
}

/// Unified JSON input format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferInput {
    #[serde(default)]
    pub wallet: Option<String>,
    pub transfers: Vec<RawTransactionRecord>,
}

/// CSV/JSON record format for raw transfers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTransactionRecord {
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    pub tx_hash: String,
    pub from: String,
    pub to: String,
    pub timestamp: String,
    pub asset_id: String,
    pub symbol: String,
    pub decimals: u32,
    pub raw_amount: Decimal,
    #[serde(default)]
    pub unit_price_eur: Option<Decimal>,
}

fn default_chain_id() -> u64 {
    1
}

/// Parse a timestamp that may be RFC 3339, a naive datetime or date-only.
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, TransactionError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date.and_hms_opt(0, 0, 0).expect("midnight is valid").and_utc());
    }
    Err(TransactionError::InvalidTimestamp(s.to_string()))
}

impl TryFrom<RawTransactionRecord> for RawTransaction {
    type Error = TransactionError;

    fn try_from(record: RawTransactionRecord) -> Result<Self, Self::Error> {
        let timestamp = parse_timestamp(&record.timestamp)?;
        if record.raw_amount.is_sign_negative() {
            return Err(TransactionError::InvalidAmount {
                tx_hash: record.tx_hash,
                amount: record.raw_amount,
            });
        }
        Ok(RawTransaction {
            chain_id: record.chain_id,
            tx_hash: record.tx_hash,
            from: record.from,
            to: record.to,
            timestamp,
            asset_id: record.asset_id,
            symbol: record.symbol,
            decimals: record.decimals,
            raw_amount: record.raw_amount,
            unit_price_eur: record.unit_price_eur,
        })
    }
}

/// Read raw transfers from CSV, sorted chronologically.
pub fn read_csv<R: Read>(reader: R) -> Result<Vec<RawTransaction>, TransactionError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let records: Result<Vec<RawTransactionRecord>, _> =
        rdr.deserialize::<RawTransactionRecord>().collect();
    let mut transactions: Vec<RawTransaction> = records?
        .into_iter()
        .map(TryInto::try_into)
        .collect::<Result<_, _>>()?;
    sort_chronologically(&mut transactions);
    Ok(transactions)
}

/// Read raw transfers from JSON, sorted chronologically.
pub fn read_json<R: Read>(reader: R) -> Result<Vec<RawTransaction>, TransactionError> {
    let input: TransferInput = serde_json::from_reader(reader)?;
    let mut transactions: Vec<RawTransaction> = input
        .transfers
        .into_iter()
        .map(TryInto::try_into)
        .collect::<Result<_, _>>()?;
    sort_chronologically(&mut transactions);
    Ok(transactions)
}

/// The FIFO ledger requires time-ordered input per asset; the sort is
/// stable, so sibling legs of one transaction stay adjacent.
fn sort_chronologically(transactions: &mut [RawTransaction]) {
    transactions.sort_by_key(|t| t.timestamp);
}
