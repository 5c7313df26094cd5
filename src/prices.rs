//! Fiat price resolution.
//!
//! The core never fetches prices itself; a collaborator resolves them ahead
//! of time. `unknown` is an expected answer, not an error.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;

use crate::transaction::TransactionError;

/// Resolves an asset's EUR unit price at a point in time.
pub trait PriceResolver {
    fn resolve(&self, asset_id: &str, at: DateTime<Utc>) -> Option<Decimal>;
}

/// Resolver that knows nothing; every value falls back to the price carried
/// on the transfer itself, or to manual review.
#[derive(Debug, Default)]
pub struct NoPrices;

impl PriceResolver for NoPrices {
    fn resolve(&self, _asset_id: &str, _at: DateTime<Utc>) -> Option<Decimal> {
        None
    }
}

#[derive(Debug, Deserialize)]
struct PriceRecord {
    asset_id: String,
    timestamp: String,
    price_eur: Decimal,
}

/// Pre-resolved price table, e.g. exported by a market-data collaborator.
///
/// Lookup returns the latest price at or before the requested time.
#[derive(Debug, Default)]
pub struct StaticPrices {
    by_asset: HashMap<String, Vec<(DateTime<Utc>, Decimal)>>,
}

impl StaticPrices {
    pub fn read_csv<R: Read>(reader: R) -> Result<Self, TransactionError> {
        let mut rdr = csv::Reader::from_reader(reader);
        let mut by_asset: HashMap<String, Vec<(DateTime<Utc>, Decimal)>> = HashMap::new();
        for record in rdr.deserialize::<PriceRecord>() {
            let record = record?;
            let at = DateTime::parse_from_rfc3339(&record.timestamp)
                .map(|dt| dt.with_timezone(&Utc))
                .or_else(|_| {
                    chrono::NaiveDate::parse_from_str(&record.timestamp, "%Y-%m-%d")
                        .map(|d| d.and_hms_opt(0, 0, 0).expect("midnight is valid").and_utc())
                })
                .map_err(|_| TransactionError::InvalidTimestamp(record.timestamp.clone()))?;
            by_asset.entry(record.asset_id).or_default().push((at, record.price_eur));
        }
        for series in by_asset.values_mut() {
            series.sort_by_key(|(at, _)| *at);
        }
        Ok(StaticPrices { by_asset })
    }

    #[cfg(test)]
    pub fn insert(&mut self, asset_id: &str, at: DateTime<Utc>, price: Decimal) {
        let series = self.by_asset.entry(asset_id.to_string()).or_default();
        series.push((at, price));
        series.sort_by_key(|(at, _)| *at);
    }
}

impl PriceResolver for StaticPrices {
    fn resolve(&self, asset_id: &str, at: DateTime<Utc>) -> Option<Decimal> {
        let series = self.by_asset.get(asset_id)?;
        series
            .iter()
            .take_while(|(t, _)| *t <= at)
            .last()
            .map(|(_, price)| *price)
    }
}
