pub mod report;
pub mod transactions;

use std::fs::File;
use std::path::Path;

use crate::prices::{NoPrices, PriceResolver, StaticPrices};
use crate::sources::KnownSourceRegistry;
use crate::transaction::{self, RawTransaction};

/// Read raw transfers from CSV or JSON, picked by file extension.
pub fn read_transactions(path: &Path) -> anyhow::Result<Vec<RawTransaction>> {
    let file = File::open(path)?;
    let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let transactions = if is_json {
        transaction::read_json(file)?
    } else {
        transaction::read_csv(file)?
    };
    log::info!("read {} transfers from {}", transactions.len(), path.display());
    Ok(transactions)
}

pub fn read_registry(path: Option<&Path>) -> anyhow::Result<KnownSourceRegistry> {
    match path {
        Some(path) => {
            let registry = KnownSourceRegistry::read_json(File::open(path)?)?;
            log::info!(
                "loaded source registry {} ({} patterns)",
                registry.version,
                registry.patterns.len()
            );
            Ok(registry)
        }
        None => Ok(KnownSourceRegistry::default()),
    }
}

pub fn read_prices(path: Option<&Path>) -> anyhow::Result<Box<dyn PriceResolver>> {
    match path {
        Some(path) => Ok(Box::new(StaticPrices::read_csv(File::open(path)?)?)),
        None => Ok(Box::new(NoPrices)),
    }
}
