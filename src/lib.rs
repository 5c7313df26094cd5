//! German crypto tax calculation: transfer classification, FIFO cost
//! basis, the §23 EStG speculation period and Freigrenze, and §22 EStG
//! miscellaneous income.
//!
//! The library is a deterministic, offline batch core: transaction
//! history and prices are resolved by collaborators before data enters,
//! and every run over the same input produces a byte-identical report.

pub mod classify;
pub mod cmd;
pub mod context;
pub mod fifo;
pub mod prices;
pub mod report;
pub mod sources;
pub mod tax;
pub mod transaction;

pub use classify::{ClassifiedTransaction, ClassifierConfig, TaxEffect, TransactionClassifier, TxCategory};
pub use context::{ComputationOptions, PipelineError, TaxContext};
pub use fifo::{FifoLedger, LedgerError, PurchaseLot, SaleConsumption};
pub use prices::{NoPrices, PriceResolver, StaticPrices};
pub use report::YearlyTaxReport;
pub use sources::{KnownSourceRegistry, RoiCategory};
pub use tax::{ExemptionMode, TaxYear};
pub use transaction::{RawTransaction, TransactionError};
