pub mod de;
pub mod estimate;
pub mod income;
pub mod speculation;

pub use de::TaxYear;
pub use estimate::{estimate, EstimateMethod, TaxEstimate};
pub use income::{RoiIncomeAggregator, RoiIncomeSummary};
pub use speculation::{ExemptionMode, SpeculationAggregator, SpeculationSummary};
