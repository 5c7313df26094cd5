//! Registry of known ROI-source addresses (staking distributors, mining
//! pools, airdrop contracts).
//!
//! The registry is versioned configuration data, loaded from JSON rather
//! than inferred at runtime, so the matching behaviour stays auditable.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Sub-category of miscellaneous income (sonstige Einkünfte, §22 EStG).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RoiCategory {
    Staking,
    Mining,
    Airdrop,
    Other,
}

impl RoiCategory {
    pub fn display(&self) -> &'static str {
        match self {
            RoiCategory::Staking => "Staking",
            RoiCategory::Mining => "Mining",
            RoiCategory::Airdrop => "Airdrop",
            RoiCategory::Other => "Other",
        }
    }
}

impl std::fmt::Display for RoiCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// How a sender address is matched against a pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AddressPattern {
    /// Full address, case-insensitive.
    Exact { address: String },
    /// Leading address bytes, case-insensitive.
    Prefix { prefix: String },
    /// Structural match: a hex address containing a zero run of at least
    /// `min_zero_run` characters, typical of system and deployer-vanity
    /// contracts.
    Shape { min_zero_run: usize },
}

impl AddressPattern {
    pub fn matches(&self, address: &str) -> bool {
        match self {
            AddressPattern::Exact { address: known } => known.eq_ignore_ascii_case(address),
            AddressPattern::Prefix { prefix } => {
                address.to_ascii_lowercase().starts_with(&prefix.to_ascii_lowercase())
            }
            AddressPattern::Shape { min_zero_run } => {
                is_hex_address(address) && longest_zero_run(address) >= *min_zero_run
            }
        }
    }
}

/// One ranked predicate of the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcePattern {
    /// Human-readable origin of the pattern, e.g. "Lido stETH distributor".
    pub label: String,
    pub pattern: AddressPattern,
    pub category: RoiCategory,
    /// How certain a match of this pattern is, in [0, 1].
    pub confidence: Decimal,
}

/// Versioned list of known ROI-source patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownSourceRegistry {
    pub version: String,
    /// Matches below this confidence are ignored.
    #[serde(default = "default_acceptance_threshold")]
    pub acceptance_threshold: Decimal,
    pub patterns: Vec<SourcePattern>,
}

fn default_acceptance_threshold() -> Decimal {
    dec!(0.8)
}

impl Default for KnownSourceRegistry {
    fn default() -> Self {
        KnownSourceRegistry {
            version: "empty".to_string(),
            acceptance_threshold: default_acceptance_threshold(),
            patterns: Vec::new(),
        }
    }
}

impl KnownSourceRegistry {
    pub fn read_json<R: Read>(reader: R) -> Result<Self, serde_json::Error> {
        serde_json::from_reader(reader)
    }

    /// Best accepted match for a sender address: the highest-confidence
    /// pattern at or above the acceptance threshold.
    pub fn match_sender(&self, address: &str) -> Option<&SourcePattern> {
        self.patterns
            .iter()
            .filter(|p| p.confidence >= self.acceptance_threshold && p.pattern.matches(address))
            .max_by_key(|p| p.confidence)
    }
}

/// `0x` followed by 40 hex characters.
pub fn is_hex_address(address: &str) -> bool {
    let Some(hex) = address.strip_prefix("0x") else {
        return false;
    };
    hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit())
}

fn longest_zero_run(address: &str) -> usize {
    let hex = address.strip_prefix("0x").unwrap_or(address);
    let mut longest = 0;
    let mut current = 0;
    for c in hex.chars() {
        if c == '0' {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Offline approximation of "this sender is a contract": shaped like a hex
/// address with a noticeable zero run. Callers must treat any decision
/// built on this as needing manual review.
pub fn is_contract_shaped(address: &str) -> bool {
    is_hex_address(address) && longest_zero_run(address) >= 6
}
