//! Transaction classification: raw transfer legs to tax categories.
//!
//! Classification is a pure function of the transfer, the owner address,
//! the sibling legs sharing its transaction hash, the known-source
//! registry and the price resolver. It never fails for well-formed input;
//! anything uncertain is flagged for manual review instead.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::prices::PriceResolver;
use crate::sources::{is_contract_shaped, KnownSourceRegistry, RoiCategory};
use crate::transaction::RawTransaction;

/// Tax category of a classified transfer leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TxCategory {
    Purchase,
    Sale,
    Swap,
    RoiIncome,
    Transfer,
    Wrap,
    Unwrap,
}

impl TxCategory {
    pub fn display(&self) -> &'static str {
        match self {
            TxCategory::Purchase => "Purchase",
            TxCategory::Sale => "Sale",
            TxCategory::Swap => "Swap",
            TxCategory::RoiIncome => "ROI Income",
            TxCategory::Transfer => "Transfer",
            TxCategory::Wrap => "Wrap",
            TxCategory::Unwrap => "Unwrap",
        }
    }
}

impl std::fmt::Display for TxCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// What the leg does to the wallet's tax position. A swap leg can be an
/// acquisition, a disposal or neutral depending on its role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaxEffect {
    Acquisition,
    Disposal,
    Income,
    Neutral,
}

/// A raw transfer with its resolved category, effect and fiat value.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedTransaction {
    pub tx: RawTransaction,
    pub category: TxCategory,
    pub effect: TaxEffect,
    pub unit_price_eur: Decimal,
    pub value_eur: Decimal,
    pub roi_category: Option<RoiCategory>,
    /// Confidence of an ROI match, from the registry pattern or the
    /// heuristic. Absent for non-ROI legs.
    pub confidence: Option<Decimal>,
    pub needs_manual_review: bool,
    pub note: Option<String>,
}

impl ClassifiedTransaction {
    pub fn amount(&self) -> Decimal {
        self.tx.units()
    }
}

/// Static classifier settings.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Symbols treated as fiat-pegged, uppercase.
    pub stable_symbols: HashSet<String>,
    /// (native, wrapped) symbol pairs, uppercase.
    pub wrap_pairs: Vec<(String, String)>,
    /// Plausible fiat magnitude band for heuristic reward detection.
    pub reward_band_eur: (Decimal, Decimal),
    /// Confidence attached to heuristic ROI matches.
    pub heuristic_confidence: Decimal,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            stable_symbols: ["EURC", "EURS", "EURT", "USDC", "USDT", "DAI", "TUSD"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            wrap_pairs: vec![
                ("ETH".to_string(), "WETH".to_string()),
                ("BTC".to_string(), "WBTC".to_string()),
                ("MATIC".to_string(), "WMATIC".to_string()),
            ],
            reward_band_eur: (dec!(0.01), dec!(1000)),
            heuristic_confidence: dec!(0.5),
        }
    }
}

/// Amounts within one part per billion count as equal (wrap detection).
const AMOUNT_TOLERANCE: Decimal = dec!(0.000000001);

pub struct TransactionClassifier {
    owner: String,
    config: ClassifierConfig,
    registry: KnownSourceRegistry,
}

impl TransactionClassifier {
    pub fn new(
        owner: impl Into<String>,
        config: ClassifierConfig,
        registry: KnownSourceRegistry,
    ) -> Self {
        TransactionClassifier { owner: owner.into(), config, registry }
    }

    /// Classify every transfer leg, resolving swap pairs across legs that
    /// share a transaction hash.
    pub fn classify_all(
        &self,
        transactions: &[RawTransaction],
        prices: &dyn PriceResolver,
    ) -> Vec<ClassifiedTransaction> {
        let mut by_hash: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, tx) in transactions.iter().enumerate() {
            by_hash.entry(tx.tx_hash.as_str()).or_default().push(i);
        }

        transactions
            .iter()
            .enumerate()
            .map(|(i, tx)| {
                let sibling = self.opposite_sibling(transactions, &by_hash, i);
                self.classify(tx, sibling, prices)
            })
            .collect()
    }

    /// First sibling leg on the same hash moving in the opposite direction
    /// relative to the owner.
    fn opposite_sibling<'t>(
        &self,
        transactions: &'t [RawTransaction],
        by_hash: &HashMap<&str, Vec<usize>>,
        index: usize,
    ) -> Option<&'t RawTransaction> {
        let tx = &transactions[index];
        let incoming = tx.is_to(&self.owner);
        by_hash
            .get(tx.tx_hash.as_str())?
            .iter()
            .filter(|&&j| j != index)
            .map(|&j| &transactions[j])
            .find(|s| {
                if incoming {
                    s.is_from(&self.owner) && !s.is_to(&self.owner)
                } else {
                    s.is_to(&self.owner) && !s.is_from(&self.owner)
                }
            })
    }

    fn classify(
        &self,
        tx: &RawTransaction,
        sibling: Option<&RawTransaction>,
        prices: &dyn PriceResolver,
    ) -> ClassifiedTransaction {
        let incoming = tx.is_to(&self.owner);
        let outgoing = tx.is_from(&self.owner);
        let units = tx.units();
        let (unit_price, price_resolved) = self.resolve_price(tx, prices);

        let mut classified = ClassifiedTransaction {
            tx: tx.clone(),
            category: TxCategory::Transfer,
            effect: TaxEffect::Neutral,
            unit_price_eur: unit_price,
            value_eur: (units * unit_price).round_dp(2),
            roi_category: None,
            confidence: None,
            needs_manual_review: !price_resolved,
            note: if price_resolved { None } else { Some("price unresolved".to_string()) },
        };

        if units.is_zero() {
            classified.note = Some("zero amount".to_string());
            classified.needs_manual_review = false;
            return classified;
        }
        if incoming == outgoing {
            // Self-transfer, or a leg that doesn't touch the wallet at all.
            return classified;
        }

        if let Some(pair) = sibling {
            self.classify_paired(&mut classified, tx, pair, incoming, prices);
            return classified;
        }

        if incoming {
            self.classify_unpaired_incoming(&mut classified, tx);
        } else {
            classified.category = TxCategory::Sale;
            classified.effect = TaxEffect::Disposal;
        }
        classified
    }

    /// Both legs of the hash touch the owner: wrap/unwrap first (a wrap is
    /// structurally also a swap), then swap resolution.
    fn classify_paired(
        &self,
        classified: &mut ClassifiedTransaction,
        tx: &RawTransaction,
        sibling: &RawTransaction,
        incoming: bool,
        prices: &dyn PriceResolver,
    ) {
        let (out_leg, in_leg) = if incoming { (sibling, tx) } else { (tx, sibling) };

        if let Some(wrapping) = self.wrap_direction(out_leg, in_leg) {
            classified.category =
                if wrapping { TxCategory::Wrap } else { TxCategory::Unwrap };
            classified.effect = TaxEffect::Neutral;
            // A non-event: unresolved prices don't matter here.
            classified.needs_manual_review = false;
            classified.note = None;
            return;
        }

        classified.category = TxCategory::Swap;
        if incoming {
            classified.effect = TaxEffect::Acquisition;
            if self.is_stable(out_leg) {
                // Cost basis comes from the fiat leg given away.
                let (out_price, out_resolved) = self.resolve_price(out_leg, prices);
                let out_value = (out_leg.units() * out_price).round_dp(2);
                let units = tx.units();
                classified.unit_price_eur =
                    if units.is_zero() { Decimal::ZERO } else { (out_value / units).round_dp(8) };
                classified.value_eur = out_value;
                classified.needs_manual_review = !out_resolved;
                classified.note =
                    (!out_resolved).then(|| "price unresolved on stable leg".to_string());
            }
        } else if self.is_stable(tx) {
            // Spending a fiat-pegged asset in a swap is not a taxable event.
            classified.effect = TaxEffect::Neutral;
        } else {
            classified.effect = TaxEffect::Disposal;
        }
    }

    fn classify_unpaired_incoming(&self, classified: &mut ClassifiedTransaction, tx: &RawTransaction) {
        if let Some(pattern) = self.registry.match_sender(&tx.from) {
            log::debug!(
                "ROI source match for {}: {} (confidence {})",
                tx.tx_hash,
                pattern.label,
                pattern.confidence
            );
            classified.category = TxCategory::RoiIncome;
            classified.effect = TaxEffect::Income;
            classified.roi_category = Some(pattern.category);
            classified.confidence = Some(pattern.confidence);
            return;
        }

        let (low, high) = self.config.reward_band_eur;
        let plausible_reward = classified.value_eur >= low
            && classified.value_eur <= high
            && is_contract_shaped(&tx.from);
        if plausible_reward {
            // Uncertain by construction; always surfaced for review.
            classified.category = TxCategory::RoiIncome;
            classified.effect = TaxEffect::Income;
            classified.roi_category = Some(RoiCategory::Other);
            classified.confidence = Some(self.config.heuristic_confidence);
            classified.needs_manual_review = true;
            classified.note = Some("heuristic reward match".to_string());
            return;
        }

        classified.category = TxCategory::Purchase;
        classified.effect = TaxEffect::Acquisition;
    }

    fn is_stable(&self, tx: &RawTransaction) -> bool {
        self.config.stable_symbols.contains(&tx.symbol.to_ascii_uppercase())
    }

    /// `Some(true)` if out->in is a 1:1 wrap, `Some(false)` for an unwrap.
    fn wrap_direction(&self, out_leg: &RawTransaction, in_leg: &RawTransaction) -> Option<bool> {
        let amounts_match = {
            let (a, b) = (out_leg.units(), in_leg.units());
            (a - b).abs() <= a.max(b) * AMOUNT_TOLERANCE
        };
        if !amounts_match {
            return None;
        }
        let out_symbol = out_leg.symbol.to_ascii_uppercase();
        let in_symbol = in_leg.symbol.to_ascii_uppercase();
        for (native, wrapped) in &self.config.wrap_pairs {
            if out_symbol == *native && in_symbol == *wrapped {
                return Some(true);
            }
            if out_symbol == *wrapped && in_symbol == *native {
                return Some(false);
            }
        }
        None
    }

    fn resolve_price(&self, tx: &RawTransaction, prices: &dyn PriceResolver) -> (Decimal, bool) {
        if let Some(price) = tx.unit_price_eur {
            return (price, true);
        }
        match prices.resolve(&tx.asset_id, tx.timestamp) {
            Some(price) => (price, true),
            None => (Decimal::ZERO, false),
        }
    }
}
