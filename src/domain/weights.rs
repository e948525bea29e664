//! Rebalancing weights: sizing signal, domestic-listing bonus and per-asset
//! caps with proportional redistribution of the excess.

use crate::domain::asset::{AssetRow, OverrideTable};
use crate::domain::asset_filter::Universe;
use crate::ports::listing_port::ListingPort;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_LISTING_BONUS: f64 = 1.3;
pub const DEFAULT_MAX_ITERATIONS: usize = 16;
pub const CAP_TOLERANCE: f64 = 1e-12;

pub fn default_caps() -> HashMap<String, f64> {
    HashMap::from([("BTC".to_string(), 0.30), ("ETH".to_string(), 0.20)])
}

/// How a universe is turned into weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeightScheme {
    /// Sizing signal, listing bonus, caps.
    #[default]
    Rules,
    /// Row `weight_ratio` values taken as-is after exclusions.
    Supplied,
}

impl FromStr for WeightScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rules" => Ok(WeightScheme::Rules),
            "supplied" | "csv" => Ok(WeightScheme::Supplied),
            other => Err(format!("unknown weights source '{}'", other)),
        }
    }
}

impl fmt::Display for WeightScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightScheme::Rules => write!(f, "rules"),
            WeightScheme::Supplied => write!(f, "supplied"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightConfig {
    pub scheme: WeightScheme,
    pub listing_bonus: f64,
    pub caps: HashMap<String, f64>,
    pub max_iterations: usize,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            scheme: WeightScheme::Rules,
            listing_bonus: DEFAULT_LISTING_BONUS,
            caps: default_caps(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// Which signal the base weights came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingSource {
    MarketCap,
    WeightRatio,
    Equal,
}

/// Symbol → weight for one anchor date. Weights are positive and sum to 1
/// unless the vector is empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightVector {
    weights: BTreeMap<String, f64>,
}

impl WeightVector {
    /// Keeps positive finite weights only. Does not renormalize.
    pub fn from_weights<I, S>(weights: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let weights = weights
            .into_iter()
            .map(|(s, w)| (s.into(), w))
            .filter(|(_, w)| w.is_finite() && *w > 0.0)
            .collect();
        Self { weights }
    }

    pub fn get(&self, symbol: &str) -> f64 {
        self.weights.get(symbol).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(s, w)| (s.as_str(), *w))
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Heaviest first, ties broken by symbol.
    pub fn ranked(&self) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> =
            self.weights.iter().map(|(s, w)| (s.clone(), *w)).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CapResult {
    pub weights: BTreeMap<String, f64>,
    pub converged: bool,
    pub iterations: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightBuild {
    pub vector: WeightVector,
    pub source: SizingSource,
    pub converged: bool,
}

fn positive(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite() && *v > 0.0).unwrap_or(0.0)
}

fn normalize(weights: &mut BTreeMap<String, f64>) {
    let total: f64 = weights.values().sum();
    if total > 0.0 {
        for w in weights.values_mut() {
            *w /= total;
        }
    }
}

fn over_cap(weights: &BTreeMap<String, f64>, caps: &HashMap<String, f64>) -> Vec<(String, f64)> {
    weights
        .iter()
        .filter_map(|(s, &w)| match caps.get(s) {
            Some(&cap) if w > cap + CAP_TOLERANCE => Some((s.clone(), cap)),
            _ => None,
        })
        .collect()
}

/// Clamps capped symbols and hands the excess to symbols that still have
/// headroom, in proportion to their current weight, until nothing exceeds
/// its cap or `max_iterations` passes have run.
///
/// Infeasible cap sets (every symbol capped, caps summing below 1) stop
/// early with `converged = false`; the result is still normalized to 1.
pub fn apply_caps(
    weights: &BTreeMap<String, f64>,
    caps: &HashMap<String, f64>,
    max_iterations: usize,
) -> CapResult {
    let mut w = weights.clone();
    normalize(&mut w);

    for iteration in 0..max_iterations {
        let over = over_cap(&w, caps);
        if over.is_empty() {
            return CapResult {
                weights: w,
                converged: true,
                iterations: iteration,
            };
        }

        let mut excess = 0.0;
        for (symbol, cap) in &over {
            if let Some(weight) = w.get_mut(symbol) {
                excess += *weight - cap;
                *weight = *cap;
            }
        }

        let pool: Vec<String> = w
            .iter()
            .filter(|(s, w)| match caps.get(*s) {
                Some(&cap) => **w < cap - CAP_TOLERANCE,
                None => true,
            })
            .map(|(s, _)| s.clone())
            .collect();
        let pool_total: f64 = pool.iter().filter_map(|s| w.get(s)).sum();
        if pool_total <= 0.0 {
            break;
        }

        for symbol in &pool {
            if let Some(weight) = w.get_mut(symbol) {
                *weight += *weight / pool_total * excess;
            }
        }
        normalize(&mut w);
    }

    normalize(&mut w);
    let converged = over_cap(&w, caps).is_empty();
    CapResult {
        weights: w,
        converged,
        iterations: max_iterations,
    }
}

pub struct WeightBuilder<'a> {
    config: &'a WeightConfig,
    overrides: &'a OverrideTable,
    listing: &'a dyn ListingPort,
}

impl<'a> WeightBuilder<'a> {
    pub fn new(
        config: &'a WeightConfig,
        overrides: &'a OverrideTable,
        listing: &'a dyn ListingPort,
    ) -> Self {
        Self {
            config,
            overrides,
            listing,
        }
    }

    /// Caps from configuration, with per-symbol overrides taking precedence.
    pub fn effective_caps(&self) -> HashMap<String, f64> {
        let mut caps = self.config.caps.clone();
        for (symbol, cap) in self.overrides.cap_overrides() {
            caps.insert(symbol.to_string(), cap);
        }
        caps
    }

    pub fn build(&self, universe: &Universe) -> WeightBuild {
        if universe.is_empty() {
            return WeightBuild {
                vector: WeightVector::default(),
                source: SizingSource::Equal,
                converged: true,
            };
        }

        match self.config.scheme {
            WeightScheme::Rules => self.build_rules(universe),
            WeightScheme::Supplied => self.build_supplied(universe),
        }
    }

    fn base_weights(universe: &Universe) -> (BTreeMap<String, f64>, SizingSource) {
        let cap_total: f64 = universe.assets.iter().map(|a| positive(a.market_cap)).sum();
        let ratio_total: f64 = universe
            .assets
            .iter()
            .map(|a| positive(a.weight_ratio))
            .sum();

        let source = if cap_total > 0.0 {
            SizingSource::MarketCap
        } else if ratio_total > 0.0 {
            SizingSource::WeightRatio
        } else {
            SizingSource::Equal
        };
        let signal = |a: &AssetRow| match source {
            SizingSource::MarketCap => positive(a.market_cap),
            SizingSource::WeightRatio => positive(a.weight_ratio),
            SizingSource::Equal => 1.0,
        };

        let mut weights: BTreeMap<String, f64> = universe
            .assets
            .iter()
            .map(|a| (a.symbol.clone(), signal(a)))
            .collect();
        normalize(&mut weights);
        (weights, source)
    }

    fn build_rules(&self, universe: &Universe) -> WeightBuild {
        let (mut weights, source) = Self::base_weights(universe);

        for asset in &universe.assets {
            let listed = asset.listed_domestic
                || self.overrides.listed_domestic(&asset.symbol)
                || self.listing.is_domestically_listed(&asset.symbol);
            if listed {
                if let Some(w) = weights.get_mut(&asset.symbol) {
                    *w *= self.config.listing_bonus;
                }
            }
        }
        normalize(&mut weights);

        let capped = apply_caps(&weights, &self.effective_caps(), self.config.max_iterations);
        if !capped.converged {
            tracing::warn!(
                date = %universe.date,
                iterations = capped.iterations,
                "weight caps did not converge, using best approximation"
            );
        }

        WeightBuild {
            vector: WeightVector::from_weights(capped.weights),
            source,
            converged: capped.converged,
        }
    }

    fn build_supplied(&self, universe: &Universe) -> WeightBuild {
        let mut ratios: BTreeMap<String, f64> = universe
            .assets
            .iter()
            .map(|a| (a.symbol.clone(), positive(a.weight_ratio)))
            .collect();
        normalize(&mut ratios);

        let (weights, source) = if ratios.values().sum::<f64>() > 0.0 {
            (ratios, SizingSource::WeightRatio)
        } else {
            Self::base_weights(universe)
        };

        WeightBuild {
            vector: WeightVector::from_weights(weights),
            source,
            converged: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::asset::SymbolOverride;
    use crate::ports::listing_port::NoListings;
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;

    fn universe(rows: Vec<AssetRow>) -> Universe {
        Universe {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            assets: rows,
        }
    }

    fn cap_row(symbol: &str, market_cap: f64) -> AssetRow {
        AssetRow {
            market_cap: Some(market_cap),
            ..AssetRow::new(symbol)
        }
    }

    fn no_caps() -> WeightConfig {
        WeightConfig {
            caps: HashMap::new(),
            ..WeightConfig::default()
        }
    }

    struct Listed(&'static [&'static str]);

    impl ListingPort for Listed {
        fn is_domestically_listed(&self, symbol: &str) -> bool {
            self.0.contains(&symbol)
        }
    }

    #[test]
    fn market_cap_weights_without_caps() {
        let config = no_caps();
        let overrides = OverrideTable::default();
        let builder = WeightBuilder::new(&config, &overrides, &NoListings);
        let build = builder.build(&universe(vec![cap_row("A", 300.0), cap_row("B", 700.0)]));

        assert_eq!(build.source, SizingSource::MarketCap);
        assert!(build.converged);
        assert_abs_diff_eq!(build.vector.get("A"), 0.30, epsilon = 1e-12);
        assert_abs_diff_eq!(build.vector.get("B"), 0.70, epsilon = 1e-12);
    }

    #[test]
    fn falls_back_to_weight_ratio_then_equal() {
        let config = no_caps();
        let overrides = OverrideTable::default();
        let builder = WeightBuilder::new(&config, &overrides, &NoListings);

        let by_ratio = builder.build(&universe(vec![
            AssetRow {
                weight_ratio: Some(1.0),
                ..AssetRow::new("A")
            },
            AssetRow {
                weight_ratio: Some(3.0),
                ..AssetRow::new("B")
            },
        ]));
        assert_eq!(by_ratio.source, SizingSource::WeightRatio);
        assert_abs_diff_eq!(by_ratio.vector.get("B"), 0.75, epsilon = 1e-12);

        let equal = builder.build(&universe(vec![
            AssetRow::new("A"),
            AssetRow::new("B"),
            AssetRow::new("C"),
            AssetRow::new("D"),
        ]));
        assert_eq!(equal.source, SizingSource::Equal);
        assert_eq!(equal.vector.len(), 4);
        assert_abs_diff_eq!(equal.vector.get("C"), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn assets_without_market_cap_are_dropped_when_others_have_one() {
        let config = no_caps();
        let overrides = OverrideTable::default();
        let builder = WeightBuilder::new(&config, &overrides, &NoListings);
        let build = builder.build(&universe(vec![
            cap_row("A", 100.0),
            AssetRow {
                weight_ratio: Some(0.5),
                ..AssetRow::new("B")
            },
        ]));
        assert_eq!(build.vector.len(), 1);
        assert_abs_diff_eq!(build.vector.get("A"), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn listing_bonus_from_port_override_and_row() {
        let config = no_caps();
        let overrides = OverrideTable::new(vec![SymbolOverride {
            symbol: "B".into(),
            listed_domestic: true,
            ..SymbolOverride::default()
        }]);
        let listing = Listed(&["A"]);
        let builder = WeightBuilder::new(&config, &overrides, &listing);
        let build = builder.build(&universe(vec![
            cap_row("A", 100.0),
            cap_row("B", 100.0),
            AssetRow {
                listed_domestic: true,
                ..cap_row("C", 100.0)
            },
            cap_row("D", 100.0),
        ]));
        // 1.3 : 1.3 : 1.3 : 1.0
        let total = 3.0 * 1.3 + 1.0;
        assert_abs_diff_eq!(build.vector.get("A"), 1.3 / total, epsilon = 1e-12);
        assert_abs_diff_eq!(build.vector.get("C"), 1.3 / total, epsilon = 1e-12);
        assert_abs_diff_eq!(build.vector.get("D"), 1.0 / total, epsilon = 1e-12);
    }

    #[test]
    fn single_pass_redistribution() {
        let weights = BTreeMap::from([
            ("A".to_string(), 0.6),
            ("B".to_string(), 0.2),
            ("C".to_string(), 0.2),
        ]);
        let caps = HashMap::from([("A".to_string(), 0.3)]);
        let result = apply_caps(&weights, &caps, DEFAULT_MAX_ITERATIONS);

        assert!(result.converged);
        assert_abs_diff_eq!(result.weights["A"], 0.30, epsilon = 1e-12);
        assert_abs_diff_eq!(result.weights["B"], 0.35, epsilon = 1e-12);
        assert_abs_diff_eq!(result.weights["C"], 0.35, epsilon = 1e-12);
    }

    #[test]
    fn redistribution_can_push_second_cap_over() {
        let weights = BTreeMap::from([
            ("BTC".to_string(), 0.60),
            ("ETH".to_string(), 0.19),
            ("SOL".to_string(), 0.21),
        ]);
        let result = apply_caps(&weights, &default_caps(), DEFAULT_MAX_ITERATIONS);

        assert!(result.converged);
        assert_abs_diff_eq!(result.weights["BTC"], 0.30, epsilon = 1e-12);
        assert_abs_diff_eq!(result.weights["ETH"], 0.20, epsilon = 1e-12);
        assert_abs_diff_eq!(result.weights["SOL"], 0.50, epsilon = 1e-12);
    }

    #[test]
    fn infeasible_caps_return_normalized_best_effort() {
        let weights = BTreeMap::from([("BTC".to_string(), 0.7), ("ETH".to_string(), 0.3)]);
        let result = apply_caps(&weights, &default_caps(), DEFAULT_MAX_ITERATIONS);

        assert!(!result.converged);
        let total: f64 = result.weights.values().sum();
        assert_abs_diff_eq!(total, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn cap_for_absent_symbol_is_noop() {
        let weights = BTreeMap::from([("A".to_string(), 0.5), ("B".to_string(), 0.5)]);
        let caps = HashMap::from([("Z".to_string(), 0.1)]);
        let result = apply_caps(&weights, &caps, DEFAULT_MAX_ITERATIONS);
        assert!(result.converged);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.weights, weights);
    }

    #[test]
    fn cap_override_replaces_default_cap() {
        let config = WeightConfig::default();
        let overrides = OverrideTable::new(vec![SymbolOverride {
            symbol: "BTC".into(),
            cap_override: Some(0.5),
            ..SymbolOverride::default()
        }]);
        let builder = WeightBuilder::new(&config, &overrides, &NoListings);
        let build = builder.build(&universe(vec![
            cap_row("BTC", 800.0),
            cap_row("SOL", 100.0),
            cap_row("XRP", 100.0),
        ]));
        assert_abs_diff_eq!(build.vector.get("BTC"), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(build.vector.get("SOL"), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn supplied_scheme_skips_bonus_and_caps() {
        let config = WeightConfig {
            scheme: WeightScheme::Supplied,
            ..WeightConfig::default()
        };
        let overrides = OverrideTable::default();
        let listing = Listed(&["BTC"]);
        let builder = WeightBuilder::new(&config, &overrides, &listing);
        let build = builder.build(&universe(vec![
            AssetRow {
                market_cap: Some(1000.0),
                weight_ratio: Some(0.8),
                ..AssetRow::new("BTC")
            },
            AssetRow {
                market_cap: Some(100.0),
                weight_ratio: Some(0.2),
                ..AssetRow::new("SOL")
            },
        ]));
        assert_eq!(build.source, SizingSource::WeightRatio);
        assert_abs_diff_eq!(build.vector.get("BTC"), 0.8, epsilon = 1e-12);
    }

    #[test]
    fn empty_universe_gives_empty_vector() {
        let config = WeightConfig::default();
        let overrides = OverrideTable::default();
        let builder = WeightBuilder::new(&config, &overrides, &NoListings);
        let build = builder.build(&universe(vec![]));
        assert!(build.vector.is_empty());
        assert_eq!(build.vector.sum(), 0.0);
    }

    #[test]
    fn ranked_orders_by_weight_then_symbol() {
        let v = WeightVector::from_weights([("B", 0.25), ("A", 0.25), ("C", 0.5), ("Z", 0.0)]);
        let ranked: Vec<String> = v.ranked().into_iter().map(|(s, _)| s).collect();
        assert_eq!(ranked, vec!["C", "A", "B"]);
    }

    #[test]
    fn weight_scheme_parse_and_display() {
        assert_eq!("rules".parse::<WeightScheme>(), Ok(WeightScheme::Rules));
        assert_eq!("CSV".parse::<WeightScheme>(), Ok(WeightScheme::Supplied));
        assert!("magic".parse::<WeightScheme>().is_err());
        assert_eq!(WeightScheme::Supplied.to_string(), "supplied");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn weights_sum_to_one_and_respect_caps(
                alt_caps in proptest::collection::vec(1.0f64..1e6, 5..20),
                btc in 1.0f64..1e7,
                eth in 1.0f64..1e7,
            ) {
                let config = WeightConfig::default();
                let overrides = OverrideTable::default();
                let builder = WeightBuilder::new(&config, &overrides, &NoListings);

                let mut rows = vec![cap_row("BTC", btc), cap_row("ETH", eth)];
                rows.extend(alt_caps.iter().enumerate().map(|(i, c)| cap_row(&format!("ALT{i}"), *c)));
                let build = builder.build(&universe(rows));

                prop_assert!(build.converged);
                prop_assert!((build.vector.sum() - 1.0).abs() < 1e-9);
                for (_, w) in build.vector.iter() {
                    prop_assert!(w >= 0.0);
                }
                prop_assert!(build.vector.get("BTC") <= 0.30 + 1e-9);
                prop_assert!(build.vector.get("ETH") <= 0.20 + 1e-9);
            }
        }
    }
}
