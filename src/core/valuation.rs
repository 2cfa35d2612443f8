//! Reference-currency valuation of a single account.
//!
//! Everything here is a pure calculation over snapshots the caller fetched
//! beforehand; no I/O happens in this module.
use crate::core::error::MonitorError;
use crate::core::pair::TradingPair;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// How quote assets are normalised into the reference currency.
#[derive(Debug, Clone)]
pub struct ValuationPolicy {
    pub reference_currency: String,
    /// Assets assumed to trade 1:1 with the reference currency. This is an
    /// approximation: no rate is fetched for them.
    pub stable_assets: HashSet<String>,
}

impl ValuationPolicy {
    pub fn new<S: AsRef<str>>(reference_currency: &str, stable_assets: &[S]) -> Self {
        Self {
            reference_currency: reference_currency.trim().to_uppercase(),
            stable_assets: stable_assets
                .iter()
                .map(|s| s.as_ref().trim().to_uppercase())
                .collect(),
        }
    }

    /// True when a value quoted in `asset` needs a rate lookup.
    pub fn needs_conversion(&self, asset: &str) -> bool {
        asset != self.reference_currency && !self.stable_assets.contains(asset)
    }
}

/// Prices fetched for one tick, keyed by exchange symbol.
#[derive(Debug, Clone, Default)]
pub struct PriceSnapshot {
    prices: HashMap<String, f64>,
}

impl PriceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: impl Into<String>, price: f64) {
        self.prices.insert(symbol.into(), price);
    }

    pub fn get(&self, symbol: &str) -> Option<f64> {
        self.prices.get(symbol).copied()
    }
}

impl FromIterator<(String, f64)> for PriceSnapshot {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self {
            prices: iter.into_iter().collect(),
        }
    }
}

/// Symbols whose prices a tick must fetch to value `pair` under `policy`.
pub fn required_symbols(pair: &TradingPair, policy: &ValuationPolicy) -> Vec<String> {
    let mut symbols = vec![pair.symbol.clone()];
    if policy.needs_conversion(&pair.quote) {
        symbols.push(pair.conversion_symbol(&policy.reference_currency));
    }
    symbols
}

/// Total value of an account in the reference currency.
///
/// The base-asset holding is priced in the pair's quote asset, converted to
/// the reference currency, and added to whatever the account holds directly
/// in the reference currency. An account holding none of the base asset is
/// valued at its direct reference balance without touching any price.
pub fn value_of(
    balances: &HashMap<String, f64>,
    pair: &TradingPair,
    prices: &PriceSnapshot,
    policy: &ValuationPolicy,
) -> Result<f64, MonitorError> {
    let base_balance = balances.get(&pair.base).copied().unwrap_or(0.0);
    let direct_balance = balances
        .get(&policy.reference_currency)
        .copied()
        .unwrap_or(0.0);

    if base_balance == 0.0 {
        debug!(pair = %pair, "No base asset held");
        return Ok(direct_balance);
    }

    let price = prices
        .get(&pair.symbol)
        .ok_or_else(|| MonitorError::PriceUnavailable(pair.symbol.clone()))?;
    let quote_value = base_balance * price;

    let reference_value = if policy.needs_conversion(&pair.quote) {
        let conversion_symbol = pair.conversion_symbol(&policy.reference_currency);
        let rate =
            prices
                .get(&conversion_symbol)
                .ok_or_else(|| MonitorError::ConversionUnavailable {
                    from: pair.quote.clone(),
                    to: policy.reference_currency.clone(),
                })?;
        quote_value * rate
    } else {
        quote_value
    };

    debug!(
        pair = %pair,
        base_balance,
        price,
        reference_value,
        direct_balance,
        "Valued account"
    );
    Ok(reference_value + direct_balance)
}
