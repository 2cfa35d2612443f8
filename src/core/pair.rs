//! Trading pair parsing and resolution.

use crate::core::cache::Cache;
use crate::core::error::MonitorError;
use crate::core::market::SymbolMetadataProvider;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, warn};

/// Quote tickers recognised by suffix when no list is configured.
pub const DEFAULT_QUOTE_ASSETS: [&str; 5] = ["USDT", "BUSD", "USDC", "BTC", "ETH"];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TradingPair {
    pub symbol: String,
    pub base: String,
    pub quote: String,
}

impl Display for TradingPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl TradingPair {
    /// Splits `symbol` on the longest matching quote ticker.
    ///
    /// Longer tickers are tried first so that `BTCUSDT` is never split on a
    /// shorter ticker that also happens to be a suffix. A match that would
    /// leave an empty base asset is skipped.
    pub fn from_suffix<S: AsRef<str>>(symbol: &str, quote_assets: &[S]) -> Option<Self> {
        let symbol = symbol.trim().to_uppercase();
        let mut quotes: Vec<String> = quote_assets
            .iter()
            .map(|q| q.as_ref().trim().to_uppercase())
            .filter(|q| !q.is_empty())
            .collect();
        quotes.sort_by_key(|q| std::cmp::Reverse(q.len()));

        quotes.into_iter().find_map(|quote| {
            let base = symbol.strip_suffix(quote.as_str())?;
            if base.is_empty() {
                return None;
            }
            Some(TradingPair {
                base: base.to_string(),
                quote,
                symbol: symbol.clone(),
            })
        })
    }

    /// Symbol quoting this pair's quote asset in `reference`, e.g. `BTCUSDT`.
    pub fn conversion_symbol(&self, reference: &str) -> String {
        format!("{}{}", self.quote, reference)
    }
}

/// Resolves configured symbols, falling back to exchange metadata and
/// remembering successful resolutions.
pub struct PairResolver {
    quote_assets: Vec<String>,
    metadata: Arc<dyn SymbolMetadataProvider>,
    resolved: Cache<String, TradingPair>,
}

impl PairResolver {
    pub fn new(quote_assets: Vec<String>, metadata: Arc<dyn SymbolMetadataProvider>) -> Self {
        Self {
            quote_assets,
            metadata,
            resolved: Cache::new(),
        }
    }

    pub async fn resolve(&self, symbol: &str) -> Result<TradingPair, MonitorError> {
        let key = symbol.trim().to_uppercase();
        if let Some(pair) = self.resolved.get(&key).await {
            return Ok(pair);
        }

        let pair = match TradingPair::from_suffix(&key, &self.quote_assets) {
            Some(pair) => pair,
            None => {
                debug!(symbol = %key, "No known quote suffix, asking exchange metadata");
                self.resolve_from_metadata(&key).await?
            }
        };

        debug!(symbol = %key, pair = %pair, "Resolved trading pair");
        self.resolved.put(key, pair.clone()).await;
        Ok(pair)
    }

    async fn resolve_from_metadata(&self, symbol: &str) -> Result<TradingPair, MonitorError> {
        match self.metadata.fetch_symbol(symbol).await {
            Ok(Some(info)) if !info.base_asset.is_empty() && !info.quote_asset.is_empty() => {
                Ok(TradingPair {
                    symbol: symbol.to_string(),
                    base: info.base_asset.to_uppercase(),
                    quote: info.quote_asset.to_uppercase(),
                })
            }
            Ok(_) => Err(MonitorError::UnresolvedPair(symbol.to_string())),
            Err(e) => {
                warn!(symbol, error = %e, "Symbol metadata lookup failed");
                Err(MonitorError::UnresolvedPair(symbol.to_string()))
            }
        }
    }
}
