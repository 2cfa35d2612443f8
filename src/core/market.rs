//! Market data abstractions

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
}

#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Last traded price of `symbol`, denominated in its quote asset.
    async fn fetch_price(&self, symbol: &str) -> Result<f64>;
}

#[async_trait]
pub trait SymbolMetadataProvider: Send + Sync {
    /// Base/quote breakdown of `symbol`, or `None` if the venue does not list it.
    async fn fetch_symbol(&self, symbol: &str) -> Result<Option<SymbolInfo>>;
}
