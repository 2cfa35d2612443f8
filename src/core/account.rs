//! Accounts and the balance source abstraction

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;

/// API credentials for one exchange account.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub secret_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// A configured account. Without credentials it is listed but never valued.
#[derive(Debug, Clone)]
pub struct Account {
    pub name: String,
    pub credentials: Option<Credentials>,
}

impl Account {
    pub fn is_monitorable(&self) -> bool {
        self.credentials.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetBalance {
    pub asset: String,
    pub free: f64,
    pub locked: f64,
}

impl AssetBalance {
    pub fn total(&self) -> f64 {
        self.free + self.locked
    }
}

/// Folds balances into `asset -> free + locked`, dropping empty holdings.
pub fn balance_totals(balances: &[AssetBalance]) -> HashMap<String, f64> {
    let mut totals = HashMap::new();
    for balance in balances {
        let total = balance.total();
        if total > 0.0 {
            *totals.entry(balance.asset.clone()).or_insert(0.0) += total;
        }
    }
    totals
}

#[async_trait]
pub trait AccountSource: Send + Sync {
    async fn fetch_balances(&self, credentials: &Credentials) -> Result<Vec<AssetBalance>>;
}
