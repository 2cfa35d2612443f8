//! One sampling tick: fetch balances, value every account, build a [`Sample`].

use crate::core::account::{Account, AccountSource, balance_totals};
use crate::core::error::MonitorError;
use crate::core::market::PriceProvider;
use crate::core::pair::{PairResolver, TradingPair};
use crate::core::sample::Sample;
use crate::core::valuation::{PriceSnapshot, ValuationPolicy, required_symbols, value_of};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

pub struct Sampler {
    accounts: Vec<Account>,
    pair_symbol: String,
    resolver: PairResolver,
    policy: ValuationPolicy,
    account_source: Arc<dyn AccountSource>,
    price_provider: Arc<dyn PriceProvider>,
    fetch_timeout: Duration,
}

impl Sampler {
    pub fn new(
        accounts: Vec<Account>,
        pair_symbol: &str,
        resolver: PairResolver,
        policy: ValuationPolicy,
        account_source: Arc<dyn AccountSource>,
        price_provider: Arc<dyn PriceProvider>,
    ) -> Self {
        Self {
            accounts,
            pair_symbol: pair_symbol.to_string(),
            resolver,
            policy,
            account_source,
            price_provider,
            fetch_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Values every configured account once.
    ///
    /// Never fails: an account that cannot be fetched or valued is recorded
    /// absent and the others are still valued.
    #[instrument(name = "SampleTick", skip(self), fields(pair = %self.pair_symbol))]
    pub async fn sample(&self) -> Sample {
        let timestamp = Utc::now();
        let monitored: Vec<&Account> = self
            .accounts
            .iter()
            .filter(|a| a.is_monitorable())
            .collect();

        let valuations = if monitored.is_empty() {
            debug!("No monitorable accounts");
            Vec::new()
        } else {
            match self.resolver.resolve(&self.pair_symbol).await {
                Ok(pair) => {
                    let prices = self.fetch_prices(&pair).await;
                    let futures = monitored
                        .iter()
                        .map(|account| self.value_account(account, &pair, &prices));
                    join_all(futures).await
                }
                Err(e) => {
                    warn!(error = %e, "Pair unresolved, recording all accounts absent");
                    Vec::new()
                }
            }
        };

        let mut sample = Sample::new(timestamp);
        for account in &self.accounts {
            let value = valuations
                .iter()
                .find(|(name, _)| *name == account.name)
                .and_then(|(_, value)| *value);
            sample = sample.with_value(account.name.clone(), value);
        }

        let valued = sample.values.iter().filter(|(_, v)| v.is_some()).count();
        info!(
            valued,
            total = self.accounts.len(),
            "Sampled account values"
        );
        sample
    }

    async fn fetch_prices(&self, pair: &TradingPair) -> PriceSnapshot {
        let symbols = required_symbols(pair, &self.policy);
        let futures = symbols.into_iter().map(|symbol| async move {
            let result = self.price_provider.fetch_price(&symbol).await;
            (symbol, result)
        });

        let mut prices = PriceSnapshot::new();
        for (symbol, result) in join_all(futures).await {
            match result {
                Ok(price) => prices.insert(symbol, price),
                Err(e) => warn!(symbol = %symbol, error = %e, "Price fetch failed"),
            }
        }
        prices
    }

    async fn value_account(
        &self,
        account: &Account,
        pair: &TradingPair,
        prices: &PriceSnapshot,
    ) -> (String, Option<f64>) {
        let result = self.try_value_account(account, pair, prices).await;
        let value = match result {
            Ok(value) => {
                debug!(account = %account.name, value, "Account valued");
                Some(value)
            }
            Err(e) if e.is_recorded_absent() => {
                warn!(account = %account.name, error = %e, "Recording account as absent");
                None
            }
            Err(e) => {
                error!(account = %account.name, error = %e, "Unexpected valuation failure");
                None
            }
        };
        (account.name.clone(), value)
    }

    async fn try_value_account(
        &self,
        account: &Account,
        pair: &TradingPair,
        prices: &PriceSnapshot,
    ) -> Result<f64, MonitorError> {
        let unavailable = |reason: String| MonitorError::BalanceUnavailable {
            account: account.name.clone(),
            reason,
        };
        let credentials = account
            .credentials
            .as_ref()
            .ok_or_else(|| unavailable("no credentials".to_string()))?;

        let balances = tokio::time::timeout(
            self.fetch_timeout,
            self.account_source.fetch_balances(credentials),
        )
        .await
        .map_err(|_| unavailable(format!("timed out after {:?}", self.fetch_timeout)))?
        .map_err(|e| unavailable(format!("{e:#}")))?;

        value_of(&balance_totals(&balances), pair, prices, &self.policy)
    }
}
