use crate::core::account::{AccountSource, AssetBalance, Credentials};
use crate::core::market::{PriceProvider, SymbolInfo, SymbolMetadataProvider};
use crate::providers::util::with_retry;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

type HmacSha256 = Hmac<Sha256>;

const RECV_WINDOW_MS: u64 = 5000;
const PUBLIC_RETRIES: usize = 2;
const RETRY_DELAY: Duration = Duration::from_millis(500);
/// Exchange error code for an unlisted symbol.
const INVALID_SYMBOL: i64 = -1121;

/// Non-success response, carrying the exchange's `{code, msg}` body when present.
#[derive(Debug, Error)]
#[error("Binance API error {status}: {msg} (code {code:?})")]
pub struct BinanceApiError {
    pub status: StatusCode,
    pub code: Option<i64>,
    pub msg: String,
}

#[derive(Deserialize, Debug)]
struct ErrorBody {
    code: i64,
    msg: String,
}

#[derive(Deserialize, Debug)]
struct TickerPrice {
    price: String,
}

#[derive(Deserialize, Debug)]
struct ExchangeInfo {
    symbols: Vec<ExchangeSymbol>,
}

#[derive(Deserialize, Debug)]
struct ExchangeSymbol {
    symbol: String,
    #[serde(alias = "baseAsset")]
    base_asset: String,
    #[serde(alias = "quoteAsset")]
    quote_asset: String,
}

#[derive(Deserialize, Debug)]
struct AccountInfo {
    balances: Vec<RawBalance>,
}

#[derive(Deserialize, Debug)]
struct RawBalance {
    asset: String,
    free: String,
    locked: String,
}

/// Spot REST client covering balances, prices and symbol metadata.
pub struct BinanceProvider {
    base_url: String,
    client: reqwest::Client,
}

impl BinanceProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("acctmon/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(BinanceProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn get_public<T: DeserializeOwned>(&self, path_and_query: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path_and_query);
        let url = url.as_str();
        let client = &self.client;
        with_retry(
            || async move {
                debug!("Requesting {}", url);
                let response = client
                    .get(url)
                    .send()
                    .await
                    .with_context(|| format!("Request error for URL: {url}"))?;
                read_json(response).await
            },
            PUBLIC_RETRIES,
            RETRY_DELAY,
            |e| !is_client_error(e),
        )
        .await
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        let (code, msg) = match serde_json::from_str::<ErrorBody>(&body) {
            Ok(err) => (Some(err.code), err.msg),
            Err(_) => (None, body),
        };
        return Err(BinanceApiError { status, code, msg }.into());
    }
    serde_json::from_str(&body).map_err(|e| anyhow!("Failed to parse JSON response: {e}"))
}

fn is_client_error(err: &anyhow::Error) -> bool {
    err.downcast_ref::<BinanceApiError>()
        .is_some_and(|e| e.status.is_client_error())
}

/// Hex HMAC-SHA256 of `query` keyed by `secret`.
pub fn sign(secret: &str, query: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow!("Invalid HMAC secret length: {e}"))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn parse_amount(raw: &str, what: &str) -> Result<f64> {
    let value: f64 = raw
        .trim()
        .parse()
        .with_context(|| format!("Invalid {what}: {raw:?}"))?;
    if !value.is_finite() {
        return Err(anyhow!("Invalid {what}: {raw:?}"));
    }
    Ok(value)
}

#[async_trait]
impl PriceProvider for BinanceProvider {
    #[instrument(name = "BinancePriceFetch", skip(self), fields(symbol = %symbol))]
    async fn fetch_price(&self, symbol: &str) -> Result<f64> {
        let ticker: TickerPrice = self
            .get_public(&format!("/api/v3/ticker/price?symbol={symbol}"))
            .await
            .with_context(|| format!("Price fetch failed for {symbol}"))?;
        parse_amount(&ticker.price, "price")
    }
}

#[async_trait]
impl SymbolMetadataProvider for BinanceProvider {
    #[instrument(name = "BinanceSymbolFetch", skip(self), fields(symbol = %symbol))]
    async fn fetch_symbol(&self, symbol: &str) -> Result<Option<SymbolInfo>> {
        let info: ExchangeInfo = match self
            .get_public(&format!("/api/v3/exchangeInfo?symbol={symbol}"))
            .await
        {
            Ok(info) => info,
            Err(e)
                if e.downcast_ref::<BinanceApiError>()
                    .is_some_and(|api| api.code == Some(INVALID_SYMBOL)) =>
            {
                debug!("Symbol not listed");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        Ok(info
            .symbols
            .into_iter()
            .find(|s| s.symbol.eq_ignore_ascii_case(symbol))
            .map(|s| SymbolInfo {
                symbol: s.symbol,
                base_asset: s.base_asset,
                quote_asset: s.quote_asset,
            }))
    }
}

#[async_trait]
impl AccountSource for BinanceProvider {
    #[instrument(name = "BinanceAccountFetch", skip_all)]
    async fn fetch_balances(&self, credentials: &Credentials) -> Result<Vec<AssetBalance>> {
        // Signed requests carry a timestamp, so they are never retried.
        let query = format!(
            "timestamp={}&recvWindow={}",
            Utc::now().timestamp_millis(),
            RECV_WINDOW_MS
        );
        let signature = sign(&credentials.secret_key, &query)?;
        let url = format!("{}/api/v3/account?{query}&signature={signature}", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &credentials.api_key)
            .send()
            .await
            .context("Account request failed")?;
        let account: AccountInfo = read_json(response).await.map_err(|e| {
            if is_client_error(&e) {
                e.context("Account request rejected, check the API key permissions")
            } else {
                e
            }
        })?;

        let balances = account
            .balances
            .into_iter()
            .map(|raw| {
                Ok(AssetBalance {
                    free: parse_amount(&raw.free, "free balance")?,
                    locked: parse_amount(&raw.locked, "locked balance")?,
                    asset: raw.asset,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(assets = balances.len(), "Fetched account balances");
        Ok(balances)
    }
}
