use crate::core::account::{Account, Credentials};
use crate::core::error::MonitorError;
use crate::core::pair::DEFAULT_QUOTE_ASSETS;
use crate::core::valuation::ValuationPolicy;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

/// Value shipped in example configs in place of real keys.
const CREDENTIAL_PLACEHOLDER: &str = "xxx";
pub const DATA_FILE_NAME: &str = "balance_history.csv";
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// Sampling period for `minutes`, rejecting zero and periods too long to represent.
pub fn interval_from_minutes(minutes: u64) -> Result<Duration> {
    if minutes == 0 {
        anyhow::bail!("interval must be greater than zero");
    }
    minutes
        .checked_mul(60)
        .map(Duration::from_secs)
        .with_context(|| format!("interval of {minutes} minutes is too long"))
}

#[derive(Deserialize, Serialize, Clone)]
pub struct AccountConfig {
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(default, alias = "apiKey")]
    pub api_key: Option<String>,
    #[serde(default, alias = "secretKey")]
    pub secret_key: Option<String>,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("name", &self.name)
            .field("credentials", &self.credentials())
            .finish()
    }
}

impl AccountConfig {
    /// Usable credentials, or `None` when either key is missing or a placeholder.
    pub fn credentials(&self) -> Option<Credentials> {
        let usable = |key: &Option<String>| {
            key.as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty() && *k != CREDENTIAL_PLACEHOLDER)
                .map(str::to_string)
        };
        Some(Credentials {
            api_key: usable(&self.api_key)?,
            secret_key: usable(&self.secret_key)?,
        })
    }

    pub fn to_account(&self) -> Account {
        Account {
            name: self.name.clone(),
            credentials: self.credentials(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BinanceProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub binance: Option<BinanceProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            binance: Some(BinanceProviderConfig {
                base_url: "https://api.binance.com".to_string(),
            }),
        }
    }
}

fn default_pair() -> String {
    "USDCUSDT".to_string()
}

fn default_reference_currency() -> String {
    "USDT".to_string()
}

fn default_stable_assets() -> Vec<String> {
    vec!["USDC".to_string(), "BUSD".to_string()]
}

fn default_quote_assets() -> Vec<String> {
    DEFAULT_QUOTE_ASSETS.iter().map(|q| q.to_string()).collect()
}

fn default_interval_minutes() -> u64 {
    5
}

fn default_stop_grace_secs() -> u64 {
    10
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub accounts: Vec<AccountConfig>,
    #[serde(default = "default_pair")]
    pub pair: String,
    #[serde(default = "default_reference_currency")]
    pub reference_currency: String,
    #[serde(default = "default_stable_assets")]
    pub stable_assets: Vec<String>,
    #[serde(default = "default_quote_assets")]
    pub quote_assets: Vec<String>,
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default)]
    pub providers: ProvidersConfig,
    pub data_path: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("io", "acctmon", "acctmon")
            .context("Could not determine project directories")
    }

    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.yaml"))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        Ok(Self::project_dirs()?.data_dir().to_path_buf())
    }

    pub fn data_file(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(DATA_FILE_NAME))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MonitorError::ConfigurationMissing(format!(
                "config file not found: {}",
                path.display()
            ))
            .into());
        }

        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for account in &self.accounts {
            let name = account.name.trim();
            if name.is_empty() {
                anyhow::bail!("Account names must not be empty");
            }
            if name == TIMESTAMP_COLUMN {
                anyhow::bail!("Account name '{TIMESTAMP_COLUMN}' is reserved");
            }
            if !seen.insert(name) {
                anyhow::bail!("Duplicate account name: {name}");
            }
        }
        interval_from_minutes(self.interval_minutes).context("Invalid interval_minutes")?;
        if self.pair.trim().is_empty() {
            anyhow::bail!("pair must not be empty");
        }
        Ok(())
    }

    pub fn accounts(&self) -> Vec<Account> {
        self.accounts.iter().map(AccountConfig::to_account).collect()
    }

    /// Fails with `ConfigurationMissing` unless at least one account can be queried.
    pub fn ensure_monitorable(&self) -> Result<(), MonitorError> {
        if self.accounts().iter().any(Account::is_monitorable) {
            Ok(())
        } else {
            Err(MonitorError::ConfigurationMissing(
                "no account has usable API credentials".to_string(),
            ))
        }
    }

    pub fn valuation_policy(&self) -> ValuationPolicy {
        ValuationPolicy::new(&self.reference_currency, &self.stable_assets)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn binance_base_url(&self) -> &str {
        self.providers
            .binance
            .as_ref()
            .map_or("https://api.binance.com", |p| &p.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
accounts:
  - name: "Main"
    api_key: "key-main"
    secret_key: "secret-main"
  - name: "Savings"
    api_key: "xxx"
    secret_key: "xxx"
  - name: "Watch only"
pair: "BTCUSDT"
reference_currency: "usdt"
interval_minutes: 15
providers:
  binance:
    base_url: "http://example.com/binance"
data_path: "/tmp/acctmon"
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        config.validate().unwrap();
        assert_eq!(config.accounts.len(), 3);
        assert_eq!(config.pair, "BTCUSDT");
        assert_eq!(config.interval(), Duration::from_secs(15 * 60));
        assert_eq!(config.stable_assets, vec!["USDC", "BUSD"]);
        assert_eq!(config.quote_assets, vec!["USDT", "BUSD", "USDC", "BTC", "ETH"]);
        assert_eq!(config.binance_base_url(), "http://example.com/binance");
        assert_eq!(
            config.data_file().unwrap(),
            PathBuf::from("/tmp/acctmon").join(DATA_FILE_NAME)
        );
        assert_eq!(config.valuation_policy().reference_currency, "USDT");

        let accounts = config.accounts();
        assert!(accounts[0].is_monitorable());
        assert!(!accounts[1].is_monitorable());
        assert!(!accounts[2].is_monitorable());
        assert!(config.ensure_monitorable().is_ok());
    }

    #[test]
    fn test_legacy_json_config() {
        let json_str = r#"{
            "accounts": [
                {"Name": "first", "apiKey": "k1", "secretKey": "s1"},
                {"Name": "second", "apiKey": "k2", "secretKey": "xxx"}
            ],
            "pair": "USDCUSDT"
        }"#;

        let config: AppConfig = serde_yaml::from_str(json_str).expect("Failed to deserialize");
        assert_eq!(config.accounts[0].name, "first");
        assert_eq!(
            config.accounts[0].credentials(),
            Some(Credentials {
                api_key: "k1".into(),
                secret_key: "s1".into()
            })
        );
        assert_eq!(config.accounts[1].credentials(), None);
        assert_eq!(config.reference_currency, "USDT");
        assert_eq!(config.interval_minutes, 5);
        assert_eq!(config.binance_base_url(), "https://api.binance.com");
    }

    #[test]
    fn test_validation_rejects_bad_accounts() {
        let dup: AppConfig = serde_yaml::from_str(
            "accounts:\n  - name: a\n  - name: a\n",
        )
        .unwrap();
        assert!(dup.validate().unwrap_err().to_string().contains("Duplicate"));

        let reserved: AppConfig =
            serde_yaml::from_str("accounts:\n  - name: timestamp\n").unwrap();
        assert!(reserved.validate().is_err());

        let zero_interval: AppConfig =
            serde_yaml::from_str("accounts: []\ninterval_minutes: 0\n").unwrap();
        assert!(zero_interval.validate().is_err());

        let huge_interval: AppConfig = serde_yaml::from_str(
            "accounts: []\ninterval_minutes: 18446744073709551615\n",
        )
        .unwrap();
        let err = huge_interval.validate().unwrap_err();
        assert!(format!("{err:#}").contains("too long"), "{err:#}");
    }

    #[test]
    fn test_interval_from_minutes() {
        assert_eq!(interval_from_minutes(5).unwrap(), Duration::from_secs(300));
        assert!(interval_from_minutes(0).is_err());
        assert!(interval_from_minutes(u64::MAX / 60).is_ok());
        assert!(interval_from_minutes(u64::MAX / 60 + 1).is_err());
    }

    #[test]
    fn test_no_credentials_is_configuration_missing() {
        let config: AppConfig = serde_yaml::from_str(
            "accounts:\n  - name: a\n    api_key: xxx\n    secret_key: xxx\n",
        )
        .unwrap();
        assert!(matches!(
            config.ensure_monitorable(),
            Err(MonitorError::ConfigurationMissing(_))
        ));
    }

    #[test]
    fn test_missing_file_is_configuration_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load_from_path(dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MonitorError>(),
            Some(MonitorError::ConfigurationMissing(_))
        ));
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "accounts:\n  - name: a\n    api_key: k\n    secret_key: s").unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.accounts.len(), 1);
        assert_eq!(config.pair, "USDCUSDT");
    }
}
