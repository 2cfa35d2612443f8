//! Failure kinds surfaced by the monitor

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// No usable account source: missing config file or no account with credentials.
    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("Unable to resolve base/quote assets for pair {0}")]
    UnresolvedPair(String),

    #[error("Price unavailable for symbol {0}")]
    PriceUnavailable(String),

    #[error("No conversion from {from} to {to}")]
    ConversionUnavailable { from: String, to: String },

    #[error("Balances unavailable for account {account}: {reason}")]
    BalanceUnavailable { account: String, reason: String },

    #[error("Failed to write sample: {0}")]
    StoreWriteFailed(String),

    #[error("Failed to read samples: {0}")]
    StoreReadFailed(String),
}

impl MonitorError {
    /// Per-account, per-tick failures that are recorded as an absent value.
    pub fn is_recorded_absent(&self) -> bool {
        matches!(
            self,
            MonitorError::UnresolvedPair(_)
                | MonitorError::PriceUnavailable(_)
                | MonitorError::ConversionUnavailable { .. }
                | MonitorError::BalanceUnavailable { .. }
        )
    }
}
