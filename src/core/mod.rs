//! Core business logic abstractions

pub mod account;
pub mod cache;
pub mod config;
pub mod error;
pub mod log;
pub mod market;
pub mod pair;
pub mod returns;
pub mod sample;
pub mod sampler;
pub mod scheduler;
pub mod valuation;

// Re-export main types for cleaner imports
pub use account::{Account, AccountSource, AssetBalance, Credentials};
pub use error::MonitorError;
pub use market::{PriceProvider, SymbolInfo, SymbolMetadataProvider};
pub use sample::{Sample, SampleSeries};
