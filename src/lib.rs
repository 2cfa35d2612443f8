pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::core::config::{AppConfig, interval_from_minutes};
use crate::core::pair::PairResolver;
use crate::core::sampler::Sampler;
use crate::core::scheduler::Scheduler;
use crate::providers::BinanceProvider;
use crate::store::csv_log::CsvSampleStore;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    Sample,
    Monitor { interval_minutes: Option<u64> },
    Report { account: Option<String> },
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("Account monitor starting...");

    let config = Arc::new(match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    });
    debug!("Loaded config: {config:#?}");

    let data_file = config.data_file()?;
    let store = Arc::new(CsvSampleStore::new(&data_file));

    match command {
        AppCommand::Report { account } => {
            cli::report::run(store.as_ref(), account.as_deref()).await
        }
        AppCommand::Sample => {
            let scheduler = build_scheduler(&config, store)?;
            cli::sample::run(&scheduler, &data_file).await
        }
        AppCommand::Monitor { interval_minutes } => {
            let interval = match interval_minutes {
                Some(minutes) => interval_from_minutes(minutes)?,
                None => config.interval(),
            };
            let scheduler = build_scheduler(&config, store)?;
            cli::monitor::run(&scheduler, interval, &data_file).await
        }
    }
}

fn build_scheduler(config: &AppConfig, store: Arc<CsvSampleStore>) -> Result<Scheduler> {
    config.ensure_monitorable()?;

    let exchange = Arc::new(BinanceProvider::new(
        config.binance_base_url(),
        config.fetch_timeout(),
    )?);
    let resolver = PairResolver::new(config.quote_assets.clone(), exchange.clone());
    let sampler = Sampler::new(
        config.accounts(),
        &config.pair,
        resolver,
        config.valuation_policy(),
        exchange.clone(),
        exchange,
    )
    .with_fetch_timeout(config.fetch_timeout());

    Ok(Scheduler::new(Arc::new(sampler), store, config.stop_grace()))
}
