use super::ui;
use crate::core::scheduler::Scheduler;
use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Samples every `interval` until Ctrl-C, then stops the scheduler.
pub async fn run(scheduler: &Scheduler, interval: Duration, data_file: &Path) -> Result<()> {
    scheduler.start(interval).await;
    println!(
        "Monitoring every {} min, writing to {}. Press Ctrl-C to stop.",
        interval.as_secs() / 60,
        data_file.display()
    );

    let signal = tokio::signal::ctrl_c().await;
    info!("Shutting down monitor");
    scheduler.stop().await;
    signal.context("Failed to listen for Ctrl-C")?;

    println!("{}", ui::style_text("Monitor stopped", ui::StyleType::Subtle));
    Ok(())
}
