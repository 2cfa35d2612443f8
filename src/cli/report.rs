use super::ui;
use crate::core::returns::{AccountReturns, annualized_returns, cumulative_returns, summarize};
use crate::core::sample::SampleSeries;
use crate::store::SampleStore;
use anyhow::{Result, bail};
use comfy_table::{Cell, Table};
use std::collections::HashMap;
use tracing::warn;

pub const NO_DATA: &str = "No data available";

/// Prints per-account returns, or one account's full history.
pub async fn run(store: &dyn SampleStore, account: Option<&str>) -> Result<()> {
    let series = match store.load_all().await {
        Ok(Some(series)) => series,
        Ok(None) => {
            println!("{NO_DATA}");
            return Ok(());
        }
        Err(e) => {
            warn!(error = %e, "Sample history unreadable");
            println!("{NO_DATA}");
            return Ok(());
        }
    };

    if let (Some(first), Some(last)) = (series.timestamps().first(), series.timestamps().last()) {
        println!(
            "\n{} samples from {} to {}",
            series.len(),
            ui::format_timestamp(*first),
            ui::format_timestamp(*last)
        );
    }

    match account {
        Some(name) => {
            if series.column(name).is_none() {
                bail!("No history for account '{name}'");
            }
            println!("\nAccount: {}", ui::style_text(name, ui::StyleType::Title));
            println!("{}", history_table(&series, name));
        }
        None => println!("{}", summary_table(&summarize(&series))),
    }
    Ok(())
}

fn summary_table(returns: &[AccountReturns]) -> Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Account"),
        ui::header_cell("Samples"),
        ui::header_cell("First"),
        ui::header_cell("First Value"),
        ui::header_cell("Latest"),
        ui::header_cell("Latest Value"),
        ui::header_cell("Cumulative"),
        ui::header_cell("Annualized"),
    ]);

    for r in returns {
        table.add_row(vec![
            Cell::new(&r.account),
            Cell::new(r.observations),
            ui::format_optional_cell(r.first.map(|(t, _)| t), ui::format_timestamp),
            ui::format_optional_cell(r.first.map(|(_, v)| v), ui::format_value),
            ui::format_optional_cell(r.latest.map(|(t, _)| t), ui::format_timestamp),
            ui::format_optional_cell(r.latest.map(|(_, v)| v), ui::format_value),
            ui::optional_change_cell(r.cumulative),
            ui::optional_change_cell(r.annualized),
        ]);
    }
    table
}

fn history_table(series: &SampleSeries, account: &str) -> Table {
    let cumulative: HashMap<usize, f64> = cumulative_returns(series, account)
        .into_iter()
        .map(|p| (p.index, p.value))
        .collect();
    let annualized: HashMap<usize, f64> = annualized_returns(series, account)
        .into_iter()
        .map(|p| (p.index, p.value))
        .collect();
    let values = series.column(account).unwrap_or_default();

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Timestamp"),
        ui::header_cell("Value"),
        ui::header_cell("Cumulative"),
        ui::header_cell("Annualized"),
    ]);

    for (index, timestamp) in series.timestamps().iter().enumerate() {
        let value = values.get(index).copied().flatten().filter(|v| v.is_finite());
        table.add_row(vec![
            Cell::new(ui::format_timestamp(*timestamp)),
            ui::format_optional_cell(value, ui::format_value),
            ui::optional_change_cell(cumulative.get(&index).copied()),
            ui::optional_change_cell(annualized.get(&index).copied()),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::MonitorError;
    use crate::core::sample::Sample;
    use crate::store::memory::MemorySampleStore;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};

    fn series() -> SampleSeries {
        let t0 = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let samples = vec![
            Sample::new(t0)
                .with_value("main", Some(100.0))
                .with_value("late", None),
            Sample::new(t0 + Duration::days(73))
                .with_value("main", None)
                .with_value("late", Some(50.0)),
            Sample::new(t0 + Duration::days(146))
                .with_value("main", Some(110.0))
                .with_value("late", Some(40.0)),
        ];
        SampleSeries::from_samples(samples.iter())
    }

    struct UnreadableStore;

    #[async_trait]
    impl SampleStore for UnreadableStore {
        async fn append(&self, _sample: &Sample) -> Result<(), MonitorError> {
            Ok(())
        }

        async fn load_all(&self) -> Result<Option<SampleSeries>, MonitorError> {
            Err(MonitorError::StoreReadFailed("corrupt header".into()))
        }
    }

    #[test]
    fn test_summary_table_shows_returns() {
        let rendered = summary_table(&summarize(&series())).to_string();
        assert!(rendered.contains("main"));
        assert!(rendered.contains("late"));
        assert!(rendered.contains("10.00%"));
        assert!(rendered.contains("-20.00%"));
    }

    #[test]
    fn test_history_table_marks_absent_rows() {
        let rendered = history_table(&series(), "main").to_string();
        assert!(rendered.contains("100.00"));
        assert!(rendered.contains("110.00"));
        assert!(rendered.contains("0.00%"));
        assert!(rendered.contains("N/A"));
    }

    #[tokio::test]
    async fn test_report_without_data_succeeds() {
        assert!(run(&MemorySampleStore::new(), None).await.is_ok());
        assert!(run(&UnreadableStore, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_report_unknown_account_fails() {
        let store = MemorySampleStore::new();
        for sample in series().to_samples() {
            store.append(&sample).await.unwrap();
        }
        assert!(run(&store, Some("main")).await.is_ok());
        assert!(run(&store, Some("nobody")).await.is_err());
    }
}
