use super::ui;
use crate::core::sample::Sample;
use crate::core::scheduler::Scheduler;
use anyhow::{Result, bail};
use comfy_table::{Cell, Table};
use std::path::Path;

/// Runs one tick, appends it and prints the valued accounts.
pub async fn run(scheduler: &Scheduler, data_file: &Path) -> Result<()> {
    let pb = ui::new_spinner("Sampling accounts...");
    let sample = scheduler.run_once().await;
    pb.finish_and_clear();

    let Some(sample) = sample else {
        bail!("Sample could not be written to {}", data_file.display());
    };

    println!(
        "\nSample at {}",
        ui::style_text(&ui::format_timestamp(sample.timestamp), ui::StyleType::Title)
    );
    println!("{}", sample_table(&sample));
    println!(
        "{}",
        ui::style_text(
            &format!("Appended to {}", data_file.display()),
            ui::StyleType::Subtle
        )
    );
    Ok(())
}

fn sample_table(sample: &Sample) -> Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Account"), ui::header_cell("Value")]);

    let mut total = 0.0;
    for (account, value) in &sample.values {
        let value_cell = match value {
            Some(v) => {
                total += v;
                ui::format_optional_cell(Some(*v), ui::format_value)
            }
            None => ui::na_cell(true),
        };
        table.add_row(vec![Cell::new(account), value_cell]);
    }
    table.add_row(vec![
        Cell::new(ui::style_text("Total", ui::StyleType::TotalLabel)),
        Cell::new(ui::style_text(&ui::format_value(total), ui::StyleType::TotalValue)),
    ]);
    table
}
