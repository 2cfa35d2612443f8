pub mod monitor;
pub mod report;
pub mod sample;
pub mod setup;
pub mod ui;
