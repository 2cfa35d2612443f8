//! Persistence for recorded samples.

pub mod csv_log;
pub mod memory;

use crate::core::error::MonitorError;
use crate::core::sample::{Sample, SampleSeries};
use async_trait::async_trait;

/// Append-only, timestamp-indexed table of account values.
///
/// Appends are serialised and durable once they return. A concurrent
/// `load_all` sees the table either before or after an append, never a
/// partial row.
#[async_trait]
pub trait SampleStore: Send + Sync {
    async fn append(&self, sample: &Sample) -> Result<(), MonitorError>;

    /// Everything appended so far, in append order; `None` if nothing has
    /// been recorded yet.
    async fn load_all(&self) -> Result<Option<SampleSeries>, MonitorError>;
}
