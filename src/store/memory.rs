use crate::core::error::MonitorError;
use crate::core::sample::{Sample, SampleSeries};
use crate::store::SampleStore;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

/// Volatile store, for dry runs and tests.
#[derive(Default)]
pub struct MemorySampleStore {
    samples: RwLock<Vec<Sample>>,
}

impl MemorySampleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SampleStore for MemorySampleStore {
    async fn append(&self, sample: &Sample) -> Result<(), MonitorError> {
        let mut samples = self.samples.write().await;
        samples.push(sample.clone());
        debug!(rows = samples.len(), "Memory store APPEND");
        Ok(())
    }

    async fn load_all(&self) -> Result<Option<SampleSeries>, MonitorError> {
        let samples = self.samples.read().await;
        if samples.is_empty() {
            return Ok(None);
        }
        Ok(Some(SampleSeries::from_samples(samples.iter())))
    }
}
