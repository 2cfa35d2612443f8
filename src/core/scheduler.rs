//! Periodic sampling with start/stop lifecycle.

use crate::core::sample::Sample;
use crate::core::sampler::Sampler;
use crate::store::SampleStore;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

impl Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerState::Stopped => write!(f, "stopped"),
            SchedulerState::Running => write!(f, "running"),
        }
    }
}

struct RunningLoop {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Drives a [`Sampler`] on a fixed cadence and appends each tick's sample.
pub struct Scheduler {
    sampler: Arc<Sampler>,
    store: Arc<dyn SampleStore>,
    grace: Duration,
    running: Mutex<Option<RunningLoop>>,
}

impl Scheduler {
    pub fn new(sampler: Arc<Sampler>, store: Arc<dyn SampleStore>, grace: Duration) -> Self {
        Self {
            sampler,
            store,
            grace,
            running: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> SchedulerState {
        match self.running.lock().await.as_ref() {
            Some(running) if !running.handle.is_finished() => SchedulerState::Running,
            _ => SchedulerState::Stopped,
        }
    }

    /// Starts ticking every `interval`, the first tick immediately. No-op when
    /// already running.
    pub async fn start(&self, interval: Duration) {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            debug!("Scheduler already running");
            return;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.sampler),
            Arc::clone(&self.store),
            interval,
            shutdown_rx,
        ));
        info!(?interval, "Scheduler started");
        *running = Some(RunningLoop { shutdown, handle });
    }

    /// Cancels the pending wait and gives an in-flight tick up to the grace
    /// period to finish. A tick still running after that is aborted and its
    /// sample is never persisted. No-op when stopped.
    pub async fn stop(&self) {
        let Some(RunningLoop {
            shutdown,
            mut handle,
        }) = self.running.lock().await.take()
        else {
            debug!("Scheduler already stopped");
            return;
        };

        // The loop may already have exited; a closed channel is fine.
        let _ = shutdown.send(true);

        match tokio::time::timeout(self.grace, &mut handle).await {
            Ok(Ok(())) => info!("Scheduler stopped"),
            Ok(Err(e)) => error!(error = %e, "Scheduler loop ended abnormally"),
            Err(_) => {
                warn!(grace = ?self.grace, "In-flight tick exceeded grace period, discarding it");
                handle.abort();
                let _ = handle.await;
            }
        }
    }

    /// Runs a single tick outside the loop and persists it.
    pub async fn run_once(&self) -> Option<Sample> {
        tick(&self.sampler, self.store.as_ref()).await
    }
}

async fn run_loop(
    sampler: Arc<Sampler>,
    store: Arc<dyn SampleStore>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }
        // Appending happens without yielding once the sample is built, so an
        // abort after the grace period can only land before the write.
        tick(&sampler, store.as_ref()).await;
    }
    debug!("Scheduler loop exited");
}

async fn tick(sampler: &Sampler, store: &dyn SampleStore) -> Option<Sample> {
    let sample = sampler.sample().await;
    match store.append(&sample).await {
        Ok(()) => {
            debug!(timestamp = %sample.timestamp, "Sample appended");
            Some(sample)
        }
        Err(e) => {
            error!(error = %e, "Sample lost, retrying on next tick");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::MonitorError;
    use crate::core::sample::SampleSeries;
    use crate::core::sampler::tests::{MockExchange, account, sampler};
    use crate::store::memory::MemorySampleStore;
    use async_trait::async_trait;
    use tokio::time::Instant;

    fn scheduler(exchange: MockExchange, store: Arc<dyn SampleStore>, grace: Duration) -> Scheduler {
        let sampler = sampler(
            Arc::new(exchange),
            vec![account("main", Some("k"))],
            "BTCUSDT",
        );
        Scheduler::new(Arc::new(sampler), store, grace)
    }

    fn exchange() -> MockExchange {
        MockExchange::default()
            .with_balance("k", "BTC", 1.0)
            .with_price("BTCUSDT", 100.0)
    }

    struct FailingStore;

    #[async_trait]
    impl SampleStore for FailingStore {
        async fn append(&self, _sample: &Sample) -> Result<(), MonitorError> {
            Err(MonitorError::StoreWriteFailed("read-only filesystem".into()))
        }

        async fn load_all(&self) -> Result<Option<SampleSeries>, MonitorError> {
            Ok(None)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_first_tick_appends_nothing() {
        let store = Arc::new(MemorySampleStore::new());
        let scheduler = scheduler(exchange(), store.clone(), Duration::from_secs(1));

        scheduler.start(Duration::from_secs(60)).await;
        scheduler.stop().await;

        assert_eq!(scheduler.state().await, SchedulerState::Stopped);
        assert!(store.load_all().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_append_samples() {
        let store = Arc::new(MemorySampleStore::new());
        let scheduler = scheduler(exchange(), store.clone(), Duration::from_secs(1));

        scheduler.start(Duration::from_millis(20)).await;
        assert_eq!(scheduler.state().await, SchedulerState::Running);
        tokio::time::sleep(Duration::from_millis(90)).await;
        scheduler.stop().await;

        // Ticks at 0, 20, 40, 60 and 80 ms.
        let series = store.load_all().await.unwrap().expect("samples appended");
        assert_eq!(series.len(), 5);
        assert!(series.column("main").unwrap().iter().all(|v| *v == Some(100.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop_are_idempotent() {
        let store = Arc::new(MemorySampleStore::new());
        let scheduler = scheduler(exchange(), store.clone(), Duration::from_secs(1));

        scheduler.stop().await;
        assert_eq!(scheduler.state().await, SchedulerState::Stopped);

        scheduler.start(Duration::from_secs(60)).await;
        scheduler.start(Duration::from_secs(60)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(scheduler.state().await, SchedulerState::Running);

        scheduler.stop().await;
        scheduler.stop().await;
        assert_eq!(scheduler.state().await, SchedulerState::Stopped);

        // A second start would have fired its own immediate tick.
        let series = store.load_all().await.unwrap().unwrap();
        assert_eq!(series.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_tick_exceeding_grace() {
        let store = Arc::new(MemorySampleStore::new());
        let scheduler = scheduler(
            exchange().with_delay(Duration::from_secs(10)),
            store.clone(),
            Duration::from_millis(50),
        );

        scheduler.start(Duration::from_secs(60)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = Instant::now();
        scheduler.stop().await;
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(scheduler.state().await, SchedulerState::Stopped);
        assert!(store.load_all().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_in_flight_tick() {
        let store = Arc::new(MemorySampleStore::new());
        let scheduler = scheduler(
            exchange().with_delay(Duration::from_millis(50)),
            store.clone(),
            Duration::from_secs(5),
        );

        scheduler.start(Duration::from_secs(60)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        scheduler.stop().await;

        let series = store.load_all().await.unwrap().expect("tick completed");
        assert_eq!(series.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_keeps_loop_running() {
        let scheduler = scheduler(exchange(), Arc::new(FailingStore), Duration::from_secs(1));

        assert!(scheduler.run_once().await.is_none());

        scheduler.start(Duration::from_millis(10)).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(scheduler.state().await, SchedulerState::Running);
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_once_persists_one_sample() {
        let store = Arc::new(MemorySampleStore::new());
        let scheduler = scheduler(exchange(), store.clone(), Duration::from_secs(1));

        let sample = scheduler.run_once().await.unwrap();
        assert_eq!(sample.value("main"), Some(100.0));

        let series = store.load_all().await.unwrap().unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(scheduler.state().await, SchedulerState::Stopped);
    }
}
