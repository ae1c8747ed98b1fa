//! Periodic refresh of the placed population.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::fetch::ResourceFetcher;
use crate::pipeline::{LaunchHandle, LoadPipeline};

/// Shortest refresh period; shorter requests are raised to this.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Refreshing,
}

/// Fires on a fixed period: advance the generation, clear, relaunch.
pub struct RefreshScheduler<F> {
    pipeline: LoadPipeline<F>,
    period: Duration,
    state: SchedulerState,
    cycles: u64,
}

impl<F: ResourceFetcher> RefreshScheduler<F> {
    /// A `period` below [`MIN_PERIOD`] (zero included) is clamped to it.
    pub fn new(pipeline: LoadPipeline<F>, period: Duration) -> Self {
        if period < MIN_PERIOD {
            log::warn!("Refresh period {:?} too short, using {:?}", period, MIN_PERIOD);
        }
        Self {
            pipeline,
            period: period.max(MIN_PERIOD),
            state: SchedulerState::Idle,
            cycles: 0,
        }
    }

    pub fn pipeline(&self) -> &LoadPipeline<F> {
        &self.pipeline
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Refresh cycles run so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run one cycle. Returns as soon as the loads are launched.
    pub fn refresh(&mut self) -> LaunchHandle {
        self.state = SchedulerState::Refreshing;

        let registry = self.pipeline.registry();
        let previous = registry.len();
        let generation = registry.begin_generation();
        let handle = self.pipeline.launch(generation);
        self.cycles += 1;

        log::info!(
            "Refresh {}: generation {}, cleared {} nodes, loading {} assets",
            self.cycles,
            generation,
            previous,
            handle.len()
        );

        self.state = SchedulerState::Idle;
        handle
    }

    /// Refresh forever. The first cycle runs immediately.
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.refresh().detach();
        }
    }

    /// Run on the current runtime; abort the returned handle to stop.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
