//! Tick scheduling

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::Notify;

/// Decides when the next detection tick runs
pub trait TickScheduler: Send + Sync {
    /// Resolves when the next tick is due
    fn next_tick(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Fixed delay between the end of one tick and the start of the next
#[derive(Debug, Clone)]
pub struct DelayScheduler {
    period: Duration,
}

impl DelayScheduler {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl TickScheduler for DelayScheduler {
    fn next_tick(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(self.period))
    }
}

/// Ticks only when triggered. Triggers made while no tick is awaited
/// coalesce into one.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    notify: Notify,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.notify.notify_one();
    }
}

impl TickScheduler for ManualScheduler {
    fn next_tick(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self.notify.notified())
    }
}
