// SPDX-License-Identifier: GPL-3.0-only

//! Duration timer
//!
//! A periodic tokio task that drives elapsed-time reporting and the
//! max-duration stop. Each tick runs to completion before the next one is
//! scheduled, and a stopped timer never fires again: stopping aborts the task
//! and bumps the generation so a tick already waiting on the controller lock
//! can tell it is stale.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// What the timer does after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickFlow {
    Continue,
    Stop,
}

/// Cancellable periodic tick
#[derive(Debug)]
pub struct DurationTimer {
    period: Duration,
    task: Option<JoinHandle<()>>,
    generation: Arc<AtomicU64>,
}

impl DurationTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            task: None,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start ticking; the first tick fires one period from now
    ///
    /// `on_tick` receives the generation the timer was started with. A
    /// running timer is stopped first.
    pub fn start<F>(&mut self, runtime: &Handle, mut on_tick: F) -> u64
    where
        F: FnMut(u64) -> TickFlow + Send + 'static,
    {
        self.stop();
        let generation = self.generation.load(Ordering::SeqCst);
        let current = Arc::clone(&self.generation);
        let period = self.period;
        let first_tick = Instant::now() + period;

        self.task = Some(runtime.spawn(async move {
            let mut interval = tokio::time::interval_at(first_tick, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                if current.load(Ordering::SeqCst) != generation {
                    break;
                }
                if on_tick(generation) == TickFlow::Stop {
                    break;
                }
            }
            debug!(generation, "Duration timer finished");
        }));

        debug!(generation, ?period, "Duration timer started");
        generation
    }

    /// Stop ticking; no tick of the current generation runs afterwards
    pub fn stop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Duration timer stopped");
        }
    }

    /// Whether `generation` is the one currently allowed to tick
    pub fn is_current(&self, generation: u64) -> bool {
        self.task.is_some() && self.generation.load(Ordering::SeqCst) == generation
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for DurationTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_at_period() {
        let ticks = Arc::new(Mutex::new(Vec::new()));
        let ticks_clone = Arc::clone(&ticks);
        let start = Instant::now();

        let mut timer = DurationTimer::new(Duration::from_millis(100));
        timer.start(&Handle::current(), move |_| {
            ticks_clone.lock().unwrap().push(start.elapsed().as_millis() as u64);
            TickFlow::Continue
        });

        tokio::time::sleep(Duration::from_millis(350)).await;
        timer.stop();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(*ticks.lock().unwrap(), vec![100, 200, 300]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_flow_ends_task() {
        let count = Arc::new(AtomicU64::new(0));
        let count_clone = Arc::clone(&count);

        let mut timer = DurationTimer::new(Duration::from_millis(100));
        timer.start(&Handle::current(), move |_| {
            let n = count_clone.fetch_add(1, Ordering::SeqCst) + 1;
            if n == 3 { TickFlow::Stop } else { TickFlow::Continue }
        });

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(!timer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_invalidates_old_generation() {
        let mut timer = DurationTimer::new(Duration::from_millis(100));
        let first = timer.start(&Handle::current(), |_| TickFlow::Continue);
        let second = timer.start(&Handle::current(), |_| TickFlow::Continue);
        assert_ne!(first, second);
        assert!(!timer.is_current(first));
        assert!(timer.is_current(second));
        timer.stop();
        assert!(!timer.is_current(second));
    }
}
