//! Repeating timers behind a trait, so the refresh loop can run on tokio in
//! the binary and on a hand-cranked clock in tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::MissedTickBehavior;

pub type RepeatingTask = Box<dyn FnMut() + Send + 'static>;

pub trait Scheduler {
    /// Run `task` every `interval`, starting one interval from now, until the
    /// returned handle is cancelled or dropped.
    fn schedule_repeating(&self, interval: Duration, task: RepeatingTask) -> ScheduleHandle;
}

/// Stops its task when cancelled or dropped.
pub struct ScheduleHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl ScheduleHandle {
    fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for ScheduleHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawns one tokio task per schedule. Must be used inside a runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule_repeating(&self, interval: Duration, mut task: RepeatingTask) -> ScheduleHandle {
        if interval.is_zero() {
            log::warn!("refusing to schedule a task with a zero interval");
            return ScheduleHandle::new(|| {});
        }
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                task();
            }
        });
        ScheduleHandle::new(move || join.abort())
    }
}

struct ManualEntry {
    interval: Duration,
    next_due: Duration,
    task: RepeatingTask,
    active: Arc<AtomicBool>,
}

/// A scheduler whose clock only moves when `advance` is called.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    inner: Arc<Mutex<ManualState>>,
}

#[derive(Default)]
struct ManualState {
    elapsed: Duration,
    entries: Vec<ManualEntry>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward, running each task once for every interval
    /// boundary crossed. Returns how many task runs happened.
    ///
    /// Tasks run without the scheduler lock held, so a task may schedule or
    /// cancel other tasks on the same scheduler.
    pub fn advance(&self, by: Duration) -> usize {
        let (now, mut entries) = {
            let Ok(mut state) = self.inner.lock() else {
                return 0;
            };
            state.elapsed += by;
            (state.elapsed, std::mem::take(&mut state.entries))
        };

        let mut runs = 0;
        for entry in entries.iter_mut() {
            while entry.next_due <= now && entry.active.load(Ordering::SeqCst) {
                (entry.task)();
                entry.next_due += entry.interval;
                runs += 1;
            }
        }

        if let Ok(mut state) = self.inner.lock() {
            // Anything scheduled while the tasks ran goes after the older entries.
            let added = std::mem::replace(&mut state.entries, entries);
            state.entries.extend(added);
            state.entries.retain(|e| e.active.load(Ordering::SeqCst));
        }
        runs
    }

    pub fn active_tasks(&self) -> usize {
        self.inner
            .lock()
            .map(|state| {
                state
                    .entries
                    .iter()
                    .filter(|e| e.active.load(Ordering::SeqCst))
                    .count()
            })
            .unwrap_or(0)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_repeating(&self, interval: Duration, task: RepeatingTask) -> ScheduleHandle {
        if interval.is_zero() {
            log::warn!("refusing to schedule a task with a zero interval");
            return ScheduleHandle::new(|| {});
        }
        let active = Arc::new(AtomicBool::new(true));
        if let Ok(mut state) = self.inner.lock() {
            let next_due = state.elapsed + interval;
            state.entries.push(ManualEntry {
                interval,
                next_due,
                task,
                active: active.clone(),
            });
        }
        ScheduleHandle::new(move || active.store(false, Ordering::SeqCst))
    }
}
