//! Scheduler facade
//!
//! Thin wrapper over the rayon global pool plus an owning-thread outbox.
//! Continuous tasks run in bounded rounds and park between wake events
//! rather than polling the pool. Worker code never frees shared state
//! directly; finalizers go through `enqueue_delete` and run when the
//! owning thread drains the outbox.
//!
//! Author: Moroya Sakamoto

use log::trace;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

type Finalizer = Box<dyn FnOnce() + Send>;

lazy_static::lazy_static! {
    /// Deferred finalizers waiting for the owning thread
    static ref OUTBOX: Mutex<Vec<Finalizer>> = Mutex::new(Vec::new());

    /// Continuous tasks with no work left, waiting to be re-armed
    static ref PARKED: Mutex<Vec<Box<dyn ContinuousTask>>> = Mutex::new(Vec::new());
}

/// Bumped by every wake; a task about to park re-runs instead if a wake
/// arrived during its round, so wakes are never lost
static WAKE_EPOCH: AtomicUsize = AtomicUsize::new(0);

/// Worker threads available to parallel stages
#[inline]
pub fn thread_pool_size() -> usize {
    rayon::current_num_threads()
}

/// Run a one-shot job on the pool
pub fn enqueue_async<F>(job: F)
where
    F: FnOnce() + Send + 'static,
{
    rayon::spawn(job);
}

/// Verdict a continuous task hands back after each invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Nothing left to do this round; park until the next wake
    Converged,
    /// Progress was made; run again right away
    Repainted,
    /// Could not work (e.g. a draw was in flight); park until the next wake
    Skipped,
    /// Finished for good; drop the task
    Remove,
}

/// A recurring task that re-enqueues itself while still useful
pub trait ContinuousTask: Send + 'static {
    /// One bounded slice of work
    fn run(&mut self) -> TaskStatus;
}

/// Keep re-running `task` on the pool while it reports progress
///
/// Rounds that report no progress park the task instead of re-enqueueing
/// it, so an idle task never occupies a worker. Parked tasks stay parked
/// until the owning thread calls [`rearm_continuous`] after an event that
/// could give them work again (a mesh install, an override-mode change,
/// the end of a draw).
pub fn enqueue_continuous<T>(task: T)
where
    T: ContinuousTask,
{
    pump(Box::new(task));
}

fn pump(mut task: Box<dyn ContinuousTask>) {
    rayon::spawn(move || {
        let epoch = WAKE_EPOCH.load(Ordering::Acquire);
        match task.run() {
            TaskStatus::Remove => trace!("continuous task removed"),
            TaskStatus::Repainted => pump(task),
            TaskStatus::Converged | TaskStatus::Skipped => {
                let mut parked = PARKED.lock().unwrap();
                if WAKE_EPOCH.load(Ordering::Acquire) == epoch {
                    parked.push(task);
                } else {
                    // A wake arrived mid-round; its cause may be exactly
                    // what this task was waiting on
                    drop(parked);
                    pump(task);
                }
            }
        }
    });
}

/// Wake every parked continuous task
///
/// The epoch bump happens under the parked-list lock, so a task that was
/// mid-round during the wake observes the bump before parking and runs
/// again instead.
pub fn rearm_continuous() {
    let parked = {
        let mut parked = PARKED.lock().unwrap();
        WAKE_EPOCH.fetch_add(1, Ordering::AcqRel);
        std::mem::take(&mut *parked)
    };
    if !parked.is_empty() {
        trace!("re-arming {} parked continuous tasks", parked.len());
    }
    for task in parked {
        pump(task);
    }
}

/// Defer a finalizer to the owning thread
pub fn enqueue_delete<F>(finalizer: F)
where
    F: FnOnce() + Send + 'static,
{
    OUTBOX.lock().unwrap().push(Box::new(finalizer));
}

/// Run every pending finalizer on the calling thread
///
/// The owning thread calls this once per turn of its own loop.
pub fn drain_outbox() {
    let pending = {
        let mut outbox = OUTBOX.lock().unwrap();
        std::mem::take(&mut *outbox)
    };
    for finalizer in pending {
        finalizer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::sync::Arc;

    #[test]
    fn test_async_job_runs() {
        let (tx, rx) = mpsc::channel();
        enqueue_async(move || {
            tx.send(42).ok();
        });
        assert_eq!(rx.recv_timeout(std::time::Duration::from_secs(10)).unwrap(), 42);
    }

    #[test]
    fn test_continuous_task_runs_until_removed() {
        struct Countdown {
            remaining: usize,
            ticks: Arc<AtomicUsize>,
            done: mpsc::Sender<()>,
        }
        impl ContinuousTask for Countdown {
            fn run(&mut self) -> TaskStatus {
                if self.remaining == 0 {
                    self.done.send(()).ok();
                    return TaskStatus::Remove;
                }
                self.remaining -= 1;
                self.ticks.fetch_add(1, Ordering::SeqCst);
                TaskStatus::Repainted
            }
        }

        let ticks = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();
        enqueue_continuous(Countdown {
            remaining: 5,
            ticks: ticks.clone(),
            done: tx,
        });
        rx.recv_timeout(std::time::Duration::from_secs(10)).unwrap();
        assert_eq!(ticks.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_idle_continuous_task_parks_until_rearmed() {
        struct Idle {
            ticks: Arc<AtomicUsize>,
        }
        impl ContinuousTask for Idle {
            fn run(&mut self) -> TaskStatus {
                self.ticks.fetch_add(1, Ordering::SeqCst);
                TaskStatus::Converged
            }
        }

        let ticks = Arc::new(AtomicUsize::new(0));
        enqueue_continuous(Idle { ticks: ticks.clone() });

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        while ticks.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
            std::thread::yield_now();
        }
        std::thread::sleep(std::time::Duration::from_millis(200));

        // A parked task occupies no worker; a hot loop would rack up
        // thousands of rounds in this window. Concurrent wake events from
        // neighboring tests account for the slack.
        let settled = ticks.load(Ordering::SeqCst);
        assert!(settled < 50, "idle task kept running: {settled} rounds");

        rearm_continuous();
        while ticks.load(Ordering::SeqCst) == settled && std::time::Instant::now() < deadline {
            std::thread::yield_now();
        }
        assert!(ticks.load(Ordering::SeqCst) > settled);
    }

    #[test]
    fn test_outbox_runs_on_draining_thread() {
        let ran = Arc::new(AtomicUsize::new(0));
        let flag = ran.clone();
        enqueue_delete(move || {
            flag.fetch_add(1, Ordering::SeqCst);
        });
        drain_outbox();
        assert!(ran.load(Ordering::SeqCst) >= 1);
        // Draining again is a no-op
        drain_outbox();
    }
}
