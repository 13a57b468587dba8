//! Parallel task-chain framework
//!
//! A chain is an ordered list of stages run against shared meshing state.
//! Each stage fans its element loop out across the pool; `setup` and
//! `done` run exactly once with exclusive access. The chain holds only a
//! weak reference to its target and re-locks it before every stage, so a
//! target dropped mid-chain silently ends the remaining work.
//!
//! Author: Moroya Sakamoto

use log::{debug, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::scheduler;

/// Fan a loop body out over a random-access domain
///
/// Workers claim elements through a shared atomic cursor; each element is
/// claimed exactly once. Returns after every element has completed.
pub fn fan_out_indexed<T, F>(domain: &[T], body: F)
where
    T: Sync,
    F: Fn(usize, &T) + Sync,
{
    let cursor = AtomicUsize::new(0);
    let workers = scheduler::thread_pool_size().min(domain.len().max(1));
    rayon::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|_| loop {
                let claimed = cursor.fetch_add(1, Ordering::Relaxed);
                if claimed >= domain.len() {
                    break;
                }
                body(claimed, &domain[claimed]);
            });
        }
    });
}

/// Fan a loop body out over a forward-only domain
///
/// The iterator advance is the only serialized step; the claimed element
/// runs outside the lock.
pub fn fan_out_iter<I, F>(domain: I, body: F)
where
    I: Iterator + Send,
    I::Item: Send,
    F: Fn(I::Item) + Sync,
{
    let domain = Mutex::new(domain);
    let workers = scheduler::thread_pool_size();
    rayon::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|_| loop {
                let claimed = domain.lock().unwrap().next();
                match claimed {
                    Some(element) => body(element),
                    None => break,
                }
            });
        }
    });
}

/// Fan a loop body out over an integer sequence
pub fn fan_out_range<F>(domain: std::ops::Range<usize>, body: F)
where
    F: Fn(usize) + Sync,
{
    let len = domain.end.saturating_sub(domain.start);
    let start = domain.start;
    let cursor = AtomicUsize::new(0);
    let workers = scheduler::thread_pool_size().min(len.max(1));
    rayon::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|_| loop {
                let claimed = cursor.fetch_add(1, Ordering::Relaxed);
                if claimed >= len {
                    break;
                }
                body(start + claimed);
            });
        }
    });
}

/// Verdict a stage's `done` hands back to the chain driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Hand the shared state to the next stage
    Continue,
    /// Stop the chain; remaining stages never run
    Abort,
}

/// One stage of a task chain over scratch state `S` and target `T`
///
/// `setup` and `done` get exclusive access and fire exactly once per
/// stage; `run` owns the data-parallel part and fans its domain out with
/// the helpers above. Anything `run` writes that is not 1:1 with its
/// claimed element must carry its own lock.
pub trait ChainStage<S, T>: Send {
    /// Stage name for the debug log
    fn name(&self) -> &'static str;

    /// Exclusive pre-pass
    fn setup(&self, _scratch: &mut S, _target: &T) {}

    /// Data-parallel element loop
    fn run(&self, _scratch: &S, _target: &T) {}

    /// Exclusive post-pass; decides whether the chain continues
    fn done(&self, _scratch: &mut S, _target: &T) -> StageOutcome {
        StageOutcome::Continue
    }
}

/// Run a chain asynchronously on the pool
///
/// `relock` is called before every stage; a `None` abandons the rest of
/// the chain without error. `scratch` is owned by the chain and dropped
/// with it.
pub fn run_chain<S, T, F>(mut scratch: S, relock: F, stages: Vec<Box<dyn ChainStage<S, T>>>)
where
    S: Send + 'static,
    T: 'static,
    F: Fn() -> Option<T> + Send + 'static,
{
    scheduler::enqueue_async(move || {
        for stage in &stages {
            let target = match relock() {
                Some(target) => target,
                None => {
                    warn!("chain target dropped before stage {}, abandoning", stage.name());
                    return;
                }
            };
            debug!("chain stage {} starting", stage.name());
            stage.setup(&mut scratch, &target);
            stage.run(&scratch, &target);
            if stage.done(&mut scratch, &target) == StageOutcome::Abort {
                debug!("chain stage {} aborted the chain", stage.name());
                return;
            }
        }
    });
}
