//! Fixed-size pools of recycled workers
//!
//! Each pool slot is a long-lived task that runs one job at a time. A job
//! receives the slot's state value, returns it when done, and the slot resets
//! it before dispatching the next run. The number of tasks therefore stays at
//! the configured size no matter how many clients come and go. A panicking
//! run is isolated in its own task; the slot logs it, starts over from a
//! fresh state and keeps serving.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Per-slot state that can be cleared between runs
pub trait Recyclable: Send + 'static {
    /// Return the state to its initial condition
    fn reset(&mut self);
}

/// Counts workers engaged with a client, as opposed to idling in accept or
/// waiting for a pair
#[derive(Debug, Default)]
pub struct Engagement {
    count: AtomicUsize,
}

impl Engagement {
    /// Mark one worker engaged until the guard drops
    pub fn enter(&self) -> EngagedGuard<'_> {
        self.count.fetch_add(1, Ordering::Relaxed);
        EngagedGuard { engagement: self }
    }

    pub fn current(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }
}

#[must_use = "the worker is only engaged while the guard is alive"]
pub struct EngagedGuard<'a> {
    engagement: &'a Engagement,
}

impl Drop for EngagedGuard<'_> {
    fn drop(&mut self) {
        self.engagement.count.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Pool counters
#[derive(Debug, Default)]
struct PoolCounters {
    busy: AtomicUsize,
    runs_completed: AtomicU64,
    runs_failed: AtomicU64,
}

/// Snapshot of pool activity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub size: usize,
    pub busy: usize,
    pub runs_completed: u64,
    pub runs_failed: u64,
}

/// A fixed-size pool of recycled workers
pub struct WorkerPool {
    name: &'static str,
    size: usize,
    slots: Vec<JoinHandle<()>>,
    counters: Arc<PoolCounters>,
    shutdown_tx: watch::Sender<bool>,
}

impl WorkerPool {
    /// Start `size` slots that run `job` repeatedly.
    ///
    /// `job` gets the slot index and the slot's state, and must hand the state back.
    pub fn spawn<S, F, Fut>(name: &'static str, size: usize, job: F) -> Self
    where
        S: Recyclable + Default,
        F: Fn(usize, S) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = S> + Send + 'static,
    {
        let job = Arc::new(job);
        let counters = Arc::new(PoolCounters::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let slots = (0..size)
            .map(|slot| {
                tokio::spawn(run_slot(
                    name,
                    slot,
                    job.clone(),
                    counters.clone(),
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        info!("Started {} pool with {} workers", name, size);

        Self {
            name,
            size,
            slots,
            counters,
            shutdown_tx,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.size,
            busy: self.counters.busy.load(Ordering::Relaxed),
            runs_completed: self.counters.runs_completed.load(Ordering::Relaxed),
            runs_failed: self.counters.runs_failed.load(Ordering::Relaxed),
        }
    }

    /// Stop every slot, cancelling in-flight runs, and wait for the slots to exit
    pub async fn shutdown(&mut self) {
        info!("Stopping {} pool...", self.name);
        let _ = self.shutdown_tx.send(true);
        for slot in self.slots.drain(..) {
            if let Err(e) = slot.await {
                debug!("{} slot ended abnormally: {}", self.name, e);
            }
        }
        info!("✅ {} pool stopped", self.name);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn run_slot<S, F, Fut>(
    name: &'static str,
    slot: usize,
    job: Arc<F>,
    counters: Arc<PoolCounters>,
    mut shutdown: watch::Receiver<bool>,
) where
    S: Recyclable + Default,
    F: Fn(usize, S) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = S> + Send + 'static,
{
    let mut state = S::default();

    loop {
        if *shutdown.borrow() {
            break;
        }

        counters.busy.fetch_add(1, Ordering::Relaxed);
        let mut run = tokio::spawn(job(slot, state));

        let finished = tokio::select! {
            result = &mut run => Some(result),
            _ = shutdown.changed() => None,
        };
        counters.busy.fetch_sub(1, Ordering::Relaxed);

        state = match finished {
            Some(Ok(state)) => {
                counters.runs_completed.fetch_add(1, Ordering::Relaxed);
                state
            }
            Some(Err(e)) => {
                counters.runs_failed.fetch_add(1, Ordering::Relaxed);
                error!("{} worker {} run failed: {}", name, slot, e);
                S::default()
            }
            None => {
                run.abort();
                break;
            }
        };

        state.reset();
        debug!("{} worker {} recycled", name, slot);
    }

    debug!("{} worker {} exiting", name, slot);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Debug, Default)]
    struct Counter {
        value: u32,
        resets: u32,
    }

    impl Recyclable for Counter {
        fn reset(&mut self) {
            self.value = 0;
            self.resets += 1;
        }
    }

    #[tokio::test]
    async fn test_state_is_reset_between_runs() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pool = WorkerPool::spawn("test", 1, move |_slot, mut state: Counter| {
            let tx = tx.clone();
            async move {
                // Each run must observe a cleared value
                let _ = tx.send((state.value, state.resets));
                state.value += 1;
                tokio::time::sleep(Duration::from_millis(1)).await;
                state
            }
        });

        let mut observed = Vec::new();
        for _ in 0..3 {
            observed.push(rx.recv().await.unwrap());
        }
        assert_eq!(observed, vec![(0, 0), (0, 1), (0, 2)]);

        pool.shutdown().await;
        assert!(pool.stats().runs_completed >= 2);
    }

    #[tokio::test]
    async fn test_pool_size_is_fixed() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pool = WorkerPool::spawn("fixed", 3, move |slot, state: Counter| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(slot);
                tokio::time::sleep(Duration::from_millis(5)).await;
                state
            }
        });

        let mut slots = std::collections::HashSet::new();
        for _ in 0..12 {
            slots.insert(rx.recv().await.unwrap());
        }
        assert!(slots.iter().all(|slot| *slot < 3));
        assert_eq!(pool.stats().size, 3);

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_panicking_run_is_recycled() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pool = WorkerPool::spawn("panicky", 1, move |_slot, mut state: Counter| {
            let tx = tx.clone();
            async move {
                state.value += 1;
                let _ = tx.send(());
                if state.resets == 0 {
                    panic!("first run fails");
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
                state
            }
        });

        rx.recv().await.unwrap();
        rx.recv().await.unwrap();
        assert!(pool.stats().runs_failed >= 1);

        pool.shutdown().await;
    }

    #[test]
    fn test_engagement_guard() {
        let engagement = Engagement::default();
        let first = engagement.enter();
        {
            let _second = engagement.enter();
            assert_eq!(engagement.current(), 2);
        }
        assert_eq!(engagement.current(), 1);
        drop(first);
        assert_eq!(engagement.current(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_blocked_runs() {
        let mut pool = WorkerPool::spawn("blocked", 2, |_slot, state: Counter| async move {
            std::future::pending::<()>().await;
            state
        });

        tokio::time::timeout(Duration::from_secs(1), pool.shutdown())
            .await
            .expect("shutdown must not wait for blocked runs");
        assert_eq!(pool.stats().busy, 0);
    }
}
