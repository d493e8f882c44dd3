use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use log::{error, trace, warn};
use parking_lot::{Condvar, Mutex};

use crate::config::OverflowPolicy;
use crate::error::PipelineError;

#[derive(Debug, Default)]
struct PoolCounters {
    in_flight: Mutex<usize>,
    idle: Condvar,
    submitted: AtomicUsize,
    dropped: AtomicUsize,
    failed: AtomicUsize,
}

/// Fixed-size pool for fire-and-forget maintenance jobs.
///
/// A job that panics is logged and counted; it never takes a worker down.
/// After running, every job holds its worker for `cooldown`.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    policy: OverflowPolicy,
    cooldown: Duration,
    counters: Arc<PoolCounters>,
}

impl WorkerPool {
    pub fn new(threads: usize, policy: OverflowPolicy, cooldown: Duration) -> Result<WorkerPool, PipelineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("sv-maintenance-{}", i))
            .build()
            .map_err(|e| PipelineError::WorkerPool(e.to_string()))?;
        Ok(WorkerPool {
            pool,
            policy,
            cooldown,
            counters: Arc::new(PoolCounters::default()),
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Queues `job` according to the overflow policy. Returns `false` when
    /// the job was dropped.
    pub fn submit<F>(&self, name: &'static str, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut in_flight = self.counters.in_flight.lock();
            match self.policy {
                OverflowPolicy::Unbounded => {}
                OverflowPolicy::Block { capacity } => {
                    while *in_flight >= capacity.max(1) {
                        self.counters.idle.wait(&mut in_flight);
                    }
                }
                OverflowPolicy::Drop { capacity } => {
                    if *in_flight >= capacity.max(1) {
                        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!("{} job dropped, {} jobs in flight", name, *in_flight);
                        return false;
                    }
                }
            }
            *in_flight += 1;
        }
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);

        let counters = self.counters.clone();
        let cooldown = self.cooldown;
        self.pool.spawn(move || {
            trace!("{} job started", name);
            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!("{} job panicked, result discarded", name);
            }
            std::thread::sleep(cooldown);
            *counters.in_flight.lock() -= 1;
            counters.idle.notify_all();
        });
        true
    }

    /// Blocks until no job is queued or running.
    pub fn wait_idle(&self) {
        let mut in_flight = self.counters.in_flight.lock();
        while *in_flight > 0 {
            self.counters.idle.wait(&mut in_flight);
        }
    }

    pub fn in_flight(&self) -> usize {
        *self.counters.in_flight.lock()
    }

    pub fn submitted(&self) -> usize {
        self.counters.submitted.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> usize {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.counters.failed.load(Ordering::Relaxed)
    }
}
