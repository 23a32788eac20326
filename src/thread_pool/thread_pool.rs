/// Worker pool for chunk jobs
///
/// A single rayon pool of fixed size. Jobs report their results through
/// channels owned by the submitter, so the pool itself never blocks the
/// world thread.
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{WorldError, WorldResult};

/// Job categories, tracked separately in the statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Terrain generation and chunk lighting
    Generate,
    /// Reading a blob from the store
    Load,
    /// Writing a blob to the store
    Save,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [JobKind::Generate, JobKind::Load, JobKind::Save];

    fn slot(self) -> usize {
        match self {
            JobKind::Generate => 0,
            JobKind::Load => 1,
            JobKind::Save => 2,
        }
    }
}

/// Configuration for the worker pool
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub threads: usize,
    /// Stack size for worker threads (in bytes)
    pub stack_size: Option<usize>,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            threads: num_cpus::get().saturating_sub(1).clamp(1, 4),
            stack_size: Some(2 * 1024 * 1024),
        }
    }
}

/// Lock-free counters for one job kind
#[derive(Debug, Default)]
pub struct PoolCounters {
    pub submitted: AtomicU64,
    pub completed: AtomicU64,
    pub active: AtomicUsize,
    pub peak_active: AtomicUsize,
    pub total_time_ns: AtomicU64,
}

/// Snapshot of the pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PoolStats {
    pub threads: usize,
    pub submitted: [u64; 3],
    pub completed: [u64; 3],
    pub in_flight: usize,
    pub peak_in_flight: usize,
    pub average_job_ms: [f64; 3],
}

pub struct WorkerPool {
    pool: ThreadPool,
    threads: usize,
    counters: Arc<[PoolCounters; 3]>,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig) -> WorldResult<Self> {
        let threads = config.threads.max(1);
        let mut builder = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("chunk-worker-{}", idx));
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }
        let pool = builder
            .build()
            .map_err(|e| WorldError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;

        log::info!("[WorkerPool] Started {} chunk workers", threads);
        Ok(Self {
            pool,
            threads,
            counters: Arc::new(Default::default()),
        })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Queue a job; it runs on a worker thread
    pub fn spawn<F>(&self, kind: JobKind, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let counters = Arc::clone(&self.counters);
        let slot = kind.slot();
        counters[slot].submitted.fetch_add(1, Ordering::Relaxed);
        let active = counters[slot].active.fetch_add(1, Ordering::Relaxed) + 1;
        counters[slot].peak_active.fetch_max(active, Ordering::Relaxed);

        self.pool.spawn(move || {
            let start = Instant::now();
            job();
            let c = &counters[slot];
            c.total_time_ns.fetch_add(start.elapsed().as_nanos() as u64, Ordering::Relaxed);
            c.completed.fetch_add(1, Ordering::Relaxed);
            c.active.fetch_sub(1, Ordering::Relaxed);
        });
    }

    /// Jobs submitted but not finished
    pub fn in_flight(&self) -> usize {
        self.counters.iter().map(|c| c.active.load(Ordering::Relaxed)).sum()
    }

    pub fn stats(&self) -> PoolStats {
        let mut stats = PoolStats {
            threads: self.threads,
            in_flight: self.in_flight(),
            ..PoolStats::default()
        };
        for kind in JobKind::ALL {
            let c = &self.counters[kind.slot()];
            let slot = kind.slot();
            stats.submitted[slot] = c.submitted.load(Ordering::Relaxed);
            stats.completed[slot] = c.completed.load(Ordering::Relaxed);
            stats.peak_in_flight += c.peak_active.load(Ordering::Relaxed);
            let done = stats.completed[slot];
            stats.average_job_ms[slot] = if done == 0 {
                0.0
            } else {
                c.total_time_ns.load(Ordering::Relaxed) as f64 / done as f64 / 1_000_000.0
            };
        }
        stats
    }
}
