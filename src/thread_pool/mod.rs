//! Fixed-size worker pool for chunk generation, disk I/O and saves.

pub mod thread_pool;

pub use thread_pool::{JobKind, PoolCounters, PoolStats, WorkerPool, WorkerPoolConfig};
