//! World error handling
//!
//! Every fallible world operation returns `WorldResult<T>`. Errors that are
//! confined to a single chunk or query are also tallied in `ErrorCounters` so
//! the world thread can keep running while the failures stay observable.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::persistence::PersistenceError;

/// Type alias for world operation results
pub type WorldResult<T> = Result<T, WorldError>;

/// World runtime errors
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("Position out of bounds: {x}, {y}, {z}")]
    OutOfBounds { x: i32, y: i32, z: i32 },

    #[error("Chunk not loaded: {cx}, {cz}")]
    ChunkNotLoaded { cx: i32, cz: i32 },

    #[error("Corrupt chunk blob: {message}")]
    CorruptChunk { message: String },

    #[error("Invalid geometry: {message}")]
    InvalidGeometry { message: String },

    #[error("Work budget exhausted in {operation}")]
    BudgetExhausted { operation: String },

    #[error("Registry full: {registry} (capacity {capacity})")]
    RegistryFull { registry: String, capacity: usize },

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorldError {
    /// Stable kind of this error, used for counting
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorldError::OutOfBounds { .. } => ErrorKind::OutOfBounds,
            WorldError::ChunkNotLoaded { .. } => ErrorKind::ChunkNotLoaded,
            WorldError::CorruptChunk { .. } => ErrorKind::CorruptChunk,
            WorldError::InvalidGeometry { .. } => ErrorKind::InvalidGeometry,
            WorldError::BudgetExhausted { .. } => ErrorKind::BudgetExhausted,
            WorldError::RegistryFull { .. } => ErrorKind::RegistryFull,
            WorldError::Config(_) => ErrorKind::Config,
            WorldError::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<PersistenceError> for WorldError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::IoError(e) => WorldError::Io(e),
            other => WorldError::CorruptChunk {
                message: other.to_string(),
            },
        }
    }
}

/// Error kinds tracked by `ErrorCounters`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    OutOfBounds,
    ChunkNotLoaded,
    CorruptChunk,
    InvalidGeometry,
    BudgetExhausted,
    RegistryFull,
    Config,
    Io,
}

/// Create an out-of-bounds error
pub fn out_of_bounds(x: i32, y: i32, z: i32) -> WorldError {
    WorldError::OutOfBounds { x, y, z }
}

/// Create an invalid geometry error
pub fn invalid_geometry(message: impl Into<String>) -> WorldError {
    WorldError::InvalidGeometry {
        message: message.into(),
    }
}

/// Create a corrupt chunk error
pub fn corrupt_chunk(message: impl Into<String>) -> WorldError {
    WorldError::CorruptChunk {
        message: message.into(),
    }
}

/// Create a budget exhausted error
pub fn budget_exhausted(operation: impl Into<String>) -> WorldError {
    WorldError::BudgetExhausted {
        operation: operation.into(),
    }
}

/// Create a registry full error
pub fn registry_full(registry: impl Into<String>, capacity: usize) -> WorldError {
    WorldError::RegistryFull {
        registry: registry.into(),
        capacity,
    }
}

/// Shared, lock-free error tallies
#[derive(Debug, Default)]
pub struct ErrorCounters {
    out_of_bounds: AtomicU64,
    chunk_not_loaded: AtomicU64,
    corrupt_chunk: AtomicU64,
    invalid_geometry: AtomicU64,
    budget_exhausted: AtomicU64,
    registry_full: AtomicU64,
    io: AtomicU64,
}

/// Point-in-time copy of `ErrorCounters`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorCounts {
    pub out_of_bounds: u64,
    pub chunk_not_loaded: u64,
    pub corrupt_chunk: u64,
    pub invalid_geometry: u64,
    pub budget_exhausted: u64,
    pub registry_full: u64,
    pub io: u64,
}

impl ErrorCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: ErrorKind) {
        let counter = match kind {
            ErrorKind::OutOfBounds => &self.out_of_bounds,
            ErrorKind::ChunkNotLoaded => &self.chunk_not_loaded,
            ErrorKind::CorruptChunk => &self.corrupt_chunk,
            ErrorKind::InvalidGeometry => &self.invalid_geometry,
            ErrorKind::BudgetExhausted => &self.budget_exhausted,
            ErrorKind::RegistryFull => &self.registry_full,
            // Config errors are fatal at init and never reach a counter
            ErrorKind::Config => return,
            ErrorKind::Io => &self.io,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an error and hand it back, for use in `map_err` chains
    pub fn note(&self, err: WorldError) -> WorldError {
        self.record(err.kind());
        err
    }

    pub fn snapshot(&self) -> ErrorCounts {
        ErrorCounts {
            out_of_bounds: self.out_of_bounds.load(Ordering::Relaxed),
            chunk_not_loaded: self.chunk_not_loaded.load(Ordering::Relaxed),
            corrupt_chunk: self.corrupt_chunk.load(Ordering::Relaxed),
            invalid_geometry: self.invalid_geometry.load(Ordering::Relaxed),
            budget_exhausted: self.budget_exhausted.load(Ordering::Relaxed),
            registry_full: self.registry_full.load(Ordering::Relaxed),
            io: self.io.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_track_kinds() {
        let counters = ErrorCounters::new();
        counters.record(ErrorKind::CorruptChunk);
        counters.record(ErrorKind::CorruptChunk);
        let err = counters.note(invalid_geometry("nan"));
        assert_eq!(err.kind(), ErrorKind::InvalidGeometry);

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.corrupt_chunk, 2);
        assert_eq!(snapshot.invalid_geometry, 1);
        assert_eq!(snapshot.out_of_bounds, 0);
    }

    #[test]
    fn test_persistence_errors_become_corrupt_chunk() {
        let err: WorldError = PersistenceError::CorruptedData("bad magic".into()).into();
        assert_eq!(err.kind(), ErrorKind::CorruptChunk);
    }
}
