//! Persistence of chunk blobs
//!
//! Chunks are encoded by `ChunkSerializer` and handed to a `ChunkStore`
//! wrapped in a store header (magic, version, length, content hash).

pub mod chunk_serializer;
pub mod compression;
pub mod error;
pub mod store;

pub use chunk_serializer::ChunkSerializer;
pub use compression::{compress, decompress};
pub use error::{atomic_write, corrupted_data, version_mismatch};
pub use store::{
    content_hash, decode_blob, encode_blob, ChunkStore, FileChunkStore, MemoryChunkStore,
    StoreHeader,
};

/// Result type for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Errors that can occur during persistence operations
#[derive(Debug)]
pub enum PersistenceError {
    IoError(std::io::Error),
    SerializationError(String),
    CompressionError(String),
    VersionMismatch { expected: u32, found: u32 },
    CorruptedData(String),
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceError::IoError(e) => write!(f, "IO error: {}", e),
            PersistenceError::SerializationError(e) => write!(f, "Serialization error: {}", e),
            PersistenceError::CompressionError(e) => write!(f, "Compression error: {}", e),
            PersistenceError::VersionMismatch { expected, found } => {
                write!(f, "Version mismatch: expected {}, found {}", expected, found)
            }
            PersistenceError::CorruptedData(e) => write!(f, "Corrupted data: {}", e),
        }
    }
}

impl std::error::Error for PersistenceError {}

impl From<std::io::Error> for PersistenceError {
    fn from(err: std::io::Error) -> Self {
        PersistenceError::IoError(err)
    }
}

impl From<bincode::Error> for PersistenceError {
    fn from(err: bincode::Error) -> Self {
        PersistenceError::SerializationError(err.to_string())
    }
}
