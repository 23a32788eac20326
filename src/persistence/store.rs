//! Persistent chunk store
//!
//! Each stored blob is `StoreHeader ‖ payload`, where the payload is an
//! encoded chunk. A wrong magic, length or content hash is reported as
//! corrupted data; the caller regenerates the chunk and the next save
//! overwrites the blob.

use std::hash::Hasher;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHasher};
use serde::{Deserialize, Serialize};

use crate::constants::persistence::{STORE_MAGIC, STORE_VERSION};
use crate::persistence::{atomic_write, corrupted_data, version_mismatch, PersistenceResult};
use crate::world::{Chunk, ChunkPos};

/// Fixed 20-byte header in front of every stored blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub length: u32,
    pub hash: u64,
}

impl StoreHeader {
    pub const LEN: usize = 20;
}

/// 64-bit content hash of a payload
pub fn content_hash(payload: &[u8]) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(payload);
    hasher.write_usize(payload.len());
    hasher.finish()
}

/// Prefix a payload with its store header
pub fn encode_blob(payload: &[u8]) -> PersistenceResult<Vec<u8>> {
    let header = StoreHeader {
        magic: STORE_MAGIC,
        version: STORE_VERSION,
        length: payload.len() as u32,
        hash: content_hash(payload),
    };
    let mut out = Vec::with_capacity(StoreHeader::LEN + payload.len());
    bincode::serialize_into(&mut out, &header)?;
    out.extend_from_slice(payload);
    Ok(out)
}

/// Validate a blob and return its payload
pub fn decode_blob(blob: &[u8]) -> PersistenceResult<&[u8]> {
    if blob.len() < StoreHeader::LEN {
        return Err(corrupted_data("Blob too small for store header"));
    }
    let header: StoreHeader = bincode::deserialize(&blob[..StoreHeader::LEN])?;
    if header.magic != STORE_MAGIC {
        return Err(corrupted_data("Invalid store magic"));
    }
    if header.version != STORE_VERSION {
        return Err(version_mismatch(STORE_VERSION, header.version));
    }
    let payload = &blob[StoreHeader::LEN..];
    if payload.len() != header.length as usize {
        return Err(corrupted_data(format!(
            "Length mismatch: header says {}, found {}",
            header.length,
            payload.len()
        )));
    }
    if content_hash(payload) != header.hash {
        return Err(corrupted_data("Content hash mismatch"));
    }
    Ok(payload)
}

/// Backing storage for chunk blobs
pub trait ChunkStore: Send + Sync {
    /// Raw blob for a chunk, if one was stored
    fn read(&self, pos: ChunkPos) -> PersistenceResult<Option<Vec<u8>>>;

    fn write(&self, pos: ChunkPos, blob: &[u8]) -> PersistenceResult<()>;

    fn contains(&self, pos: ChunkPos) -> bool;

    /// Load and validate a chunk; `Ok(None)` if nothing is stored
    fn load_chunk(&self, pos: ChunkPos) -> PersistenceResult<Option<Chunk>> {
        let Some(blob) = self.read(pos)? else {
            return Ok(None);
        };
        let payload = decode_blob(&blob)?;
        let chunk = crate::persistence::ChunkSerializer::deserialize(payload)?;
        if chunk.position() != pos {
            return Err(corrupted_data(format!(
                "Blob for {:?} contains chunk {:?}",
                pos,
                chunk.position()
            )));
        }
        Ok(Some(chunk))
    }

    fn save_chunk(&self, chunk: &Chunk) -> PersistenceResult<()> {
        let blob = encode_blob(&chunk.serialize())?;
        self.write(chunk.position(), &blob)
    }
}

/// One file per chunk under a directory, written atomically
pub struct FileChunkStore {
    root: PathBuf,
}

impl FileChunkStore {
    pub fn new(root: impl AsRef<Path>) -> PersistenceResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join("chunks"))?;
        log::info!("[FileChunkStore] Using save directory {}", root.display());
        Ok(Self { root })
    }

    /// Get the file path for a chunk
    pub fn chunk_path(&self, pos: ChunkPos) -> PathBuf {
        self.root
            .join("chunks")
            .join(format!("chunk_{}_{}.bin", pos.x, pos.z))
    }
}

impl ChunkStore for FileChunkStore {
    fn read(&self, pos: ChunkPos) -> PersistenceResult<Option<Vec<u8>>> {
        match std::fs::read(self.chunk_path(pos)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, pos: ChunkPos, blob: &[u8]) -> PersistenceResult<()> {
        atomic_write(&self.chunk_path(pos), blob)
    }

    fn contains(&self, pos: ChunkPos) -> bool {
        self.chunk_path(pos).exists()
    }
}

/// In-memory store used when no save directory is configured
#[derive(Default)]
pub struct MemoryChunkStore {
    blobs: RwLock<FxHashMap<ChunkPos, Vec<u8>>>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    /// Replace a stored blob verbatim; lets tests plant corrupt data
    pub fn insert_raw(&self, pos: ChunkPos, blob: Vec<u8>) {
        self.blobs.write().insert(pos, blob);
    }
}

impl ChunkStore for MemoryChunkStore {
    fn read(&self, pos: ChunkPos) -> PersistenceResult<Option<Vec<u8>>> {
        Ok(self.blobs.read().get(&pos).cloned())
    }

    fn write(&self, pos: ChunkPos, blob: &[u8]) -> PersistenceResult<()> {
        self.blobs.write().insert(pos, blob.to_vec());
        Ok(())
    }

    fn contains(&self, pos: ChunkPos) -> bool {
        self.blobs.read().contains_key(&pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::PersistenceError;
    use crate::world::BlockId;

    #[test]
    fn test_header_is_twenty_bytes() {
        let blob = encode_blob(b"abc").expect("blob should encode");
        assert_eq!(blob.len(), StoreHeader::LEN + 3);
        assert_eq!(&blob[0..4], &STORE_MAGIC);
    }

    #[test]
    fn test_flipped_payload_byte_is_detected() {
        let mut blob = encode_blob(b"payload bytes").expect("blob should encode");
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        match decode_blob(&blob) {
            Err(PersistenceError::CorruptedData(msg)) => assert!(msg.contains("hash")),
            other => panic!("Expected hash mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_magic_is_detected() {
        let mut blob = encode_blob(b"payload").expect("blob should encode");
        blob[0] = b'X';
        assert!(decode_blob(&blob).is_err());
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let store = FileChunkStore::new(dir.path()).expect("store should open");
        let mut chunk = Chunk::new(ChunkPos::new(4, -9), 32);
        chunk.set_block(1, 2, 3, BlockId::BRICK).expect("write should succeed");

        assert!(store.load_chunk(chunk.position()).expect("read should succeed").is_none());
        store.save_chunk(&chunk).expect("save should succeed");
        assert!(store.contains(chunk.position()));
        let loaded = store
            .load_chunk(chunk.position())
            .expect("load should succeed")
            .expect("chunk should exist");
        assert_eq!(loaded.get_block(1, 2, 3), BlockId::BRICK);
    }

    #[test]
    fn test_memory_store_rejects_mismatched_position() {
        let store = MemoryChunkStore::new();
        let chunk = Chunk::new(ChunkPos::new(1, 1), 16);
        let blob = encode_blob(&chunk.serialize()).expect("blob should encode");
        store.insert_raw(ChunkPos::new(2, 2), blob);
        assert!(store.load_chunk(ChunkPos::new(2, 2)).is_err());
    }
}
