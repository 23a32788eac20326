use serde::{Deserialize, Serialize};

use crate::biome::BiomeId;
use crate::constants::core::{COLUMN_COUNT, MAX_WORLD_HEIGHT};
use crate::constants::persistence::{CHUNK_FORMAT_VERSION, CHUNK_MAGIC};
use crate::persistence::{compress, corrupted_data, decompress, version_mismatch, PersistenceResult};
use crate::world::{BlockId, Chunk, ChunkPos, NibbleArray};

/// Header for serialized chunks (fixed 28 bytes with bincode's default options)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct ChunkHeader {
    magic: [u8; 4],
    format: u16,
    cx: i32,
    cz: i32,
    height: u16,
    version: u64,
    /// CRC32 of the uncompressed planes
    checksum: u32,
}

const HEADER_LEN: usize = 28;

/// Encodes chunks as header + DEFLATE(RLE blocks ‖ metadata ‖ sky ‖ block light ‖ biomes ‖ heights)
pub struct ChunkSerializer;

impl ChunkSerializer {
    pub fn serialize(chunk: &Chunk) -> Vec<u8> {
        let planes = Self::encode_planes(chunk);
        let checksum = calculate_checksum(&planes);

        let header = ChunkHeader {
            magic: CHUNK_MAGIC,
            format: CHUNK_FORMAT_VERSION,
            cx: chunk.position().x,
            cz: chunk.position().z,
            height: chunk.height() as u16,
            version: chunk.version(),
            checksum,
        };

        let mut out = Vec::with_capacity(HEADER_LEN + planes.len() / 8);
        // Serializing a plain struct into a Vec cannot fail
        if let Err(e) = bincode::serialize_into(&mut out, &header) {
            log::error!("[ChunkSerializer::serialize] Header encoding failed: {}", e);
        }
        match compress(&planes) {
            Ok(packed) => out.extend_from_slice(&packed),
            Err(e) => log::error!("[ChunkSerializer::serialize] Compression failed: {}", e),
        }
        out
    }

    pub fn deserialize(data: &[u8]) -> PersistenceResult<Chunk> {
        if data.len() < HEADER_LEN {
            return Err(corrupted_data("Data too small to contain valid chunk header"));
        }
        let header: ChunkHeader = bincode::deserialize(&data[..HEADER_LEN])?;
        if header.magic != CHUNK_MAGIC {
            return Err(corrupted_data("Invalid chunk magic"));
        }
        if header.format != CHUNK_FORMAT_VERSION {
            return Err(version_mismatch(CHUNK_FORMAT_VERSION as u32, header.format as u32));
        }
        let height = header.height as usize;
        if height == 0 || height % 16 != 0 || height > MAX_WORLD_HEIGHT as usize {
            return Err(corrupted_data(format!("Invalid chunk height {}", height)));
        }

        let volume = COLUMN_COUNT * height;
        let nibble_len = (volume + 1) / 2;
        let limit = 4 + volume * 6 + nibble_len * 3 + COLUMN_COUNT * 3;
        let planes = decompress(&data[HEADER_LEN..], limit)?;
        if calculate_checksum(&planes) != header.checksum {
            return Err(corrupted_data("Checksum mismatch"));
        }

        let mut reader = PlaneReader::new(&planes);
        let blocks = decode_rle(&mut reader, volume)?;
        let metadata = reader.nibbles(volume, "metadata")?;
        let sky = reader.nibbles(volume, "sky light")?;
        let block_light = reader.nibbles(volume, "block light")?;
        let biomes: Vec<BiomeId> = bytemuck::cast_slice(reader.take(COLUMN_COUNT, "biomes")?).to_vec();
        let mut heights = Vec::with_capacity(COLUMN_COUNT);
        for _ in 0..COLUMN_COUNT {
            heights.push(reader.u16("height map")?);
        }
        if !reader.is_done() {
            return Err(corrupted_data("Trailing bytes after chunk planes"));
        }

        let chunk = Chunk::from_planes(
            ChunkPos::new(header.cx, header.cz),
            height,
            header.version,
            blocks,
            metadata,
            sky,
            block_light,
            biomes,
        );
        if chunk.height_plane() != heights.as_slice() {
            return Err(corrupted_data("Height map does not match block data"));
        }
        Ok(chunk)
    }

    fn encode_planes(chunk: &Chunk) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(chunk.volume() * 2);

        // RLE encode the blocks
        let mut runs: Vec<(BlockId, u32)> = Vec::new();
        for &block in chunk.blocks() {
            match runs.last_mut() {
                Some((id, len)) if *id == block => *len += 1,
                _ => runs.push((block, 1)),
            }
        }
        buffer.extend_from_slice(&(runs.len() as u32).to_le_bytes());
        for (block, length) in runs {
            buffer.extend_from_slice(&block.0.to_le_bytes());
            buffer.extend_from_slice(&length.to_le_bytes());
        }

        buffer.extend_from_slice(chunk.metadata_plane().as_bytes());
        buffer.extend_from_slice(chunk.sky_plane().as_bytes());
        buffer.extend_from_slice(chunk.block_light_plane().as_bytes());
        buffer.extend_from_slice(bytemuck::cast_slice(chunk.biome_plane()));
        for h in chunk.height_plane() {
            buffer.extend_from_slice(&h.to_le_bytes());
        }
        buffer
    }
}

fn decode_rle(reader: &mut PlaneReader<'_>, volume: usize) -> PersistenceResult<Vec<BlockId>> {
    let run_count = reader.u32("run count")? as usize;
    if run_count > volume {
        return Err(corrupted_data("Invalid run count"));
    }
    let mut blocks = Vec::with_capacity(volume);
    for _ in 0..run_count {
        let id = BlockId(reader.u16("run id")?);
        let length = reader.u32("run length")? as usize;
        if length == 0 || blocks.len() + length > volume {
            return Err(corrupted_data("Invalid block count"));
        }
        blocks.resize(blocks.len() + length, id);
    }
    if blocks.len() != volume {
        return Err(corrupted_data("Invalid block count"));
    }
    Ok(blocks)
}

/// Bounds-checked cursor over the decoded planes
struct PlaneReader<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl<'a> PlaneReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, cursor: 0 }
    }

    fn take(&mut self, len: usize, what: &str) -> PersistenceResult<&'a [u8]> {
        if self.cursor + len > self.data.len() {
            return Err(corrupted_data(format!("Missing {}", what)));
        }
        let slice = &self.data[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(slice)
    }

    fn u16(&mut self, what: &str) -> PersistenceResult<u16> {
        let b = self.take(2, what)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self, what: &str) -> PersistenceResult<u32> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn nibbles(&mut self, len: usize, what: &str) -> PersistenceResult<NibbleArray> {
        let bytes = self.take((len + 1) / 2, what)?.to_vec();
        NibbleArray::from_bytes(len, bytes).ok_or_else(|| corrupted_data(format!("Bad {} plane", what)))
    }

    fn is_done(&self) -> bool {
        self.cursor == self.data.len()
    }
}

/// Calculate CRC32 checksum
fn calculate_checksum(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::PersistenceError;

    fn sample_chunk() -> Chunk {
        let mut chunk = Chunk::new(ChunkPos::new(-3, 7), 64);
        chunk.fill_layer(0, BlockId::BEDROCK);
        for lx in 0..16 {
            chunk
                .set_block(lx, 1 + (lx % 5), 3, BlockId::STONE)
                .expect("write should succeed");
        }
        chunk.set_light(2, 40, 2, crate::lighting::LightChannel::Sky, 15);
        chunk.set_light(2, 2, 2, crate::lighting::LightChannel::Block, 9);
        chunk.set_biome(4, 4, BiomeId(3));
        chunk
    }

    #[test]
    fn test_header_length_matches_bincode() {
        let header = ChunkHeader {
            magic: CHUNK_MAGIC,
            format: 0,
            cx: 0,
            cz: 0,
            height: 0,
            version: 0,
            checksum: 0,
        };
        let size = bincode::serialized_size(&header).expect("size should be computable");
        assert_eq!(size as usize, HEADER_LEN);
    }

    #[test]
    fn test_round_trip_preserves_planes() {
        let chunk = sample_chunk();
        let bytes = ChunkSerializer::serialize(&chunk);
        let decoded = ChunkSerializer::deserialize(&bytes).expect("chunk should decode");
        assert_eq!(decoded.position(), chunk.position());
        assert_eq!(decoded.version(), chunk.version());
        assert_eq!(decoded.blocks(), chunk.blocks());
        assert_eq!(decoded.get_light(2, 40, 2).sky, 15);
        assert_eq!(decoded.get_light(2, 2, 2).block, 9);
        assert_eq!(decoded.get_biome(4, 4), BiomeId(3));
        assert_eq!(decoded.height_at(5, 3), chunk.height_at(5, 3));
        assert!(!decoded.is_modified());
        assert_eq!(ChunkSerializer::serialize(&decoded), bytes);
    }

    #[test]
    fn test_corruption_detection_invalid_magic() {
        let mut bytes = ChunkSerializer::serialize(&sample_chunk());
        bytes[0..4].copy_from_slice(b"FAKE");
        match ChunkSerializer::deserialize(&bytes) {
            Err(PersistenceError::CorruptedData(msg)) => assert!(msg.contains("Invalid chunk magic")),
            other => panic!("Expected CorruptedData error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_corruption_detection_invalid_size() {
        match ChunkSerializer::deserialize(&[0u8; 10]) {
            Err(PersistenceError::CorruptedData(msg)) => assert!(msg.contains("Data too small")),
            other => panic!("Expected CorruptedData error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_corruption_detection_payload_flip() {
        let mut bytes = ChunkSerializer::serialize(&sample_chunk());
        let idx = bytes.len() - 3;
        bytes[idx] ^= 0x5A;
        assert!(ChunkSerializer::deserialize(&bytes).is_err());
    }

    #[test]
    fn test_corruption_detection_bad_version() {
        let mut bytes = ChunkSerializer::serialize(&sample_chunk());
        bytes[4..6].copy_from_slice(&99u16.to_le_bytes());
        match ChunkSerializer::deserialize(&bytes) {
            Err(PersistenceError::VersionMismatch { found, .. }) => assert_eq!(found, 99),
            other => panic!("Expected VersionMismatch error, got {:?}", other.map(|_| ())),
        }
    }
}
