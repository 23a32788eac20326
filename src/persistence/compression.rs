use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::persistence::{PersistenceError, PersistenceResult};

/// Raw DEFLATE at the default level
pub fn compress(data: &[u8]) -> PersistenceResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len() / 4), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| PersistenceError::CompressionError(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| PersistenceError::CompressionError(e.to_string()))
}

/// Inflate, refusing output larger than `limit` bytes
pub fn decompress(data: &[u8], limit: usize) -> PersistenceResult<Vec<u8>> {
    let decoder = DeflateDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .take(limit as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| PersistenceError::CompressionError(e.to_string()))?;
    if out.len() > limit {
        return Err(PersistenceError::CorruptedData(format!(
            "Decompressed payload exceeds {} bytes",
            limit
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_shrinks_repetitive_data() {
        let data = vec![7u8; 10_000];
        let packed = compress(&data).expect("compression should succeed");
        assert!(packed.len() < 200);
        let unpacked = decompress(&packed, 10_000).expect("decompression should succeed");
        assert_eq!(unpacked, data);
    }

    #[test]
    fn test_decompress_limit() {
        let packed = compress(&vec![1u8; 5000]).expect("compression should succeed");
        assert!(decompress(&packed, 100).is_err());
    }

    #[test]
    fn test_garbage_fails() {
        assert!(decompress(&[0xFF, 0xFF, 0xFF, 0xFF, 0x00], 1000).is_err());
    }
}
