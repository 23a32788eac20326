//! Persistence error helpers

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::persistence::{PersistenceError, PersistenceResult};

/// Create a corrupted data error
pub fn corrupted_data(reason: impl Into<String>) -> PersistenceError {
    PersistenceError::CorruptedData(reason.into())
}

/// Create a version mismatch error
pub fn version_mismatch(expected: u32, found: u32) -> PersistenceError {
    PersistenceError::VersionMismatch { expected, found }
}

/// Write a file by writing a sibling temp file and renaming it over the target
pub fn atomic_write(path: &Path, data: &[u8]) -> PersistenceResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_write_replaces_content() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("nested").join("blob.bin");
        atomic_write(&path, b"first").expect("first write should succeed");
        atomic_write(&path, b"second").expect("second write should succeed");
        assert_eq!(fs::read(&path).expect("file should exist"), b"second");
        assert!(!dir.path().join("nested").join("blob.bin.tmp").exists());
    }
}
