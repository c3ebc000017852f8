//! Streaming SHA-256 file hashing
//!
//! Files are read in fixed-size chunks so memory use does not grow with file size.

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Read buffer size used while hashing
pub const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// Calculate the lowercase hex SHA-256 digest of a file's current contents
pub fn calculate_checksum(path: &Path) -> Result<String> {
    let mut file = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_known_digest() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"hello world").unwrap();
        temp.flush().unwrap();

        let checksum = calculate_checksum(temp.path()).unwrap();
        assert_eq!(
            checksum,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_file_larger_than_chunk() {
        let mut temp = NamedTempFile::new().unwrap();
        let data = vec![0xA5u8; HASH_CHUNK_SIZE * 3 + 17];
        temp.write_all(&data).unwrap();
        temp.flush().unwrap();

        let expected = format!("{:x}", Sha256::digest(&data));
        assert_eq!(calculate_checksum(temp.path()).unwrap(), expected);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(calculate_checksum(&dir.path().join("absent.bin")).is_err());
    }
}
