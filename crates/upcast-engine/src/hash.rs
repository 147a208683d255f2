//! Content hashing for the analysis cache.
//!
//! The cache is keyed by a strong hash of the file bytes, so renaming or
//! re-delivering identical content never triggers a second analysis.

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::error::{EngineError, EngineResult};

const READ_BUF_SIZE: usize = 64 * 1024;

/// Hex SHA-256 of the file's contents.
///
/// An unreadable file is a permanent failure: retrying cannot fix a
/// missing or inaccessible source.
pub async fn content_hash(path: &str) -> EngineResult<String> {
    let mut file = tokio::fs::File::open(path).await.map_err(|e| {
        EngineError::permanent(format!("source file unreadable: {}: {}", path, e))
    })?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];

    loop {
        let n = file.read(&mut buf).await.map_err(|e| {
            EngineError::permanent(format!("source file unreadable: {}: {}", path, e))
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_identical_content_same_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path_a = dir.path().join("a.mp4");
        let path_b = dir.path().join("b.mp4");
        std::fs::write(&path_a, b"same bytes").unwrap();
        std::fs::write(&path_b, b"same bytes").unwrap();

        let hash_a = content_hash(path_a.to_str().unwrap()).await.unwrap();
        let hash_b = content_hash(path_b.to_str().unwrap()).await.unwrap();
        assert_eq!(hash_a, hash_b);
        assert_eq!(hash_a.len(), 64);
        assert!(hash_a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_different_content_different_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path_a = dir.path().join("a.mp4");
        let path_b = dir.path().join("b.mp4");
        std::fs::write(&path_a, b"first").unwrap();
        std::fs::write(&path_b, b"second").unwrap();

        assert_ne!(
            content_hash(path_a.to_str().unwrap()).await.unwrap(),
            content_hash(path_b.to_str().unwrap()).await.unwrap(),
        );
    }

    #[tokio::test]
    async fn test_large_file_streams() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.mp4");
        let mut file = std::fs::File::create(&path).unwrap();
        for _ in 0..40 {
            file.write_all(&[7u8; 8192]).unwrap();
        }
        drop(file);

        let hash = content_hash(path.to_str().unwrap()).await.unwrap();
        assert_eq!(hash.len(), 64);
    }

    #[tokio::test]
    async fn test_missing_file_is_permanent() {
        let err = content_hash("/nonexistent/video.mp4").await.unwrap_err();
        assert!(err.is_permanent());
    }
}
