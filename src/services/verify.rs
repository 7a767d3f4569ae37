use super::PipelineError;
use super::source::StagedFile;
use crate::utils::hash::sha256_hex;

/// Confirm the staged file is byte-complete and compute its content digest.
///
/// The size check is strict equality against the on-disk length: a staged
/// file *larger* than expected means a prior partial write corrupted the
/// staging path, not a successful transfer. Only reads the file, never
/// mutates it.
pub async fn verify(staged: &StagedFile, expected_size: u64) -> Result<String, PipelineError> {
    let metadata = tokio::fs::metadata(&staged.path)
        .await
        .map_err(|e| PipelineError::Transfer(format!("stat {}: {}", staged.path.display(), e)))?;

    let actual = metadata.len();
    if actual != expected_size {
        return Err(PipelineError::IncompleteTransfer {
            expected: expected_size,
            actual,
        });
    }

    let file = tokio::fs::File::open(&staged.path)
        .await
        .map_err(|e| PipelineError::Transfer(format!("open {}: {}", staged.path.display(), e)))?;
    let digest = sha256_hex(file)
        .await
        .map_err(|e| PipelineError::Transfer(format!("hash {}: {}", staged.path.display(), e)))?;

    tracing::debug!(
        "verified {} ({} bytes, sha256 {})",
        staged.path.display(),
        actual,
        digest
    );
    Ok(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn stage(dir: &tempfile::TempDir, name: &str, contents: &[u8]) -> StagedFile {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents).unwrap();
        StagedFile {
            path,
            size_bytes: contents.len() as u64,
        }
    }

    #[tokio::test]
    async fn test_verify_matching_size_returns_digest() {
        let dir = tempfile::tempdir().unwrap();
        let staged = stage(&dir, "b1.zpaq", b"hello world");
        let digest = verify(&staged, 11).await.unwrap();
        assert_eq!(
            digest,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn test_verify_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let a = stage(&dir, "a.zpaq", b"same bytes");
        let b = stage(&dir, "b.zpaq", b"same bytes");
        assert_eq!(verify(&a, 10).await.unwrap(), verify(&b, 10).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_short_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let staged = stage(&dir, "short.zpaq", b"abc");
        let err = verify(&staged, 4).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::IncompleteTransfer {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[tokio::test]
    async fn test_verify_oversized_file_fails_too() {
        // Strict equality: a larger-than-expected staging file is
        // corruption from a prior partial write, not success.
        let dir = tempfile::tempdir().unwrap();
        let staged = stage(&dir, "long.zpaq", b"abcdef");
        let err = verify(&staged, 4).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::IncompleteTransfer {
                expected: 4,
                actual: 6
            }
        ));
    }
}
