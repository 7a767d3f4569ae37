use sha2::{Digest, Sha256};

/// Stream a reader through SHA-256 and return the lowercase hex digest.
///
/// The digest is stable and non-keyed so values can be compared across
/// runs and surfaced for audit.
pub async fn sha256_hex<R: tokio::io::AsyncRead + Unpin>(mut reader: R) -> anyhow::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = tokio::io::AsyncReadExt::read(&mut reader, &mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sha256_known_vector() {
        let hash = sha256_hex(&b"hello world"[..]).await.unwrap();
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn test_sha256_empty() {
        let hash = sha256_hex(&b""[..]).await.unwrap();
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn test_sha256_bit_flip_changes_digest() {
        let a = sha256_hex(&b"backup-2025.zpaq contents"[..]).await.unwrap();
        let b = sha256_hex(&b"backup-2025.zpaq bontents"[..]).await.unwrap();
        assert_ne!(a, b);
    }
}
