use crate::error::{InstallResult, IoResultExt};
use sha1::{Digest, Sha1};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// What a file on disk must look like to be reused.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expected {
    pub size: Option<u64>,
    pub sha1: Option<String>,
}

impl Expected {
    pub fn new(size: Option<u64>, sha1: Option<&str>) -> Self {
        Self {
            size,
            sha1: sha1.map(|s| s.to_ascii_lowercase()),
        }
    }

    pub fn sha1(sha1: &str) -> Self {
        Self::new(None, Some(sha1))
    }

    /// Existence alone satisfies an empty expectation.
    pub fn is_empty(&self) -> bool {
        self.size.is_none() && self.sha1.is_none()
    }
}

/// Check a file against its expected size and SHA-1.
///
/// Missing files and directories report `false`; other read failures are errors.
pub async fn verify_file(path: &Path, expected: &Expected) -> InstallResult<bool> {
    let meta = match tokio::fs::metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e).at(path),
    };
    if !meta.is_file() {
        log::debug!("Not a regular file, treating as unverified: {:?}", path);
        return Ok(false);
    }

    if let Some(size) = expected.size {
        if meta.len() != size {
            log::debug!(
                "Size mismatch for {:?}: expected {}, found {}",
                path,
                size,
                meta.len()
            );
            return Ok(false);
        }
    }

    if let Some(ref sha1) = expected.sha1 {
        let computed = sha1_file(path).await?;
        if !computed.eq_ignore_ascii_case(sha1) {
            log::debug!("SHA1 mismatch for {:?}: {} != {}", path, computed, sha1);
            return Ok(false);
        }
    }

    Ok(true)
}

/// Streaming lowercase hex SHA-1 of a file.
pub async fn sha1_file(path: &Path) -> InstallResult<String> {
    let mut file = tokio::fs::File::open(path).await.at(path)?;
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await.at(path)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn sha1_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
