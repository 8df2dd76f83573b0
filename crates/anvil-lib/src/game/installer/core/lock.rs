//! Per-destination exclusive locks for the download engine.

use crate::error::{InstallError, InstallResult, IoResultExt};
use futures::future::BoxFuture;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

const INITIAL_BACKOFF: Duration = Duration::from_millis(25);
const MAX_BACKOFF: Duration = Duration::from_millis(500);

/// Held while one worker owns a destination path. Dropping releases it.
pub trait LockHandle: Send {
    fn release(self: Box<Self>);
}

/// Strategy for excluding concurrent writers of the same destination.
pub trait DestinationLock: Send + Sync {
    fn acquire<'a>(
        &'a self,
        destination: &'a Path,
    ) -> BoxFuture<'a, InstallResult<Box<dyn LockHandle>>>;
}

/// `<dest>.lock` created with exclusive-create; works across processes.
#[derive(Debug, Clone)]
pub struct MarkerFileLock {
    pub wait: Duration,
    pub stale_after: Duration,
}

impl MarkerFileLock {
    pub fn new(wait: Duration, stale_after: Duration) -> Self {
        Self { wait, stale_after }
    }

    pub fn marker_path(destination: &Path) -> PathBuf {
        let mut name = destination
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        destination.with_file_name(name)
    }

    fn try_create(marker: &Path) -> std::io::Result<bool> {
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(marker)
        {
            Ok(mut file) => {
                let _ = writeln!(file, "{}", std::process::id());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn is_stale(&self, marker: &Path) -> bool {
        std::fs::metadata(marker)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .map(|age| age > self.stale_after)
            .unwrap_or(false)
    }

    /// Move a stale marker aside before deleting it, so a reclaimer that lost the
    /// race can never delete the marker its winner just created.
    fn reclaim(&self, marker: &Path) -> std::io::Result<()> {
        let mut name = marker.as_os_str().to_os_string();
        name.push(format!(".stale-{}-{:016x}", std::process::id(), rand::random::<u64>()));
        let aside = PathBuf::from(name);
        match std::fs::rename(marker, &aside) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        }

        if self.is_stale(&aside) {
            log::warn!("Reclaimed stale lock {:?}", marker);
        } else {
            // A live marker was taken between the check and the rename; put it back
            // unless a newer one already sits there.
            match std::fs::hard_link(&aside, marker) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e),
            }
        }
        std::fs::remove_file(&aside)
    }

    async fn acquire_marker(&self, destination: &Path) -> InstallResult<MarkerGuard> {
        let marker = Self::marker_path(destination);
        if let Some(parent) = marker.parent() {
            tokio::fs::create_dir_all(parent).await.at(parent)?;
        }

        let started = Instant::now();
        let mut backoff = INITIAL_BACKOFF;
        loop {
            if Self::try_create(&marker).at(&marker)? {
                log::debug!("Acquired lock {:?}", marker);
                return Ok(MarkerGuard { path: marker });
            }

            if self.is_stale(&marker) {
                self.reclaim(&marker).at(&marker)?;
                continue;
            }

            let waited = started.elapsed();
            if waited >= self.wait {
                return Err(InstallError::LockTimeout {
                    path: destination.to_path_buf(),
                    waited,
                });
            }

            tokio::time::sleep(backoff.min(self.wait - waited)).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }
}

impl DestinationLock for MarkerFileLock {
    fn acquire<'a>(
        &'a self,
        destination: &'a Path,
    ) -> BoxFuture<'a, InstallResult<Box<dyn LockHandle>>> {
        Box::pin(async move {
            let guard = self.acquire_marker(destination).await?;
            Ok(Box::new(guard) as Box<dyn LockHandle>)
        })
    }
}

struct MarkerGuard {
    path: PathBuf,
}

impl LockHandle for MarkerGuard {
    fn release(self: Box<Self>) {}
}

impl Drop for MarkerGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to remove lock {:?}: {}", self.path, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn acquire_and_release_removes_marker() {
        let tmp = tempdir().unwrap();
        let dest = tmp.path().join("lib.jar");
        let lock = MarkerFileLock::new(Duration::from_secs(1), Duration::from_secs(60));

        let handle = lock.acquire(&dest).await.unwrap();
        let marker = MarkerFileLock::marker_path(&dest);
        assert!(marker.exists());
        handle.release();
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn held_lock_times_out() {
        let tmp = tempdir().unwrap();
        let dest = tmp.path().join("lib.jar");
        let lock = MarkerFileLock::new(Duration::from_millis(120), Duration::from_secs(60));

        let _held = lock.acquire(&dest).await.unwrap();
        let err = match lock.acquire(&dest).await {
            Err(e) => e,
            Ok(_) => panic!("second acquire must not succeed"),
        };
        assert!(matches!(err, InstallError::LockTimeout { .. }));
    }

    #[tokio::test]
    async fn stale_marker_is_reclaimed() {
        let tmp = tempdir().unwrap();
        let dest = tmp.path().join("lib.jar");
        std::fs::write(MarkerFileLock::marker_path(&dest), b"12345").unwrap();

        // Zero staleness threshold: any existing marker counts as abandoned
        let lock = MarkerFileLock::new(Duration::from_secs(1), Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let handle = lock.acquire(&dest).await.unwrap();
        handle.release();
    }

    #[tokio::test]
    async fn late_reclaimer_keeps_a_fresh_marker() {
        let tmp = tempdir().unwrap();
        let dest = tmp.path().join("lib.jar");
        let lock = MarkerFileLock::new(Duration::from_millis(100), Duration::from_secs(60));

        // The winner of a reclaim race already holds a new marker
        let winner = lock.acquire(&dest).await.unwrap();
        let marker = MarkerFileLock::marker_path(&dest);
        lock.reclaim(&marker).unwrap();

        assert!(marker.exists());
        assert!(matches!(
            lock.acquire(&dest).await,
            Err(InstallError::LockTimeout { .. })
        ));
        let leftovers: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".stale-"))
            .collect();
        assert!(leftovers.is_empty());
        winner.release();
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn reclaim_of_vanished_marker_is_quiet() {
        let tmp = tempdir().unwrap();
        let lock = MarkerFileLock::new(Duration::from_secs(1), Duration::ZERO);
        let marker = MarkerFileLock::marker_path(&tmp.path().join("gone.jar"));
        lock.reclaim(&marker).unwrap();
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn waiter_proceeds_after_release() {
        let tmp = tempdir().unwrap();
        let dest = tmp.path().join("lib.jar");
        let lock = MarkerFileLock::new(Duration::from_secs(5), Duration::from_secs(60));

        let first = lock.acquire(&dest).await.unwrap();
        let releaser = async {
            tokio::time::sleep(Duration::from_millis(60)).await;
            first.release();
        };
        let (_, second) = tokio::join!(releaser, lock.acquire(&dest));
        assert!(second.is_ok());
    }
}
