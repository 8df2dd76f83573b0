//! Per-operation collaborators: HTTP client, settings, cancellation, progress and caches.

use crate::error::{InstallError, InstallResult};
use crate::game::installer::catalog::VersionCatalog;
use crate::game::installer::config::InstallerConfig;
use crate::game::installer::core::lock::{DestinationLock, MarkerFileLock};
use crate::game::installer::types::{CancelToken, Platform, ProgressReporter, SilentProgressReporter};
use crate::game::launcher::version_parser::{resolve_version, ResolvedRuntime};
use reqwest::Client;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

pub struct InstallContext {
    pub client: Client,
    pub config: InstallerConfig,
    pub platform: Platform,
    cancel: CancelToken,
    reporter: Arc<dyn ProgressReporter>,
    lock: Arc<dyn DestinationLock>,
    resolved: Mutex<HashMap<(PathBuf, String), Arc<ResolvedRuntime>>>,
    catalog: OnceCell<Arc<VersionCatalog>>,
}

impl InstallContext {
    pub fn new(config: InstallerConfig) -> InstallResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(concat!("anvil-lib/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| InstallError::network("client setup", e))?;

        let lock = Arc::new(MarkerFileLock::new(config.lock_wait, config.lock_stale_after));
        Ok(Self {
            client,
            platform: Platform::current(),
            cancel: CancelToken::never(),
            reporter: Arc::new(SilentProgressReporter),
            lock,
            resolved: Mutex::new(HashMap::new()),
            catalog: OnceCell::new(),
            config,
        })
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_lock(mut self, lock: Arc<dyn DestinationLock>) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn cancel(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn reporter(&self) -> &dyn ProgressReporter {
        self.reporter.as_ref()
    }

    pub fn lock(&self) -> &dyn DestinationLock {
        self.lock.as_ref()
    }

    pub(crate) fn catalog_cell(&self) -> &OnceCell<Arc<VersionCatalog>> {
        &self.catalog
    }

    /// Resolve through the per-context cache; descriptors are read once per operation.
    pub async fn resolve(
        &self,
        versions_dir: &Path,
        version_id: &str,
    ) -> InstallResult<Arc<ResolvedRuntime>> {
        let key = (versions_dir.to_path_buf(), version_id.to_string());
        let cached = self.resolved_cache().get(&key).cloned();
        if let Some(hit) = cached {
            return Ok(hit);
        }

        let resolved = Arc::new(resolve_version(versions_dir, version_id).await?);
        self.resolved_cache().insert(key, resolved.clone());
        Ok(resolved)
    }

    /// Drop cached resolutions after descriptors on disk change.
    pub fn forget_resolved(&self) {
        self.resolved_cache().clear();
    }

    fn resolved_cache(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<(PathBuf, String), Arc<ResolvedRuntime>>> {
        self.resolved.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn resolution_is_cached_until_forgotten() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path().join("v1");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("v1.json"), r#"{"id":"v1","mainClass":"A"}"#).unwrap();

        let ctx = InstallContext::new(InstallerConfig::default()).unwrap();
        let first = ctx.resolve(tmp.path(), "v1").await.unwrap();
        std::fs::write(dir.join("v1.json"), r#"{"id":"v1","mainClass":"B"}"#).unwrap();
        let second = ctx.resolve(tmp.path(), "v1").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        ctx.forget_resolved();
        let third = ctx.resolve(tmp.path(), "v1").await.unwrap();
        assert_eq!(third.main_class.as_deref(), Some("B"));
    }
}
