//! Centralized installer settings.
//! Constants are the production defaults; `InstallerConfig` carries the values an
//! operation actually uses so tests can point every endpoint at a mock server.

use std::path::PathBuf;
use std::time::Duration;

// Timing
pub const CONNECT_TIMEOUT_SECS: u64 = 15;
pub const REQUEST_TIMEOUT_SECS: u64 = 120;
pub const LOCK_WAIT_SECS: u64 = 600;
pub const LOCK_STALE_SECS: u64 = 300;
pub const PROGRESS_INTERVAL_MS: u64 = 100;
pub const DEFAULT_CONCURRENCY: usize = 8;
pub const ASSET_WORKERS: usize = 8;

// URL Constants
pub const VANILLA_MANIFEST_URL: &str =
    "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";
pub const LIBRARIES_BASE_URL: &str = "https://libraries.minecraft.net/";
pub const RESOURCES_BASE_URL: &str = "https://resources.download.minecraft.net/";
pub const FABRIC_META_URL: &str = "https://meta.fabricmc.net/v2";
pub const QUILT_META_URL: &str = "https://meta.quiltmc.org/v3";
pub const NEOFORGE_MAVEN_URL: &str = "https://maven.neoforged.net/releases/";
pub const FORGE_MAVEN_URL: &str = "https://maven.minecraftforge.net/";

/// Runtime settings for one install or launch-preparation operation.
#[derive(Debug, Clone)]
pub struct InstallerConfig {
    pub concurrency: usize,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Upper bound on waiting for another worker's destination lock.
    pub lock_wait: Duration,
    /// Lock markers older than this are treated as abandoned.
    pub lock_stale_after: Duration,
    pub progress_interval: Duration,
    /// Explicit `java` for processor steps; falls back to PATH lookup.
    pub java_path: Option<PathBuf>,
    pub manifest_url: String,
    pub libraries_base_url: String,
    pub resources_base_url: String,
    pub fabric_meta_url: String,
    pub quilt_meta_url: String,
    pub forge_maven_url: String,
    pub neoforge_maven_url: String,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            lock_wait: Duration::from_secs(LOCK_WAIT_SECS),
            lock_stale_after: Duration::from_secs(LOCK_STALE_SECS),
            progress_interval: Duration::from_millis(PROGRESS_INTERVAL_MS),
            java_path: None,
            manifest_url: VANILLA_MANIFEST_URL.to_string(),
            libraries_base_url: LIBRARIES_BASE_URL.to_string(),
            resources_base_url: RESOURCES_BASE_URL.to_string(),
            fabric_meta_url: FABRIC_META_URL.to_string(),
            quilt_meta_url: QUILT_META_URL.to_string(),
            forge_maven_url: FORGE_MAVEN_URL.to_string(),
            neoforge_maven_url: NEOFORGE_MAVEN_URL.to_string(),
        }
    }
}

impl InstallerConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_lock_policy(mut self, wait: Duration, stale_after: Duration) -> Self {
        self.lock_wait = wait;
        self.lock_stale_after = stale_after;
        self
    }

    pub fn with_java_path(mut self, java: impl Into<PathBuf>) -> Self {
        self.java_path = Some(java.into());
        self
    }

    /// Route every remote endpoint to one base URL (mock servers).
    pub fn with_endpoint_base(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.manifest_url = format!("{}/mc/game/version_manifest_v2.json", base);
        self.libraries_base_url = format!("{}/libraries/", base);
        self.resources_base_url = format!("{}/resources/", base);
        self.fabric_meta_url = format!("{}/fabric/v2", base);
        self.quilt_meta_url = format!("{}/quilt/v3", base);
        self.forge_maven_url = format!("{}/forge-maven/", base);
        self.neoforge_maven_url = format!("{}/neoforge-maven/", base);
        self
    }
}
