//! On-disk runtime layout: shared caches plus one directory per installed version.

use crate::error::{InstallError, InstallResult, IoResultExt};
use crate::game::launcher::version_parser::{descriptor_path, VersionManifest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const METADATA_FILE: &str = "launcher-metadata.json";

const GAME_DIRS: &[&str] = &[
    "config",
    "data",
    "logs",
    "saves",
    "resourcepacks",
    "screenshots",
    "shaderpacks",
];

const EMPTY_FILES: &[&str] = &["options.txt", "servers.dat", "command_history.txt"];

/// `launcher-metadata.json` sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutMetadata {
    pub version_id: String,
    pub is_modded: bool,
    pub created_at: DateTime<Utc>,
}

/// Paths of one version directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPaths {
    pub root: PathBuf,
    pub descriptor: PathBuf,
    pub binary: PathBuf,
    pub natives: PathBuf,
    pub mods: PathBuf,
    pub metadata: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledVersion {
    pub id: String,
    pub is_modded: bool,
    pub loader: Option<String>,
    pub base_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeLayout {
    root: PathBuf,
}

impl RuntimeLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.root.join("libraries")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.root.join("assets")
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.root.join("versions")
    }

    pub fn installers_dir(&self) -> PathBuf {
        self.root.join("cache").join("installers")
    }

    pub fn version_paths(&self, version_id: &str) -> VersionPaths {
        let versions = self.versions_dir();
        let root = versions.join(version_id);
        VersionPaths {
            descriptor: descriptor_path(&versions, version_id),
            binary: root.join(format!("{}.jar", version_id)),
            natives: root.join("natives"),
            mods: root.join("mods"),
            metadata: root.join(METADATA_FILE),
            root,
        }
    }

    /// Create the version directory tree and its sidecar. Existing files are left alone;
    /// a version that becomes modded gets its `mods/` directory and flag updated.
    pub async fn ensure_version(
        &self,
        version_id: &str,
        is_modded: bool,
    ) -> InstallResult<VersionPaths> {
        validate_version_id(version_id)?;
        let paths = self.version_paths(version_id);

        for dir in [
            self.libraries_dir(),
            self.assets_dir().join("indexes"),
            self.assets_dir().join("objects"),
            self.installers_dir(),
            paths.natives.clone(),
        ] {
            tokio::fs::create_dir_all(&dir).await.at(&dir)?;
        }
        for name in GAME_DIRS {
            let dir = paths.root.join(name);
            tokio::fs::create_dir_all(&dir).await.at(&dir)?;
        }
        if is_modded {
            tokio::fs::create_dir_all(&paths.mods).await.at(&paths.mods)?;
        }
        for name in EMPTY_FILES {
            let file = paths.root.join(name);
            if !tokio::fs::try_exists(&file).await.at(&file)? {
                tokio::fs::write(&file, b"").await.at(&file)?;
            }
        }

        let existing = self.read_metadata(version_id).await?;
        let metadata = match existing {
            Some(meta) if meta.is_modded || !is_modded => None,
            Some(meta) => Some(LayoutMetadata { is_modded: true, ..meta }),
            None => Some(LayoutMetadata {
                version_id: version_id.to_string(),
                is_modded,
                created_at: Utc::now(),
            }),
        };
        if let Some(meta) = metadata {
            let raw = serde_json::to_vec_pretty(&meta)
                .map_err(|e| InstallError::corrupt("layout metadata", e))?;
            tokio::fs::write(&paths.metadata, raw).await.at(&paths.metadata)?;
            log::debug!("Runtime layout ready for {} (modded: {})", version_id, meta.is_modded);
        }

        Ok(paths)
    }

    pub async fn read_metadata(&self, version_id: &str) -> InstallResult<Option<LayoutMetadata>> {
        let path = self.version_paths(version_id).metadata;
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(InstallError::Io { path, source: e }),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| InstallError::corrupt(format!("{:?}", path), e))
    }

    /// Every version directory that holds its own descriptor, sorted by id.
    pub async fn list_installed(&self) -> InstallResult<Vec<InstalledVersion>> {
        let versions_dir = self.versions_dir();
        let mut entries = match tokio::fs::read_dir(&versions_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(InstallError::Io { path: versions_dir, source: e }),
        };

        let mut installed = Vec::new();
        while let Some(entry) = entries.next_entry().await.at(&versions_dir)? {
            let Some(id) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let descriptor = descriptor_path(&versions_dir, &id);
            let raw = match tokio::fs::read(&descriptor).await {
                Ok(raw) => raw,
                Err(_) => continue,
            };
            let manifest: VersionManifest = match serde_json::from_slice(&raw) {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("Skipping unreadable descriptor {:?}: {}", descriptor, e);
                    continue;
                }
            };
            let launcher = manifest.launcher.as_ref();
            installed.push(InstalledVersion {
                id,
                is_modded: launcher.map(|l| l.modded).unwrap_or(false),
                loader: launcher.and_then(|l| l.loader.clone()),
                base_version: launcher
                    .and_then(|l| l.base_version.clone())
                    .or(manifest.inherits_from.clone()),
            });
        }
        installed.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(installed)
    }

    /// Remove a version directory. Shared libraries and assets stay.
    pub async fn uninstall(&self, version_id: &str) -> InstallResult<()> {
        validate_version_id(version_id)?;
        let paths = self.version_paths(version_id);
        if !tokio::fs::try_exists(&paths.root).await.at(&paths.root)? {
            return Err(InstallError::NotFound(format!("version {}", version_id)));
        }
        tokio::fs::remove_dir_all(&paths.root).await.at(&paths.root)?;
        log::info!("Uninstalled {}", version_id);
        Ok(())
    }
}

/// Version ids become directory names below `versions/`.
pub fn validate_version_id(id: &str) -> InstallResult<()> {
    let bad = id.is_empty()
        || id == "."
        || id == ".."
        || id.trim() != id
        || id.chars().any(|c| matches!(c, '/' | '\\' | ':' | '\0'));
    if bad {
        return Err(InstallError::validation("version id", format!("{:?}", id)));
    }
    Ok(())
}
