//! Remote version catalog and loader metadata lookups.

use crate::error::{InstallError, InstallResult};
use crate::game::installer::config::InstallerConfig;
use crate::game::installer::context::InstallContext;
use crate::game::installer::core::downloader::{download_bytes, download_json, download_to_path, DownloadJob};
use crate::game::installer::core::verify::Expected;
use crate::game::installer::layout::{InstalledVersion, RuntimeLayout};
use crate::game::installer::retry::RetryPolicy;
use crate::game::installer::types::ModloaderType;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

/// `version_manifest_v2.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionCatalog {
    pub latest: LatestVersions,
    pub versions: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestVersions {
    pub release: String,
    pub snapshot: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub version_type: String,
    pub url: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub release_time: String,
    #[serde(default)]
    pub sha1: Option<String>,
}

impl VersionCatalog {
    pub fn find(&self, id: &str) -> Option<&CatalogEntry> {
        self.versions.iter().find(|v| v.id == id)
    }

    pub fn releases(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.versions.iter().filter(|v| v.version_type == "release")
    }
}

/// Fetch the catalog once per context.
pub async fn fetch_catalog(ctx: &InstallContext) -> InstallResult<Arc<VersionCatalog>> {
    let catalog = ctx
        .catalog_cell()
        .get_or_try_init(|| async {
            log::info!("Fetching version catalog: {}", ctx.config.manifest_url);
            let catalog: VersionCatalog =
                download_json(ctx, &ctx.config.manifest_url, RetryPolicy::catalog()).await?;
            log::info!("Fetched {} versions", catalog.versions.len());
            Ok::<_, InstallError>(Arc::new(catalog))
        })
        .await?;
    Ok(catalog.clone())
}

/// One row of the combined version list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionListing {
    pub id: String,
    /// Catalog type, or `custom` for local profiles
    #[serde(rename = "type")]
    pub version_type: String,
    pub release_time: Option<String>,
    pub is_installed: bool,
    pub is_custom: bool,
    pub base_version: Option<String>,
}

/// Catalog versions plus local profiles the catalog does not know, newest first.
pub async fn list_versions(
    ctx: &InstallContext,
    layout: &RuntimeLayout,
) -> InstallResult<Vec<VersionListing>> {
    let catalog = fetch_catalog(ctx).await?;
    let installed = layout.list_installed().await?;
    Ok(merge_versions(&catalog, &installed))
}

/// Custom profiles borrow their base version's release time for ordering.
pub fn merge_versions(catalog: &VersionCatalog, installed: &[InstalledVersion]) -> Vec<VersionListing> {
    let installed_ids: HashSet<&str> = installed.iter().map(|v| v.id.as_str()).collect();
    let by_id: HashMap<&str, &CatalogEntry> =
        catalog.versions.iter().map(|v| (v.id.as_str(), v)).collect();

    let mut listing: Vec<VersionListing> = catalog
        .versions
        .iter()
        .map(|v| VersionListing {
            id: v.id.clone(),
            version_type: v.version_type.clone(),
            release_time: catalog_time(v),
            is_installed: installed_ids.contains(v.id.as_str()),
            is_custom: false,
            base_version: None,
        })
        .collect();

    for local in installed.iter().filter(|v| !by_id.contains_key(v.id.as_str())) {
        let release_time = local
            .base_version
            .as_deref()
            .and_then(|base| by_id.get(base))
            .and_then(|entry| catalog_time(entry));
        listing.push(VersionListing {
            id: local.id.clone(),
            version_type: "custom".to_string(),
            release_time,
            is_installed: true,
            is_custom: true,
            base_version: local.base_version.clone(),
        });
    }

    listing.sort_by(|a, b| {
        release_millis(b)
            .cmp(&release_millis(a))
            .then_with(|| natural_cmp(&a.id, &b.id))
    });
    listing
}

fn catalog_time(entry: &CatalogEntry) -> Option<String> {
    [&entry.release_time, &entry.time]
        .into_iter()
        .find(|t| !t.is_empty())
        .cloned()
}

fn release_millis(listing: &VersionListing) -> i64 {
    listing
        .release_time
        .as_deref()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.timestamp_millis())
        .unwrap_or(0)
}

/// Case-insensitive order that compares digit runs by value (`1.9` < `1.10`).
fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (mut a, mut b) = (a.chars().peekable(), b.chars().peekable());
    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let left = take_number(&mut a);
                let right = take_number(&mut b);
                let ord = left
                    .trim_start_matches('0')
                    .len()
                    .cmp(&right.trim_start_matches('0').len())
                    .then_with(|| left.trim_start_matches('0').cmp(right.trim_start_matches('0')));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                let ord = x.to_lowercase().cmp(y.to_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
                a.next();
                b.next();
            }
        }
    }
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.next_if(|c| c.is_ascii_digit()) {
        digits.push(c);
    }
    digits
}

#[derive(Debug, Deserialize)]
struct LoaderListEntry {
    loader: LoaderMeta,
}

#[derive(Debug, Deserialize)]
struct LoaderMeta {
    version: String,
}

#[derive(Debug, Deserialize)]
struct MavenMetadata {
    versioning: MavenVersioning,
}

#[derive(Debug, Deserialize)]
struct MavenVersioning {
    versions: MavenVersionList,
}

#[derive(Debug, Deserialize)]
struct MavenVersionList {
    #[serde(default)]
    version: Vec<String>,
}

/// Newest Forge build published for a game version (`<mc>-<build>`).
pub fn select_forge_version(versions: &[String], game_version: &str) -> Option<String> {
    let prefix = format!("{}-", game_version);
    versions.iter().rev().find(|v| v.starts_with(&prefix)).cloned()
}

/// NeoForge drops the leading `1.`: game `1.20.4` ships as `20.4.x`, `1.21` as `21.0.x`.
pub fn neoforge_prefix(game_version: &str) -> Option<String> {
    let rest = game_version.strip_prefix("1.")?;
    let mut parts = rest.split('.');
    let minor = parts.next().filter(|p| !p.is_empty())?;
    let patch = parts.next().unwrap_or("0");
    Some(format!("{}.{}.", minor, patch))
}

/// Newest matching NeoForge build, falling back to the newest published build.
pub fn select_neoforge_version(versions: &[String], game_version: &str) -> Option<String> {
    neoforge_prefix(game_version)
        .and_then(|prefix| versions.iter().rev().find(|v| v.starts_with(&prefix)).cloned())
        .or_else(|| versions.last().cloned())
}

fn maven_artifact_base(config: &InstallerConfig, loader: ModloaderType) -> InstallResult<String> {
    match loader {
        ModloaderType::Forge => Ok(format!(
            "{}/net/minecraftforge/forge",
            config.forge_maven_url.trim_end_matches('/')
        )),
        ModloaderType::NeoForge => Ok(format!(
            "{}/net/neoforged/neoforge",
            config.neoforge_maven_url.trim_end_matches('/')
        )),
        other => Err(InstallError::validation(
            "loader",
            format!("{} does not ship an installer archive", other),
        )),
    }
}

fn meta_base(config: &InstallerConfig, loader: ModloaderType) -> InstallResult<&str> {
    match loader {
        ModloaderType::Fabric => Ok(config.fabric_meta_url.trim_end_matches('/')),
        ModloaderType::Quilt => Ok(config.quilt_meta_url.trim_end_matches('/')),
        other => Err(InstallError::validation(
            "loader",
            format!("{} has no profile metadata service", other),
        )),
    }
}

/// Newest loader version available for a game version.
pub async fn latest_loader_version(
    ctx: &InstallContext,
    loader: ModloaderType,
    game_version: &str,
) -> InstallResult<String> {
    let found = match loader {
        ModloaderType::Fabric | ModloaderType::Quilt => {
            let url = format!("{}/versions/loader/{}", meta_base(&ctx.config, loader)?, game_version);
            let entries: Vec<LoaderListEntry> =
                download_json(ctx, &url, RetryPolicy::catalog()).await?;
            entries.into_iter().next().map(|e| e.loader.version)
        }
        ModloaderType::Forge | ModloaderType::NeoForge => {
            let url = format!("{}/maven-metadata.xml", maven_artifact_base(&ctx.config, loader)?);
            let raw = download_bytes(ctx, &url, RetryPolicy::catalog()).await?;
            let xml = String::from_utf8_lossy(&raw);
            let metadata: MavenMetadata = serde_xml_rs::from_str(&xml)
                .map_err(|e| InstallError::corrupt(format!("maven metadata {}", url), e))?;
            let versions = metadata.versioning.versions.version;
            log::debug!("{}: {} published versions", loader, versions.len());
            if loader == ModloaderType::Forge {
                select_forge_version(&versions, game_version)
            } else {
                select_neoforge_version(&versions, game_version)
            }
        }
    };

    found.ok_or_else(|| {
        InstallError::NotFound(format!("{} build for Minecraft {}", loader, game_version))
    })
}

/// Newest installer build published by a Fabric/Quilt metadata service.
pub async fn latest_installer_version(
    ctx: &InstallContext,
    loader: ModloaderType,
) -> InstallResult<String> {
    let url = format!("{}/versions/installer", meta_base(&ctx.config, loader)?);
    let entries: Vec<LoaderMeta> = download_json(ctx, &url, RetryPolicy::catalog()).await?;
    entries
        .into_iter()
        .next()
        .map(|e| e.version)
        .ok_or_else(|| InstallError::NotFound(format!("{} installer build", loader)))
}

/// Fabric/Quilt version descriptor for a game + loader version.
///
/// The installer-qualified endpoint is tried first; any failure other than
/// cancellation falls back to the plain loader endpoint.
pub async fn fetch_loader_profile(
    ctx: &InstallContext,
    loader: ModloaderType,
    game_version: &str,
    loader_version: &str,
) -> InstallResult<serde_json::Value> {
    let base = format!(
        "{}/versions/loader/{}/{}",
        meta_base(&ctx.config, loader)?,
        game_version,
        loader_version
    );

    let qualified = async {
        let installer = latest_installer_version(ctx, loader).await?;
        let url = format!("{}/{}/profile/json", base, installer);
        download_json::<serde_json::Value>(ctx, &url, RetryPolicy::catalog()).await
    };
    match qualified.await {
        Ok(profile) => Ok(profile),
        Err(e) if e.is_cancelled() => Err(e),
        Err(e) => {
            log::debug!("Installer-qualified {} profile unavailable: {}", loader, e);
            download_json(ctx, &format!("{}/profile/json", base), RetryPolicy::catalog()).await
        }
    }
}

pub fn installer_url(
    config: &InstallerConfig,
    loader: ModloaderType,
    version: &str,
) -> InstallResult<String> {
    let base = maven_artifact_base(config, loader)?;
    Ok(format!(
        "{}/{}/{}-{}-installer.jar",
        base,
        version,
        loader.as_str(),
        version
    ))
}

/// Download (or reuse) an installer archive under `cache/installers/`.
pub async fn download_installer(
    ctx: &InstallContext,
    layout: &RuntimeLayout,
    loader: ModloaderType,
    version: &str,
) -> InstallResult<PathBuf> {
    let url = installer_url(&ctx.config, loader, version)?;

    // Maven publishes a checksum beside every artifact; use it when reachable
    let sha1 = match download_bytes(ctx, &format!("{}.sha1", url), RetryPolicy::catalog()).await {
        Ok(raw) => {
            let text = String::from_utf8_lossy(&raw);
            text.split_whitespace().next().map(str::to_string)
        }
        Err(e) if e.is_cancelled() => return Err(e),
        Err(e) => {
            log::debug!("No published checksum for {}: {}", url, e);
            None
        }
    };

    let destination = layout
        .installers_dir()
        .join(format!("{}-{}-installer.jar", loader.as_str(), version));
    let job = DownloadJob::new(url, destination.clone(), Expected::new(None, sha1.as_deref()));
    log::info!("Fetching {} installer {}", loader, version);
    download_to_path(ctx, &job, ctx.reporter()).await?;
    Ok(destination)
}
