use crate::error::{InstallError, InstallResult};
use crate::game::installer::catalog::fetch_catalog;
use crate::game::installer::context::InstallContext;
use crate::game::installer::core::assets::acquire_assets;
use crate::game::installer::core::downloader::{download_to_path, DownloadJob};
use crate::game::installer::core::library::acquire_libraries;
use crate::game::installer::core::verify::Expected;
use crate::game::installer::layout::RuntimeLayout;
use crate::game::launcher::version_parser::{parse_version_json, ResolvedRuntime};
use std::sync::Arc;

/// Install a vanilla version: descriptor, client binary, libraries, natives and assets.
/// Every artifact is verified, so a repeat install only re-checks the cache.
pub async fn install_vanilla(
    ctx: &InstallContext,
    layout: &RuntimeLayout,
    version_id: &str,
) -> InstallResult<Arc<ResolvedRuntime>> {
    log::info!("Installing vanilla Minecraft {}", version_id);
    ctx.cancel().check()?;
    let reporter = ctx.reporter();
    reporter.start_step("Preparing version", None);

    let catalog = fetch_catalog(ctx).await?;
    let entry = catalog
        .find(version_id)
        .ok_or_else(|| InstallError::NotFound(format!("Minecraft version {}", version_id)))?;

    let paths = layout.ensure_version(version_id, false).await?;

    let descriptor_job = DownloadJob::new(
        entry.url.clone(),
        paths.descriptor.clone(),
        Expected::new(None, entry.sha1.as_deref()),
    );
    download_to_path(ctx, &descriptor_job, reporter).await?;
    let manifest = parse_version_json(&paths.descriptor).await?;

    let client = manifest
        .downloads
        .as_ref()
        .and_then(|d| d.client.as_ref())
        .ok_or_else(|| {
            InstallError::validation(format!("version {}", version_id), "no client download")
        })?;
    let client_url = client.url.clone().ok_or_else(|| {
        InstallError::validation(format!("version {}", version_id), "client download has no URL")
    })?;
    reporter.start_step("Downloading client", None);
    let client_job = DownloadJob::new(
        client_url,
        paths.binary.clone(),
        Expected::new(client.size, client.sha1.as_deref()),
    );
    download_to_path(ctx, &client_job, reporter).await?;

    let resolved = ctx.resolve(&layout.versions_dir(), version_id).await?;
    acquire_libraries(ctx, &resolved.libraries, &layout.libraries_dir(), &paths.natives).await?;

    match &resolved.asset_index {
        Some(index) => {
            acquire_assets(ctx, index, &layout.assets_dir()).await?;
        }
        None => log::warn!("Version {} declares no asset index", version_id),
    }

    log::info!("Vanilla Minecraft {} installed", version_id);
    Ok(resolved)
}
