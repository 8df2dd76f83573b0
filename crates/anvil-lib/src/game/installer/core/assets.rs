use super::downloader::{download_to_path, DownloadJob, FetchOutcome};
use super::verify::Expected;
use crate::game::installer::config::ASSET_WORKERS;
use crate::error::{InstallError, InstallResult, IoResultExt};
use crate::game::installer::context::InstallContext;
use crate::game::installer::types::SilentProgressReporter;
use crate::game::launcher::version_parser::AssetIndex;
use serde::Deserialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Parsed `assets/indexes/<id>.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetIndexFile {
    #[serde(default)]
    pub objects: HashMap<String, AssetObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetObject {
    pub hash: String,
    pub size: u64,
}

/// `objects/<hash[0..2]>/<hash>` under the assets root.
pub fn asset_object_path(assets_dir: &Path, hash: &str) -> PathBuf {
    assets_dir
        .join("objects")
        .join(hash_prefix(hash))
        .join(hash)
}

/// `<base>/<hash[0..2]>/<hash>` on the resource host.
pub fn asset_object_url(base: &str, hash: &str) -> String {
    format!("{}/{}/{}", base.trim_end_matches('/'), hash_prefix(hash), hash)
}

fn hash_prefix(hash: &str) -> &str {
    hash.get(..2).unwrap_or(hash)
}

/// Fetch the asset index once, then every object through a fixed worker pool.
/// Returns the number of objects that were actually transferred.
pub async fn acquire_assets(
    ctx: &InstallContext,
    asset_index: &AssetIndex,
    assets_dir: &Path,
) -> InstallResult<usize> {
    ctx.cancel().check()?;
    let index_path = assets_dir
        .join("indexes")
        .join(format!("{}.json", asset_index.id));
    let index_job = DownloadJob::new(
        asset_index.url.clone(),
        index_path.clone(),
        Expected::new(Some(asset_index.size), Some(&asset_index.sha1)),
    );
    download_to_path(ctx, &index_job, &SilentProgressReporter).await?;

    let raw = tokio::fs::read(&index_path).await.at(&index_path)?;
    let index: AssetIndexFile = serde_json::from_slice(&raw)
        .map_err(|e| InstallError::corrupt(format!("asset index {:?}", index_path), e))?;

    let mut seen = HashSet::new();
    let queue: VecDeque<DownloadJob> = index
        .objects
        .values()
        .filter(|obj| seen.insert(obj.hash.clone()))
        .map(|obj| {
            DownloadJob::new(
                asset_object_url(&ctx.config.resources_base_url, &obj.hash),
                asset_object_path(assets_dir, &obj.hash),
                Expected::new(Some(obj.size), Some(&obj.hash)),
            )
        })
        .collect();

    let total = queue.len();
    log::info!("Asset index {}: {} unique objects", asset_index.id, total);
    ctx.reporter().start_step("Downloading assets", None);

    let queue = Mutex::new(queue);
    let completed = AtomicUsize::new(0);
    let fetched = AtomicUsize::new(0);
    let workers = (0..ASSET_WORKERS.min(total.max(1)))
        .map(|_| asset_worker(ctx, &queue, &completed, &fetched, total));
    futures::future::try_join_all(workers).await?;

    let fetched = fetched.load(Ordering::SeqCst);
    log::info!("Assets ready: {} fetched, {} already present", fetched, total - fetched);
    Ok(fetched)
}

async fn asset_worker(
    ctx: &InstallContext,
    queue: &Mutex<VecDeque<DownloadJob>>,
    completed: &AtomicUsize,
    fetched: &AtomicUsize,
    total: usize,
) -> InstallResult<()> {
    loop {
        ctx.cancel().check()?;
        let next = queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        let Some(job) = next else {
            return Ok(());
        };

        if let FetchOutcome::Fetched { .. } =
            download_to_path(ctx, &job, &SilentProgressReporter).await?
        {
            fetched.fetch_add(1, Ordering::SeqCst);
        }
        let count = completed.fetch_add(1, Ordering::SeqCst) + 1;
        let reporter = ctx.reporter();
        reporter.set_substep(Some("assets"), Some(count as u32), Some(total as u32));
        reporter.set_percent(((count * 100) / total.max(1)) as i32);
    }
}
