use super::downloader::{download_to_path, DownloadJob, FetchOutcome};
use super::verify::{verify_file, Expected};
use crate::error::{InstallError, InstallResult, IoResultExt};
use crate::game::installer::context::InstallContext;
use crate::game::installer::types::{Platform, SilentProgressReporter};
use crate::game::launcher::classpath::{is_natives_only, library_relative_path, maven_to_path};
use crate::game::launcher::natives::extract_native_bundle;
use crate::game::launcher::rules;
use crate::game::launcher::version_parser::{Artifact, Library};
use crate::utils::run_blocking;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A native archive to unpack once it is on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeBundle {
    pub archive: PathBuf,
    pub excludes: Vec<String>,
}

/// Everything a library list needs on disk for one platform.
#[derive(Debug, Clone, Default)]
pub struct LibraryPlan {
    pub jobs: Vec<DownloadJob>,
    pub natives: Vec<NativeBundle>,
}

/// The patched client is produced by the installer processors, never downloaded.
pub fn is_pipeline_output(name: &str) -> bool {
    let parts: Vec<&str> = name.split(':').collect();
    parts.len() >= 4
        && parts[3].split('@').next() == Some("client")
        && matches!(
            (parts[0], parts[1]),
            ("net.minecraftforge", "forge") | ("net.neoforged", "neoforge")
        )
}

/// Join a repository base and a relative artifact path.
pub fn join_url(base: &str, rel_path: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, rel_path)
    } else {
        format!("{}/{}", base, rel_path)
    }
}

/// Native classifier for the platform: the `natives` map (with `${arch}`), else a
/// `natives-<os>` key published in `downloads.classifiers`.
pub fn native_classifier(library: &Library, platform: &Platform) -> Option<String> {
    if let Some(classifier) = library
        .natives
        .as_ref()
        .and_then(|map| map.get(platform.os.as_str()))
    {
        return Some(classifier.replace("${arch}", platform.arch.data_model()));
    }

    let classifiers = library.downloads.as_ref()?.classifiers.as_ref()?;
    platform
        .os
        .native_classifiers()
        .iter()
        .find(|key| classifiers.contains_key(**key))
        .map(|key| key.to_string())
}

fn artifact_job(
    artifact: Option<&Artifact>,
    rel_path: String,
    repo_base: &str,
    libraries_dir: &Path,
) -> DownloadJob {
    let url = match artifact.and_then(|a| a.url.as_deref()) {
        Some(url) if url.starts_with("http://") || url.starts_with("https://") => url.to_string(),
        // Empty URL: shipped inside an installer archive, never fetched remotely
        Some("") => String::new(),
        Some(relative) => join_url(repo_base, relative),
        None => join_url(repo_base, &rel_path),
    };
    let expected = Expected::new(
        artifact.and_then(|a| a.size),
        artifact.and_then(|a| a.sha1.as_deref()),
    );
    DownloadJob::new(url, libraries_dir.join(rel_path), expected)
}

/// Turn a library list into download jobs and native bundles for `platform`.
pub fn plan_libraries(
    libraries: &[Library],
    libraries_dir: &Path,
    platform: &Platform,
    default_base: &str,
) -> InstallResult<LibraryPlan> {
    let mut plan = LibraryPlan::default();
    let mut seen: HashSet<PathBuf> = HashSet::new();

    for library in libraries {
        if !rules::allowed_opt(library.rules.as_ref(), platform) {
            log::debug!("Library excluded by rules: {}", library.name);
            continue;
        }
        if is_pipeline_output(&library.name) {
            log::debug!("Skipping processor output library: {}", library.name);
            continue;
        }

        let repo_base = library.url.as_deref().unwrap_or(default_base);
        let downloads = library.downloads.as_ref();
        let artifact = downloads.and_then(|d| d.artifact.as_ref());

        if !is_natives_only(library) {
            let job = artifact_job(
                artifact,
                library_relative_path(library)?,
                repo_base,
                libraries_dir,
            );
            if seen.insert(job.destination.clone()) {
                plan.jobs.push(job);
            }
        }

        if let Some(classifier) = native_classifier(library, platform) {
            let published = downloads
                .and_then(|d| d.classifiers.as_ref())
                .and_then(|c| c.get(&classifier));
            let rel_path = match published.and_then(|a| a.path.clone()) {
                Some(path) => path,
                None => maven_to_path(&format!("{}:{}", library.name, classifier))?,
            };
            let job = artifact_job(published, rel_path, repo_base, libraries_dir);
            let archive = job.destination.clone();
            if seen.insert(archive.clone()) {
                plan.jobs.push(job);
                plan.natives.push(NativeBundle {
                    archive,
                    excludes: library
                        .extract
                        .as_ref()
                        .map(|e| e.exclude.clone())
                        .unwrap_or_default(),
                });
            }
        }
    }

    Ok(plan)
}

/// Acquire one library job; jobs without a URL must already be in place.
async fn acquire_one(ctx: &InstallContext, job: &DownloadJob) -> InstallResult<FetchOutcome> {
    if job.url.is_empty() {
        if verify_file(&job.destination, &job.expected).await? {
            return Ok(FetchOutcome::AlreadySatisfied);
        }
        return Err(InstallError::NotFound(format!(
            "library {:?} has no download URL and is not installed",
            job.destination
        )));
    }
    download_to_path(ctx, job, &SilentProgressReporter).await
}

/// Download every applicable library (and native archive) and unpack natives.
pub async fn acquire_libraries(
    ctx: &InstallContext,
    libraries: &[Library],
    libraries_dir: &Path,
    natives_dir: &Path,
) -> InstallResult<()> {
    let plan = plan_libraries(
        libraries,
        libraries_dir,
        &ctx.platform,
        &ctx.config.libraries_base_url,
    )?;
    let total = plan.jobs.len();
    log::info!(
        "Acquiring {} library artifacts ({} native bundles)",
        total,
        plan.natives.len()
    );

    let reporter = ctx.reporter();
    reporter.start_step("Downloading libraries", None);
    let completed = AtomicUsize::new(0);
    let fetched = AtomicUsize::new(0);

    stream::iter(plan.jobs.iter())
        .map(|job| {
            let completed = &completed;
            let fetched = &fetched;
            async move {
                ctx.cancel().check()?;
                if let FetchOutcome::Fetched { .. } = acquire_one(ctx, job).await? {
                    fetched.fetch_add(1, Ordering::SeqCst);
                }
                let count = completed.fetch_add(1, Ordering::SeqCst) + 1;
                reporter.set_substep(
                    job.destination.file_name().and_then(|n| n.to_str()),
                    Some(count as u32),
                    Some(total as u32),
                );
                reporter.set_percent(((count * 100) / total.max(1)) as i32);
                Ok::<(), InstallError>(())
            }
        })
        .buffer_unordered(ctx.config.concurrency.max(1))
        .try_collect::<Vec<()>>()
        .await?;

    log::info!(
        "Libraries ready: {} fetched, {} already present",
        fetched.load(Ordering::SeqCst),
        total - fetched.load(Ordering::SeqCst)
    );

    if !plan.natives.is_empty() {
        ctx.cancel().check()?;
        tokio::fs::create_dir_all(natives_dir).await.at(natives_dir)?;
        extract_natives(plan.natives, natives_dir.to_path_buf()).await?;
    }

    Ok(())
}

/// A bundle that fails to open is logged and skipped so its siblings still extract.
async fn extract_natives(bundles: Vec<NativeBundle>, natives_dir: PathBuf) -> InstallResult<()> {
    run_blocking(move || {
        for bundle in &bundles {
            match extract_native_bundle(&bundle.archive, &natives_dir, &bundle.excludes) {
                Ok(count) => log::debug!("Extracted {} natives from {:?}", count, bundle.archive),
                Err(e) => log::warn!("Failed to extract natives from {:?}: {}", bundle.archive, e),
            }
        }
        Ok(())
    })
    .await
}
