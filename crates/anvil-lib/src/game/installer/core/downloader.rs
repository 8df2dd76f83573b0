use crate::error::{InstallError, InstallResult, IoResultExt};
use crate::game::installer::context::InstallContext;
use crate::game::installer::core::verify::{sha1_file, verify_file, Expected};
use crate::game::installer::retry::RetryPolicy;
use crate::game::installer::types::ProgressReporter;
use crate::utils::run_blocking;
use futures::StreamExt;
use sha1::{Digest, Sha1};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs::{create_dir_all, File};
use tokio::io::AsyncWriteExt;

/// One remote file and where its verified copy must end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub url: String,
    pub destination: PathBuf,
    pub expected: Expected,
}

impl DownloadJob {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>, expected: Expected) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            expected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A verified copy was already in place; nothing was transferred.
    AlreadySatisfied,
    Fetched { bytes: u64 },
}

/// `<dest>.part` beside the destination, so the final rename never crosses filesystems.
pub fn temp_path_for(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "download".into());
    name.push(".part");
    destination.with_file_name(name)
}

/// Publish a local file at `destination` under the destination lock.
///
/// An identical file already in place is left alone; otherwise the copy is written
/// beside the destination and renamed over it.
pub async fn install_local_file(
    ctx: &InstallContext,
    source: &Path,
    destination: &Path,
) -> InstallResult<FetchOutcome> {
    ctx.cancel().check()?;
    let parent = destination
        .parent()
        .ok_or_else(|| InstallError::validation("install destination", format!("{:?}", destination)))?;
    create_dir_all(parent).await.at(parent)?;

    let handle = ctx.lock().acquire(destination).await?;
    let result = publish_copy(source, destination, parent).await;
    handle.release();
    result
}

async fn publish_copy(source: &Path, destination: &Path, parent: &Path) -> InstallResult<FetchOutcome> {
    let wanted = sha1_file(source).await?;
    if tokio::fs::metadata(destination).await.map(|m| m.is_file()).unwrap_or(false)
        && sha1_file(destination).await? == wanted
    {
        return Ok(FetchOutcome::AlreadySatisfied);
    }
    run_blocking({
        let source = source.to_path_buf();
        let destination = destination.to_path_buf();
        let parent = parent.to_path_buf();
        move || {
            let mut temp = tempfile::NamedTempFile::new_in(&parent).at(&parent)?;
            let mut input = std::fs::File::open(&source).at(&source)?;
            let bytes = std::io::copy(&mut input, temp.as_file_mut()).at(temp.path())?;
            temp.as_file().sync_all().at(temp.path())?;
            temp.persist(&destination).map_err(|e| InstallError::Io {
                path: destination.clone(),
                source: e.error,
            })?;
            Ok(FetchOutcome::Fetched { bytes })
        }
    })
    .await
}

/// Download a file to a path with locking, verification and an atomic final rename.
///
/// The destination either keeps its previous state or holds a fully verified file.
pub async fn download_to_path(
    ctx: &InstallContext,
    job: &DownloadJob,
    reporter: &dyn ProgressReporter,
) -> InstallResult<FetchOutcome> {
    ctx.cancel().check()?;
    let path = job.destination.as_path();

    // Step 1: reuse a verified copy without touching the network
    if verify_file(path, &job.expected).await? {
        log::debug!("Already satisfied, skipping: {:?}", path);
        return Ok(FetchOutcome::AlreadySatisfied);
    }

    if let Some(parent) = path.parent() {
        create_dir_all(parent).await.at(parent)?;
    }

    // Step 2: exclusive ownership of the destination
    let handle = ctx.lock().acquire(path).await?;

    // A concurrent worker may have finished while we waited
    if verify_file(path, &job.expected).await? {
        log::debug!("Satisfied by concurrent worker: {:?}", path);
        handle.release();
        return Ok(FetchOutcome::AlreadySatisfied);
    }

    // A directory squatting on the destination would block the rename
    if tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        log::warn!("Removing directory at download destination: {:?}", path);
        tokio::fs::remove_dir_all(path).await.at(path)?;
    }

    // Step 3-4: stream into the temp file and verify it
    let tmp_path = temp_path_for(path);
    let bytes = match transfer(ctx, job, &tmp_path, reporter).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e);
        }
    };

    // Step 5: atomic move into place
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e).at(path);
    }

    // Step 6
    handle.release();
    log::debug!("Download complete: {:?}", path);
    Ok(FetchOutcome::Fetched { bytes })
}

async fn transfer(
    ctx: &InstallContext,
    job: &DownloadJob,
    tmp_path: &Path,
    reporter: &dyn ProgressReporter,
) -> InstallResult<u64> {
    let start = Instant::now();
    let url = job.url.as_str();
    log::debug!("Downloading: {} -> {:?}", url, job.destination);

    let response = ctx
        .client
        .get(url)
        .send()
        .await
        .map_err(|e| InstallError::network(url, e))?;

    if !response.status().is_success() {
        return Err(InstallError::HttpStatus {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let total_size = response.content_length().or(job.expected.size);
    let mut file = File::create(tmp_path).await.at(tmp_path)?;
    let mut downloaded: u64 = 0;
    let mut chunk_count: u64 = 0;
    let mut hasher = Sha1::new();
    let mut last_report = Instant::now();

    let mut stream = response.bytes_stream();
    while let Some(chunk_result) = stream.next().await {
        if ctx.cancel().is_cancelled() {
            log::warn!("Download cancelled: {:?}", job.destination);
            return Err(InstallError::Cancelled);
        }

        let chunk = chunk_result.map_err(|e| InstallError::network(url, e))?;
        file.write_all(&chunk).await.at(tmp_path)?;
        hasher.update(&chunk);

        downloaded += chunk.len() as u64;
        chunk_count += 1;
        if last_report.elapsed() >= ctx.config.progress_interval {
            last_report = Instant::now();
            reporter.update_bytes(downloaded, total_size, bytes_per_sec(downloaded, start));
        }
    }
    file.flush().await.at(tmp_path)?;
    file.sync_all().await.at(tmp_path)?;
    drop(file);
    reporter.update_bytes(downloaded, total_size, bytes_per_sec(downloaded, start));

    if let Some(size) = job.expected.size {
        if downloaded != size {
            return Err(InstallError::SizeMismatch {
                path: job.destination.clone(),
                expected: size,
                actual: downloaded,
            });
        }
    }
    if let Some(ref expected) = job.expected.sha1 {
        let computed = format!("{:x}", hasher.finalize());
        if !computed.eq_ignore_ascii_case(expected) {
            return Err(InstallError::Sha1Mismatch {
                path: job.destination.clone(),
                expected: expected.clone(),
                actual: computed,
            });
        }
        log::debug!("SHA1 validated: {}", computed);
    }

    let secs = start.elapsed().as_secs_f64();
    log::info!(
        "Download stats: url={}, size={} bytes, chunks={}, time={:.2}s, throughput={:.2} MB/s",
        url,
        downloaded,
        chunk_count,
        secs,
        (downloaded as f64 / 1024.0 / 1024.0) / secs.max(0.001)
    );

    Ok(downloaded)
}

fn bytes_per_sec(bytes: u64, start: Instant) -> u64 {
    (bytes as f64 / start.elapsed().as_secs_f64().max(0.001)) as u64
}

/// Fetch a small document into memory, retrying transient failures.
pub async fn download_bytes(
    ctx: &InstallContext,
    url: &str,
    policy: RetryPolicy,
) -> InstallResult<Vec<u8>> {
    policy
        .run(url, move || async move {
            ctx.cancel().check()?;
            let response = ctx
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| InstallError::network(url, e))?;
            if !response.status().is_success() {
                return Err(InstallError::HttpStatus {
                    url: url.to_string(),
                    status: response.status().as_u16(),
                });
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|e| InstallError::network(url, e))?;
            Ok(bytes.to_vec())
        })
        .await
}

/// Download JSON and deserialize
pub async fn download_json<T: serde::de::DeserializeOwned>(
    ctx: &InstallContext,
    url: &str,
    policy: RetryPolicy,
) -> InstallResult<T> {
    log::debug!("Downloading JSON: {}", url);
    let bytes = download_bytes(ctx, url, policy).await?;
    serde_json::from_slice(&bytes).map_err(|e| InstallError::corrupt(format!("document {}", url), e))
}
