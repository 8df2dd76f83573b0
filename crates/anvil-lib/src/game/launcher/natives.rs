/// Native library extraction for the launcher
use crate::error::{InstallError, InstallResult, IoResultExt};
use std::path::Path;

/// Extract a native archive flat into `target_dir`.
///
/// Entries keep only their file name; directories and entries under an excluded
/// prefix are skipped and existing files are overwritten. Returns the number of
/// files written.
pub fn extract_native_bundle(
    archive: &Path,
    target_dir: &Path,
    excludes: &[String],
) -> InstallResult<usize> {
    log::debug!("Extracting natives from: {:?}", archive);

    let file = std::fs::File::open(archive).at(archive)?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| InstallError::corrupt(format!("native archive {:?}", archive), e))?;

    std::fs::create_dir_all(target_dir).at(target_dir)?;

    let mut written = 0;
    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| InstallError::corrupt(format!("native archive {:?}", archive), e))?;

        if entry.is_dir() || should_exclude(entry.name(), excludes) {
            continue;
        }

        let Some(file_name) = Path::new(entry.name()).file_name().map(|n| n.to_os_string()) else {
            continue;
        };

        let output_path = target_dir.join(file_name);
        let mut output_file = std::fs::File::create(&output_path).at(&output_path)?;
        std::io::copy(&mut entry, &mut output_file).at(&output_path)?;
        written += 1;
    }

    Ok(written)
}

/// Check if a file should be excluded
fn should_exclude(file_path: &str, exclusions: &[String]) -> bool {
    exclusions
        .iter()
        .any(|exclusion| file_path.starts_with(exclusion.as_str()))
}
