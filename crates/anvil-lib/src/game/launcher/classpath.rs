/// Classpath construction for the launcher
use crate::error::{InstallError, InstallResult};
use crate::game::installer::types::Platform;
use crate::game::launcher::rules;
use crate::game::launcher::version_parser::{binary_path, Library, ResolvedRuntime};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Ordered classpath plus its platform-joined form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classpath {
    pub entries: Vec<PathBuf>,
    pub joined: String,
}

/// Convert Maven coordinates to file path
/// Format: group:artifact:version[:classifier][@extension]
/// Example: "com.google.guava:guava:21.0" -> "com/google/guava/guava/21.0/guava-21.0.jar"
pub fn maven_to_path(coords: &str) -> InstallResult<String> {
    let parts: Vec<&str> = coords.split(':').collect();

    if parts.len() < 3 || parts[..3].iter().any(|p| p.is_empty()) {
        return Err(InstallError::validation("maven coordinate", coords));
    }

    let group = parts[0].replace('.', "/");
    let artifact = parts[1];
    let mut version = parts[2];
    let mut classifier = None;
    let mut extension = "jar";

    if parts.len() == 3 {
        // group:artifact:version@extension
        if let Some((v, ext)) = version.split_once('@') {
            version = v;
            extension = ext;
        }
    } else {
        // group:artifact:version:classifier[@extension]
        if let Some((clf, ext)) = parts[3].split_once('@') {
            classifier = Some(clf);
            extension = ext;
        } else {
            classifier = Some(parts[3]);
        }
    }

    let filename = if let Some(clf) = classifier {
        format!("{}-{}-{}.{}", artifact, version, clf, extension)
    } else {
        format!("{}-{}.{}", artifact, version, extension)
    };

    Ok(format!("{}/{}/{}/{}", group, artifact, version, filename))
}

/// Library path relative to the libraries root; an explicit descriptor path wins.
pub fn library_relative_path(library: &Library) -> InstallResult<String> {
    match library
        .downloads
        .as_ref()
        .and_then(|d| d.artifact.as_ref())
        .and_then(|a| a.path.as_ref())
    {
        Some(path) if !path.is_empty() => Ok(path.clone()),
        _ => maven_to_path(&library.name),
    }
}

/// Libraries that exist only to carry native archives contribute nothing to the classpath.
/// That covers a legacy natives map or published classifiers without a main artifact.
pub fn is_natives_only(library: &Library) -> bool {
    let downloads = library.downloads.as_ref();
    let has_classifiers = downloads.is_some_and(|d| d.classifiers.is_some());
    downloads.and_then(|d| d.artifact.as_ref()).is_none()
        && (library.natives.is_some() || has_classifiers)
}

/// Libraries (resolver order), then the game binary, then the loader's patched binary.
/// Repeated paths keep their first position.
pub fn build_classpath(
    resolved: &ResolvedRuntime,
    libraries_dir: &Path,
    versions_dir: &Path,
    loader_binary: Option<&Path>,
    platform: &Platform,
) -> InstallResult<Classpath> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    for library in &resolved.libraries {
        if !rules::allowed_opt(library.rules.as_ref(), platform) || is_natives_only(library) {
            continue;
        }
        candidates.push(libraries_dir.join(library_relative_path(library)?));
    }
    candidates.push(binary_path(versions_dir, &resolved.binary));
    if let Some(loader) = loader_binary {
        candidates.push(loader.to_path_buf());
    }

    let entries = dedupe_first_wins(candidates);
    let joined = entries
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(platform.os.classpath_separator());

    Ok(Classpath { entries, joined })
}

fn dedupe_first_wins(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter(|p| seen.insert(p.clone()))
        .collect()
}
