/// Utilities for reading Forge/NeoForge installer archives
use crate::error::{InstallError, InstallResult, IoResultExt};
use crate::game::launcher::version_parser::Library;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

/// `install_profile.json`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallProfile {
    #[serde(default)]
    pub spec: i32,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub minecraft: Option<String>,
    #[serde(default)]
    pub data: HashMap<String, SidedDataEntry>,
    #[serde(default)]
    pub processors: Vec<Processor>,
    #[serde(default)]
    pub libraries: Vec<Library>,
    /// Pre-1.13 installers embed the version descriptor here
    #[serde(default)]
    pub version_info: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SidedDataEntry {
    #[serde(default)]
    pub client: String,
    #[serde(default)]
    pub server: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Processor {
    pub jar: String,
    #[serde(default)]
    pub classpath: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub outputs: HashMap<String, String>,
    #[serde(default)]
    pub sides: Option<Vec<String>>,
}

impl Processor {
    /// Processors without a side list run everywhere.
    pub fn runs_on_client(&self) -> bool {
        match &self.sides {
            Some(sides) => sides.iter().any(|s| s == "client"),
            None => true,
        }
    }
}

/// An opened installer archive. All methods block; call them off the async runtime.
pub struct InstallerArchive {
    path: PathBuf,
    zip: zip::ZipArchive<std::fs::File>,
}

impl InstallerArchive {
    pub fn open(path: &Path) -> InstallResult<Self> {
        log::debug!("Opening installer archive {:?}", path);
        let file = std::fs::File::open(path).at(path)?;
        let zip = zip::ZipArchive::new(file)
            .map_err(|e| InstallError::corrupt(format!("installer archive {:?}", path), e))?;
        Ok(Self {
            path: path.to_path_buf(),
            zip,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_entry(&mut self, name: &str) -> InstallResult<Option<Vec<u8>>> {
        let mut entry = match self.zip.by_name(name) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(corrupt_archive(&self.path, e)),
        };
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buf).at(&self.path)?;
        Ok(Some(buf))
    }

    pub fn has_entry(&mut self, name: &str) -> bool {
        self.zip.index_for_name(name).is_some()
    }

    pub fn install_profile(&mut self) -> InstallResult<InstallProfile> {
        let raw = self.read_entry("install_profile.json")?.ok_or_else(|| {
            InstallError::validation(
                format!("installer {:?}", self.path),
                "install_profile.json not found",
            )
        })?;
        let profile: InstallProfile = serde_json::from_slice(&raw)
            .map_err(|e| InstallError::corrupt("install_profile.json", e))?;
        log::debug!(
            "Parsed install profile: spec={}, processors={}",
            profile.spec,
            profile.processors.len()
        );
        Ok(profile)
    }

    /// `version.json`, or the descriptor embedded in a legacy install profile.
    pub fn version_descriptor(&mut self) -> InstallResult<serde_json::Value> {
        if let Some(raw) = self.read_entry("version.json")? {
            return serde_json::from_slice(&raw)
                .map_err(|e| InstallError::corrupt("version.json", e));
        }
        self.install_profile()?.version_info.ok_or_else(|| {
            InstallError::validation(
                format!("installer {:?}", self.path),
                "no version.json and no embedded versionInfo",
            )
        })
    }

    /// Extract one entry below `dir`, keeping its archive-relative path.
    /// Names that would land outside `dir` are rejected.
    pub fn extract_entry(&mut self, name: &str, dir: &Path) -> InstallResult<PathBuf> {
        let mut entry = match self.zip.by_name(name) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(InstallError::validation(
                    format!("installer {:?}", self.path),
                    format!("entry {} not found", name),
                ))
            }
            Err(e) => return Err(corrupt_archive(&self.path, e)),
        };
        let rel = entry.enclosed_name().ok_or_else(|| {
            InstallError::validation(
                format!("installer {:?}", self.path),
                format!("entry {} escapes the extraction directory", name),
            )
        })?;
        let destination = dir.join(rel);
        write_entry(&mut entry, &destination)?;
        Ok(destination)
    }

    /// Stage every `maven/` artifact below `staging_dir`.
    /// Returns the staged paths relative to `staging_dir`, which are also their
    /// library-cache paths.
    pub fn extract_maven(&mut self, staging_dir: &Path) -> InstallResult<Vec<PathBuf>> {
        let mut staged = Vec::new();
        for i in 0..self.zip.len() {
            let mut entry = self
                .zip
                .by_index(i)
                .map_err(|e| corrupt_archive(&self.path, e))?;
            if entry.is_dir() {
                continue;
            }
            let Some(rel) = entry
                .enclosed_name()
                .and_then(|p| p.strip_prefix("maven").ok().map(Path::to_path_buf))
                .filter(|rel| !rel.as_os_str().is_empty())
            else {
                continue;
            };
            write_entry(&mut entry, &staging_dir.join(&rel))?;
            staged.push(rel);
        }
        log::debug!("Staged {} embedded libraries", staged.len());
        Ok(staged)
    }
}

fn corrupt_archive(path: &Path, e: zip::result::ZipError) -> InstallError {
    InstallError::corrupt(format!("installer archive {:?}", path), e)
}

fn write_entry(entry: &mut impl Read, destination: &Path) -> InstallResult<()> {
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent).at(parent)?;
    }
    let mut out = std::fs::File::create(destination).at(destination)?;
    std::io::copy(entry, &mut out).at(destination)?;
    Ok(())
}

/// `Main-Class` from a jar's manifest, `None` when the jar declares no entry point.
pub fn jar_main_class(jar_path: &Path) -> InstallResult<Option<String>> {
    let file = std::fs::File::open(jar_path).at(jar_path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| InstallError::corrupt(format!("jar {:?}", jar_path), e))?;
    let mut manifest = match archive.by_name("META-INF/MANIFEST.MF") {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(InstallError::corrupt(format!("jar {:?}", jar_path), e)),
    };
    let mut content = String::new();
    manifest.read_to_string(&mut content).at(jar_path)?;
    Ok(manifest_attribute(&content, "Main-Class"))
}

/// Manifest lines wrap at 72 bytes with a leading space on the continuation.
fn manifest_attribute(content: &str, key: &str) -> Option<String> {
    let mut joined: Vec<String> = Vec::new();
    for line in content.lines() {
        match (line.strip_prefix(' '), joined.last_mut()) {
            (Some(rest), Some(prev)) => prev.push_str(rest),
            _ => joined.push(line.to_string()),
        }
    }
    joined.iter().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        (name.trim() == key).then(|| value.trim().to_string())
    })
}
