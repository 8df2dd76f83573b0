/// Version descriptor model and inheritance resolution
use crate::error::{InstallError, InstallResult, IoResultExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Longest `inheritsFrom` chain accepted before the descriptor set is treated as corrupt.
pub const MAX_CHAIN_DEPTH: usize = 16;

/// Complete version manifest from version.json
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionManifest {
    /// Version ID (e.g., "1.20.1" or "1.20.1-forge-47.2.0")
    pub id: String,

    /// Main class to execute
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_class: Option<String>,

    /// Parent version to inherit from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherits_from: Option<String>,

    /// Id of the version whose binary this version runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jar: Option<String>,

    /// Game and JVM arguments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Arguments>,

    /// Legacy arguments (pre-1.13)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minecraft_arguments: Option<String>,

    /// Libraries required for this version
    #[serde(default)]
    pub libraries: Vec<Library>,

    /// Asset index information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_index: Option<AssetIndex>,

    /// Assets version (legacy)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets: Option<String>,

    /// Client/server binary downloads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloads: Option<VersionDownloads>,

    /// Java version requirements
    #[serde(skip_serializing_if = "Option::is_none")]
    pub java_version: Option<JavaVersion>,

    /// Version type (release, snapshot, etc.)
    #[serde(skip_serializing_if = "Option::is_none", rename = "type")]
    pub version_type: Option<String>,

    /// Release time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_time: Option<String>,

    /// Time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,

    /// Loader bookkeeping written when a modded profile is created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launcher: Option<LauncherMetadata>,
}

/// Game and JVM arguments
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Arguments {
    #[serde(default)]
    pub game: Vec<Argument>,

    #[serde(default)]
    pub jvm: Vec<Argument>,
}

/// Argument that can be simple or conditional
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Argument {
    /// Simple string argument
    Simple(String),

    /// Conditional argument with rules
    Conditional {
        rules: Vec<Rule>,
        value: ArgumentValue,
    },
}

/// Argument value can be a single string or array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgumentValue {
    Single(String),
    Multiple(Vec<String>),
}

/// Rule for conditional arguments/libraries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub action: RuleAction,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<OsRule>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<HashMap<String, bool>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OsRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Regular expression matched against the host OS version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
}

/// Library definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    /// Maven coordinates
    pub name: String,

    /// Download information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloads: Option<LibraryDownloads>,

    /// Custom Maven repository URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Rules for conditional inclusion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<Rule>>,

    /// Native classifiers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub natives: Option<HashMap<String, String>>,

    /// Extract rules for natives
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extract: Option<ExtractRules>,
}

impl Library {
    /// A library referenced only by its coordinate.
    pub fn from_coords(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            downloads: None,
            url: None,
            rules: None,
            natives: None,
            extract: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryDownloads {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifiers: Option<HashMap<String, Artifact>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDownloads {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<Artifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<Artifact>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractRules {
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Asset index information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetIndex {
    pub id: String,
    pub sha1: String,
    pub size: u64,
    #[serde(default)]
    pub total_size: u64,
    pub url: String,
}

/// Java version requirements
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JavaVersion {
    pub component: String,
    pub major_version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LauncherMetadata {
    #[serde(default)]
    pub modded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loader: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loader_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_version: Option<String>,
}

/// A version with its whole `inheritsFrom` chain folded in.
#[derive(Debug, Clone)]
pub struct ResolvedRuntime {
    pub id: String,
    /// Ids walked, requested version first
    pub chain: Vec<String>,
    /// Root's libraries first
    pub libraries: Vec<Library>,
    pub jvm_arguments: Vec<Argument>,
    pub game_arguments: Vec<Argument>,
    pub legacy_arguments: Option<String>,
    pub main_class: Option<String>,
    pub asset_index: Option<AssetIndex>,
    pub assets: Option<String>,
    /// Game binary id: the nearest descriptor whose jar exists, else the requested id
    pub binary: String,
    pub version_type: Option<String>,
    pub java_version: Option<JavaVersion>,
    pub launcher: Option<LauncherMetadata>,
}

impl ResolvedRuntime {
    /// Index id for `${assets_index_name}`; legacy `assets` wins over the index id.
    pub fn assets_id(&self) -> Option<&str> {
        self.assets
            .as_deref()
            .or(self.asset_index.as_ref().map(|a| a.id.as_str()))
    }

    pub fn is_modded(&self) -> bool {
        self.launcher.as_ref().map(|l| l.modded).unwrap_or(false)
    }
}

pub fn descriptor_path(versions_dir: &Path, version_id: &str) -> PathBuf {
    versions_dir
        .join(version_id)
        .join(format!("{}.json", version_id))
}

pub fn binary_path(versions_dir: &Path, version_id: &str) -> PathBuf {
    versions_dir
        .join(version_id)
        .join(format!("{}.jar", version_id))
}

/// Parse a version.json file
pub async fn parse_version_json(path: &Path) -> InstallResult<VersionManifest> {
    let content = tokio::fs::read_to_string(path).await.at(path)?;
    serde_json::from_str(&content)
        .map_err(|e| InstallError::corrupt(format!("version descriptor {:?}", path), e))
}

/// Resolve the complete version chain by following inheritsFrom
pub async fn resolve_version(versions_dir: &Path, version_id: &str) -> InstallResult<ResolvedRuntime> {
    let mut nodes: Vec<VersionManifest> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut next = Some(version_id.to_string());

    while let Some(id) = next.take() {
        if !seen.insert(id.clone()) {
            return Err(InstallError::corrupt(
                format!("version {}", version_id),
                format!("inheritance cycle through {}", id),
            ));
        }
        if nodes.len() >= MAX_CHAIN_DEPTH {
            return Err(InstallError::corrupt(
                format!("version {}", version_id),
                format!("inheritance chain deeper than {}", MAX_CHAIN_DEPTH),
            ));
        }

        let path = descriptor_path(versions_dir, &id);
        log::debug!("Checking version path for {} -> {:?}", id, path);
        if !tokio::fs::try_exists(&path).await.at(&path)? {
            return Err(InstallError::NotFound(format!(
                "version descriptor {:?}",
                path
            )));
        }

        let manifest = parse_version_json(&path).await?;
        next = manifest.inherits_from.clone();
        nodes.push(manifest);
    }

    Ok(fold_chain(versions_dir, version_id, nodes))
}

/// Fold descriptors (requested version first) into one runtime.
fn fold_chain(versions_dir: &Path, version_id: &str, nodes: Vec<VersionManifest>) -> ResolvedRuntime {
    let chain: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();

    // Child-first scalars: the nearest non-null value wins
    let main_class = nodes.iter().find_map(|n| n.main_class.clone());
    let asset_index = nodes.iter().find_map(|n| n.asset_index.clone());
    let assets = nodes.iter().find_map(|n| n.assets.clone());
    let legacy_arguments = nodes.iter().find_map(|n| n.minecraft_arguments.clone());
    let version_type = nodes.iter().find_map(|n| n.version_type.clone());
    let java_version = nodes.iter().find_map(|n| n.java_version.clone());
    let launcher = nodes.iter().find_map(|n| n.launcher.clone());

    // Exactly one game jar goes on the classpath
    let binary = nodes
        .iter()
        .map(|n| n.jar.clone().unwrap_or_else(|| n.id.clone()))
        .find(|bin| binary_path(versions_dir, bin).is_file())
        .unwrap_or_else(|| version_id.to_string());

    // Root-first lists: parents contribute before children
    let mut libraries = Vec::new();
    let mut jvm_arguments = Vec::new();
    let mut game_arguments = Vec::new();
    for node in nodes.into_iter().rev() {
        libraries.extend(node.libraries);
        if let Some(args) = node.arguments {
            jvm_arguments.extend(args.jvm);
            game_arguments.extend(args.game);
        }
    }

    ResolvedRuntime {
        id: version_id.to_string(),
        chain,
        libraries,
        jvm_arguments,
        game_arguments,
        legacy_arguments,
        main_class,
        asset_index,
        assets,
        binary,
        version_type,
        java_version,
        launcher,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn write_descriptor(versions_dir: &Path, value: serde_json::Value) {
        let id = value["id"].as_str().unwrap().to_string();
        let dir = versions_dir.join(&id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{}.json", id)), value.to_string()).unwrap();
    }

    fn touch_jar(versions_dir: &Path, id: &str) {
        let dir = versions_dir.join(id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{}.jar", id)), b"jar").unwrap();
    }

    #[test]
    fn test_parse_simple_argument() {
        let json = r#""--username""#;
        let arg: Argument = serde_json::from_str(json).unwrap();
        match arg {
            Argument::Simple(s) => assert_eq!(s, "--username"),
            _ => panic!("Expected simple argument"),
        }
    }

    #[test]
    fn test_parse_conditional_argument() {
        let json = r#"{"rules":[{"action":"allow","os":{"name":"osx"}}],"value":["-XstartOnFirstThread"]}"#;
        let arg: Argument = serde_json::from_str(json).unwrap();
        match arg {
            Argument::Conditional { rules, value } => {
                assert_eq!(rules[0].action, RuleAction::Allow);
                assert_eq!(
                    value,
                    ArgumentValue::Multiple(vec!["-XstartOnFirstThread".into()])
                );
            }
            _ => panic!("Expected conditional argument"),
        }
    }

    #[tokio::test]
    async fn forge_child_inherits_vanilla_scalars() {
        let tmp = tempdir().unwrap();
        let versions = tmp.path();
        write_descriptor(
            versions,
            json!({
                "id": "1.20.1",
                "mainClass": "net.minecraft.client.main.Main",
                "assetIndex": {"id": "5", "sha1": "aa", "size": 1, "totalSize": 2, "url": "http://x/5.json"},
                "arguments": {"game": ["--version"], "jvm": ["-Xss1M"]},
                "libraries": [{"name": "com.mojang:logging:1.1.1"}]
            }),
        );
        write_descriptor(
            versions,
            json!({
                "id": "1.20.1-forge",
                "inheritsFrom": "1.20.1",
                "mainClass": "cpw.mods.bootstraplauncher.BootstrapLauncher",
                "arguments": {"game": ["--launchTarget", "forgeclient"]},
                "libraries": [{"name": "net.minecraftforge:fmlloader:1.20.1-47.2.0"}]
            }),
        );
        touch_jar(versions, "1.20.1");

        let resolved = resolve_version(versions, "1.20.1-forge").await.unwrap();
        assert_eq!(resolved.chain, vec!["1.20.1-forge", "1.20.1"]);
        assert_eq!(
            resolved.main_class.as_deref(),
            Some("cpw.mods.bootstraplauncher.BootstrapLauncher")
        );
        assert_eq!(resolved.asset_index.as_ref().unwrap().id, "5");
        assert_eq!(resolved.libraries[0].name, "com.mojang:logging:1.1.1");
        assert_eq!(
            resolved.libraries[1].name,
            "net.minecraftforge:fmlloader:1.20.1-47.2.0"
        );
        assert_eq!(
            resolved.game_arguments,
            vec![
                Argument::Simple("--version".into()),
                Argument::Simple("--launchTarget".into()),
                Argument::Simple("forgeclient".into()),
            ]
        );
        assert_eq!(resolved.jvm_arguments.len(), 1);
        assert_eq!(resolved.binary, "1.20.1");
    }

    #[tokio::test]
    async fn child_without_main_class_takes_the_parents() {
        let tmp = tempdir().unwrap();
        let versions = tmp.path();
        write_descriptor(
            versions,
            json!({
                "id": "1.20.1",
                "mainClass": "net.minecraft.client.main.Main",
                "type": "release",
                "libraries": [
                    {"name": "com.mojang:logging:1.1.1"},
                    {"name": "org.lwjgl:lwjgl:3.3.1"}
                ]
            }),
        );
        write_descriptor(
            versions,
            json!({
                "id": "my-forge",
                "inheritsFrom": "1.20.1",
                "libraries": [{"name": "net.minecraftforge:fmlloader:1.20.1-47.2.0"}]
            }),
        );

        let resolved = resolve_version(versions, "my-forge").await.unwrap();
        assert_eq!(
            resolved.main_class.as_deref(),
            Some("net.minecraft.client.main.Main")
        );
        assert_eq!(resolved.version_type.as_deref(), Some("release"));
        let names: Vec<&str> = resolved.libraries.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "com.mojang:logging:1.1.1",
                "org.lwjgl:lwjgl:3.3.1",
                "net.minecraftforge:fmlloader:1.20.1-47.2.0",
            ]
        );
    }

    #[tokio::test]
    async fn binary_follows_jar_override_and_fallback() {
        let tmp = tempdir().unwrap();
        let versions = tmp.path();
        write_descriptor(versions, json!({"id": "base"}));
        write_descriptor(
            versions,
            json!({"id": "child", "inheritsFrom": "base", "jar": "patched"}),
        );

        let resolved = resolve_version(versions, "child").await.unwrap();
        assert_eq!(resolved.binary, "child");

        touch_jar(versions, "base");
        let resolved = resolve_version(versions, "child").await.unwrap();
        assert_eq!(resolved.binary, "base");

        // The nearest existing jar shadows the parent's
        touch_jar(versions, "patched");
        let resolved = resolve_version(versions, "child").await.unwrap();
        assert_eq!(resolved.binary, "patched");
    }

    #[tokio::test]
    async fn missing_descriptor_is_not_found() {
        let tmp = tempdir().unwrap();
        let err = resolve_version(tmp.path(), "nope").await.unwrap_err();
        assert!(matches!(err, InstallError::NotFound(_)));

        write_descriptor(tmp.path(), json!({"id": "orphan", "inheritsFrom": "gone"}));
        let err = resolve_version(tmp.path(), "orphan").await.unwrap_err();
        assert!(matches!(err, InstallError::NotFound(_)));
    }

    #[tokio::test]
    async fn inheritance_cycle_is_corruption() {
        let tmp = tempdir().unwrap();
        write_descriptor(tmp.path(), json!({"id": "a", "inheritsFrom": "b"}));
        write_descriptor(tmp.path(), json!({"id": "b", "inheritsFrom": "a"}));
        let err = resolve_version(tmp.path(), "a").await.unwrap_err();
        assert!(matches!(err, InstallError::Corrupt { .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::Io);
    }

    #[tokio::test]
    async fn legacy_arguments_come_from_nearest_descriptor() {
        let tmp = tempdir().unwrap();
        write_descriptor(
            tmp.path(),
            json!({"id": "1.12.2", "minecraftArguments": "--username ${auth_player_name}"}),
        );
        write_descriptor(
            tmp.path(),
            json!({
                "id": "1.12.2-forge",
                "inheritsFrom": "1.12.2",
                "minecraftArguments": "--username ${auth_player_name} --tweakClass net.minecraftforge.fml.common.launcher.FMLTweaker"
            }),
        );
        let resolved = resolve_version(tmp.path(), "1.12.2-forge").await.unwrap();
        assert!(resolved
            .legacy_arguments
            .as_deref()
            .unwrap()
            .contains("--tweakClass"));
    }
}
