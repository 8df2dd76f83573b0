/// Argument builder for Minecraft launcher
use crate::error::{InstallError, InstallResult};
use crate::game::launcher::classpath::build_classpath;
use crate::game::launcher::rules::{allowed_with_features, FeatureSet};
use crate::game::launcher::types::{LaunchEnvironment, LaunchInvocation, LaunchRequest};
use crate::game::launcher::version_parser::{Argument, ArgumentValue, ResolvedRuntime};
use dunce::canonicalize;
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

pub const DEFAULT_MAIN_CLASS: &str = "net.minecraft.client.main.Main";
pub const LAUNCHER_NAME: &str = "anvil";

/// Assemble the full process invocation for a resolved version.
pub fn build_invocation(
    resolved: &ResolvedRuntime,
    request: &LaunchRequest,
    env: &LaunchEnvironment,
) -> InstallResult<LaunchInvocation> {
    let classpath = build_classpath(
        resolved,
        &env.libraries_dir,
        &env.versions_dir,
        env.loader_binary.as_deref(),
        &env.platform,
    )?;
    let variables = build_variables(resolved, request, env, &classpath.joined);
    let features = FeatureSet::none();

    // JVM side
    let mut jvm_args = match &request.extra_jvm_args {
        Some(extra) => parse_user_args("extra JVM arguments", extra)?,
        None => get_default_jvm_args(),
    };

    let templates = if resolved.jvm_arguments.is_empty() {
        default_jvm_templates()
    } else {
        resolved.jvm_arguments.clone()
    };
    let manifest_args: Vec<String> = templates
        .iter()
        .filter_map(|arg| applicable_values(arg, env, &features))
        .flatten()
        .map(|value| substitute_variables(value, &variables))
        .collect();

    if !manifest_args.iter().any(|a| a.starts_with("-Djava.library.path=")) {
        jvm_args.push(format!(
            "-Djava.library.path={}",
            canonical_string(&env.natives_dir)
        ));
    }
    if !manifest_args.iter().any(|a| a.starts_with("-Dminecraft.launcher.brand=")) {
        jvm_args.push(format!("-Dminecraft.launcher.brand={}", LAUNCHER_NAME));
    }
    if !manifest_args.iter().any(|a| a.starts_with("-Dminecraft.launcher.version=")) {
        jvm_args.push(format!(
            "-Dminecraft.launcher.version={}",
            env!("CARGO_PKG_VERSION")
        ));
    }
    if resolved.is_modded() {
        let loader = resolved.launcher.as_ref().and_then(|l| l.loader.as_deref());
        if let Some(flag) = loader.and_then(|l| mod_path_flag(l, &env.game_dir.join("mods"))) {
            jvm_args.push(flag);
        }
    }
    jvm_args.extend(manifest_args);
    if !jvm_args
        .iter()
        .any(|a| a == "-cp" || a == "-classpath" || a == "--class-path")
    {
        jvm_args.push("-cp".to_string());
        jvm_args.push(classpath.joined.clone());
    }
    apply_memory(&mut jvm_args, request.min_memory, request.max_memory);

    // Game side
    let mut program_args: Vec<String> = if !resolved.game_arguments.is_empty() {
        expand_game_arguments(&resolved.game_arguments, env, &features, &variables)
    } else if let Some(legacy) = &resolved.legacy_arguments {
        legacy
            .split_whitespace()
            .map(|token| substitute_variables(token, &variables))
            .collect()
    } else {
        expand_game_arguments(&default_game_templates(), env, &features, &variables)
    };
    if let Some(extra) = &request.extra_game_args {
        program_args.extend(parse_user_args("extra game arguments", extra)?);
    }

    let main_class = match &resolved.main_class {
        Some(main) => main.clone(),
        None => {
            log::warn!("{} declares no main class, using {}", resolved.id, DEFAULT_MAIN_CLASS);
            DEFAULT_MAIN_CLASS.to_string()
        }
    };

    Ok(LaunchInvocation {
        jvm_args,
        main_class,
        program_args,
        classpath: classpath.entries,
        classpath_string: classpath.joined,
        working_dir: env.game_dir.clone(),
    })
}

/// Values of a template token when its rules admit it.
fn applicable_values<'a>(
    arg: &'a Argument,
    env: &LaunchEnvironment,
    features: &FeatureSet,
) -> Option<Vec<&'a str>> {
    match arg {
        Argument::Simple(s) => Some(vec![s.as_str()]),
        Argument::Conditional { rules, value } => {
            if !allowed_with_features(rules, &env.platform, features) {
                return None;
            }
            Some(match value {
                ArgumentValue::Single(s) => vec![s.as_str()],
                ArgumentValue::Multiple(values) => values.iter().map(String::as_str).collect(),
            })
        }
    }
}

/// Game tokens may pack a flag and its value into one string; split the template
/// before substitution so substituted paths with spaces stay whole.
fn expand_game_arguments(
    templates: &[Argument],
    env: &LaunchEnvironment,
    features: &FeatureSet,
    variables: &HashMap<String, String>,
) -> Vec<String> {
    templates
        .iter()
        .filter_map(|arg| applicable_values(arg, env, features))
        .flatten()
        .flat_map(|value| {
            let parts = split_preserving_quotes(value);
            if parts.is_empty() {
                vec![value.to_string()]
            } else {
                parts
            }
        })
        .map(|token| substitute_variables(&token, variables))
        .collect()
}

/// Replace `${name}` placeholders; unknown names stay verbatim.
pub fn substitute_variables(text: &str, variables: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match variables.get(key) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 1]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Splits a string into whitespace-separated tokens while respecting
/// single and double quotes. Quotes are removed from returned tokens.
pub(crate) fn split_preserving_quotes(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut in_double = false;
    let mut in_single = false;

    for c in s.chars() {
        match c {
            '"' if !in_single => {
                in_double = !in_double;
            }
            '\'' if !in_double => {
                in_single = !in_single;
            }
            c if c.is_whitespace() && !in_double && !in_single => {
                if !buf.is_empty() {
                    out.push(std::mem::take(&mut buf));
                }
            }
            c => buf.push(c),
        }
    }

    if !buf.is_empty() {
        out.push(buf);
    }

    out
}

/// User-supplied argument strings follow shell quoting rules.
fn parse_user_args(what: &str, raw: &str) -> InstallResult<Vec<String>> {
    shlex::split(raw).ok_or_else(|| InstallError::validation(what, "unbalanced quotes"))
}

/// Replace any `-Xms`/`-Xmx` already present with the requested sizes.
pub fn apply_memory(args: &mut Vec<String>, min_mb: Option<u32>, max_mb: Option<u32>) {
    if let Some(min) = min_mb {
        args.retain(|a| !a.starts_with("-Xms"));
        args.insert(0, format!("-Xms{}M", min));
    }
    if let Some(max) = max_mb {
        args.retain(|a| !a.starts_with("-Xmx"));
        args.insert(0, format!("-Xmx{}M", max));
    }
}

/// Where each loader looks for mods.
pub fn mod_path_flag(loader: &str, mods_dir: &Path) -> Option<String> {
    let property = match loader {
        "fabric" => "fabric.modPath",
        "quilt" => "quilt.modPath",
        "forge" | "neoforge" => "fml.modsFolder",
        _ => return None,
    };
    Some(format!("-D{}={}", property, canonical_string(mods_dir)))
}

/// Stable UUID for a player without an online account.
pub fn offline_uuid(username: &str) -> String {
    Uuid::new_v3(
        &Uuid::NAMESPACE_URL,
        format!("OfflinePlayer:{}", username).as_bytes(),
    )
    .hyphenated()
    .to_string()
}

/// Prefer canonicalized paths so variables are consistent across platforms.
fn canonical_string(path: &Path) -> String {
    canonicalize(path)
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| path.to_string_lossy().to_string())
}

fn build_variables(
    resolved: &ResolvedRuntime,
    request: &LaunchRequest,
    env: &LaunchEnvironment,
    classpath: &str,
) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    let uuid = request
        .uuid
        .clone()
        .unwrap_or_else(|| offline_uuid(&request.username));

    // Player info (support multiple common placeholders for compatibility)
    vars.insert("auth_player_name".to_string(), request.username.clone());
    vars.insert("player_name".to_string(), request.username.clone());
    vars.insert("auth_uuid".to_string(), uuid.clone());
    vars.insert("uuid".to_string(), uuid);
    vars.insert("auth_access_token".to_string(), request.access_token.clone());
    vars.insert("accessToken".to_string(), request.access_token.clone());
    vars.insert("auth_session".to_string(), request.access_token.clone());
    vars.insert("user_type".to_string(), request.user_type.clone());
    vars.insert("user_properties".to_string(), "{}".to_string());
    vars.insert("clientid".to_string(), request.client_id.clone());
    vars.insert(
        "auth_xuid".to_string(),
        request.xuid.clone().unwrap_or_else(|| "0".to_string()),
    );

    // Version info
    vars.insert("version_name".to_string(), resolved.id.clone());
    vars.insert(
        "version_type".to_string(),
        resolved
            .version_type
            .clone()
            .unwrap_or_else(|| "release".to_string()),
    );
    vars.insert(
        "assets_index_name".to_string(),
        resolved.assets_id().unwrap_or(&resolved.id).to_string(),
    );

    // Directories
    let assets = canonical_string(&env.assets_dir);
    vars.insert("game_directory".to_string(), canonical_string(&env.game_dir));
    vars.insert("assets_root".to_string(), assets.clone());
    vars.insert("game_assets".to_string(), assets);
    vars.insert("natives_directory".to_string(), canonical_string(&env.natives_dir));
    vars.insert("library_directory".to_string(), canonical_string(&env.libraries_dir));
    vars.insert(
        "classpath_separator".to_string(),
        env.platform.os.classpath_separator().to_string(),
    );
    vars.insert("classpath".to_string(), classpath.to_string());
    vars.insert("launcher_name".to_string(), LAUNCHER_NAME.to_string());
    vars.insert(
        "launcher_version".to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    );

    // Resolution
    if let Some(width) = request.window_width {
        vars.insert("resolution_width".to_string(), width.to_string());
    }
    if let Some(height) = request.window_height {
        vars.insert("resolution_height".to_string(), height.to_string());
    }

    vars
}

fn default_jvm_templates() -> Vec<Argument> {
    ["-Djava.library.path=${natives_directory}", "-cp", "${classpath}"]
        .into_iter()
        .map(|s| Argument::Simple(s.to_string()))
        .collect()
}

fn default_game_templates() -> Vec<Argument> {
    [
        "--username",
        "${auth_player_name}",
        "--version",
        "${version_name}",
        "--gameDir",
        "${game_directory}",
        "--assetsDir",
        "${assets_root}",
        "--assetIndex",
        "${assets_index_name}",
        "--uuid",
        "${auth_uuid}",
        "--accessToken",
        "${auth_access_token}",
        "--userType",
        "${user_type}",
    ]
    .into_iter()
    .map(|s| Argument::Simple(s.to_string()))
    .collect()
}

/// Get default JVM arguments
fn get_default_jvm_args() -> Vec<String> {
    vec![
        // Memory settings
        "-Xms2G".to_string(),
        "-Xmx4G".to_string(),
        // G1GC settings for better performance
        "-XX:+UseG1GC".to_string(),
        "-XX:+UnlockExperimentalVMOptions".to_string(),
        "-XX:G1NewSizePercent=20".to_string(),
        "-XX:G1ReservePercent=20".to_string(),
        "-XX:MaxGCPauseMillis=50".to_string(),
        "-XX:G1HeapRegionSize=32M".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::installer::types::{Arch, OsType, Platform};
    use crate::game::launcher::version_parser::{
        LauncherMetadata, Library, OsRule, Rule, RuleAction,
    };
    use std::path::PathBuf;

    fn runtime() -> ResolvedRuntime {
        ResolvedRuntime {
            id: "1.20.1".into(),
            chain: vec!["1.20.1".into()],
            libraries: vec![Library::from_coords("com.example:lib:1.0")],
            jvm_arguments: vec![],
            game_arguments: vec![],
            legacy_arguments: None,
            main_class: Some("net.minecraft.client.main.Main".into()),
            asset_index: None,
            assets: Some("5".into()),
            binary: "1.20.1".into(),
            version_type: Some("release".into()),
            java_version: None,
            launcher: None,
        }
    }

    fn env() -> LaunchEnvironment {
        LaunchEnvironment {
            platform: Platform::new(OsType::Linux, Arch::X64, "6.1"),
            libraries_dir: PathBuf::from("/nonexistent/libraries"),
            versions_dir: PathBuf::from("/nonexistent/versions"),
            assets_dir: PathBuf::from("/nonexistent/assets"),
            natives_dir: PathBuf::from("/nonexistent/versions/1.20.1/natives"),
            game_dir: PathBuf::from("/nonexistent/versions/1.20.1"),
            loader_binary: None,
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_substitute_variables() {
        let mut vars = HashMap::new();
        vars.insert("username".to_string(), "Player".to_string());
        vars.insert("version".to_string(), "1.20.1".to_string());

        let result = substitute_variables("--username ${username} --version ${version}", &vars);
        assert_eq!(result, "--username Player --version 1.20.1");
    }

    #[test]
    fn test_substitute_variables_no_match() {
        let vars = HashMap::new();
        let result = substitute_variables("--username ${username}", &vars);
        assert_eq!(result, "--username ${username}");
        assert_eq!(substitute_variables("${open", &vars), "${open");
    }

    #[test]
    fn test_split_preserving_quotes() {
        assert_eq!(
            split_preserving_quotes(r#"--a "b c" 'd e' f"#),
            vec!["--a", "b c", "d e", "f"]
        );
    }

    #[test]
    fn versions_without_templates_get_defaults() {
        let invocation =
            build_invocation(&runtime(), &LaunchRequest::offline("Steve"), &env()).unwrap();
        let args = &invocation.program_args;
        assert_eq!(value_after(args, "--username"), Some("Steve"));
        assert_eq!(value_after(args, "--version"), Some("1.20.1"));
        assert_eq!(value_after(args, "--assetIndex"), Some("5"));
        assert_eq!(value_after(args, "--accessToken"), Some("0"));
        assert_eq!(value_after(args, "--userType"), Some("legacy"));
        assert_eq!(value_after(args, "--uuid"), Some(offline_uuid("Steve").as_str()));

        let jvm = &invocation.jvm_args;
        assert!(jvm.iter().any(|a| a.starts_with("-Djava.library.path=")));
        assert_eq!(value_after(jvm, "-cp"), Some(invocation.classpath_string.as_str()));
        assert_eq!(invocation.main_class, "net.minecraft.client.main.Main");
        assert_eq!(invocation.working_dir, PathBuf::from("/nonexistent/versions/1.20.1"));
        assert_eq!(
            invocation.classpath,
            vec![
                PathBuf::from("/nonexistent/libraries/com/example/lib/1.0/lib-1.0.jar"),
                PathBuf::from("/nonexistent/versions/1.20.1/1.20.1.jar"),
            ]
        );
    }

    #[test]
    fn legacy_argument_string_is_split() {
        let mut resolved = runtime();
        resolved.legacy_arguments = Some(
            "--username ${auth_player_name} --session ${auth_session} --tweakClass ${tweak}".into(),
        );
        let invocation = build_invocation(
            &resolved,
            &LaunchRequest::offline("Alex").with_session("tok", "msa"),
            &env(),
        )
        .unwrap();
        assert_eq!(
            invocation.program_args,
            vec!["--username", "Alex", "--session", "tok", "--tweakClass", "${tweak}"]
        );
    }

    #[test]
    fn conditional_tokens_use_no_features() {
        let mut resolved = runtime();
        resolved.game_arguments = vec![
            Argument::Simple("--username".into()),
            Argument::Simple("${auth_player_name}".into()),
            Argument::Conditional {
                rules: vec![Rule {
                    action: RuleAction::Allow,
                    os: None,
                    features: Some([("has_custom_resolution".to_string(), true)].into()),
                }],
                value: ArgumentValue::Multiple(vec![
                    "--width".into(),
                    "${resolution_width}".into(),
                ]),
            },
        ];
        resolved.jvm_arguments = vec![
            Argument::Conditional {
                rules: vec![Rule {
                    action: RuleAction::Allow,
                    os: Some(OsRule {
                        name: Some("osx".into()),
                        ..Default::default()
                    }),
                    features: None,
                }],
                value: ArgumentValue::Single("-XstartOnFirstThread".into()),
            },
            Argument::Simple("-cp".into()),
            Argument::Simple("${classpath}".into()),
        ];
        let request = LaunchRequest::offline("Steve").with_window(800, 600);
        let invocation = build_invocation(&resolved, &request, &env()).unwrap();
        assert_eq!(invocation.program_args, vec!["--username", "Steve"]);
        assert!(!invocation.jvm_args.contains(&"-XstartOnFirstThread".to_string()));
        assert_eq!(invocation.jvm_args.iter().filter(|a| *a == "-cp").count(), 1);
    }

    #[test]
    fn memory_override_replaces_defaults() {
        let invocation = build_invocation(
            &runtime(),
            &LaunchRequest::offline("Steve").with_memory(Some(1024), Some(3072)),
            &env(),
        )
        .unwrap();
        let jvm = &invocation.jvm_args;
        assert_eq!(jvm.iter().filter(|a| a.starts_with("-Xmx")).count(), 1);
        assert!(jvm.contains(&"-Xmx3072M".to_string()));
        assert!(jvm.contains(&"-Xms1024M".to_string()));
        assert!(!jvm.contains(&"-Xmx4G".to_string()));
    }

    #[test]
    fn extra_args_use_shell_quoting() {
        let request = LaunchRequest::offline("Steve")
            .with_extra_jvm_args(r#"-Dfoo="a b" -XX:+UseZGC"#)
            .with_extra_game_args("--demo");
        let invocation = build_invocation(&runtime(), &request, &env()).unwrap();
        assert!(invocation.jvm_args.contains(&"-Dfoo=a b".to_string()));
        assert!(invocation.jvm_args.contains(&"-XX:+UseZGC".to_string()));
        assert!(!invocation.jvm_args.contains(&"-XX:+UseG1GC".to_string()));
        assert_eq!(invocation.program_args.last().map(String::as_str), Some("--demo"));

        let broken = LaunchRequest::offline("Steve").with_extra_jvm_args("\"unterminated");
        assert!(build_invocation(&runtime(), &broken, &env()).is_err());
    }

    #[test]
    fn modded_versions_get_mod_path_flag() {
        let mut resolved = runtime();
        resolved.launcher = Some(LauncherMetadata {
            modded: true,
            loader: Some("neoforge".into()),
            loader_version: Some("20.4.237".into()),
            base_version: Some("1.20.4".into()),
        });
        let invocation =
            build_invocation(&resolved, &LaunchRequest::offline("Steve"), &env()).unwrap();
        assert!(invocation
            .jvm_args
            .contains(&"-Dfml.modsFolder=/nonexistent/versions/1.20.1/mods".to_string()));

        assert_eq!(
            mod_path_flag("fabric", Path::new("/m")).as_deref(),
            Some("-Dfabric.modPath=/m")
        );
        assert_eq!(mod_path_flag("liteloader", Path::new("/m")), None);
    }

    #[test]
    fn offline_uuid_is_stable() {
        assert_eq!(offline_uuid("Steve"), offline_uuid("Steve"));
        assert_ne!(offline_uuid("Steve"), offline_uuid("Alex"));
        assert_eq!(offline_uuid("Steve").len(), 36);
    }

    #[test]
    fn test_default_jvm_args() {
        let args = get_default_jvm_args();
        assert!(args.contains(&"-Xms2G".to_string()));
        assert!(args.contains(&"-Xmx4G".to_string()));
        assert!(args.contains(&"-XX:+UseG1GC".to_string()));
    }
}
