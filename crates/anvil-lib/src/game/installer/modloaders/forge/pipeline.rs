//! Patch pipeline: runs an installer's client processors and installs the patched
//! game binary atomically.

use super::parser::{jar_main_class, InstallProfile, InstallerArchive, Processor};
use crate::error::{InstallError, InstallResult, IoResultExt};
use crate::game::installer::context::InstallContext;
use crate::game::installer::core::downloader::install_local_file;
use crate::game::installer::core::library::acquire_libraries;
use crate::game::installer::core::verify::sha1_file;
use crate::game::installer::layout::RuntimeLayout;
use crate::game::installer::retry::RetryPolicy;
use crate::game::launcher::classpath::maven_to_path;
use crate::game::launcher::version_parser::{binary_path, Library};
use crate::utils::process::SpawnProfile;
use crate::utils::run_blocking;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio::process::Command;

const MODERN_ENTRY: &str = "net/minecraft/client/main/Main.class";
const LEGACY_ENTRY: &str = "net/minecraft/client/Minecraft.class";

#[derive(Debug, Clone)]
pub struct MaterializeRequest {
    /// Vanilla version whose binary is patched
    pub base_version: String,
    /// Installer archive; without one the base binary is copied as is
    pub installer: Option<PathBuf>,
    pub output_path: PathBuf,
}

/// Produce the binary for a loader profile at `request.output_path`.
/// On any failure the output path is left untouched.
pub async fn materialize_binary(
    ctx: &InstallContext,
    layout: &RuntimeLayout,
    request: &MaterializeRequest,
) -> InstallResult<()> {
    ctx.cancel().check()?;
    let base_binary = binary_path(&layout.versions_dir(), &request.base_version);

    let source = match &request.installer {
        Some(installer) => run_pipeline(ctx, layout, request, installer, &base_binary).await?,
        None => {
            log::info!("No installer for {}, reusing base binary", request.base_version);
            run_blocking({
                let base = base_binary.clone();
                move || validate_client_jar(&base)
            })
            .await?;
            base_binary
        }
    };

    ctx.cancel().check()?;
    install_atomically(source, request.output_path.clone()).await?;
    log::info!("Game binary ready at {:?}", request.output_path);
    Ok(())
}

/// A usable client binary is a zip holding the game's entry point class.
pub fn validate_client_jar(path: &Path) -> InstallResult<()> {
    let file = std::fs::File::open(path).at(path)?;
    let zip = zip::ZipArchive::new(file)
        .map_err(|e| InstallError::validation(format!("client binary {:?}", path), e))?;
    if zip.index_for_name(MODERN_ENTRY).is_some() || zip.index_for_name(LEGACY_ENTRY).is_some() {
        return Ok(());
    }
    Err(InstallError::validation(
        format!("client binary {:?}", path),
        "game entry point class not found",
    ))
}

/// Copy beside the destination, validate the copy, then rename over the destination.
async fn install_atomically(source: PathBuf, destination: PathBuf) -> InstallResult<()> {
    run_blocking(move || {
        let parent = destination
            .parent()
            .ok_or_else(|| InstallError::validation("output path", format!("{:?}", destination)))?;
        std::fs::create_dir_all(parent).at(parent)?;

        let mut temp = tempfile::NamedTempFile::new_in(parent).at(parent)?;
        let mut input = std::fs::File::open(&source).at(&source)?;
        std::io::copy(&mut input, temp.as_file_mut()).at(temp.path())?;
        temp.as_file().sync_all().at(temp.path())?;
        validate_client_jar(temp.path())?;

        temp.persist(&destination)
            .map_err(|e| InstallError::Io {
                path: destination.clone(),
                source: e.error,
            })?;
        Ok(())
    })
    .await
}

/// What the installer archive contributes before any processor runs.
struct Unpacked {
    profile: InstallProfile,
    extracted: HashMap<String, PathBuf>,
    /// Embedded maven artifacts, relative to the staging directory
    staged: Vec<PathBuf>,
}

async fn run_pipeline(
    ctx: &InstallContext,
    layout: &RuntimeLayout,
    request: &MaterializeRequest,
    installer: &Path,
    base_binary: &Path,
) -> InstallResult<PathBuf> {
    log::info!("Running patch pipeline from {:?}", installer);
    let reporter = ctx.reporter();
    reporter.start_step("Patching game binary", None);

    let libraries_dir = layout.libraries_dir();
    let work = tempfile::Builder::new()
        .prefix("patch-")
        .tempdir_in(ensure_dir(layout.root().join("cache")).await?)
        .at(layout.root())?;

    // 1. profile, embedded maven artifacts, data files
    let staging_dir = work.path().join("maven");
    let unpacked = {
        let installer = installer.to_path_buf();
        let staging_dir = staging_dir.clone();
        let work_dir = work.path().to_path_buf();
        run_blocking(move || unpack_installer(&installer, &staging_dir, &work_dir)).await?
    };
    for rel in &unpacked.staged {
        install_local_file(ctx, &staging_dir.join(rel), &libraries_dir.join(rel)).await?;
    }
    let profile = &unpacked.profile;
    let processors: Vec<&Processor> =
        profile.processors.iter().filter(|p| p.runs_on_client()).collect();

    if processors.is_empty() {
        log::info!("Installer declares no client processors, reusing base binary");
        run_blocking({
            let base = base_binary.to_path_buf();
            move || validate_client_jar(&base)
        })
        .await?;
        return Ok(base_binary.to_path_buf());
    }

    // 2. tool libraries
    let tools = tool_libraries(ctx, profile, &processors);
    acquire_libraries(ctx, &tools, &libraries_dir, &work.path().join("natives")).await?;

    // 3. tokens; the binary diff must decompress before anything runs
    let tokens = build_tokens(
        profile,
        &unpacked.extracted,
        request,
        installer,
        base_binary,
        layout,
    )?;
    if let Some(binpatch) = tokens.get("BINPATCH") {
        let binpatch = PathBuf::from(binpatch);
        run_blocking(move || check_lzma(&binpatch)).await?;
    }

    // 4. processors in declared order
    let java = match &ctx.config.java_path {
        Some(path) => path.clone(),
        None => which::which("java").map_err(|_| InstallError::MissingTool("java".into()))?,
    };
    let separator = ctx.platform.os.classpath_separator();
    let total = processors.len();
    let mut skipped = 0;
    for (idx, processor) in processors.iter().enumerate() {
        ctx.cancel().check()?;
        reporter.set_substep(Some(&processor.jar), Some(idx as u32 + 1), Some(total as u32));

        if outputs_valid(processor, &tokens, &libraries_dir).await? {
            log::info!(
                "Skipping processor {}/{}: {} (outputs already valid)",
                idx + 1,
                total,
                processor.jar
            );
            skipped += 1;
            continue;
        }

        log::info!("Executing processor {}/{}: {}", idx + 1, total, processor.jar);
        run_processor(&java, processor, &tokens, &libraries_dir, separator).await?;
        verify_outputs(processor, &tokens, &libraries_dir).await?;
        reporter.set_percent((((idx + 1) * 100) / total) as i32);
    }
    if skipped > 0 {
        log::info!("Skipped {}/{} processors with valid outputs", skipped, total);
    }

    // 5. patched output, else the official-mapped binary
    for key in ["PATCHED", "MC_OFF"] {
        if let Some(path) = tokens.get(key).map(PathBuf::from) {
            if tokio::fs::try_exists(&path).await.at(&path)? {
                log::debug!("Using {} output {:?}", key, path);
                return Ok(path);
            }
        }
    }
    Err(InstallError::validation(
        format!("installer {:?}", installer),
        "processors did not produce a patched binary",
    ))
}

async fn ensure_dir(dir: PathBuf) -> InstallResult<PathBuf> {
    tokio::fs::create_dir_all(&dir).await.at(&dir)?;
    Ok(dir)
}

fn unpack_installer(
    installer: &Path,
    staging_dir: &Path,
    work_dir: &Path,
) -> InstallResult<Unpacked> {
    let mut archive = InstallerArchive::open(installer)?;
    let profile = archive.install_profile()?;
    let staged = archive.extract_maven(staging_dir)?;

    let mut extracted = HashMap::new();
    let mut wanted: Vec<String> = profile
        .data
        .values()
        .filter_map(|entry| entry.client.strip_prefix('/').map(str::to_string))
        .collect();
    if archive.has_entry("data/client.lzma") {
        wanted.push("data/client.lzma".to_string());
    }
    for name in wanted {
        if extracted.contains_key(&name) {
            continue;
        }
        let destination = archive.extract_entry(&name, work_dir)?;
        extracted.insert(name, destination);
    }
    Ok(Unpacked {
        profile,
        extracted,
        staged,
    })
}

/// Profile libraries plus every processor jar and classpath entry not already listed.
fn tool_libraries(
    ctx: &InstallContext,
    profile: &InstallProfile,
    processors: &[&Processor],
) -> Vec<Library> {
    let mut tools = profile.libraries.clone();
    for processor in processors {
        for coords in std::iter::once(&processor.jar).chain(processor.classpath.iter()) {
            if tools.iter().any(|l| &l.name == coords) {
                continue;
            }
            let mut lib = Library::from_coords(coords.clone());
            lib.url = Some(if coords.starts_with("net.neoforged") {
                ctx.config.neoforge_maven_url.clone()
            } else {
                ctx.config.forge_maven_url.clone()
            });
            tools.push(lib);
        }
    }
    tools
}

fn build_tokens(
    profile: &InstallProfile,
    extracted: &HashMap<String, PathBuf>,
    request: &MaterializeRequest,
    installer: &Path,
    base_binary: &Path,
    layout: &RuntimeLayout,
) -> InstallResult<HashMap<String, String>> {
    let lossy = |p: &Path| p.to_string_lossy().into_owned();
    let libraries_dir = layout.libraries_dir();

    let mut tokens = HashMap::new();
    tokens.insert("SIDE".to_string(), "client".to_string());
    tokens.insert("MINECRAFT_JAR".to_string(), lossy(base_binary));
    tokens.insert("ROOT".to_string(), lossy(layout.root()));
    tokens.insert("INSTALLER".to_string(), lossy(installer));
    tokens.insert("LIBRARY_DIR".to_string(), lossy(&libraries_dir));
    tokens.insert("MINECRAFT_VERSION".to_string(), request.base_version.clone());
    if let Some(diff) = extracted.get("data/client.lzma") {
        tokens.insert("BINPATCH".to_string(), lossy(diff));
    }

    for (key, entry) in &profile.data {
        let value = &entry.client;
        let resolved = if let Some(inner) = value.strip_prefix('/') {
            match extracted.get(inner) {
                Some(path) => lossy(path),
                None => value.clone(),
            }
        } else if let Some(coords) = bracketed(value, '[', ']') {
            lossy(&libraries_dir.join(maven_to_path(coords)?))
        } else if let Some(literal) = bracketed(value, '\'', '\'') {
            literal.to_string()
        } else {
            value.clone()
        };
        tokens.insert(key.clone(), resolved);
    }
    Ok(tokens)
}

fn bracketed(value: &str, open: char, close: char) -> Option<&str> {
    value
        .strip_prefix(open)
        .and_then(|v| v.strip_suffix(close))
}

/// Replace `{NAME}` with known tokens; unknown names stay verbatim.
pub fn substitute_tokens(text: &str, tokens: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match tokens.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
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

/// Substitute tokens, then map a bracketed coordinate to its library path.
fn resolve_arg(arg: &str, tokens: &HashMap<String, String>, libraries_dir: &Path) -> InstallResult<String> {
    let substituted = substitute_tokens(arg, tokens);
    match bracketed(&substituted, '[', ']') {
        Some(coords) => Ok(libraries_dir
            .join(maven_to_path(coords)?)
            .to_string_lossy()
            .into_owned()),
        None => Ok(substituted),
    }
}

/// The legacy LZMA stream must decode completely.
fn check_lzma(path: &Path) -> InstallResult<()> {
    let file = std::fs::File::open(path).at(path)?;
    let stream = xz2::stream::Stream::new_lzma_decoder(u64::MAX)
        .map_err(|e| InstallError::validation(format!("binary diff {:?}", path), e))?;
    let mut decoder = xz2::read::XzDecoder::new_stream(std::io::BufReader::new(file), stream);
    let mut buf = [0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        match decoder.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => total += n as u64,
            Err(e) => return Err(InstallError::validation(format!("binary diff {:?}", path), e)),
        }
    }
    log::debug!("Binary diff {:?} decodes to {} bytes", path, total);
    Ok(())
}

/// Declared outputs as (path, expected sha1).
fn declared_outputs(
    processor: &Processor,
    tokens: &HashMap<String, String>,
    libraries_dir: &Path,
) -> InstallResult<Vec<(PathBuf, String)>> {
    processor
        .outputs
        .iter()
        .map(|(key, value)| {
            let path = PathBuf::from(resolve_arg(key, tokens, libraries_dir)?);
            let sha1 = substitute_tokens(value, tokens);
            let sha1 = bracketed(&sha1, '\'', '\'').unwrap_or(&sha1).to_lowercase();
            Ok((path, sha1))
        })
        .collect()
}

async fn outputs_valid(
    processor: &Processor,
    tokens: &HashMap<String, String>,
    libraries_dir: &Path,
) -> InstallResult<bool> {
    let outputs = declared_outputs(processor, tokens, libraries_dir)?;
    if outputs.is_empty() {
        return Ok(false);
    }
    for (path, expected) in outputs {
        if !path.is_file() || sha1_file(&path).await? != expected {
            return Ok(false);
        }
    }
    Ok(true)
}

async fn verify_outputs(
    processor: &Processor,
    tokens: &HashMap<String, String>,
    libraries_dir: &Path,
) -> InstallResult<()> {
    for (path, expected) in declared_outputs(processor, tokens, libraries_dir)? {
        if !path.is_file() {
            return Err(InstallError::Processor {
                tool: processor.jar.clone(),
                code: Some(0),
                stderr: format!("declared output {:?} was not created", path),
            });
        }
        let actual = sha1_file(&path).await?;
        if actual != expected {
            return Err(InstallError::Sha1Mismatch {
                path,
                expected,
                actual,
            });
        }
    }
    Ok(())
}

async fn run_processor(
    java: &Path,
    processor: &Processor,
    tokens: &HashMap<String, String>,
    libraries_dir: &Path,
    separator: &str,
) -> InstallResult<()> {
    let jar = libraries_dir.join(maven_to_path(&processor.jar)?);
    if !jar.is_file() {
        return Err(InstallError::MissingTool(format!(
            "processor jar {} at {:?}",
            processor.jar, jar
        )));
    }
    let main_class = run_blocking({
        let jar = jar.clone();
        move || jar_main_class(&jar)
    })
    .await?
    .ok_or_else(|| InstallError::MissingTool(format!("entry point of {}", processor.jar)))?;

    let mut classpath = vec![jar.to_string_lossy().into_owned()];
    for coords in &processor.classpath {
        classpath.push(
            libraries_dir
                .join(maven_to_path(coords)?)
                .to_string_lossy()
                .into_owned(),
        );
    }
    let args = processor
        .args
        .iter()
        .map(|arg| resolve_arg(arg, tokens, libraries_dir))
        .collect::<InstallResult<Vec<_>>>()?;

    log::debug!("Processor main class: {}", main_class);
    log::debug!("Processor args: {:?}", args);

    let classpath = classpath.join(separator);
    let (classpath, main_class, args) = (&classpath, &main_class, &args);
    let output = RetryPolicy::subprocess()
        .run(&processor.jar, move || async move {
            Command::new(java)
                .arg("-cp")
                .arg(classpath)
                .arg(main_class)
                .args(args)
                .as_processor()
                .output()
                .await
                .map_err(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => {
                        InstallError::MissingTool(format!("java at {:?}", java))
                    }
                    _ => InstallError::Io {
                        path: java.to_path_buf(),
                        source: e,
                    },
                })
        })
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        log::error!("Processor {} failed: {}", processor.jar, stderr);
        return Err(InstallError::Processor {
            tool: processor.jar.clone(),
            code: output.status.code(),
            stderr,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::FileOptions;

    fn tokens() -> HashMap<String, String> {
        [
            ("SIDE".to_string(), "client".to_string()),
            ("PATCHED".to_string(), "/libs/patched.jar".to_string()),
        ]
        .into()
    }

    #[test]
    fn token_substitution_keeps_unknown_names() {
        assert_eq!(
            substitute_tokens("--side {SIDE} --out {PATCHED} {UNKNOWN}", &tokens()),
            "--side client --out /libs/patched.jar {UNKNOWN}"
        );
        assert_eq!(substitute_tokens("{unterminated", &tokens()), "{unterminated");
    }

    #[test]
    fn bracketed_args_become_library_paths() {
        let arg = resolve_arg("[net.minecraft:client:1.20.1:srg]", &tokens(), Path::new("/libs")).unwrap();
        assert_eq!(
            PathBuf::from(arg),
            PathBuf::from("/libs/net/minecraft/client/1.20.1/client-1.20.1-srg.jar")
        );
    }

    fn write_jar(path: &Path, entries: &[&str]) {
        let f = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(f);
        for name in entries {
            zip.start_file::<&str, ()>(name, FileOptions::default()).unwrap();
            zip.write_all(b"x").unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn client_jar_validation() {
        let tmp = TempDir::new().unwrap();
        let modern = tmp.path().join("modern.jar");
        write_jar(&modern, &[MODERN_ENTRY]);
        let legacy = tmp.path().join("legacy.jar");
        write_jar(&legacy, &[LEGACY_ENTRY]);
        let empty = tmp.path().join("empty.jar");
        write_jar(&empty, &["readme.txt"]);
        let garbage = tmp.path().join("garbage.jar");
        std::fs::write(&garbage, b"nope").unwrap();

        assert!(validate_client_jar(&modern).is_ok());
        assert!(validate_client_jar(&legacy).is_ok());
        assert!(validate_client_jar(&empty).is_err());
        assert!(validate_client_jar(&garbage).is_err());
    }

    #[test]
    fn lzma_integrity() {
        let tmp = TempDir::new().unwrap();
        let good = tmp.path().join("good.lzma");
        let opts = xz2::stream::LzmaOptions::new_preset(6).unwrap();
        let stream = xz2::stream::Stream::new_lzma_encoder(&opts).unwrap();
        let mut enc = xz2::write::XzEncoder::new_stream(Vec::new(), stream);
        enc.write_all(b"binary patch payload").unwrap();
        std::fs::write(&good, enc.finish().unwrap()).unwrap();
        assert!(check_lzma(&good).is_ok());

        let bad = tmp.path().join("bad.lzma");
        std::fs::write(&bad, b"\x00\x01garbage").unwrap();
        assert_eq!(
            check_lzma(&bad).unwrap_err().kind(),
            crate::error::ErrorKind::Validation
        );
    }

    #[tokio::test]
    async fn atomic_install_rejects_invalid_source() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("bad.jar");
        write_jar(&source, &["readme.txt"]);
        let dest = tmp.path().join("out/custom.jar");

        assert!(install_atomically(source, dest.clone()).await.is_err());
        assert!(!dest.exists());
        let leftovers = std::fs::read_dir(tmp.path().join("out")).unwrap().count();
        assert_eq!(leftovers, 0);
    }
}
