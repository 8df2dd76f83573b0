#![cfg(unix)]

mod common;

use anvil_lib::game::installer::core::verify::sha1_bytes;
use anvil_lib::game::installer::layout::RuntimeLayout;
use anvil_lib::game::installer::modloaders::forge::{materialize_binary, MaterializeRequest};
use anvil_lib::{ErrorKind, InstallError};
use serde_json::json;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const PATCHED_REL: &str =
    "libraries/net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-client.jar";

fn lzma(payload: &[u8]) -> Vec<u8> {
    let opts = xz2::stream::LzmaOptions::new_preset(6).unwrap();
    let stream = xz2::stream::Stream::new_lzma_encoder(&opts).unwrap();
    let mut enc = xz2::write::XzEncoder::new_stream(Vec::new(), stream);
    enc.write_all(payload).unwrap();
    enc.finish().unwrap()
}

fn tool_jar(main_class: &str) -> Vec<u8> {
    let manifest = format!("Manifest-Version: 1.0\r\nMain-Class: {}\r\n", main_class);
    common::zip_bytes(&[("META-INF/MANIFEST.MF", manifest.as_bytes())])
}

/// Installer with two client steps: one writes a checksummed marker, two patches the binary.
fn write_installer(path: &Path, binpatch: &[u8]) {
    let profile = json!({
        "spec": 1,
        "version": "1.20.1-forge-47.2.0",
        "minecraft": "1.20.1",
        "data": {
            "PATCHED": {
                "client": "[net.minecraftforge:forge:1.20.1-47.2.0:client]",
                "server": "[net.minecraftforge:forge:1.20.1-47.2.0:server]"
            },
            "BINPATCH": {"client": "/data/client.lzma", "server": "/data/server.lzma"},
            "MARKER_SHA": {"client": format!("'{}'", sha1_bytes(b"one\n")), "server": "''"}
        },
        "processors": [
            {
                "jar": "com.example:step-one:1.0",
                "args": ["{ROOT}"],
                "outputs": {"{ROOT}/step1.txt": "{MARKER_SHA}"}
            },
            {
                "sides": ["server"],
                "jar": "com.example:server-only:1.0",
                "args": ["{ROOT}"]
            },
            {
                "jar": "com.example:step-two:1.0",
                "args": ["{ROOT}", "{MINECRAFT_JAR}", "{PATCHED}", "{SIDE}"]
            }
        ],
        "libraries": []
    });
    let profile_raw = serde_json::to_vec(&profile).unwrap();
    let step_one = tool_jar("example.StepOne");
    let step_two = tool_jar("example.StepTwo");
    common::write_zip(
        path,
        &[
            ("install_profile.json", &profile_raw),
            ("version.json", b"{\"id\": \"1.20.1-forge-47.2.0\"}"),
            ("data/client.lzma", binpatch),
            ("maven/com/example/step-one/1.0/step-one-1.0.jar", &step_one),
            ("maven/com/example/step-two/1.0/step-two-1.0.jar", &step_two),
        ],
    );
}

/// Stand-in for `java`: `-cp <classpath> <main> <args...>`.
fn write_fake_java(dir: &Path, step_two_body: &str) -> PathBuf {
    let script = format!(
        r#"#!/bin/sh
main="$3"
shift 3
root="$1"
echo "$main" >> "$root/calls.log"
case "$main" in
  example.StepOne)
    printf 'one\n' > "$root/step1.txt"
    ;;
  example.StepTwo)
{}
    ;;
  *)
    echo "unexpected main class $main" >&2
    exit 9
    ;;
esac
"#,
        step_two_body
    );
    let path = dir.join("fake-java");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

const PATCH_BY_COPY: &str = r#"    mkdir -p "$(dirname "$3")"
    cp "$2" "$3""#;

struct Fixture {
    _tmp: TempDir,
    layout: RuntimeLayout,
    installer: PathBuf,
    output: PathBuf,
    java: PathBuf,
}

fn fixture(step_two_body: &str, binpatch: &[u8]) -> Fixture {
    common::init_logging();
    let tmp = TempDir::new().unwrap();
    let layout = RuntimeLayout::new(tmp.path().join("runtime"));
    std::fs::create_dir_all(layout.root()).unwrap();

    let base = layout.versions_dir().join("1.20.1").join("1.20.1.jar");
    std::fs::create_dir_all(base.parent().unwrap()).unwrap();
    std::fs::write(&base, common::client_jar()).unwrap();

    let installer = tmp.path().join("forge-installer.jar");
    write_installer(&installer, binpatch);
    let java = write_fake_java(tmp.path(), step_two_body);
    let output = layout.versions_dir().join("my-forge").join("my-forge.jar");
    Fixture {
        _tmp: tmp,
        layout,
        installer,
        output,
        java,
    }
}

impl Fixture {
    fn request(&self) -> MaterializeRequest {
        MaterializeRequest {
            base_version: "1.20.1".to_string(),
            installer: Some(self.installer.clone()),
            output_path: self.output.clone(),
        }
    }

    fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.layout.root().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

#[tokio::test]
async fn client_steps_run_in_order_and_install_patched_binary() {
    let fx = fixture(PATCH_BY_COPY, &lzma(b"binary patch payload"));
    let mut ctx = common::context("http://127.0.0.1:9");
    ctx.config.java_path = Some(fx.java.clone());

    materialize_binary(&ctx, &fx.layout, &fx.request()).await.unwrap();

    assert_eq!(fx.calls(), vec!["example.StepOne", "example.StepTwo"]);
    assert_eq!(std::fs::read(&fx.output).unwrap(), common::client_jar());
    assert!(fx.layout.root().join(PATCHED_REL).is_file());
    // Embedded maven artifacts land in the shared library tree
    assert!(fx
        .layout
        .libraries_dir()
        .join("com/example/step-one/1.0/step-one-1.0.jar")
        .is_file());

    // A step whose declared outputs already verify is skipped on the next run
    materialize_binary(&ctx, &fx.layout, &fx.request()).await.unwrap();
    assert_eq!(
        fx.calls(),
        vec!["example.StepOne", "example.StepTwo", "example.StepTwo"]
    );
}

#[tokio::test]
async fn embedded_libraries_replace_damaged_copies_in_the_shared_tree() {
    let fx = fixture(PATCH_BY_COPY, &lzma(b"binary patch payload"));
    let mut ctx = common::context("http://127.0.0.1:9");
    ctx.config.java_path = Some(fx.java.clone());
    let step_one = fx
        .layout
        .libraries_dir()
        .join("com/example/step-one/1.0/step-one-1.0.jar");
    std::fs::create_dir_all(step_one.parent().unwrap()).unwrap();
    std::fs::write(&step_one, b"trunc").unwrap();

    materialize_binary(&ctx, &fx.layout, &fx.request()).await.unwrap();

    let jar = zip::ZipArchive::new(std::fs::File::open(&step_one).unwrap()).unwrap();
    assert!(jar.index_for_name("META-INF/MANIFEST.MF").is_some());
    assert!(!step_one.with_file_name("step-one-1.0.jar.lock").exists());
    assert_eq!(fx.calls(), vec!["example.StepOne", "example.StepTwo"]);
}

#[tokio::test]
async fn failing_step_reports_processor_error_and_leaves_output_untouched() {
    let fx = fixture(
        r#"    echo "patch exploded" >&2
    exit 3"#,
        &lzma(b"binary patch payload"),
    );
    let mut ctx = common::context("http://127.0.0.1:9");
    ctx.config.java_path = Some(fx.java.clone());

    let err = materialize_binary(&ctx, &fx.layout, &fx.request())
        .await
        .unwrap_err();
    match &err {
        InstallError::Processor { tool, code, stderr } => {
            assert_eq!(tool, "com.example:step-two:1.0");
            assert_eq!(*code, Some(3));
            assert!(stderr.contains("patch exploded"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(fx.calls(), vec!["example.StepOne", "example.StepTwo"]);
    assert!(!fx.output.exists());
}

#[tokio::test]
async fn corrupt_binary_diff_fails_before_any_step() {
    let fx = fixture(PATCH_BY_COPY, b"definitely not lzma");
    let mut ctx = common::context("http://127.0.0.1:9");
    ctx.config.java_path = Some(fx.java.clone());

    let err = materialize_binary(&ctx, &fx.layout, &fx.request())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(fx.calls().is_empty());
    assert!(!fx.output.exists());
}

#[tokio::test]
async fn missing_java_is_a_missing_tool() {
    let fx = fixture(PATCH_BY_COPY, &lzma(b"payload"));
    let mut ctx = common::context("http://127.0.0.1:9");
    ctx.config.java_path = Some(fx.layout.root().join("no-such-java"));

    let err = materialize_binary(&ctx, &fx.layout, &fx.request())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingTool);
    assert!(!fx.output.exists());
}

#[tokio::test]
async fn without_installer_the_base_binary_is_copied() {
    let fx = fixture(PATCH_BY_COPY, &lzma(b"payload"));
    let ctx = common::context("http://127.0.0.1:9");
    let request = MaterializeRequest {
        installer: None,
        ..fx.request()
    };

    materialize_binary(&ctx, &fx.layout, &request).await.unwrap();
    assert_eq!(std::fs::read(&fx.output).unwrap(), common::client_jar());
    assert!(fx.calls().is_empty());
}
