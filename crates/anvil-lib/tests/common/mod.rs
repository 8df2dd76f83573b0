#![allow(dead_code)]

use anvil_lib::game::installer::config::InstallerConfig;
use anvil_lib::game::installer::context::InstallContext;
use anvil_lib::game::installer::core::verify::sha1_bytes;
use anvil_lib::game::installer::types::{Arch, OsType, Platform};
use serde_json::{json, Value};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::write::FileOptions;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn linux() -> Platform {
    Platform::new(OsType::Linux, Arch::X64, "6.1")
}

/// Context routed at a mock server, with a short lock wait.
pub fn context(server_uri: &str) -> InstallContext {
    let config = InstallerConfig::default()
        .with_endpoint_base(server_uri)
        .with_lock_policy(Duration::from_secs(10), Duration::from_secs(60));
    InstallContext::new(config)
        .unwrap()
        .with_platform(linux())
}

/// In-memory zip archive with the given entries.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, data) in entries {
        zip.start_file::<&str, ()>(*name, FileOptions::default())
            .unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, zip_bytes(entries)).unwrap();
}

/// A client binary that passes entry point validation.
pub fn client_jar() -> Vec<u8> {
    zip_bytes(&[
        ("net/minecraft/client/main/Main.class", b"\xca\xfe\xba\xbe"),
        ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\r\n"),
    ])
}

/// Serve a vanilla version: catalog, descriptor and client binary.
pub async fn mount_vanilla(server: &MockServer, version: &str, client: &[u8]) {
    let base = server.uri();
    let descriptor = json!({
        "id": version,
        "type": "release",
        "mainClass": "net.minecraft.client.main.Main",
        "arguments": {
            "game": ["--username", "${auth_player_name}", "--version", "${version_name}",
                     "--gameDir", "${game_directory}"],
            "jvm": ["-Djava.library.path=${natives_directory}", "-cp", "${classpath}"]
        },
        "libraries": [],
        "downloads": {
            "client": {
                "url": format!("{}/client/{}.jar", base, version),
                "sha1": sha1_bytes(client),
                "size": client.len()
            }
        }
    });
    let descriptor_raw = serde_json::to_vec(&descriptor).unwrap();
    let catalog = json!({
        "latest": {"release": version, "snapshot": version},
        "versions": [{
            "id": version,
            "type": "release",
            "url": format!("{}/v1/packages/{}.json", base, version),
            "time": "2023-06-12T13:25:51+00:00",
            "releaseTime": "2023-06-12T13:25:51+00:00",
            "sha1": sha1_bytes(&descriptor_raw)
        }]
    });

    Mock::given(method("GET"))
        .and(path("/mc/game/version_manifest_v2.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(catalog))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/v1/packages/{}.json", version)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(descriptor_raw))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/client/{}.jar", version)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(client.to_vec()))
        .mount(server)
        .await;
}

pub fn write_json(path: &Path, value: &Value) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
}
