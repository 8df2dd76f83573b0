use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use anvil_lib::game::installer::layout::RuntimeLayout;
use anvil_lib::game::installer::{
    create_modded_profile, install_vanilla, CancelToken, InstallContext, InstallerConfig,
    ModdedProfileRequest, ModloaderType, ProgressReporter,
};
use anvil_lib::game::launcher::{prepare_launch, LaunchRequest};

struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn start_step(&self, name: &str, total_steps: Option<u32>) {
        println!("[STEP START] {} (total: {:?})", name, total_steps);
    }

    fn update_bytes(&self, transferred: u64, total: Option<u64>, bytes_per_sec: u64) {
        if let Some(t) = total {
            println!("[BYTES] {}/{} ({} B/s)", transferred, t, bytes_per_sec);
        } else {
            println!("[BYTES] {} ({} B/s)", transferred, bytes_per_sec);
        }
    }

    fn set_percent(&self, percent: i32) {
        println!("[PROGRESS] {}%", percent);
    }

    fn set_message(&self, message: &str) {
        println!("[MSG] {}", message);
    }

    fn set_substep(&self, name: Option<&str>, current: Option<u32>, total: Option<u32>) {
        println!("[SUBSTEP] name={:?} {}/{:?}", name, current.unwrap_or(0), total);
    }

    fn done(&self, success: bool, message: Option<&str>) {
        println!("[DONE] success={} message={:?}", success, message);
    }
}

/// Usage: install_and_launch <root> <minecraft-version> [fabric|quilt|forge|neoforge]
///
/// Installs into `<root>` (downloads real artifacts; may take a few minutes) and
/// prints the command that would start the game.
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let root = PathBuf::from(args.next().context("missing <root>")?);
    let version = args.next().unwrap_or_else(|| "1.20.1".to_string());
    let loader = args
        .next()
        .map(|l| l.parse::<ModloaderType>())
        .transpose()?;

    let (cancel, token) = CancelToken::pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let ctx = InstallContext::new(InstallerConfig::default())?
        .with_reporter(Arc::new(ConsoleReporter))
        .with_cancel(token);
    let layout = RuntimeLayout::new(&root);

    let version_id = match loader {
        Some(loader) => {
            let name = format!("{}-{}", loader, version);
            let request = ModdedProfileRequest::new(name.clone(), version.clone(), loader);
            if layout.read_metadata(&name).await?.is_none() {
                create_modded_profile(&ctx, &layout, &request).await?;
            }
            name
        }
        None => {
            install_vanilla(&ctx, &layout, &version).await?;
            version
        }
    };

    let invocation = prepare_launch(&ctx, &layout, &version_id, &LaunchRequest::offline("Player"))
        .await?;
    println!("Working directory: {}", invocation.working_dir.display());
    println!("java {}", invocation.args().join(" "));
    Ok(())
}
