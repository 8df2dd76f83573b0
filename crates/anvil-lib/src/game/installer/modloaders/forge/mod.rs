pub mod parser;
pub mod pipeline;

pub use pipeline::{materialize_binary, validate_client_jar, MaterializeRequest};

use self::parser::InstallerArchive;
use crate::error::InstallResult;
use crate::game::installer::catalog::{download_installer, latest_loader_version};
use crate::game::installer::context::InstallContext;
use crate::game::installer::core::traits::{LoaderProfile, ModloaderInstaller};
use crate::game::installer::layout::RuntimeLayout;
use crate::game::installer::types::ModloaderType;
use crate::utils::run_blocking;
use futures::future::BoxFuture;

pub struct ForgeInstaller;

impl ModloaderInstaller for ForgeInstaller {
    fn loader(&self) -> ModloaderType {
        ModloaderType::Forge
    }

    fn fetch_profile<'a>(
        &'a self,
        ctx: &'a InstallContext,
        layout: &'a RuntimeLayout,
        game_version: &'a str,
        loader_version: Option<&'a str>,
    ) -> BoxFuture<'a, InstallResult<LoaderProfile>> {
        Box::pin(async move {
            let version = match loader_version {
                Some(v) => forge_full_version(game_version, v),
                None => latest_loader_version(ctx, ModloaderType::Forge, game_version).await?,
            };
            installer_profile(ctx, layout, ModloaderType::Forge, &version).await
        })
    }
}

/// Forge version format: 1.20.1-47.2.0 or just 47.2.0
pub fn forge_full_version(game_version: &str, version: &str) -> String {
    if version.starts_with(&format!("{}-", game_version)) {
        version.to_string()
    } else {
        format!("{}-{}", game_version, version)
    }
}

/// Download the installer and read the version descriptor it carries.
pub(crate) async fn installer_profile(
    ctx: &InstallContext,
    layout: &RuntimeLayout,
    loader: ModloaderType,
    version: &str,
) -> InstallResult<LoaderProfile> {
    log::info!("Installing {} {}", loader, version);
    let installer = download_installer(ctx, layout, loader, version).await?;
    let descriptor = run_blocking({
        let installer = installer.clone();
        move || InstallerArchive::open(&installer)?.version_descriptor()
    })
    .await?;
    Ok(LoaderProfile {
        descriptor,
        loader_version: version.to_string(),
        installer: Some(installer),
    })
}
