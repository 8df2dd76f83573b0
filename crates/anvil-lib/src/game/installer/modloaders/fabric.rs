use crate::error::InstallResult;
use crate::game::installer::catalog::{fetch_loader_profile, latest_loader_version};
use crate::game::installer::context::InstallContext;
use crate::game::installer::core::traits::{LoaderProfile, ModloaderInstaller};
use crate::game::installer::layout::RuntimeLayout;
use crate::game::installer::types::ModloaderType;
use futures::future::BoxFuture;

pub struct FabricInstaller;

impl ModloaderInstaller for FabricInstaller {
    fn loader(&self) -> ModloaderType {
        ModloaderType::Fabric
    }

    fn fetch_profile<'a>(
        &'a self,
        ctx: &'a InstallContext,
        _layout: &'a RuntimeLayout,
        game_version: &'a str,
        loader_version: Option<&'a str>,
    ) -> BoxFuture<'a, InstallResult<LoaderProfile>> {
        Box::pin(meta_profile(ctx, ModloaderType::Fabric, game_version, loader_version))
    }
}

/// Fabric and Quilt publish ready-made descriptors on their meta services.
pub(crate) async fn meta_profile(
    ctx: &InstallContext,
    loader: ModloaderType,
    game_version: &str,
    loader_version: Option<&str>,
) -> InstallResult<LoaderProfile> {
    let loader_version = match loader_version {
        Some(v) => v.to_string(),
        None => latest_loader_version(ctx, loader, game_version).await?,
    };
    log::info!(
        "Fetching {} {} profile for Minecraft {}",
        loader,
        loader_version,
        game_version
    );
    let descriptor = fetch_loader_profile(ctx, loader, game_version, &loader_version).await?;
    Ok(LoaderProfile {
        descriptor,
        loader_version,
        installer: None,
    })
}
