use super::forge::installer_profile;
use crate::error::InstallResult;
use crate::game::installer::catalog::latest_loader_version;
use crate::game::installer::context::InstallContext;
use crate::game::installer::core::traits::{LoaderProfile, ModloaderInstaller};
use crate::game::installer::layout::RuntimeLayout;
use crate::game::installer::types::ModloaderType;
use futures::future::BoxFuture;

pub struct NeoForgeInstaller;

impl ModloaderInstaller for NeoForgeInstaller {
    fn loader(&self) -> ModloaderType {
        ModloaderType::NeoForge
    }

    fn fetch_profile<'a>(
        &'a self,
        ctx: &'a InstallContext,
        layout: &'a RuntimeLayout,
        game_version: &'a str,
        loader_version: Option<&'a str>,
    ) -> BoxFuture<'a, InstallResult<LoaderProfile>> {
        Box::pin(async move {
            // NeoForge versions carry no game-version prefix
            let version = match loader_version {
                Some(v) => v.to_string(),
                None => latest_loader_version(ctx, ModloaderType::NeoForge, game_version).await?,
            };
            installer_profile(ctx, layout, ModloaderType::NeoForge, &version).await
        })
    }
}
