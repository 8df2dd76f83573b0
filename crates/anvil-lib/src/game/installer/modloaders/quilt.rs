use super::fabric::meta_profile;
use crate::error::InstallResult;
use crate::game::installer::context::InstallContext;
use crate::game::installer::core::traits::{LoaderProfile, ModloaderInstaller};
use crate::game::installer::layout::RuntimeLayout;
use crate::game::installer::types::ModloaderType;
use futures::future::BoxFuture;

/// Quilt uses the same flow as Fabric, just with its own meta service.
pub struct QuiltInstaller;

impl ModloaderInstaller for QuiltInstaller {
    fn loader(&self) -> ModloaderType {
        ModloaderType::Quilt
    }

    fn fetch_profile<'a>(
        &'a self,
        ctx: &'a InstallContext,
        _layout: &'a RuntimeLayout,
        game_version: &'a str,
        loader_version: Option<&'a str>,
    ) -> BoxFuture<'a, InstallResult<LoaderProfile>> {
        Box::pin(meta_profile(ctx, ModloaderType::Quilt, game_version, loader_version))
    }
}
