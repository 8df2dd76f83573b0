use crate::error::InstallResult;
use crate::game::installer::context::InstallContext;
use crate::game::installer::layout::RuntimeLayout;
use crate::game::installer::types::ModloaderType;
use futures::future::BoxFuture;
use std::path::PathBuf;

/// A loader's version descriptor before it is rewritten into a named profile.
#[derive(Debug, Clone)]
pub struct LoaderProfile {
    pub descriptor: serde_json::Value,
    pub loader_version: String,
    /// Installer archive for loaders that patch the game binary
    pub installer: Option<PathBuf>,
}

/// Trait for modloader installers.
/// Each loader knows how to find its newest build and fetch its descriptor;
/// profile creation and patching are shared.
pub trait ModloaderInstaller: Send + Sync {
    fn loader(&self) -> ModloaderType;

    /// Fetch the loader descriptor for `game_version`, newest loader build unless pinned.
    fn fetch_profile<'a>(
        &'a self,
        ctx: &'a InstallContext,
        layout: &'a RuntimeLayout,
        game_version: &'a str,
        loader_version: Option<&'a str>,
    ) -> BoxFuture<'a, InstallResult<LoaderProfile>>;
}
