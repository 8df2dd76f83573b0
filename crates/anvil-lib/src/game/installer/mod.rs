//! Installation side: catalog lookups, artifact acquisition, loader profiles and the
//! patch pipeline.

pub mod catalog;
pub mod config;
pub mod context;
pub mod core;
pub mod layout;
pub mod modloaders;
pub mod profile;
pub mod retry;
pub mod types;
pub mod vanilla;

pub use catalog::{fetch_catalog, list_versions, VersionCatalog, VersionListing};
pub use config::InstallerConfig;
pub use context::InstallContext;
pub use profile::{create_modded_profile, ModdedProfileRequest};
pub use types::{CancelHandle, CancelToken, ModloaderType, Platform, ProgressReporter};
pub use vanilla::install_vanilla;

use crate::game::installer::core::traits::ModloaderInstaller;
use crate::game::installer::modloaders::fabric::FabricInstaller;
use crate::game::installer::modloaders::forge::ForgeInstaller;
use crate::game::installer::modloaders::neoforge::NeoForgeInstaller;
use crate::game::installer::modloaders::quilt::QuiltInstaller;

/// Installer implementation for a loader.
pub fn installer_for(loader: ModloaderType) -> Box<dyn ModloaderInstaller> {
    match loader {
        ModloaderType::Fabric => Box::new(FabricInstaller),
        ModloaderType::Quilt => Box::new(QuiltInstaller),
        ModloaderType::Forge => Box::new(ForgeInstaller),
        ModloaderType::NeoForge => Box::new(NeoForgeInstaller),
    }
}
