/// Game launcher module: resolves versions and assembles the JVM invocation
pub mod arguments;
pub mod classpath;
pub mod natives;
pub mod rules;
pub mod types;
pub mod version_parser;

// Re-export commonly used types
pub use crate::game::installer::types::OsType;
pub use arguments::{build_invocation, offline_uuid, substitute_variables};
pub use classpath::{build_classpath, maven_to_path, Classpath};
pub use types::{LaunchEnvironment, LaunchInvocation, LaunchRequest};
pub use version_parser::{
    parse_version_json, resolve_version, Argument, Library, ResolvedRuntime, VersionManifest,
};

use crate::error::InstallResult;
use crate::game::installer::context::InstallContext;
use crate::game::installer::core::assets::acquire_assets;
use crate::game::installer::core::library::acquire_libraries;
use crate::game::installer::layout::RuntimeLayout;

/// Make an installed version ready to run and return its invocation.
///
/// Libraries, natives and assets are re-verified, so a damaged cache is repaired
/// before the game starts. Modded profiles put their own binary last on the classpath.
pub async fn prepare_launch(
    ctx: &InstallContext,
    layout: &RuntimeLayout,
    version_id: &str,
    request: &LaunchRequest,
) -> InstallResult<LaunchInvocation> {
    log::info!("Preparing launch of {} for {}", version_id, request.username);
    ctx.cancel().check()?;

    let versions_dir = layout.versions_dir();
    let resolved = ctx.resolve(&versions_dir, version_id).await?;
    let paths = layout.ensure_version(version_id, resolved.is_modded()).await?;

    acquire_libraries(ctx, &resolved.libraries, &layout.libraries_dir(), &paths.natives).await?;
    match &resolved.asset_index {
        Some(index) => {
            acquire_assets(ctx, index, &layout.assets_dir()).await?;
        }
        None => log::warn!("Version {} declares no asset index", version_id),
    }

    let loader_binary = if resolved.is_modded()
        && tokio::fs::try_exists(&paths.binary).await.unwrap_or(false)
    {
        Some(paths.binary.clone())
    } else {
        None
    };

    let env = LaunchEnvironment {
        platform: ctx.platform.clone(),
        libraries_dir: layout.libraries_dir(),
        versions_dir,
        assets_dir: layout.assets_dir(),
        natives_dir: paths.natives.clone(),
        game_dir: paths.root.clone(),
        loader_binary,
    };
    let invocation = build_invocation(&resolved, request, &env)?;
    log::debug!(
        "Launch of {} uses main class {} with {} classpath entries",
        version_id,
        invocation.main_class,
        invocation.classpath.len()
    );
    Ok(invocation)
}
