//! Named modded profiles layered on an installed vanilla version.

use crate::error::{InstallError, InstallResult, IoResultExt};
use crate::game::installer::catalog::fetch_catalog;
use crate::game::installer::context::InstallContext;
use crate::game::installer::core::library::acquire_libraries;
use crate::game::installer::installer_for;
use crate::game::installer::layout::{validate_version_id, RuntimeLayout};
use crate::game::installer::modloaders::forge::{materialize_binary, MaterializeRequest};
use crate::game::installer::types::ModloaderType;
use crate::game::installer::vanilla::install_vanilla;
use crate::game::launcher::version_parser::ResolvedRuntime;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ModdedProfileRequest {
    pub custom_name: String,
    pub base_version: String,
    pub loader: ModloaderType,
    /// Newest loader build when unset
    pub loader_version: Option<String>,
}

impl ModdedProfileRequest {
    pub fn new(
        custom_name: impl Into<String>,
        base_version: impl Into<String>,
        loader: ModloaderType,
    ) -> Self {
        Self {
            custom_name: custom_name.into(),
            base_version: base_version.into(),
            loader,
            loader_version: None,
        }
    }

    pub fn with_loader_version(mut self, version: impl Into<String>) -> Self {
        self.loader_version = Some(version.into());
        self
    }
}

/// Rewrite a loader descriptor into the named profile.
pub fn rewrite_descriptor(
    mut descriptor: Value,
    request: &ModdedProfileRequest,
    loader_version: &str,
) -> InstallResult<Value> {
    let object = descriptor
        .as_object_mut()
        .ok_or_else(|| InstallError::corrupt("loader descriptor", "not a JSON object"))?;
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

    object.insert("id".into(), json!(request.custom_name));
    object.insert("inheritsFrom".into(), json!(request.base_version));
    object.insert("jar".into(), json!(request.custom_name));
    object.insert("time".into(), json!(now));
    object.insert("releaseTime".into(), json!(now));
    object.insert(
        "launcher".into(),
        json!({
            "modded": true,
            "loader": request.loader.as_str(),
            "loaderVersion": loader_version,
            "baseVersion": request.base_version,
        }),
    );
    Ok(descriptor)
}

/// Create `versions/<custom_name>/` from a loader profile on top of `base_version`.
///
/// The base version is installed first. Forge and NeoForge binaries come out of the
/// patch pipeline; other loaders run the base binary. A profile that fails after its
/// directory was created is removed again.
pub async fn create_modded_profile(
    ctx: &InstallContext,
    layout: &RuntimeLayout,
    request: &ModdedProfileRequest,
) -> InstallResult<Arc<ResolvedRuntime>> {
    validate_version_id(&request.custom_name)?;
    let paths = layout.version_paths(&request.custom_name);
    if tokio::fs::try_exists(&paths.root).await.at(&paths.root)? {
        return Err(InstallError::validation(
            "profile name",
            format!("version {} already exists", request.custom_name),
        ));
    }

    let catalog = fetch_catalog(ctx).await?;
    if catalog.find(&request.base_version).is_none() {
        return Err(InstallError::NotFound(format!(
            "Minecraft version {}",
            request.base_version
        )));
    }

    log::info!(
        "Creating {} profile {} on Minecraft {}",
        request.loader,
        request.custom_name,
        request.base_version
    );
    install_vanilla(ctx, layout, &request.base_version).await?;

    let installer = installer_for(request.loader);
    let profile = installer
        .fetch_profile(
            ctx,
            layout,
            &request.base_version,
            request.loader_version.as_deref(),
        )
        .await?;
    let descriptor = rewrite_descriptor(profile.descriptor, request, &profile.loader_version)?;

    let result = async {
        let paths = layout.ensure_version(&request.custom_name, true).await?;
        let raw = serde_json::to_vec_pretty(&descriptor)
            .map_err(|e| InstallError::corrupt("profile descriptor", e))?;
        tokio::fs::write(&paths.descriptor, raw)
            .await
            .at(&paths.descriptor)?;

        materialize_binary(
            ctx,
            layout,
            &MaterializeRequest {
                base_version: request.base_version.clone(),
                installer: profile.installer.clone(),
                output_path: paths.binary.clone(),
            },
        )
        .await?;

        ctx.forget_resolved();
        let resolved = ctx
            .resolve(&layout.versions_dir(), &request.custom_name)
            .await?;
        acquire_libraries(ctx, &resolved.libraries, &layout.libraries_dir(), &paths.natives)
            .await?;
        Ok::<_, InstallError>(resolved)
    }
    .await;

    match result {
        Ok(resolved) => {
            log::info!("Profile {} ready", request.custom_name);
            Ok(resolved)
        }
        Err(e) => {
            log::error!("Profile {} failed: {}", request.custom_name, e);
            if let Err(cleanup) = tokio::fs::remove_dir_all(&paths.root).await {
                log::warn!("Could not remove {:?}: {}", paths.root, cleanup);
            }
            ctx.forget_resolved();
            Err(e)
        }
    }
}
