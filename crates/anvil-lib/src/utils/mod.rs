pub mod process;

use crate::error::{InstallError, InstallResult};
use std::path::PathBuf;

/// Run blocking filesystem or archive work on the blocking pool.
pub(crate) async fn run_blocking<T, F>(f: F) -> InstallResult<T>
where
    F: FnOnce() -> InstallResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| InstallError::Io {
            path: PathBuf::new(),
            source: std::io::Error::other(e),
        })?
}
