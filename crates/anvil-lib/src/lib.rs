//! Installer and launch-preparation core for Minecraft.
//!
//! Resolves inheritance-based version descriptors, acquires and verifies every
//! artifact they need through a lock-protected atomic download engine, rebuilds
//! Forge/NeoForge client binaries through the installer processor pipeline, and
//! assembles the final JVM invocation.

pub mod error;
pub mod game;
pub mod utils;

pub use error::{ErrorKind, InstallError, InstallResult};
