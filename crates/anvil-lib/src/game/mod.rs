pub mod installer;
pub mod launcher;

// Re-export commonly used types
pub use installer::context::InstallContext;
pub use installer::layout::RuntimeLayout;
pub use launcher::{prepare_launch, LaunchInvocation, LaunchRequest, ResolvedRuntime};
