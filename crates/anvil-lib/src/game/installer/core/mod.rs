pub mod assets;
pub mod downloader;
pub mod library;
pub mod lock;
pub mod traits;
pub mod verify;
