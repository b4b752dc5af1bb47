//! Assets module - Jars, shared configuration files and unit log files on disk

pub mod config_files;
pub mod download;
pub mod layout;
pub mod logs;

pub use config_files::{ConfigError, ConfigFiles};
pub use download::{DownloadCoordinator, DownloadState};
