//! Core module - Catalog, process table, instance tracking, status and lifecycle control

pub mod broadcast;
pub mod catalog;
pub mod error;
pub mod instance;
mod monitor;
pub mod process;
pub mod settings;
pub mod status;
pub mod supervisor;
pub mod unit;

pub use broadcast::Broadcaster;
pub use catalog::Catalog;
pub use error::{SupervisorError, SupervisorResult};
pub use settings::Settings;
pub use status::StatusSnapshot;
pub use supervisor::Supervisor;
