pub mod env;
mod loader;

pub use env::{AppConfig, DirectoryConfig, PanelConfig, ScannerConfig};
pub use loader::load_config;
