use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Page watched by the scanner context.
    pub page_url: String,
    /// Hostname used for platform-adapter lookups, derived from `page_url`
    /// unless overridden.
    pub hostname: String,
    /// Base URL of the remote triage / frame-classification service.
    pub api_base: String,
    pub scanning_enabled: bool,
    pub meeting_mode_enabled: bool,
    pub scanner: ScannerConfig,
    pub panel: PanelConfig,
    pub directories: DirectoryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Cadence of the video sampling tick.
    pub video_tick: Duration,
    /// Minimum gap between two successful samples of the same element.
    pub sample_interval: Duration,
    /// Cadence of page snapshot refreshes (the mutation-event analogue).
    pub refetch_interval: Duration,
    /// Hard timeout for a single frame-classification request.
    pub frame_timeout: Duration,
    /// Timeout for request/reply exchanges over the message bus.
    pub message_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct PanelConfig {
    pub status_interval: Duration,
    /// Text submitted for selection analysis when the panel starts,
    /// standing in for a user-selected passage.
    pub selection_text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub logs_dir: String,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid URL in {key}: {value}")]
    InvalidUrl { key: &'static str, value: String },
}
