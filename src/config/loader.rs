use std::{env, time::Duration};

use url::Url;

use super::env::{
    AppConfig, ConfigError, DirectoryConfig, LoggingConfig, PanelConfig, ScannerConfig,
};

pub fn load_config() -> Result<AppConfig, ConfigError> {
    AppConfig::from_env()
}

impl AppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let page_url = env::var("PAGE_URL").map_err(|_| ConfigError::Missing("PAGE_URL"))?;
        let parsed_page = Url::parse(&page_url).map_err(|_| ConfigError::InvalidUrl {
            key: "PAGE_URL",
            value: page_url.clone(),
        })?;

        let hostname = env::var("PAGE_HOSTNAME")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| parsed_page.host_str().map(str::to_string))
            .ok_or(ConfigError::InvalidUrl {
                key: "PAGE_URL",
                value: page_url.clone(),
            })?;

        let api_base =
            env::var("API_BASE").unwrap_or_else(|_| "http://localhost:8000".to_string());
        Url::parse(&api_base).map_err(|_| ConfigError::InvalidUrl {
            key: "API_BASE",
            value: api_base.clone(),
        })?;

        let scanner = ScannerConfig {
            video_tick: parse_duration_ms("VIDEO_TICK_MS", 2_000),
            sample_interval: parse_duration_ms("SAMPLE_INTERVAL_MS", 5_000),
            refetch_interval: parse_duration_ms("REFETCH_INTERVAL_MS", 10_000),
            frame_timeout: parse_duration_ms("FRAME_TIMEOUT_MS", 45_000),
            message_timeout: parse_duration_ms("MESSAGE_TIMEOUT_MS", 10_000),
        };

        let panel = PanelConfig {
            status_interval: parse_duration_ms("PANEL_STATUS_INTERVAL_MS", 30_000),
            selection_text: env::var("SELECTION_TEXT")
                .ok()
                .filter(|value| !value.trim().is_empty()),
        };

        let directories = DirectoryConfig {
            logs_dir: env::var("LOGS_DIR").unwrap_or_else(|_| "logs".to_string()),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        };

        Ok(Self {
            page_url,
            hostname,
            api_base,
            scanning_enabled: parse_bool("SCANNING_ENABLED", true),
            meeting_mode_enabled: parse_bool("MEETING_MODE_ENABLED", false),
            scanner,
            panel,
            directories,
            logging,
        })
    }
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|value| match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn parse_duration_ms(key: &str, default_ms: u64) -> Duration {
    let ms = env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default_ms);
    Duration::from_millis(ms)
}
