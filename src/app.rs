use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use reqwest::Client;
use tokio::{task::JoinHandle, time::timeout};
use url::Url;

use crate::{
    broker::{Bus, BrokerService, RemoteTriage},
    config::AppConfig,
    domain::Settings,
    infrastructure::lifecycle::Lifecycle,
    panel::PanelContext,
    scanner::ScannerContext,
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Wires the three contexts to one bus and supervises their lifetimes.
pub struct PageSentryApp {
    broker_handle: JoinHandle<()>,
    scanner_handle: JoinHandle<()>,
    panel_handle: JoinHandle<()>,
    lifecycle: Lifecycle,
    config: Arc<AppConfig>,
}

impl PageSentryApp {
    pub fn initialize(config: AppConfig, lifecycle: Lifecycle) -> Result<Self> {
        let config = Arc::new(config);
        let api_base = Url::parse(&config.api_base)
            .with_context(|| format!("bad api base {}", config.api_base))?;

        let http = Client::builder()
            .user_agent(format!("pagesentry/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        let bus = Arc::new(Bus::new());

        let settings = Settings {
            scanning_enabled: config.scanning_enabled,
            meeting_mode_enabled: config.meeting_mode_enabled,
            api_base: config.api_base.clone(),
        };
        let broker_handle = BrokerService::new(
            bus.clone(),
            Box::new(RemoteTriage::new(http.clone(), api_base)),
            settings,
            lifecycle.subscribe(),
        )
        .spawn();

        let scanner_handle = ScannerContext::new(
            bus.clone(),
            http,
            config.clone(),
            lifecycle.subscribe(),
        )?
        .spawn();

        let panel_handle = PanelContext::new(bus, config.clone(), lifecycle.subscribe()).spawn();

        Ok(Self {
            broker_handle,
            scanner_handle,
            panel_handle,
            lifecycle,
            config,
        })
    }

    pub async fn run(self) -> Result<()> {
        let PageSentryApp {
            broker_handle,
            mut scanner_handle,
            panel_handle,
            lifecycle,
            config,
        } = self;

        tracing::info!(
            page_url = %config.page_url,
            hostname = %config.hostname,
            "pagesentry started"
        );

        let mut listener = lifecycle.subscribe();
        let mut scanner_completed = false;
        tokio::select! {
            _ = listener.invalidated() => {
                tracing::info!("invalidation signal received");
            }
            res = &mut scanner_handle => {
                // The handle is consumed here and must not be polled
                // again below.
                scanner_completed = true;
                if let Err(err) = res {
                    if err.is_panic() {
                        tracing::error!("scanner context panicked");
                    }
                }
                tracing::warn!("scanner context exited on its own");
            }
        }

        // Invalidate again for the case where the scanner exited first;
        // the watch channel makes this idempotent.
        lifecycle.invalidate();

        if !scanner_completed {
            join_bounded("scanner", scanner_handle).await;
        }
        join_bounded("broker", broker_handle).await;
        join_bounded("panel", panel_handle).await;

        tracing::info!("pagesentry stopped");
        Ok(())
    }
}

async fn join_bounded(name: &str, handle: JoinHandle<()>) {
    match timeout(SHUTDOWN_TIMEOUT, handle).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            if err.is_panic() {
                tracing::error!(context = name, "context task panicked");
            }
        }
        Err(_) => {
            tracing::warn!(
                context = name,
                "context did not stop within {:?}",
                SHUTDOWN_TIMEOUT
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DirectoryConfig, PanelConfig, ScannerConfig, env::LoggingConfig};

    fn test_config() -> AppConfig {
        AppConfig {
            page_url: "https://example.com/feed".into(),
            hostname: "example.com".into(),
            api_base: "http://localhost:8000".into(),
            scanning_enabled: true,
            meeting_mode_enabled: false,
            scanner: ScannerConfig {
                video_tick: Duration::from_secs(2),
                sample_interval: Duration::from_secs(5),
                refetch_interval: Duration::from_secs(3600),
                frame_timeout: Duration::from_secs(45),
                message_timeout: Duration::from_millis(50),
            },
            panel: PanelConfig {
                status_interval: Duration::from_secs(30),
                selection_text: None,
            },
            directories: DirectoryConfig {
                logs_dir: "logs".into(),
            },
            logging: LoggingConfig {
                level: "info".into(),
            },
        }
    }

    // Covers the race where every context finishes before supervision
    // first polls: the select may then resolve on the already-finished
    // scanner handle, which must not be joined a second time. Repeated
    // because the select picks between two ready branches at random.
    #[tokio::test]
    async fn run_survives_contexts_that_stop_before_supervision() {
        for _ in 0..8 {
            let (lifecycle, _listener) = Lifecycle::new();
            let app = PageSentryApp::initialize(test_config(), lifecycle.clone()).expect("app");

            lifecycle.invalidate();
            tokio::time::sleep(Duration::from_millis(100)).await;

            timeout(Duration::from_secs(10), app.run())
                .await
                .expect("run finished")
                .expect("run ok");
        }
    }

    #[tokio::test]
    async fn invalidation_during_run_shuts_down_cleanly() {
        let (lifecycle, _listener) = Lifecycle::new();
        let app = PageSentryApp::initialize(test_config(), lifecycle.clone()).expect("app");

        let runner = tokio::spawn(app.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        lifecycle.invalidate();

        timeout(Duration::from_secs(10), runner)
            .await
            .expect("run finished")
            .expect("run task ok")
            .expect("run ok");
    }
}
