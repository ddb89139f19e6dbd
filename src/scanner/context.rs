use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::Client;
use tokio::{sync::mpsc, task::JoinHandle, time::MissedTickBehavior};
use url::Url;

use crate::{
    analysis::AnalysisClient,
    broker::{
        Bus, ContextId, Envelope, Request,
        protocol::{self, EnabledPayload, SettingsPatch},
    },
    config::AppConfig,
    domain::{MeetingModeStatus, Settings},
    infrastructure::lifecycle::LifecycleListener,
    page::{
        MemoryPage,
        frame::{self, FrameFetcher, HttpFrameFetcher},
        snapshot::SnapshotLoader,
    },
    platform,
};

use super::{
    highlight::HighlightEngine,
    posts::{BrokerTextAnalyzer, PostScanner, TextAnalyzer},
    risk::RiskAggregator,
    status::MeetingStats,
    videos::{SampleOutcome, VideoSampler},
};

/// The page-scanner context: owns the page model and every scanning
/// engine, and reacts to ticks, snapshot refreshes, frame outcomes, and
/// bus messages from a single event loop.
pub struct ScannerContext {
    bus: Arc<Bus>,
    inbox: mpsc::UnboundedReceiver<Envelope>,
    lifecycle: LifecycleListener,
    config: Arc<AppConfig>,
    http: Client,
    settings: Settings,
    page: MemoryPage,
    loader: SnapshotLoader,
    frames: Arc<dyn FrameFetcher>,
    frame_client: AnalysisClient,
    analyzer: Box<dyn TextAnalyzer>,
    posts: PostScanner,
    sampler: VideoSampler,
    risk: RiskAggregator,
    highlight: HighlightEngine,
    stats: MeetingStats,
    outcome_tx: mpsc::UnboundedSender<SampleOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<SampleOutcome>,
    is_meeting_host: bool,
}

impl ScannerContext {
    pub fn new(
        bus: Arc<Bus>,
        http: Client,
        config: Arc<AppConfig>,
        lifecycle: LifecycleListener,
    ) -> Result<Self> {
        let inbox = bus.register(ContextId::Scanner);
        let page_url =
            Url::parse(&config.page_url).with_context(|| format!("bad page URL {}", config.page_url))?;
        let api_base =
            Url::parse(&config.api_base).with_context(|| format!("bad api base {}", config.api_base))?;

        let hostname = config.hostname.clone();
        let loader = SnapshotLoader::new(http.clone(), page_url, &hostname);
        let settings = Settings {
            scanning_enabled: config.scanning_enabled,
            meeting_mode_enabled: config.meeting_mode_enabled,
            api_base: config.api_base.clone(),
        };
        let analyzer = Box::new(BrokerTextAnalyzer::new(
            bus.clone(),
            config.scanner.message_timeout,
        ));
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();

        Ok(Self {
            bus,
            inbox,
            lifecycle,
            settings,
            page: MemoryPage::new(&hostname),
            loader,
            frames: Arc::new(HttpFrameFetcher::new(http.clone())),
            frame_client: AnalysisClient::new(http.clone(), api_base),
            http,
            analyzer,
            posts: PostScanner::new(),
            sampler: VideoSampler::new(config.scanner.sample_interval),
            risk: RiskAggregator::new(),
            highlight: HighlightEngine::new(),
            stats: MeetingStats::new(),
            outcome_tx,
            outcome_rx,
            is_meeting_host: platform::is_meeting_hostname(&hostname),
            config,
        })
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        if !self.loader.is_supported() {
            tracing::info!(
                target: "scanner",
                hostname = %self.config.hostname,
                "hostname not supported; scanner idle"
            );
        }

        // Settings are owned by the broker; no reply means we keep the
        // locally seeded copy.
        let pull = self
            .bus
            .request(
                ContextId::Broker,
                Envelope::new(protocol::GET_SETTINGS),
                self.config.scanner.message_timeout,
            )
            .await;
        if let Some(settings) = pull.and_then(|reply| reply.payload_as::<Settings>()) {
            self.settings = settings;
        }

        self.refresh_snapshot().await;
        self.scan_all().await;

        let mut video_tick = tokio::time::interval(self.config.scanner.video_tick);
        video_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut refetch_tick = tokio::time::interval(self.config.scanner.refetch_interval);
        refetch_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            // The guard runs at the top of every wakeup: once the
            // context is invalid all timers stop and nothing sends.
            if !self.lifecycle.is_live() {
                break;
            }
            tokio::select! {
                _ = self.lifecycle.invalidated() => break,
                _ = video_tick.tick() => self.scan_videos().await,
                _ = refetch_tick.tick() => {
                    if self.settings.scanning_enabled && self.refresh_snapshot().await {
                        self.scan_all().await;
                    }
                }
                Some(outcome) = self.outcome_rx.recv() => self.handle_outcome(outcome),
                message = self.inbox.recv() => {
                    let Some(envelope) = message else { break };
                    self.handle_message(envelope).await;
                }
            }
        }
        tracing::info!(target: "scanner", "scanner context stopped");
    }

    /// Pulls a fresh snapshot and carries scanner state across via the
    /// fingerprint sweep. Returns whether a new snapshot was installed.
    async fn refresh_snapshot(&mut self) -> bool {
        if !self.loader.is_supported() {
            return false;
        }
        match self.loader.fetch().await {
            Ok(Some(page)) => {
                let present = page.present_keys();
                self.posts.sweep(&present);
                self.sampler.sweep(&present);
                self.risk.sweep(&present);
                self.page = page;
                self.risk
                    .reapply_overlays(&mut self.page, self.is_meeting_host);
                true
            }
            Ok(None) => false,
            Err(err) => {
                tracing::warn!(target: "scanner", error = %err, "snapshot fetch failed");
                false
            }
        }
    }

    async fn scan_all(&mut self) {
        if !self.settings.scanning_enabled {
            return;
        }
        let submitted = self
            .posts
            .scan_posts(&mut self.page, self.analyzer.as_ref())
            .await;
        if submitted > 0 {
            tracing::debug!(target: "scanner", submitted, "posts submitted for triage");
        }
        self.scan_videos().await;
    }

    async fn scan_videos(&mut self) {
        if !self.settings.scanning_enabled {
            return;
        }
        let now = Utc::now();
        for id in self.page.elements_with_tag("video") {
            let Some(key) = self.page.key(id).cloned() else {
                continue;
            };
            if let Some(reason) = self.sampler.gate(&self.page, id, &key, now) {
                tracing::trace!(
                    target: "scanner",
                    video = key.as_str(),
                    reason = reason.as_str(),
                    "sample skipped"
                );
                continue;
            }

            let Some(source) = self.page.attr(id, "poster").map(str::to_string) else {
                tracing::debug!(target: "scanner", video = key.as_str(), "no capture source");
                continue;
            };
            let bytes = match self.frames.fetch(&source).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue,
                Err(err) => {
                    tracing::debug!(target: "scanner", error = %err, "frame capture failed");
                    continue;
                }
            };
            let encoded = match frame::downscale_encode(&bytes) {
                Ok(encoded) => encoded,
                Err(err) => {
                    tracing::debug!(target: "scanner", error = %err, "frame encode failed");
                    continue;
                }
            };

            self.sampler.mark_dispatched(key.clone(), now);
            tracing::debug!(
                target: "scanner",
                video = key.as_str(),
                width = encoded.width,
                height = encoded.height,
                "frame dispatched"
            );

            // Frame classification bypasses the bus on purpose: the
            // message channel's lifetime is shorter than a slow
            // classifier call, so the request rides on this context.
            let client = self.frame_client.clone();
            let outcomes = self.outcome_tx.clone();
            let timeout = self.config.scanner.frame_timeout;
            let filename = format!("{}.jpg", key.as_str());
            tokio::spawn(async move {
                let result = client
                    .classify_frame(encoded.image_b64, filename, timeout)
                    .await;
                if let Err(err) = &result {
                    tracing::debug!(target: "scanner", error = %err, "frame classification failed");
                }
                let _ = outcomes.send(SampleOutcome {
                    key,
                    result: result.ok(),
                });
            });
        }
    }

    fn handle_outcome(&mut self, outcome: SampleOutcome) {
        // Pending clears on every outcome, even after invalidation.
        self.sampler.complete(&outcome.key);
        if !self.lifecycle.is_live() {
            return;
        }
        let Some(result) = outcome.result else {
            return;
        };

        let score = self.risk.record(&outcome.key, &result);
        if let Some(video) = self.page.find_by_key(&outcome.key) {
            self.risk
                .apply_overlay(&mut self.page, video, score, self.is_meeting_host);
        }
        if self.is_meeting_host {
            let reason = (!result.explainability.is_empty()).then_some(result.explainability.as_str());
            self.stats.record(score, result.label, reason);
        }
        tracing::debug!(
            target: "scanner",
            video = outcome.key.as_str(),
            score,
            label = result.label.as_str(),
            "risk updated"
        );
    }

    async fn handle_message(&mut self, envelope: Envelope) {
        if !self.lifecycle.is_live() {
            return;
        }
        match envelope.parse() {
            Request::SettingsPatch(patch) => self.apply_patch(patch),
            Request::ShowBanner(banner) => {
                self.highlight.capture_selection(&self.page);
                self.highlight.render_banner(
                    &mut self.page,
                    &banner.verdict,
                    banner.confidence,
                    &banner.summary,
                );
            }
            Request::ApplyHighlights(payload) => {
                self.highlight.capture_selection(&self.page);
                // A fresh verdict replaces any earlier annotations.
                self.highlight.clear_highlights(&mut self.page);
                let container = self.highlight.target_container(&self.page);
                let applied =
                    self.highlight
                        .apply_highlights(&mut self.page, container, &payload.highlights);
                tracing::debug!(target: "scanner", applied, "phrase highlights applied");
            }
            Request::GetMeetingMode => {
                self.reply(
                    &envelope,
                    &EnabledPayload {
                        enabled: self.settings.meeting_mode_enabled,
                    },
                );
            }
            Request::SetMeetingMode { enabled } => {
                self.settings.meeting_mode_enabled = enabled;
                self.reply(&envelope, &EnabledPayload { enabled });
            }
            Request::ForceScan => self.scan_all().await,
            Request::GetMeetingStatus => {
                let status = self.meeting_status();
                self.reply(&envelope, &status);
            }
            // Unknown or not addressed to this context: ignored.
            _ => {}
        }
    }

    fn reply<T: serde::Serialize>(&self, envelope: &Envelope, payload: &T) {
        let Some(correlation_id) = envelope.correlation_id else {
            return;
        };
        if let Ok(reply) = Envelope::with_payload(protocol::RESULT, payload) {
            self.bus.reply(correlation_id, reply);
        }
    }

    fn apply_patch(&mut self, patch: SettingsPatch) {
        let was_enabled = self.settings.scanning_enabled;
        patch.apply_to(&mut self.settings);

        if was_enabled && !self.settings.scanning_enabled {
            // Disabling scanning clears every overlay and discards all
            // per-element risk state; re-enabling starts clean.
            self.risk.clear_all(&mut self.page);
            self.highlight.dismiss_banner(&mut self.page);
            self.highlight.clear_highlights(&mut self.page);
            self.stats.reset();
            tracing::info!(target: "scanner", "scanning disabled; risk state cleared");
        }
        if let Some(api_base) = &patch.api_base {
            match Url::parse(api_base) {
                Ok(url) => self.frame_client = AnalysisClient::new(self.http.clone(), url),
                Err(err) => {
                    tracing::warn!(target: "scanner", error = %err, api_base, "rejected api base update");
                }
            }
        }
    }

    fn meeting_status(&self) -> MeetingModeStatus {
        self.stats.snapshot(
            self.settings.meeting_mode_enabled,
            self.is_meeting_host,
            self.page.elements_with_tag("video").len(),
        )
    }
}
