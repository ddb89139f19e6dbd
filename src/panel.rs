use std::sync::Arc;

use tokio::{sync::mpsc, task::JoinHandle, time::MissedTickBehavior};

use crate::{
    broker::{Bus, ContextId, Envelope, protocol, protocol::TextPayload},
    config::AppConfig,
    domain::{MeetingModeStatus, Settings, TriageResult},
    infrastructure::lifecycle::LifecycleListener,
};

/// The panel context: a live status surface over the other two contexts.
/// It holds no state of its own; every refresh asks the broker for the
/// current settings and the scanner for meeting-mode activity, and a
/// context that does not answer is simply reported as unreachable.
pub struct PanelContext {
    bus: Arc<Bus>,
    inbox: mpsc::UnboundedReceiver<Envelope>,
    lifecycle: LifecycleListener,
    config: Arc<AppConfig>,
}

impl PanelContext {
    pub fn new(bus: Arc<Bus>, config: Arc<AppConfig>, lifecycle: LifecycleListener) -> Self {
        let inbox = bus.register(ContextId::Panel);
        Self {
            bus,
            inbox,
            lifecycle,
            config,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        // Opening the panel nudges the scanner, mirroring a user bringing
        // the surface into view.
        self.bus
            .send(ContextId::Scanner, Envelope::new(protocol::FORCE_SCAN));

        if let Some(text) = self.config.panel.selection_text.clone() {
            self.submit_selection(&text).await;
        }

        let mut status_tick = tokio::time::interval(self.config.panel.status_interval);
        status_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if !self.lifecycle.is_live() {
                break;
            }
            tokio::select! {
                _ = self.lifecycle.invalidated() => break,
                _ = status_tick.tick() => self.refresh_status().await,
                message = self.inbox.recv() => {
                    // Nothing addresses the panel today; the route exists
                    // so future pushes have somewhere to land.
                    if message.is_none() {
                        break;
                    }
                }
            }
        }
        tracing::info!(target: "panel", "panel context stopped");
    }

    /// Sends the configured passage down the selection-analysis path:
    /// the broker triages it, replies with the verdict, and pushes the
    /// banner and phrase highlights to the scanner on its own.
    async fn submit_selection(&self, text: &str) {
        let Ok(envelope) = Envelope::with_payload(
            protocol::ANALYZE_SELECTION,
            &TextPayload {
                text: text.to_string(),
            },
        ) else {
            return;
        };
        let verdict = self
            .bus
            .request(
                ContextId::Broker,
                envelope,
                self.config.scanner.message_timeout,
            )
            .await
            .and_then(|reply| reply.payload_as::<TriageResult>());
        match verdict {
            Some(result) => {
                tracing::info!(
                    target: "panel",
                    verdict = %result.verdict,
                    confidence = result.confidence,
                    "selection verdict"
                );
            }
            None => tracing::warn!(target: "panel", "selection analysis got no reply"),
        }
    }

    async fn refresh_status(&self) {
        let timeout = self.config.scanner.message_timeout;

        let settings = self
            .bus
            .request(ContextId::Broker, Envelope::new(protocol::GET_SETTINGS), timeout)
            .await
            .and_then(|reply| reply.payload_as::<Settings>());
        match &settings {
            Some(settings) => {
                tracing::info!(
                    target: "panel",
                    scanning = settings.scanning_enabled,
                    meeting_mode = settings.meeting_mode_enabled,
                    api_base = %settings.api_base,
                    "settings"
                );
            }
            None => tracing::warn!(target: "panel", "broker unreachable"),
        }

        // Meeting status is only worth polling while meeting mode is on,
        // or when the broker could not tell us either way.
        if settings.is_some_and(|s| !s.meeting_mode_enabled) {
            return;
        }
        let status = self
            .bus
            .request(
                ContextId::Scanner,
                Envelope::new(protocol::GET_MEETING_STATUS),
                timeout,
            )
            .await
            .and_then(|reply| reply.payload_as::<MeetingModeStatus>());
        match status {
            Some(status) => {
                tracing::info!(
                    target: "panel",
                    meeting_host = status.is_meeting_host,
                    videos = status.active_video_count,
                    frames = status.sampled_frame_count,
                    risk = status.latest_risk_score,
                    label = status.latest_label.map(|l| l.as_str()),
                    "meeting status"
                );
            }
            None => tracing::warn!(target: "panel", "scanner unreachable"),
        }
    }
}
