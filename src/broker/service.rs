use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::Client;
use tokio::{sync::mpsc, task::JoinHandle};
use url::Url;

use crate::{
    analysis::AnalysisClient,
    domain::{Settings, TriageResult},
    infrastructure::lifecycle::LifecycleListener,
};

use super::{
    bus::{Bus, ContextId},
    protocol::{self, BannerPayload, Envelope, HighlightsPayload, Request, SettingsPatch},
};

/// Seam between the broker and the remote text classifier. A `None`
/// covers every failure mode alike; requesters treat silence as a
/// negative answer.
pub trait TriageBackend: Send + Sync {
    fn triage<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Option<TriageResult>>;
    /// Points the backend at a new service root.
    fn rebase(&mut self, api_base: Url);
}

pub struct RemoteTriage {
    http: Client,
    client: AnalysisClient,
}

impl RemoteTriage {
    pub fn new(http: Client, api_base: Url) -> Self {
        let client = AnalysisClient::new(http.clone(), api_base);
        Self { http, client }
    }
}

impl TriageBackend for RemoteTriage {
    fn triage<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Option<TriageResult>> {
        Box::pin(async move {
            match self.client.triage(text).await {
                Ok(result) => Some(result),
                Err(err) => {
                    tracing::warn!(target: "broker", error = %err, "triage request failed");
                    None
                }
            }
        })
    }

    fn rebase(&mut self, api_base: Url) {
        self.client = AnalysisClient::new(self.http.clone(), api_base);
    }
}

/// The background-broker context: owns the settings value (last write
/// wins; durable storage is an external collaborator) and performs text
/// triage on behalf of the other contexts.
pub struct BrokerService {
    bus: Arc<Bus>,
    backend: Box<dyn TriageBackend>,
    settings: Settings,
    lifecycle: LifecycleListener,
    inbox: mpsc::UnboundedReceiver<Envelope>,
}

impl BrokerService {
    pub fn new(
        bus: Arc<Bus>,
        backend: Box<dyn TriageBackend>,
        initial: Settings,
        lifecycle: LifecycleListener,
    ) -> Self {
        let inbox = bus.register(ContextId::Broker);
        Self {
            bus,
            backend,
            settings: initial,
            lifecycle,
            inbox,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.lifecycle.invalidated() => break,
                message = self.inbox.recv() => {
                    let Some(envelope) = message else { break };
                    self.handle(envelope).await;
                }
            }
        }
        tracing::info!(target: "broker", "broker context stopped");
    }

    async fn handle(&mut self, envelope: Envelope) {
        if !self.lifecycle.is_live() {
            return;
        }
        match envelope.parse() {
            Request::AnalyzeText { text } => {
                let Some(correlation_id) = envelope.correlation_id else {
                    return;
                };
                if let Some(result) = self.backend.triage(&text).await {
                    self.reply_with_result(correlation_id, &result);
                }
                // No reply on failure: requesters must treat silence as a
                // negative answer anyway.
            }
            Request::AnalyzeSelection { text } => {
                let Some(result) = self.backend.triage(&text).await else {
                    return;
                };
                if let Some(correlation_id) = envelope.correlation_id {
                    self.reply_with_result(correlation_id, &result);
                }
                self.push_banner(&result);
                if !result.highlights.is_empty() {
                    self.push_highlights(&result);
                }
            }
            Request::GetSettings => {
                let Some(correlation_id) = envelope.correlation_id else {
                    return;
                };
                if let Ok(reply) = Envelope::with_payload(protocol::RESULT, &self.settings) {
                    self.bus.reply(correlation_id, reply);
                }
            }
            Request::SetSettings(patch) => self.apply_settings(envelope.correlation_id, patch),
            // Anything else is not addressed to this context.
            _ => {}
        }
    }

    fn reply_with_result(&self, correlation_id: u64, result: &TriageResult) {
        if let Ok(reply) = Envelope::with_payload(protocol::RESULT, result) {
            self.bus.reply(correlation_id, reply);
        }
    }

    fn apply_settings(&mut self, correlation_id: Option<u64>, patch: SettingsPatch) {
        patch.apply_to(&mut self.settings);

        if let Some(api_base) = &patch.api_base {
            match Url::parse(api_base) {
                Ok(url) => self.backend.rebase(url),
                Err(err) => {
                    tracing::warn!(target: "broker", error = %err, api_base, "rejected api base update");
                }
            }
        }

        tracing::info!(
            target: "broker",
            scanning = self.settings.scanning_enabled,
            meeting_mode = self.settings.meeting_mode_enabled,
            "settings updated"
        );

        if let Some(correlation_id) = correlation_id {
            if let Ok(reply) = Envelope::with_payload(protocol::RESULT, &self.settings) {
                self.bus.reply(correlation_id, reply);
            }
        }
        if let Ok(push) = Envelope::with_payload(protocol::SETTINGS_PATCH, &patch) {
            self.bus.send(ContextId::Scanner, push);
        }
    }

    fn push_banner(&self, result: &TriageResult) {
        let payload = BannerPayload {
            verdict: result.verdict.clone(),
            confidence: result.confidence,
            summary: result.summary.clone(),
        };
        if let Ok(push) = Envelope::with_payload(protocol::SHOW_BANNER, &payload) {
            self.bus.send(ContextId::Scanner, push);
        }
    }

    fn push_highlights(&self, result: &TriageResult) {
        let payload = HighlightsPayload {
            highlights: result.highlights.clone(),
        };
        if let Ok(push) = Envelope::with_payload(protocol::APPLY_HIGHLIGHTS, &payload) {
            self.bus.send(ContextId::Scanner, push);
        }
    }
}
