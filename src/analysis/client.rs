use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use url::Url;

use crate::domain::{DeepfakeFrameResult, TriageResult};

use super::wire::{
    FRAME_PATH, FrameRequest, FrameResponse, TRIAGE_PATH, TriageRequest, TriageResponse,
    normalize_frame, normalize_triage,
};

/// Thin client over the remote triage / frame-classification service.
/// Failures are surfaced as errors; callers drop the sample and wait for
/// the next naturally-occurring scan, never retry.
#[derive(Clone)]
pub struct AnalysisClient {
    http: Client,
    api_base: Url,
}

impl AnalysisClient {
    pub fn new(http: Client, api_base: Url) -> Self {
        Self { http, api_base }
    }

    pub async fn triage(&self, text: &str) -> Result<TriageResult> {
        let url = self.endpoint(TRIAGE_PATH)?;
        let response = self
            .http
            .post(url)
            .json(&TriageRequest { text })
            .send()
            .await?
            .error_for_status()?;

        let wire: TriageResponse = response.json().await.context("malformed triage response")?;
        Ok(normalize_triage(wire))
    }

    pub async fn classify_frame(
        &self,
        image_b64: String,
        filename: String,
        timeout: Duration,
    ) -> Result<DeepfakeFrameResult> {
        let url = self.endpoint(FRAME_PATH)?;
        let response = self
            .http
            .post(url)
            .timeout(timeout)
            .json(&FrameRequest {
                image_b64,
                filename,
            })
            .send()
            .await?
            .error_for_status()?;

        let wire: FrameResponse = response
            .json()
            .await
            .context("malformed frame classification response")?;
        Ok(normalize_frame(wire))
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_base
            .join(path)
            .with_context(|| format!("invalid analysis endpoint {path}"))
    }
}
