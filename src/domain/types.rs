use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Settings owned by the background broker and cached by the scanner.
/// Last write wins; persistence lives outside this core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub scanning_enabled: bool,
    pub meeting_mode_enabled: bool,
    pub api_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageHighlight {
    pub text: String,
    pub label: String,
}

/// Response from the text classifier, already clamped to local ranges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageResult {
    pub verdict: String,
    pub confidence: u8,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub highlights: Vec<TriageHighlight>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameLabel {
    Real,
    SuspectedFake,
    Unverified,
}

impl FrameLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameLabel::Real => "REAL",
            FrameLabel::SuspectedFake => "SUSPECTED_FAKE",
            FrameLabel::Unverified => "UNVERIFIED",
        }
    }
}

/// Normalized frame-classifier verdict. `deepfake_score` is the
/// fake-side percentage regardless of which way the verdict leans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepfakeFrameResult {
    pub label: FrameLabel,
    pub confidence: u8,
    pub deepfake_score: u8,
    pub explainability: String,
}

/// Derived snapshot of meeting-mode activity, recomputed on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingModeStatus {
    pub enabled: bool,
    pub is_meeting_host: bool,
    pub active_video_count: usize,
    pub sampled_frame_count: u64,
    pub latest_risk_score: Option<u8>,
    pub latest_label: Option<FrameLabel>,
    pub latest_reason: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}
