use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::domain::{Settings, TriageHighlight};

// Message kinds. Receivers ignore anything they do not recognize, so new
// kinds can be added without coordinating both ends.
pub const ANALYZE_TEXT: &str = "analyze_text";
pub const ANALYZE_SELECTION: &str = "analyze_selection";
pub const GET_SETTINGS: &str = "get_settings";
pub const SET_SETTINGS: &str = "set_settings";
pub const SETTINGS_PATCH: &str = "settings_patch";
pub const SHOW_BANNER: &str = "show_banner";
pub const APPLY_HIGHLIGHTS: &str = "apply_highlights";
pub const GET_MEETING_MODE: &str = "get_meeting_mode";
pub const SET_MEETING_MODE: &str = "set_meeting_mode";
pub const FORCE_SCAN: &str = "force_scan";
pub const GET_MEETING_STATUS: &str = "get_meeting_status";
pub const RESULT: &str = "result";

/// The only shape that crosses context boundaries: a tagged kind, an
/// optional JSON payload, and a correlation id when a reply is wanted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<u64>,
}

impl Envelope {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            payload: None,
            correlation_id: None,
        }
    }

    pub fn with_payload<T: Serialize>(kind: &str, payload: &T) -> anyhow::Result<Self> {
        Ok(Self {
            kind: kind.to_string(),
            payload: Some(serde_json::to_value(payload)?),
            correlation_id: None,
        })
    }

    pub fn payload_as<T: DeserializeOwned>(&self) -> Option<T> {
        self.payload
            .clone()
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// Typed view of the envelope. A missing or malformed payload turns
    /// the message into `Unknown`, which every receiver drops silently.
    pub fn parse(&self) -> Request {
        match self.kind.as_str() {
            ANALYZE_TEXT => match self.payload_as::<TextPayload>() {
                Some(p) => Request::AnalyzeText { text: p.text },
                None => Request::Unknown,
            },
            ANALYZE_SELECTION => match self.payload_as::<TextPayload>() {
                Some(p) => Request::AnalyzeSelection { text: p.text },
                None => Request::Unknown,
            },
            GET_SETTINGS => Request::GetSettings,
            SET_SETTINGS => match self.payload_as::<SettingsPatch>() {
                Some(p) => Request::SetSettings(p),
                None => Request::Unknown,
            },
            SETTINGS_PATCH => match self.payload_as::<SettingsPatch>() {
                Some(p) => Request::SettingsPatch(p),
                None => Request::Unknown,
            },
            SHOW_BANNER => match self.payload_as::<BannerPayload>() {
                Some(p) => Request::ShowBanner(p),
                None => Request::Unknown,
            },
            APPLY_HIGHLIGHTS => match self.payload_as::<HighlightsPayload>() {
                Some(p) => Request::ApplyHighlights(p),
                None => Request::Unknown,
            },
            GET_MEETING_MODE => Request::GetMeetingMode,
            SET_MEETING_MODE => match self.payload_as::<EnabledPayload>() {
                Some(p) => Request::SetMeetingMode { enabled: p.enabled },
                None => Request::Unknown,
            },
            FORCE_SCAN => Request::ForceScan,
            GET_MEETING_STATUS => Request::GetMeetingStatus,
            _ => Request::Unknown,
        }
    }
}

#[derive(Debug)]
pub enum Request {
    AnalyzeText { text: String },
    AnalyzeSelection { text: String },
    GetSettings,
    SetSettings(SettingsPatch),
    SettingsPatch(SettingsPatch),
    ShowBanner(BannerPayload),
    ApplyHighlights(HighlightsPayload),
    GetMeetingMode,
    SetMeetingMode { enabled: bool },
    ForceScan,
    GetMeetingStatus,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextPayload {
    pub text: String,
}

/// Partial settings update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scanning_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_mode_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

impl SettingsPatch {
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(enabled) = self.scanning_enabled {
            settings.scanning_enabled = enabled;
        }
        if let Some(enabled) = self.meeting_mode_enabled {
            settings.meeting_mode_enabled = enabled;
        }
        if let Some(api_base) = &self.api_base {
            settings.api_base = api_base.clone();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BannerPayload {
    pub verdict: String,
    pub confidence: u8,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighlightsPayload {
    pub highlights: Vec<TriageHighlight>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnabledPayload {
    pub enabled: bool,
}
