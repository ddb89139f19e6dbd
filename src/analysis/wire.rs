use serde::{Deserialize, Serialize};

use crate::domain::{DeepfakeFrameResult, FrameLabel, TriageHighlight, TriageResult};

pub const TRIAGE_PATH: &str = "/api/v1/triage";
pub const FRAME_PATH: &str = "/api/v1/deepfake/image";

#[derive(Debug, Serialize)]
pub struct TriageRequest<'a> {
    pub text: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct TriageResponse {
    pub verdict: String,
    pub confidence: i64,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub highlights: Vec<WireHighlight>,
}

#[derive(Debug, Deserialize)]
pub struct WireHighlight {
    pub text: String,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Serialize)]
pub struct FrameRequest {
    pub image_b64: String,
    pub filename: String,
}

/// Raw frame-endpoint shape: boolean verdict plus 0.0-1.0 confidence.
#[derive(Debug, Deserialize)]
pub struct FrameResponse {
    pub is_deepfake: bool,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

pub fn normalize_triage(response: TriageResponse) -> TriageResult {
    TriageResult {
        verdict: response.verdict,
        confidence: response.confidence.clamp(0, 100) as u8,
        summary: response.summary,
        highlights: response
            .highlights
            .into_iter()
            .filter(|h| !h.text.is_empty())
            .map(|h| TriageHighlight {
                text: h.text,
                label: h.label,
            })
            .collect(),
    }
}

pub fn normalize_frame(response: FrameResponse) -> DeepfakeFrameResult {
    let confidence = (response.confidence.clamp(0.0, 1.0) * 100.0).round() as u8;
    let (label, deepfake_score) = if response.is_deepfake {
        (FrameLabel::SuspectedFake, confidence)
    } else {
        (FrameLabel::Real, 100 - confidence)
    };
    DeepfakeFrameResult {
        label,
        confidence,
        deepfake_score,
        explainability: response.reasoning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_frame_keeps_fake_side_percentage() {
        let result = normalize_frame(FrameResponse {
            is_deepfake: true,
            confidence: 0.87,
            reasoning: "blending artifacts".into(),
        });
        assert_eq!(result.label, FrameLabel::SuspectedFake);
        assert_eq!(result.confidence, 87);
        assert_eq!(result.deepfake_score, 87);
    }

    #[test]
    fn real_frame_inverts_to_fake_side_percentage() {
        let result = normalize_frame(FrameResponse {
            is_deepfake: false,
            confidence: 0.9,
            reasoning: String::new(),
        });
        assert_eq!(result.label, FrameLabel::Real);
        assert_eq!(result.deepfake_score, 10);
    }

    #[test]
    fn frame_confidence_out_of_range_is_clamped() {
        let result = normalize_frame(FrameResponse {
            is_deepfake: true,
            confidence: 3.2,
            reasoning: String::new(),
        });
        assert_eq!(result.confidence, 100);
        assert_eq!(result.deepfake_score, 100);
    }

    #[test]
    fn triage_confidence_is_clamped_and_empty_highlights_dropped() {
        let result = normalize_triage(TriageResponse {
            verdict: "FALSE".into(),
            confidence: 140,
            summary: "fabricated claim".into(),
            highlights: vec![
                WireHighlight {
                    text: String::new(),
                    label: "ai".into(),
                },
                WireHighlight {
                    text: "miracle cure".into(),
                    label: "ai".into(),
                },
            ],
        });
        assert_eq!(result.confidence, 100);
        assert_eq!(result.highlights.len(), 1);
        assert_eq!(result.highlights[0].text, "miracle cure");
    }
}
