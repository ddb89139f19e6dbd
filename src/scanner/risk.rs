use std::collections::{HashMap, HashSet};

use crate::{
    domain::{DeepfakeFrameResult, FrameLabel},
    page::{ElementId, ElementKey, MemoryPage, Node},
};

/// A sample is suspicious when the classifier says fake outright or the
/// fake-side score reaches this bar.
pub const SUSPICIOUS_SCORE: u8 = 75;
/// Overlay thresholds differ by surface: meeting pages alert earlier.
pub const MEETING_BADGE_THRESHOLD: u8 = 65;
pub const DEFAULT_BADGE_THRESHOLD: u8 = 75;
pub const MAX_HIGH_RISK_HITS: u8 = 6;
pub const RISK_BADGE_CLASS: &str = "risk-badge";

/// Per-video smoothed risk. Held in a fingerprint-keyed arena and swept
/// with the page, never destroyed explicitly.
#[derive(Debug, Clone, Default)]
pub struct VideoRiskState {
    pub sample_count: u32,
    pub avg_score: u8,
    pub last_score: u8,
    pub high_risk_hits: u8,
    pub last_label: Option<FrameLabel>,
    pub last_reason: Option<String>,
    /// Last composite score, kept so overlays survive snapshot rebuilds.
    pub last_weighted: u8,
}

/// Folds one frame result into the state and returns the composite
/// score: running mean weighted 70/30 against the latest sample, plus a
/// consistency boost once suspicious samples repeat.
pub fn update_risk(state: &mut VideoRiskState, frame: &DeepfakeFrameResult) -> u8 {
    let incoming = frame.deepfake_score.min(100);

    state.sample_count += 1;
    state.last_score = incoming;
    let n = state.sample_count;
    state.avg_score = ((f64::from(state.avg_score) * f64::from(n - 1) + f64::from(incoming))
        / f64::from(n))
    .round() as u8;

    let suspicious = frame.label == FrameLabel::SuspectedFake || incoming >= SUSPICIOUS_SCORE;
    if suspicious {
        state.high_risk_hits = (state.high_risk_hits + 1).min(MAX_HIGH_RISK_HITS);
    } else {
        state.high_risk_hits = state.high_risk_hits.saturating_sub(1);
    }

    let weighted =
        (f64::from(state.avg_score) * 0.7 + f64::from(state.last_score) * 0.3).round() as u32;
    let boost = if state.high_risk_hits >= 2 {
        u32::from(state.high_risk_hits * 2).min(10)
    } else {
        0
    };
    let score = (weighted + boost).min(100) as u8;

    state.last_label = Some(frame.label);
    state.last_reason = if frame.explainability.is_empty() {
        None
    } else {
        Some(frame.explainability.clone())
    };
    state.last_weighted = score;
    score
}

pub fn badge_threshold(meeting: bool) -> u8 {
    if meeting {
        MEETING_BADGE_THRESHOLD
    } else {
        DEFAULT_BADGE_THRESHOLD
    }
}

pub struct RiskAggregator {
    states: HashMap<ElementKey, VideoRiskState>,
}

impl RiskAggregator {
    pub fn new() -> Self {
        Self {
            states: HashMap::new(),
        }
    }

    pub fn record(&mut self, key: &ElementKey, frame: &DeepfakeFrameResult) -> u8 {
        let state = self.states.entry(key.clone()).or_default();
        update_risk(state, frame)
    }

    pub fn state(&self, key: &ElementKey) -> Option<&VideoRiskState> {
        self.states.get(key)
    }

    pub fn tracked(&self) -> usize {
        self.states.len()
    }

    /// Shows or removes the overlay badge on the video's container
    /// according to the composite score and the surface's threshold.
    pub fn apply_overlay(&self, page: &mut MemoryPage, video: ElementId, score: u8, meeting: bool) {
        let container = page.parent(video).unwrap_or(video);
        let existing = page
            .child_elements(container)
            .into_iter()
            .find(|child| page.has_class(*child, RISK_BADGE_CLASS));

        if score < badge_threshold(meeting) {
            if let Some(badge) = existing {
                page.remove_element(badge);
            }
            return;
        }

        let category = if meeting {
            "Meeting AI risk"
        } else {
            "Possible deepfake"
        };
        let text = format!("{category} {score}");
        let tooltip = self.tooltip_for(page, video);

        match existing {
            Some(badge) => {
                page.set_text(badge, &text);
                page.set_attr(badge, "title", &tooltip);
            }
            None => {
                let badge = page.create_element("span");
                page.add_class(badge, RISK_BADGE_CLASS);
                page.set_text(badge, &text);
                page.set_attr(badge, "title", &tooltip);
                page.append_child(container, Node::Element(badge));
            }
        }
    }

    /// Re-applies overlays after a snapshot rebuild, which starts from a
    /// badge-free tree.
    pub fn reapply_overlays(&self, page: &mut MemoryPage, meeting: bool) {
        for (key, state) in &self.states {
            if let Some(video) = page.find_by_key(key) {
                self.apply_overlay(page, video, state.last_weighted, meeting);
            }
        }
    }

    fn tooltip_for(&self, page: &MemoryPage, video: ElementId) -> String {
        let Some(key) = page.key(video) else {
            return String::new();
        };
        let Some(state) = self.states.get(key) else {
            return String::new();
        };
        let reason = state.last_reason.as_deref().unwrap_or("no explanation");
        format!("samples: {}; {}", state.sample_count, reason)
    }

    /// Removes every risk badge and discards all per-element state, so
    /// re-enabling scanning starts from a clean slate.
    pub fn clear_all(&mut self, page: &mut MemoryPage) {
        for badge in page.elements_with_class(RISK_BADGE_CLASS) {
            page.remove_element(badge);
        }
        self.states.clear();
    }

    pub fn sweep(&mut self, present: &HashSet<ElementKey>) {
        self.states.retain(|key, _| present.contains(key));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::VideoPlayback;

    fn frame(label: FrameLabel, deepfake_score: u8) -> DeepfakeFrameResult {
        DeepfakeFrameResult {
            label,
            confidence: deepfake_score,
            deepfake_score,
            explainability: "test reason".into(),
        }
    }

    fn page_with_video(key: &ElementKey) -> (MemoryPage, ElementId) {
        let mut page = MemoryPage::new("us05web.zoom.us");
        let container = page.create_element("div");
        let video = page.create_element("video");
        page.set_key(video, key.clone());
        page.set_video(video, VideoPlayback::default());
        page.append_child(container, Node::Element(video));
        let body = page.body();
        page.append_child(body, Node::Element(container));
        (page, video)
    }

    #[test]
    fn composite_score_stays_within_bounds() {
        let mut state = VideoRiskState::default();
        for score in [0u8, 100, 100, 100, 100, 0, 37, 100] {
            let label = if score >= 50 {
                FrameLabel::SuspectedFake
            } else {
                FrameLabel::Real
            };
            let composite = update_risk(&mut state, &frame(label, score));
            assert!(composite <= 100);
            assert!(state.avg_score <= 100);
        }
    }

    #[test]
    fn running_mean_is_the_arithmetic_average() {
        let mut state = VideoRiskState::default();
        update_risk(&mut state, &frame(FrameLabel::Real, 50));
        update_risk(&mut state, &frame(FrameLabel::SuspectedFake, 100));
        assert_eq!(state.avg_score, 75);
        assert_eq!(state.last_score, 100);
        assert_eq!(state.sample_count, 2);
    }

    #[test]
    fn hits_cap_at_six_and_floor_at_zero() {
        let mut state = VideoRiskState::default();
        for _ in 0..9 {
            update_risk(&mut state, &frame(FrameLabel::SuspectedFake, 90));
        }
        assert_eq!(state.high_risk_hits, MAX_HIGH_RISK_HITS);
        for _ in 0..9 {
            update_risk(&mut state, &frame(FrameLabel::Real, 10));
        }
        assert_eq!(state.high_risk_hits, 0);
    }

    #[test]
    fn single_suspicious_sample_earns_no_boost() {
        let mut state = VideoRiskState::default();
        let score = update_risk(&mut state, &frame(FrameLabel::SuspectedFake, 80));
        // avg == last == 80, hits == 1: no consistency boost yet.
        assert_eq!(score, 80);
    }

    #[test]
    fn repeated_suspicious_samples_add_a_capped_boost() {
        let mut state = VideoRiskState::default();
        update_risk(&mut state, &frame(FrameLabel::SuspectedFake, 80));
        let second = update_risk(&mut state, &frame(FrameLabel::SuspectedFake, 80));
        // weighted 80 plus hits(2)*2.
        assert_eq!(second, 84);

        for _ in 0..10 {
            update_risk(&mut state, &frame(FrameLabel::SuspectedFake, 80));
        }
        let capped = update_risk(&mut state, &frame(FrameLabel::SuspectedFake, 80));
        // Boost never exceeds 10.
        assert_eq!(capped, 90);
    }

    #[test]
    fn real_label_with_high_score_still_counts_as_suspicious() {
        let mut state = VideoRiskState::default();
        update_risk(&mut state, &frame(FrameLabel::Real, SUSPICIOUS_SCORE));
        assert_eq!(state.high_risk_hits, 1);
        update_risk(&mut state, &frame(FrameLabel::Real, SUSPICIOUS_SCORE - 1));
        assert_eq!(state.high_risk_hits, 0);
    }

    #[test]
    fn overlay_respects_per_surface_thresholds() {
        let key = ElementKey::derive("video", "stream-a");
        let aggregator = RiskAggregator::new();

        let (mut page, video) = page_with_video(&key);
        aggregator.apply_overlay(&mut page, video, 65, true);
        assert_eq!(page.elements_with_class(RISK_BADGE_CLASS).len(), 1);

        aggregator.apply_overlay(&mut page, video, 64, true);
        assert!(page.elements_with_class(RISK_BADGE_CLASS).is_empty());

        aggregator.apply_overlay(&mut page, video, 74, false);
        assert!(page.elements_with_class(RISK_BADGE_CLASS).is_empty());
        aggregator.apply_overlay(&mut page, video, 75, false);
        assert_eq!(page.elements_with_class(RISK_BADGE_CLASS).len(), 1);
    }

    #[test]
    fn overlay_text_names_the_surface_category() {
        let key = ElementKey::derive("video", "stream-b");
        let mut aggregator = RiskAggregator::new();
        let (mut page, video) = page_with_video(&key);

        let score = aggregator.record(&key, &frame(FrameLabel::SuspectedFake, 90));
        aggregator.apply_overlay(&mut page, video, score, true);
        let badge = page.elements_with_class(RISK_BADGE_CLASS)[0];
        assert!(page.text_content(badge).starts_with("Meeting AI risk"));
        assert!(
            page.attr(badge, "title")
                .is_some_and(|t| t.contains("samples: 1"))
        );
    }

    #[test]
    fn clear_all_is_a_total_reset() {
        let key = ElementKey::derive("video", "stream-c");
        let mut aggregator = RiskAggregator::new();
        let (mut page, video) = page_with_video(&key);

        let score = aggregator.record(&key, &frame(FrameLabel::SuspectedFake, 90));
        aggregator.apply_overlay(&mut page, video, score, false);
        assert_eq!(aggregator.tracked(), 1);

        aggregator.clear_all(&mut page);
        assert_eq!(aggregator.tracked(), 0);
        assert!(page.elements_with_class(RISK_BADGE_CLASS).is_empty());

        // A fresh sample behaves as if the element had never been seen.
        aggregator.record(&key, &frame(FrameLabel::SuspectedFake, 90));
        let state = aggregator.state(&key).expect("state");
        assert_eq!(state.sample_count, 1);
        assert_eq!(state.high_risk_hits, 1);
    }

    #[test]
    fn sweep_drops_states_for_vanished_elements() {
        let key = ElementKey::derive("video", "stream-d");
        let mut aggregator = RiskAggregator::new();
        aggregator.record(&key, &frame(FrameLabel::Real, 10));
        assert_eq!(aggregator.tracked(), 1);

        aggregator.sweep(&HashSet::new());
        assert_eq!(aggregator.tracked(), 0);
    }
}
