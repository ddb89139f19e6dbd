use chrono::{DateTime, Utc};

use crate::domain::{FrameLabel, MeetingModeStatus};

/// Accumulates meeting-mode sampling activity for on-demand queries from
/// the panel. Mutated only by the scanner context.
#[derive(Debug, Default)]
pub struct MeetingStats {
    sampled_frames: u64,
    latest_score: Option<u8>,
    latest_label: Option<FrameLabel>,
    latest_reason: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}

impl MeetingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, score: u8, label: FrameLabel, reason: Option<&str>) {
        self.sampled_frames += 1;
        self.latest_score = Some(score);
        self.latest_label = Some(label);
        self.latest_reason = reason.map(str::to_string);
        self.updated_at = Some(Utc::now());
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn sampled_frames(&self) -> u64 {
        self.sampled_frames
    }

    pub fn snapshot(
        &self,
        enabled: bool,
        is_meeting_host: bool,
        active_video_count: usize,
    ) -> MeetingModeStatus {
        MeetingModeStatus {
            enabled,
            is_meeting_host,
            active_video_count,
            sampled_frame_count: self.sampled_frames,
            latest_risk_score: self.latest_score,
            latest_label: self.latest_label,
            latest_reason: self.latest_reason.clone(),
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_the_latest_sample() {
        let mut stats = MeetingStats::new();
        stats.record(40, FrameLabel::Real, None);
        stats.record(82, FrameLabel::SuspectedFake, Some("temporal flicker"));

        let status = stats.snapshot(true, true, 3);
        assert!(status.enabled);
        assert!(status.is_meeting_host);
        assert_eq!(status.active_video_count, 3);
        assert_eq!(status.sampled_frame_count, 2);
        assert_eq!(status.latest_risk_score, Some(82));
        assert_eq!(status.latest_label, Some(FrameLabel::SuspectedFake));
        assert_eq!(status.latest_reason.as_deref(), Some("temporal flicker"));
        assert!(status.updated_at.is_some());
    }

    #[test]
    fn fresh_stats_snapshot_is_empty() {
        let status = MeetingStats::new().snapshot(false, false, 0);
        assert_eq!(status.sampled_frame_count, 0);
        assert_eq!(status.latest_risk_score, None);
        assert_eq!(status.updated_at, None);
    }

    #[test]
    fn reset_clears_accumulated_activity() {
        let mut stats = MeetingStats::new();
        stats.record(90, FrameLabel::SuspectedFake, Some("artifacts"));
        stats.reset();
        assert_eq!(stats.sampled_frames(), 0);
        assert_eq!(stats.snapshot(false, false, 0).latest_risk_score, None);
    }
}
