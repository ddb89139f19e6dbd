use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use chrono::{DateTime, Utc};

use crate::{
    domain::DeepfakeFrameResult,
    page::{ElementId, ElementKey, MemoryPage},
};

/// Below this rendered size a video is decoration, not content.
pub const MIN_RENDER_WIDTH: f32 = 160.0;
pub const MIN_RENDER_HEIGHT: f32 = 90.0;

/// Outcome of one spawned frame-classification request, delivered back
/// into the scanner loop. `None` covers every failure mode: the sample
/// is dropped and the pending flag cleared either way.
#[derive(Debug)]
pub struct SampleOutcome {
    pub key: ElementKey,
    pub result: Option<DeepfakeFrameResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Pending,
    NotPlaying,
    NotReady,
    TooSmall,
    OffScreen,
    TooSoon,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Pending => "analysis in flight",
            SkipReason::NotPlaying => "paused or ended",
            SkipReason::NotReady => "no decoded frames",
            SkipReason::TooSmall => "rendered box too small",
            SkipReason::OffScreen => "outside viewport",
            SkipReason::TooSoon => "inside sampling interval",
        }
    }
}

/// Gates which video elements may be sampled on a tick and tracks the
/// per-element pending flag and sample cadence. The timer fires far more
/// often than any single element should be resampled; these gates bound
/// the per-resource analysis rate.
pub struct VideoSampler {
    pending: HashSet<ElementKey>,
    last_sampled: HashMap<ElementKey, DateTime<Utc>>,
    sample_interval: chrono::Duration,
}

impl VideoSampler {
    pub fn new(sample_interval: Duration) -> Self {
        Self {
            pending: HashSet::new(),
            last_sampled: HashMap::new(),
            sample_interval: chrono::Duration::from_std(sample_interval)
                .unwrap_or_else(|_| chrono::Duration::seconds(5)),
        }
    }

    /// Returns why the element must be skipped this tick, or `None` when
    /// it is eligible for sampling.
    pub fn gate(
        &self,
        page: &MemoryPage,
        id: ElementId,
        key: &ElementKey,
        now: DateTime<Utc>,
    ) -> Option<SkipReason> {
        if self.pending.contains(key) {
            return Some(SkipReason::Pending);
        }
        let Some(playback) = page.video(id) else {
            return Some(SkipReason::NotReady);
        };
        if playback.paused || playback.ended {
            return Some(SkipReason::NotPlaying);
        }
        if !playback.ready {
            return Some(SkipReason::NotReady);
        }
        let rect = page.rect(id);
        if rect.width < MIN_RENDER_WIDTH || rect.height < MIN_RENDER_HEIGHT {
            return Some(SkipReason::TooSmall);
        }
        if !rect.intersects(&page.viewport()) {
            return Some(SkipReason::OffScreen);
        }
        if let Some(last) = self.last_sampled.get(key) {
            if now.signed_duration_since(*last) < self.sample_interval {
                return Some(SkipReason::TooSoon);
            }
        }
        None
    }

    /// Records the dispatch of a captured frame: cadence timestamp plus
    /// the pending flag that blocks duplicate in-flight work.
    pub fn mark_dispatched(&mut self, key: ElementKey, now: DateTime<Utc>) {
        self.last_sampled.insert(key.clone(), now);
        self.pending.insert(key);
    }

    /// Clears the pending flag on any outcome, success or failure.
    pub fn complete(&mut self, key: &ElementKey) {
        self.pending.remove(key);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn sweep(&mut self, present: &HashSet<ElementKey>) {
        self.pending.retain(|key| present.contains(key));
        self.last_sampled.retain(|key, _| present.contains(key));
    }
}
