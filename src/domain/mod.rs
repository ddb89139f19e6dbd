pub mod types;

pub use types::{
    DeepfakeFrameResult, FrameLabel, MeetingModeStatus, Settings, TriageHighlight, TriageResult,
};
