pub mod frame;
pub mod memory;
pub mod snapshot;

pub use memory::{ElementData, ElementId, ElementKey, MemoryPage, Node, Rect, VideoPlayback};
