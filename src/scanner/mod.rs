pub mod context;
pub mod highlight;
pub mod posts;
pub mod risk;
pub mod status;
pub mod videos;

pub use context::ScannerContext;
