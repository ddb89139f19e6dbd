pub mod directories;
pub mod lifecycle;
pub mod logging;
