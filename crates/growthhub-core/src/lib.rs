pub mod alerts;
pub mod config;
pub mod error;
pub mod fallback;
pub mod format;
pub mod generation;
pub mod quota;
pub mod segments;
pub mod usage;
