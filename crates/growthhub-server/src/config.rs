/// Environment parsing lives in `growthhub-core` so tests can build a
/// `Config` without the server.
pub use growthhub_core::config::Config;
