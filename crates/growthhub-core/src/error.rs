use thiserror::Error;

/// Invalid domain input: plan names and timezone identifiers.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown plan: {0} (expected free, personal or business)")]
    UnknownPlan(String),

    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),
}
