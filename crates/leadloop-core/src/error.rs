//! LeadLoop error types.

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, LeadLoopError>;

/// All errors produced by LeadLoop crates.
#[derive(Debug, thiserror::Error)]
pub enum LeadLoopError {
    /// Configuration file missing, unreadable, or malformed.
    #[error("Config error: {0}")]
    Config(String),

    /// The agent registry could not be read or written.
    #[error("Registry unavailable: {0}")]
    Registry(String),

    /// A `schedule_cron` expression failed to parse.
    #[error("Invalid schedule: {0}")]
    Schedule(String),

    /// The executor reported a failed agent run.
    #[error("Execution failed: {0}")]
    Execution(String),

    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
