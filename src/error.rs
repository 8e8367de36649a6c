//! Domain error types for the seams that need to match on a kind rather than
//! just propagate a message: comment-command dispatch, platform-CLI retry,
//! and configuration validation.
//!
//! Most call sites still use `anyhow::Result` and `?`; these variants exist so
//! the event orchestrator and config loader can branch on *why* something
//! failed instead of grepping a formatted string. Conflicts are carried as
//! plain data (`ConflictSnapshot`, `ConflictOutcome`) rather than an error
//! variant, since a real conflict is an expected outcome the sync
//! orchestrator handles inline, not an exceptional one.

use thiserror::Error;

/// A conflicting path plus the marker-delimited snapshot captured for it.
#[derive(Debug, Clone)]
pub struct ConflictSnapshot {
    pub path: String,
    pub contents: String,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Command(String),

    #[error("hosting platform call failed: {0}")]
    Platform(String),
}
