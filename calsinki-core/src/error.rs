//! Engine error taxonomy.
//!
//! Transport failures from the calendar API are classified into these
//! variants by the provider layer; the engine decides per variant whether
//! to retry, fall back, or record the failure and move on.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Network or provider failure. Retried before the mutation is
    /// recorded as failed; never aborts the pass.
    #[error("transport error: {0}")]
    Transport(String),

    /// Provider rate limit. Retried with backoff.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The destination event vanished between fetch and mutation.
    /// Benign for deletes; updates fall back to a create.
    #[error("event not found: {0}")]
    NotFound(String),

    /// Unresolvable calendar reference or similar. Fatal for the rule
    /// only; sibling rules are unaffected.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Whether a retry of the same call can reasonably succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SyncError::Transport(_) | SyncError::RateLimited(_))
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
