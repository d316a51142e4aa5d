//! Control-domain error types
//!
//! Every error here is local and recoverable: the affected deck or mixer keeps
//! its last valid state, and the other deck is never affected. The audio
//! callback itself has no error channel; silence is its universal fallback.

use thiserror::Error;

use crate::track::LoadError;

/// Errors reported to control-domain callers (UI, loop monitor)
#[derive(Debug, Error)]
pub enum ControlError {
    /// A parameter was outside its documented domain. The previous value is
    /// retained; nothing is partially applied or silently clamped.
    #[error("{name} out of range: {value} (expected {expected})")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        expected: &'static str,
    },

    /// The source could not be opened or decoded; the deck keeps its
    /// previous track (or remains empty).
    #[error("failed to load track: {0}")]
    LoadFailure(#[from] LoadError),

    /// The operation requires a loaded track, but the deck is empty.
    #[error("no track loaded")]
    NotReady,

    /// The bounded command queue was full; the command was not enqueued.
    #[error("control queue full, command dropped")]
    QueueFull,
}

/// Result type for control-domain operations
pub type ControlResult<T> = Result<T, ControlError>;
