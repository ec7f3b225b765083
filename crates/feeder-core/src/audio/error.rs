//! Feeder error types

use thiserror::Error;

use super::config::BackendKind;

/// Errors that can occur while feeding audio to an output backend
///
/// Starvation is not represented here: running out of queued data is an
/// expected runtime condition, recorded in the `dropped`/`delayed` counters
/// of [`PlaybackState`](crate::clock::PlaybackState).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeederError {
    /// Malformed chunk (wrong channel count or ragged channel lengths)
    #[error("Invalid audio buffer: {reason}")]
    InvalidBuffer { reason: String },

    /// Channel count passed to init or a queue was zero
    #[error("Invalid channel count: {0}")]
    InvalidChannelCount(usize),

    /// Sample rate passed to init was zero
    #[error("Invalid sample rate: {0}Hz")]
    InvalidSampleRate(u32),

    /// Operation called in a lifecycle state that doesn't allow it
    #[error("Invalid state: cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    /// A backend passed its support probe but could not be built
    #[error("Failed to construct {backend} backend: {reason}")]
    BackendConstructionFailure { backend: BackendKind, reason: String },

    /// Device-level failure while starting or pausing output
    #[error("Audio stream error: {0}")]
    Stream(String),
}

impl FeederError {
    /// Shorthand for an [`FeederError::InvalidBuffer`] with a formatted reason
    pub fn invalid_buffer(reason: impl Into<String>) -> Self {
        Self::InvalidBuffer {
            reason: reason.into(),
        }
    }

    pub fn construction(backend: BackendKind, reason: impl ToString) -> Self {
        Self::BackendConstructionFailure {
            backend,
            reason: reason.to_string(),
        }
    }
}

/// Result type for feeder operations
pub type FeederResult<T> = Result<T, FeederError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = FeederError::InvalidState {
            operation: "start",
            state: "uninitialized".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid state: cannot start while uninitialized"
        );

        let err = FeederError::construction(BackendKind::Jack, "server went away");
        assert_eq!(
            err.to_string(),
            "Failed to construct JACK backend: server went away"
        );
    }
}
