use thiserror::Error;

use super::state::{Command, LifecycleState};

/// Errors that can occur while capturing, buffering or persisting audio.
///
/// Transient variants (`SourceReadTransient`) are absorbed by the worker loop
/// and only surface through observers; structural variants are returned to the
/// caller synchronously; sink variants also travel through result handlers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("capture source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("capture source read failed: {0}")]
    SourceReadTransient(String),

    #[error("failed to open output sink: {0}")]
    SinkOpenFailed(String),

    #[error("failed to write output sink: {0}")]
    SinkWriteFailed(String),

    #[error("failed to finalize output sink: {0}")]
    SinkFinalizeFailed(String),

    #[error("{command} is not permitted while {state}")]
    InvalidTransition {
        state: LifecycleState,
        command: Command,
    },

    #[error("skip of {skip} bytes exceeds the {valid} valid bytes")]
    OutOfRange { skip: usize, valid: usize },

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("failed to allocate {0} bytes of audio memory")]
    AllocationFailed(u64),

    #[error("audio worker disconnected")]
    WorkerDisconnected,

    #[error("timeout")]
    Timeout,
}

impl CaptureError {
    /// Whether this error only affects a single poll of the capture source.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::SourceReadTransient(_))
    }
}
