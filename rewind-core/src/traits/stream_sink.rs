use crate::models::artifact::Artifact;
use crate::models::audio_models::PcmFormat;
use crate::models::error::CaptureError;

/// A growing output stream that bytes can be durably written to.
///
/// A sink ends in exactly one of `finalize` or `abort`; both consume it.
pub trait StreamSink: Send {
    fn write(&mut self, data: &[u8]) -> Result<(), CaptureError>;

    /// Make the written bytes durable and describe the result.
    ///
    /// On failure nothing partial may remain visible to callers.
    fn finalize(self: Box<Self>) -> Result<Artifact, CaptureError>;

    /// Discard everything written so far.
    fn abort(self: Box<Self>);

    /// PCM bytes accepted by `write` so far.
    fn bytes_written(&self) -> u64;
}

/// Why a sink is being opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// The live recording started by `start_recording`.
    Recording,
    /// A one-shot dump of buffered history.
    Snapshot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkRequest {
    pub kind: SinkKind,
    pub label: Option<String>,
    pub format: PcmFormat,
}

/// Produces sinks for recordings and snapshots.
pub trait SinkFactory: Send + Sync {
    fn open(&self, request: &SinkRequest) -> Result<Box<dyn StreamSink>, CaptureError>;
}
