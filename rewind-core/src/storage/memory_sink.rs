use std::sync::Arc;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::models::artifact::{Artifact, ArtifactLocation};
use crate::models::audio_models::PcmFormat;
use crate::models::error::CaptureError;
use crate::traits::stream_sink::{SinkFactory, SinkKind, SinkRequest, StreamSink};

use super::hex_encode;

/// Sink that keeps everything in memory.
///
/// Useful for in-process consumers of snapshots (analysis, upload) and for
/// tests. Finalizing yields an artifact whose location carries the bytes.
#[derive(Debug)]
pub struct MemorySink {
    data: Vec<u8>,
    format: PcmFormat,
    label: Option<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_format(PcmFormat::mono_16(48000), None)
    }

    pub fn with_format(format: PcmFormat, label: Option<String>) -> Self {
        Self {
            data: Vec::new(),
            format,
            label,
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        self.data.clone()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSink for MemorySink {
    fn write(&mut self, data: &[u8]) -> Result<(), CaptureError> {
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<Artifact, CaptureError> {
        let MemorySink { data, format, label } = *self;
        let checksum = hex_encode(&Sha256::digest(&data));
        let byte_count = data.len() as u64;
        Ok(Artifact {
            id: uuid::Uuid::new_v4().to_string(),
            label,
            duration_secs: format.seconds_for_bytes(byte_count),
            location: ArtifactLocation::Memory(Arc::from(data)),
            byte_count,
            checksum,
            created_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    fn abort(self: Box<Self>) {}

    fn bytes_written(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Opens `MemorySink`s and remembers every request it served.
#[derive(Debug, Clone, Default)]
pub struct MemorySinkFactory {
    requests: Arc<Mutex<Vec<SinkRequest>>>,
}

impl MemorySinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<SinkRequest> {
        self.requests.lock().clone()
    }

    pub fn opened(&self, kind: SinkKind) -> usize {
        self.requests.lock().iter().filter(|r| r.kind == kind).count()
    }
}

impl SinkFactory for MemorySinkFactory {
    fn open(&self, request: &SinkRequest) -> Result<Box<dyn StreamSink>, CaptureError> {
        self.requests.lock().push(request.clone());
        Ok(Box::new(MemorySink::with_format(request.format, request.label.clone())))
    }
}
