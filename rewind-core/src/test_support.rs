//! Fakes shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::artifact::Artifact;
use crate::models::audio_models::{PcmFormat, SourceInfo};
use crate::models::error::CaptureError;
use crate::models::state::LifecycleState;
use crate::storage::memory_sink::MemorySink;
use crate::traits::capture_source::CaptureSource;
use crate::traits::engine_observer::EngineObserver;
use crate::traits::result_handler::ResultHandler;
use crate::traits::stream_sink::{SinkFactory, SinkKind, SinkRequest, StreamSink};

#[derive(Default)]
struct ScriptState {
    pending: VecDeque<u8>,
    fail_next_poll: bool,
    fail_open: bool,
    open: bool,
    open_count: usize,
    last_format: Option<PcmFormat>,
}

/// Capture source fed by the test. Clones share the same queue.
#[derive(Clone, Default)]
pub(crate) struct ScriptedSource {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, bytes: &[u8]) {
        self.state.lock().pending.extend(bytes.iter().copied());
    }

    pub(crate) fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub(crate) fn fail_next_poll(&self) {
        self.state.lock().fail_next_poll = true;
    }

    pub(crate) fn fail_open(&self) {
        self.state.lock().fail_open = true;
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state.lock().open
    }

    pub(crate) fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    pub(crate) fn last_format(&self) -> Option<PcmFormat> {
        self.state.lock().last_format
    }
}

impl CaptureSource for ScriptedSource {
    fn open(&mut self, format: &PcmFormat) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        if state.fail_open {
            return Err(CaptureError::SourceUnavailable("scripted open failure".into()));
        }
        state.open = true;
        state.open_count += 1;
        state.last_format = Some(*format);
        Ok(())
    }

    fn poll(&mut self, buf: &mut [u8]) -> Result<usize, CaptureError> {
        let mut state = self.state.lock();
        if state.fail_next_poll {
            state.fail_next_poll = false;
            return Err(CaptureError::SourceReadTransient("scripted read failure".into()));
        }
        let n = buf.len().min(state.pending.len());
        for (slot, byte) in buf.iter_mut().zip(state.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn headroom(&self) -> Duration {
        Duration::from_millis(100)
    }

    fn close(&mut self) {
        self.state.lock().open = false;
    }

    fn device_info(&self) -> SourceInfo {
        SourceInfo {
            id: "scripted".into(),
            name: "Scripted Source".into(),
            is_default: true,
        }
    }
}

/// Which sink operation a `TestSinkFactory` makes fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailAt {
    Open,
    Write,
    Finalize,
}

#[derive(Default)]
pub(crate) struct SinkCounters {
    pub(crate) opened: AtomicUsize,
    pub(crate) finalized: AtomicUsize,
    pub(crate) aborted: AtomicUsize,
}

impl SinkCounters {
    pub(crate) fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub(crate) fn finalized(&self) -> usize {
        self.finalized.load(Ordering::SeqCst)
    }

    pub(crate) fn aborted(&self) -> usize {
        self.aborted.load(Ordering::SeqCst)
    }
}

/// In-memory sinks with optional injected failures for one sink kind.
#[derive(Clone, Default)]
pub(crate) struct TestSinkFactory {
    failure: Option<(SinkKind, FailAt)>,
    pub(crate) counters: Arc<SinkCounters>,
    requests: Arc<Mutex<Vec<SinkRequest>>>,
}

impl TestSinkFactory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing(kind: SinkKind, at: FailAt) -> Self {
        Self {
            failure: Some((kind, at)),
            ..Self::default()
        }
    }

    pub(crate) fn requests(&self) -> Vec<SinkRequest> {
        self.requests.lock().clone()
    }
}

impl SinkFactory for TestSinkFactory {
    fn open(&self, request: &SinkRequest) -> Result<Box<dyn StreamSink>, CaptureError> {
        self.requests.lock().push(request.clone());
        let fail_at = match self.failure {
            Some((kind, at)) if kind == request.kind => Some(at),
            _ => None,
        };
        if fail_at == Some(FailAt::Open) {
            return Err(CaptureError::SinkOpenFailed("injected open failure".into()));
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TestSink {
            inner: MemorySink::with_format(request.format, request.label.clone()),
            fail_at,
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct TestSink {
    inner: MemorySink,
    fail_at: Option<FailAt>,
    counters: Arc<SinkCounters>,
}

impl StreamSink for TestSink {
    fn write(&mut self, data: &[u8]) -> Result<(), CaptureError> {
        if self.fail_at == Some(FailAt::Write) {
            return Err(CaptureError::SinkWriteFailed("injected write failure".into()));
        }
        self.inner.write(data)
    }

    fn finalize(self: Box<Self>) -> Result<Artifact, CaptureError> {
        if self.fail_at == Some(FailAt::Finalize) {
            self.counters.aborted.fetch_add(1, Ordering::SeqCst);
            return Err(CaptureError::SinkFinalizeFailed("injected finalize failure".into()));
        }
        self.counters.finalized.fetch_add(1, Ordering::SeqCst);
        Box::new(self.inner).finalize()
    }

    fn abort(self: Box<Self>) {
        self.counters.aborted.fetch_add(1, Ordering::SeqCst);
    }

    fn bytes_written(&self) -> u64 {
        self.inner.bytes_written()
    }
}

/// Everything an `EngineObserver` was told.
#[derive(Default)]
pub(crate) struct RecordingObserver {
    pub(crate) states: Mutex<Vec<LifecycleState>>,
    pub(crate) audio: Mutex<Vec<u8>>,
    pub(crate) errors: Mutex<Vec<CaptureError>>,
}

impl EngineObserver for RecordingObserver {
    fn on_state_changed(&self, state: LifecycleState) {
        self.states.lock().push(state);
    }

    fn on_audio(&self, pcm: &[u8]) {
        self.audio.lock().extend_from_slice(pcm);
    }

    fn on_error(&self, error: &CaptureError) {
        self.errors.lock().push(error.clone());
    }
}

/// A result handler that forwards into a channel.
pub(crate) fn collector() -> (Box<dyn ResultHandler>, Receiver<Result<Artifact, CaptureError>>) {
    let (tx, rx) = mpsc::channel();
    let handler = move |result: Result<Artifact, CaptureError>| {
        let _ = tx.send(result);
    };
    (Box::new(handler), rx)
}

pub(crate) fn counting_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
