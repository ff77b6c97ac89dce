use std::ops::Deref;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::models::config::EngineConfig;
use crate::models::error::CaptureError;
use crate::models::state::EngineStatus;
use crate::traits::capture_source::CaptureSource;
use crate::traits::engine_observer::EngineObserver;
use crate::traits::result_handler::{Dispatcher, InlineDispatcher, ResultHandler};
use crate::traits::stream_sink::SinkFactory;

use super::worker::{EngineCommand, Reply, Worker};

/// A configuration change applied through `reconfigure`.
///
/// Either change discards all buffered history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconfiguration {
    SampleRate(u32),
    Capacity(u64),
}

/// Cloneable, thread-safe handle to the audio worker.
///
/// Every method blocks until the worker has taken the command up. Commands
/// are applied in the order they were sent. Results of recordings and
/// snapshots are reported through a `ResultHandler` instead of the return
/// value.
#[derive(Clone)]
pub struct EngineHandle {
    sender: Sender<EngineCommand>,
}

impl EngineHandle {
    fn request<T>(&self, command: impl FnOnce(Reply<T>) -> EngineCommand) -> Result<T, CaptureError> {
        let (reply, response) = mpsc::channel();
        self.sender
            .send(command(reply))
            .map_err(|_| CaptureError::WorkerDisconnected)?;
        response.recv().map_err(|_| CaptureError::WorkerDisconnected)?
    }

    /// Open the source and start filling the memory. No-op while capturing.
    pub fn start_listening(&self) -> Result<(), CaptureError> {
        self.request(|reply| EngineCommand::StartListening { reply })
    }

    /// Close the source and drop the memory.
    ///
    /// Fails with `InvalidTransition` while a recording is in progress.
    pub fn stop_listening(&self) -> Result<(), CaptureError> {
        self.request(|reply| EngineCommand::StopListening { reply })
    }

    /// Start a recording seeded with up to `prepend_seconds` of memory.
    ///
    /// Starting from Idle opens the source for the length of the recording
    /// only. No-op while already recording.
    pub fn start_recording(&self, prepend_seconds: f64) -> Result<(), CaptureError> {
        self.request(|reply| EngineCommand::StartRecording { prepend_seconds, reply })
    }

    /// Finish the recording.
    ///
    /// With a handler the recording is finalized and reported; without one it
    /// is discarded. A handler passed while nothing is recording receives the
    /// error that ended the last recording, or `InvalidTransition`.
    pub fn stop_recording(&self, handler: Option<Box<dyn ResultHandler>>) -> Result<(), CaptureError> {
        self.request(|reply| EngineCommand::StopRecording { handler, reply })
    }

    /// Write the newest `seconds` of memory to a new sink.
    ///
    /// Returns once the request is accepted; `handler` receives the artifact.
    /// Rejected while Idle, in which case the handler also sees the error.
    pub fn dump_snapshot(
        &self,
        seconds: f64,
        handler: Box<dyn ResultHandler>,
        label: Option<String>,
    ) -> Result<(), CaptureError> {
        self.request(|reply| EngineCommand::DumpSnapshot {
            seconds,
            label,
            handler,
            reply,
        })
    }

    /// Change the sample rate or memory size. Rejected while recording.
    pub fn reconfigure(&self, change: Reconfiguration) -> Result<(), CaptureError> {
        self.request(|reply| EngineCommand::Reconfigure { change, reply })
    }

    /// Current state, after taking in everything the source has ready.
    pub fn query_state(&self) -> Result<EngineStatus, CaptureError> {
        self.request(|reply| EngineCommand::QueryState { reply })
    }

    /// Like `query_state`, giving up after `timeout`.
    pub fn query_state_timeout(&self, timeout: Duration) -> Result<EngineStatus, CaptureError> {
        let (reply, response): (Reply<EngineStatus>, Receiver<_>) = mpsc::channel();
        self.sender
            .send(EngineCommand::QueryState { reply })
            .map_err(|_| CaptureError::WorkerDisconnected)?;
        match response.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(CaptureError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(CaptureError::WorkerDisconnected),
        }
    }
}

/// Builder for `CaptureEngine`.
pub struct EngineBuilder {
    source: Box<dyn CaptureSource>,
    sinks: Arc<dyn SinkFactory>,
    config: EngineConfig,
    dispatcher: Arc<dyn Dispatcher>,
    observer: Option<Arc<dyn EngineObserver>>,
}

impl EngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Where result handlers run. Defaults to the worker thread.
    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn EngineObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Validate the configuration and start the worker thread.
    ///
    /// When `listening_enabled` is set the worker starts listening right
    /// away; a failure there is reported to the observer.
    pub fn spawn(self) -> Result<CaptureEngine, CaptureError> {
        self.config.validate().map_err(CaptureError::ConfigurationFailed)?;

        let (sender, receiver) = mpsc::channel();
        let worker = Worker::new(self.source, self.sinks, self.dispatcher, self.observer, self.config);

        let thread = thread::Builder::new()
            .name("audio-worker".into())
            .spawn(move || worker.run(receiver))
            .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to spawn audio worker: {}", e)))?;

        Ok(CaptureEngine {
            handle: EngineHandle { sender },
            thread: Some(thread),
        })
    }
}

/// Owns the audio worker thread.
///
/// Derefs to `EngineHandle`; clone the handle to drive the engine from other
/// threads. Dropping the engine discards an unfinished recording, closes the
/// source and joins the worker.
pub struct CaptureEngine {
    handle: EngineHandle,
    thread: Option<JoinHandle<()>>,
}

impl CaptureEngine {
    pub fn builder(source: Box<dyn CaptureSource>, sinks: Arc<dyn SinkFactory>) -> EngineBuilder {
        EngineBuilder {
            source,
            sinks,
            config: EngineConfig::default(),
            dispatcher: Arc::new(InlineDispatcher),
            observer: None,
        }
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }
}

impl Deref for CaptureEngine {
    type Target = EngineHandle;

    fn deref(&self) -> &EngineHandle {
        &self.handle
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        let _ = self.handle.sender.send(EngineCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
