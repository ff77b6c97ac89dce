use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::artifact::Artifact;
use crate::models::config::{validate_capacity, validate_sample_rate, EngineConfig};
use crate::models::error::CaptureError;
use crate::models::state::{Command, EngineStatus, LifecycleState, Transition};
use crate::processing::ring_buffer::RingBuffer;
use crate::traits::capture_source::CaptureSource;
use crate::traits::engine_observer::EngineObserver;
use crate::traits::result_handler::{deliver, Dispatcher, ResultHandler};
use crate::traits::stream_sink::{SinkFactory, SinkKind, SinkRequest, StreamSink};

use super::engine::Reconfiguration;

/// Bytes requested from the source per `append`.
pub(crate) const POLL_CHUNK_BYTES: usize = 32 * 1024;

pub(crate) type Reply<T> = Sender<Result<T, CaptureError>>;

/// Commands sent to the audio worker
pub(crate) enum EngineCommand {
    StartListening {
        reply: Reply<()>,
    },
    StopListening {
        reply: Reply<()>,
    },
    StartRecording {
        prepend_seconds: f64,
        reply: Reply<()>,
    },
    StopRecording {
        handler: Option<Box<dyn ResultHandler>>,
        reply: Reply<()>,
    },
    DumpSnapshot {
        seconds: f64,
        label: Option<String>,
        handler: Box<dyn ResultHandler>,
        reply: Reply<()>,
    },
    Reconfigure {
        change: Reconfiguration,
        reply: Reply<()>,
    },
    QueryState {
        reply: Reply<EngineStatus>,
    },
    Shutdown,
}

/// Time to wait before polling again after a short read.
///
/// Stays between half and nine tenths of the source headroom, aiming for one
/// second of slack.
pub(crate) fn poll_delay(headroom: Duration) -> Duration {
    let headroom = headroom.as_secs_f64();
    let delay = (headroom - 1.0).max(headroom * 0.5).min(headroom * 0.9);
    Duration::from_secs_f64(delay.max(0.0))
}

/// Sole owner of the source, the ring buffer and the open recording sink.
///
/// The lifecycle state is derived: Idle while the source is closed,
/// Recording while a recording sink is open, Listening otherwise.
pub(crate) struct Worker {
    source: Box<dyn CaptureSource>,
    sinks: Arc<dyn SinkFactory>,
    dispatcher: Arc<dyn Dispatcher>,
    observer: Option<Arc<dyn EngineObserver>>,
    config: EngineConfig,
    ring: RingBuffer,
    source_open: bool,
    recording: Option<Box<dyn StreamSink>>,
    // Why the last recording ended on its own; reported to the next stop_recording
    recording_failure: Option<CaptureError>,
    listening_enabled: bool,
    next_poll: Option<Instant>,
}

impl Worker {
    pub(crate) fn new(
        source: Box<dyn CaptureSource>,
        sinks: Arc<dyn SinkFactory>,
        dispatcher: Arc<dyn Dispatcher>,
        observer: Option<Arc<dyn EngineObserver>>,
        config: EngineConfig,
    ) -> Self {
        Self {
            source,
            sinks,
            dispatcher,
            observer,
            config,
            ring: RingBuffer::new(),
            source_open: false,
            recording: None,
            recording_failure: None,
            listening_enabled: false,
            next_poll: None,
        }
    }

    pub(crate) fn lifecycle(&self) -> LifecycleState {
        if !self.source_open {
            LifecycleState::Idle
        } else if self.recording.is_some() {
            LifecycleState::Recording
        } else {
            LifecycleState::Listening
        }
    }

    /// Worker main loop. Returns after `Shutdown` or when every handle is gone.
    pub(crate) fn run(mut self, commands: Receiver<EngineCommand>) {
        let info = self.source.device_info();
        log::info!("Audio worker started for source '{}'", info.name);

        if self.config.listening_enabled {
            let before = self.lifecycle();
            if let Err(e) = self.start_listening() {
                log::error!("Failed to start listening: {}", e);
                self.notify_error(&e);
            }
            self.notify_transition(before);
        }

        loop {
            let command = match self.next_poll {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        self.poll_tick();
                        continue;
                    }
                    match commands.recv_timeout(deadline - now) {
                        Ok(command) => command,
                        Err(RecvTimeoutError::Timeout) => {
                            self.poll_tick();
                            continue;
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match commands.recv() {
                    Ok(command) => command,
                    Err(_) => break,
                },
            };

            if !self.handle(command) {
                break;
            }
        }

        self.shutdown();
        log::info!("Audio worker stopped");
    }

    /// Run one command. Returns false on shutdown.
    fn handle(&mut self, command: EngineCommand) -> bool {
        let before = self.lifecycle();

        match command {
            EngineCommand::StartListening { reply } => {
                let _ = reply.send(self.start_listening());
            }
            EngineCommand::StopListening { reply } => {
                let _ = reply.send(self.stop_listening());
            }
            EngineCommand::StartRecording { prepend_seconds, reply } => {
                let _ = reply.send(self.start_recording(prepend_seconds));
            }
            EngineCommand::StopRecording { handler, reply } => {
                self.stop_recording(handler);
                let _ = reply.send(Ok(()));
            }
            EngineCommand::DumpSnapshot {
                seconds,
                label,
                handler,
                reply,
            } => match self.check(Command::DumpSnapshot) {
                Ok(_) => {
                    // The caller is released before the dump runs.
                    let _ = reply.send(Ok(()));
                    self.dump_snapshot(seconds, label, handler);
                }
                Err(e) => {
                    let _ = reply.send(Err(e.clone()));
                    deliver(self.dispatcher.as_ref(), handler, Err(e));
                }
            },
            EngineCommand::Reconfigure { change, reply } => {
                let _ = reply.send(self.reconfigure(change));
            }
            EngineCommand::QueryState { reply } => {
                let _ = reply.send(Ok(self.query_state()));
            }
            EngineCommand::Shutdown => return false,
        }

        self.settle();
        self.notify_transition(before);
        true
    }

    /// Look `command` up in the transition table for the current state.
    ///
    /// `Ok(Some(target))` runs the command, `Ok(None)` is a no-op.
    fn check(&self, command: Command) -> Result<Option<LifecycleState>, CaptureError> {
        let state = self.lifecycle();
        match state.on(command) {
            Transition::Enter(target) => Ok(Some(target)),
            Transition::Ignore => Ok(None),
            Transition::Reject => Err(CaptureError::InvalidTransition { state, command }),
        }
    }

    fn start_listening(&mut self) -> Result<(), CaptureError> {
        if self.check(Command::StartListening)?.is_some() {
            self.open_capture()?;
        }
        self.listening_enabled = true;
        Ok(())
    }

    fn stop_listening(&mut self) -> Result<(), CaptureError> {
        let target = self.check(Command::StopListening)?;
        self.listening_enabled = false;
        if target.is_some() {
            self.close_capture();
            log::info!("Stopped listening");
        }
        Ok(())
    }

    fn start_recording(&mut self, prepend_seconds: f64) -> Result<(), CaptureError> {
        let from = self.lifecycle();
        if self.check(Command::StartRecording)?.is_none() {
            return Ok(());
        }

        if from.is_idle() {
            self.open_capture()?;
        }
        self.drain_source();
        self.recording_failure = None;

        match self.open_recording(prepend_seconds) {
            Ok(sink) => {
                self.recording = Some(sink);
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to start recording: {}", e);
                if from.is_idle() {
                    self.close_capture();
                }
                Err(e)
            }
        }
    }

    /// Open a recording sink and seed it with up to `prepend_seconds` of history.
    fn open_recording(&mut self, prepend_seconds: f64) -> Result<Box<dyn StreamSink>, CaptureError> {
        let format = self.config.format();
        let request = SinkRequest {
            kind: SinkKind::Recording,
            label: None,
            format,
        };
        let mut sink = self.sinks.open(&request).map_err(open_failure)?;

        let requested = format.frame_floor(format.bytes_for_seconds(prepend_seconds));
        match self.ring.dump_trailing(requested, sink.as_mut()) {
            Ok(window) => {
                log::info!(
                    "Recording started with {:.2}s of history",
                    format.seconds_for_bytes(window.len as u64)
                );
                Ok(sink)
            }
            Err(e) => {
                sink.abort();
                Err(e)
            }
        }
    }

    fn stop_recording(&mut self, handler: Option<Box<dyn ResultHandler>>) {
        let target = match self.check(Command::StopRecording) {
            Ok(target) => target,
            Err(e) => {
                if let Some(handler) = handler {
                    deliver(self.dispatcher.as_ref(), handler, Err(e));
                }
                return;
            }
        };

        if target.is_some() {
            // Everything captured up to this command belongs to the recording.
            self.drain_source();
        }

        match (self.recording.take(), handler) {
            (Some(sink), Some(handler)) => {
                let result = sink.finalize();
                match &result {
                    Ok(artifact) => log::info!(
                        "Recording finished: {:.2}s, {} bytes",
                        artifact.duration_secs,
                        artifact.byte_count
                    ),
                    Err(e) => log::error!("Failed to finalize recording: {}", e),
                }
                deliver(self.dispatcher.as_ref(), handler, result);
            }
            (Some(sink), None) => {
                log::info!("Recording discarded");
                sink.abort();
            }
            (None, Some(handler)) => {
                let state = self.lifecycle();
                let error = self.recording_failure.take().unwrap_or(CaptureError::InvalidTransition {
                    state,
                    command: Command::StopRecording,
                });
                deliver(self.dispatcher.as_ref(), handler, Err(error));
            }
            (None, None) => {}
        }
        self.recording_failure = None;
    }

    fn dump_snapshot(&mut self, seconds: f64, label: Option<String>, handler: Box<dyn ResultHandler>) {
        self.drain_source();
        let result = self.write_snapshot(seconds, label);
        match &result {
            Ok(artifact) => log::info!(
                "Snapshot saved: {:.2}s, {} bytes",
                artifact.duration_secs,
                artifact.byte_count
            ),
            Err(e) => log::error!("Snapshot failed: {}", e),
        }
        deliver(self.dispatcher.as_ref(), handler, result);
    }

    fn write_snapshot(&mut self, seconds: f64, label: Option<String>) -> Result<Artifact, CaptureError> {
        let format = self.config.format();
        let request = SinkRequest {
            kind: SinkKind::Snapshot,
            label,
            format,
        };
        let mut sink = self.sinks.open(&request).map_err(open_failure)?;

        let requested = format.frame_floor(format.bytes_for_seconds(seconds));
        if let Err(e) = self.ring.dump_trailing(requested, sink.as_mut()) {
            sink.abort();
            return Err(e);
        }
        sink.finalize()
    }

    fn reconfigure(&mut self, change: Reconfiguration) -> Result<(), CaptureError> {
        self.check(Command::Reconfigure)?;

        match change {
            Reconfiguration::SampleRate(rate) => {
                validate_sample_rate(rate).map_err(CaptureError::ConfigurationFailed)?;
                if rate == self.config.sample_rate {
                    return Ok(());
                }
            }
            Reconfiguration::Capacity(bytes) => {
                validate_capacity(bytes).map_err(CaptureError::ConfigurationFailed)?;
                if bytes == self.config.buffer_capacity_bytes {
                    return Ok(());
                }
            }
        }

        let reopen = self.source_open;
        if reopen {
            self.close_capture();
        }
        let previous = self.config.clone();
        match change {
            Reconfiguration::SampleRate(rate) => self.config.sample_rate = rate,
            Reconfiguration::Capacity(bytes) => self.config.buffer_capacity_bytes = bytes,
        }
        log::info!(
            "Reconfigured to {} Hz with {} bytes of memory",
            self.config.sample_rate,
            self.config.buffer_capacity_bytes
        );

        if reopen {
            if let Err(e) = self.open_capture() {
                log::warn!("Reconfiguration failed, keeping previous settings: {}", e);
                self.config = previous;
                self.listening_enabled = false;
                return Err(e);
            }
        }
        Ok(())
    }

    fn query_state(&mut self) -> EngineStatus {
        self.drain_source();
        let format = self.config.format();
        let stats = self.ring.stats();
        EngineStatus {
            state: self.lifecycle(),
            listening_enabled: self.listening_enabled,
            recording: self.recording.is_some(),
            memorized_seconds: format.seconds_for_bytes(stats.valid_bytes as u64),
            capacity_seconds: format.seconds_for_bytes(stats.capacity as u64),
            recorded_seconds: self
                .recording
                .as_ref()
                .map(|sink| format.seconds_for_bytes(sink.bytes_written()))
                .unwrap_or(0.0),
        }
    }

    /// Allocate the buffer and open the source. Leaves everything closed on failure.
    ///
    /// The capacity is cut to whole frames so the oldest byte kept after a
    /// wrap always starts a sample.
    fn open_capture(&mut self) -> Result<(), CaptureError> {
        let capacity = self.config.format().frame_floor(self.config.buffer_capacity_bytes);
        let capacity = usize::try_from(capacity).map_err(|_| CaptureError::AllocationFailed(capacity))?;
        self.ring.allocate(capacity)?;

        if let Err(e) = self.source.open(&self.config.format()) {
            self.ring.release();
            let e = match e {
                CaptureError::SourceUnavailable(_) => e,
                other => CaptureError::SourceUnavailable(other.to_string()),
            };
            log::error!("Failed to open capture source: {}", e);
            return Err(e);
        }

        self.source_open = true;
        self.next_poll = Some(Instant::now());
        log::info!(
            "Listening at {} Hz with {:.1}s of memory",
            self.config.sample_rate,
            self.config.format().seconds_for_bytes(capacity as u64)
        );
        Ok(())
    }

    fn close_capture(&mut self) {
        if let Some(sink) = self.recording.take() {
            sink.abort();
        }
        self.source.close();
        self.source_open = false;
        self.ring.release();
        self.next_poll = None;
    }

    fn poll_tick(&mut self) {
        let before = self.lifecycle();
        self.drain_source();
        self.next_poll = if self.source_open {
            Some(Instant::now() + poll_delay(self.source.headroom()))
        } else {
            None
        };
        self.settle();
        self.notify_transition(before);
    }

    /// Pull everything the source has ready. Stops at the first short read.
    fn drain_source(&mut self) -> usize {
        if !self.source_open {
            return 0;
        }

        let mut total = 0;
        loop {
            match self.ring.append(self.source.as_mut(), POLL_CHUNK_BYTES) {
                Ok(0) => break,
                Ok(read) => {
                    total += read;
                    self.forward_chunk();
                    if read < POLL_CHUNK_BYTES {
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("Capture source read failed: {}", e);
                    self.notify_error(&e);
                    break;
                }
            }
        }
        total
    }

    /// Hand the freshly appended chunk to the observer and the recording.
    fn forward_chunk(&mut self) {
        let chunk = self.ring.last_appended();
        if let Some(observer) = &self.observer {
            observer.on_audio(chunk);
        }

        let failure = match self.recording.as_mut() {
            Some(sink) => sink.write(chunk).err(),
            None => None,
        };
        if let Some(e) = failure {
            log::error!("Recording aborted: {}", e);
            if let Some(sink) = self.recording.take() {
                sink.abort();
            }
            self.notify_error(&e);
            self.recording_failure = Some(e);
        }
    }

    /// Close capture that is no longer wanted, e.g. after a recording that
    /// was started from Idle ends.
    fn settle(&mut self) {
        if self.source_open && self.recording.is_none() && !self.listening_enabled {
            self.close_capture();
            log::debug!("Capture closed, listening is disabled");
        }
    }

    fn shutdown(&mut self) {
        if let Some(sink) = self.recording.take() {
            log::warn!("Discarding unfinished recording on shutdown");
            sink.abort();
        }
        if self.source_open {
            self.close_capture();
        }
    }

    fn notify_transition(&self, before: LifecycleState) {
        let after = self.lifecycle();
        if after != before {
            log::debug!("Engine state: {} -> {}", before, after);
            if let Some(observer) = &self.observer {
                observer.on_state_changed(after);
            }
        }
    }

    fn notify_error(&self, error: &CaptureError) {
        if let Some(observer) = &self.observer {
            observer.on_error(error);
        }
    }
}

fn open_failure(error: CaptureError) -> CaptureError {
    match error {
        CaptureError::SinkOpenFailed(_) => error,
        other => CaptureError::SinkOpenFailed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn poll_delay_aims_for_one_second_of_slack() {
        assert_relative_eq!(poll_delay(Duration::from_secs(4)).as_secs_f64(), 3.0, epsilon = 1e-9);
        assert_relative_eq!(poll_delay(Duration::from_secs(6)).as_secs_f64(), 5.0, epsilon = 1e-9);
    }

    #[test]
    fn poll_delay_short_headroom_waits_half() {
        assert_relative_eq!(poll_delay(Duration::from_secs(1)).as_secs_f64(), 0.5, epsilon = 1e-9);
        assert_relative_eq!(poll_delay(Duration::from_millis(100)).as_secs_f64(), 0.05, epsilon = 1e-9);
    }

    #[test]
    fn poll_delay_long_headroom_is_capped() {
        assert_relative_eq!(poll_delay(Duration::from_secs(20)).as_secs_f64(), 18.0, epsilon = 1e-9);
    }

    #[test]
    fn poll_delay_zero_headroom() {
        assert_eq!(poll_delay(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn open_failure_keeps_sink_errors() {
        let e = CaptureError::SinkOpenFailed("disk".into());
        assert_eq!(open_failure(e.clone()), e);
        assert_eq!(
            open_failure(CaptureError::StorageError("full".into())),
            CaptureError::SinkOpenFailed("storage error: full".into())
        );
    }
}
