//! # rewind-core
//!
//! Platform-agnostic retroactive audio capture.
//!
//! A single audio worker keeps the last few minutes of microphone audio in a
//! ring buffer. Callers can dump the newest stretch of that memory to a sink
//! at any time, or start a recording that begins with history from before
//! the request. Platform backends (Windows WASAPI) implement the
//! `CaptureSource` trait and plug into the generic `CaptureEngine`.
//!
//! ## Architecture
//!
//! ```text
//! rewind-core (this crate)
//! ├── traits/       ← CaptureSource, StreamSink, SinkFactory, ResultHandler, EngineObserver
//! ├── models/       ← CaptureError, LifecycleState, EngineConfig, PcmFormat, Artifact
//! ├── processing/   ← RingBuffer, PCM conversion, WAV header generation
//! ├── session/      ← CaptureEngine (audio worker), AutoSaveScheduler
//! └── storage/      ← WavFileSink, MemorySink, metadata sidecars
//! ```
//!
//! ```text
//! [CaptureSource] → [RingBuffer] ─┬→ [recording StreamSink]
//!                                 ├→ [snapshot StreamSink] (on demand)
//!                                 └→ [EngineObserver::on_audio]
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

#[cfg(test)]
mod test_support;

// Re-export key types at crate root for convenience.
pub use models::artifact::{Artifact, ArtifactLocation, ArtifactMetadata};
pub use models::audio_models::{PcmFormat, SourceInfo};
pub use models::config::{AutoSaveConfig, EngineConfig};
pub use models::error::CaptureError;
pub use models::state::{Command, EngineStatus, LifecycleState};
pub use processing::ring_buffer::RingBuffer;
pub use session::auto_save::{AutoSaveScheduler, HandlerFactory, AUTO_SAVE_LABEL};
pub use session::engine::{CaptureEngine, EngineBuilder, EngineHandle, Reconfiguration};
pub use storage::memory_sink::{MemorySink, MemorySinkFactory};
pub use storage::wav_sink::{WavFileSink, WavSinkFactory};
pub use traits::capture_source::CaptureSource;
pub use traits::engine_observer::EngineObserver;
pub use traits::result_handler::{Dispatcher, InlineDispatcher, ResultHandler};
pub use traits::stream_sink::{SinkFactory, SinkKind, SinkRequest, StreamSink};
