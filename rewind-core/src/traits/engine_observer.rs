use crate::models::error::CaptureError;
use crate::models::state::LifecycleState;

/// Event observer for the audio worker.
///
/// All methods are called from the worker thread. Implementations must
/// return quickly and marshal to other threads themselves; every call
/// delays the next poll of the capture source.
///
/// Voice-activity detectors and sound classifiers plug in through
/// `on_audio`, which sees every captured chunk in order.
pub trait EngineObserver: Send + Sync {
    fn on_state_changed(&self, _state: LifecycleState) {}

    /// Freshly captured mono 16-bit PCM, in capture order.
    fn on_audio(&self, _pcm: &[u8]) {}

    fn on_error(&self, _error: &CaptureError) {}
}
