use std::time::Duration;

use crate::models::audio_models::{PcmFormat, SourceInfo};
use crate::models::error::CaptureError;

/// Something the audio worker can poll for PCM bytes.
///
/// Implemented by:
/// - `WasapiCaptureSource` (Windows, `rewind-windows`)
/// - scripted sources in tests
///
/// Every method is called from the audio worker thread only.
pub trait CaptureSource: Send {
    /// Open the device for the given format. Failure leaves the engine idle.
    fn open(&mut self, format: &PcmFormat) -> Result<(), CaptureError>;

    /// Copy up to `buf.len()` bytes of captured PCM into `buf`.
    ///
    /// Must not block: returns `Ok(0)` when nothing is ready. Errors are
    /// reserved for device failures.
    fn poll(&mut self, buf: &mut [u8]) -> Result<usize, CaptureError>;

    /// How much audio the device buffers internally before it starts
    /// dropping data. Drives the worker's poll cadence.
    fn headroom(&self) -> Duration;

    /// Release the device. Safe to call when not open.
    fn close(&mut self);

    /// Information about the device backing this source.
    fn device_info(&self) -> SourceInfo;
}
