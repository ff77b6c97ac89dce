use serde::{Deserialize, Serialize};

/// PCM layout of everything flowing through the engine.
///
/// The ring buffer stores raw little-endian samples in this layout; sinks
/// receive the same bytes and use the format only for headers and durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl PcmFormat {
    /// Mono 16-bit PCM, the only layout the engine captures.
    pub fn mono_16(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            bits_per_sample: 16,
        }
    }

    pub fn block_align(&self) -> u16 {
        self.channels * self.bits_per_sample / 8
    }

    pub fn bytes_per_second(&self) -> u64 {
        self.sample_rate as u64 * self.block_align() as u64
    }

    /// Byte count for a duration, rounded to the nearest byte. Negative or
    /// non-finite durations map to zero.
    pub fn bytes_for_seconds(&self, seconds: f64) -> u64 {
        if !seconds.is_finite() || seconds <= 0.0 {
            return 0;
        }
        (seconds * self.bytes_per_second() as f64).round() as u64
    }

    /// Round `bytes` down to a whole number of frames.
    pub fn frame_floor(&self, bytes: u64) -> u64 {
        let align = u64::from(self.block_align().max(1));
        bytes - bytes % align
    }

    pub fn seconds_for_bytes(&self, bytes: u64) -> f64 {
        let rate = self.bytes_per_second();
        if rate == 0 {
            return 0.0;
        }
        bytes as f64 / rate as f64
    }
}

/// A capture device backing a `CaptureSource`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}
