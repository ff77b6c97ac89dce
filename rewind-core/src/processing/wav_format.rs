//! RIFF/WAV header handling for PCM output files.
//!
//! Layout of the 44-byte header:
//! ```text
//! [0-3]    "RIFF"
//! [4-7]    file size - 8 (36 + data_size)
//! [8-11]   "WAVE"
//! [12-15]  "fmt "
//! [16-19]  16 (PCM format chunk size)
//! [20-21]  1 (PCM format code)
//! [22-23]  channels
//! [24-27]  sample_rate
//! [28-31]  byte_rate = sample_rate * block_align
//! [32-33]  block_align = channels * bits_per_sample / 8
//! [34-35]  bits_per_sample
//! [36-39]  "data"
//! [40-43]  data_size
//! ```

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::models::audio_models::PcmFormat;
use crate::models::error::CaptureError;

/// Size of the standard WAV RIFF header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

/// Offset of the RIFF chunk size field.
pub const RIFF_SIZE_OFFSET: u64 = 4;

/// Offset of the data chunk size field.
pub const DATA_SIZE_OFFSET: u64 = 40;

/// Largest PCM payload a WAV file can describe.
pub const MAX_DATA_SIZE: u64 = u32::MAX as u64 - 36;

/// Build a header for `data_size` bytes of PCM in `format`.
pub fn header(format: &PcmFormat, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
    let block_align = format.block_align();
    let byte_rate = format.sample_rate * block_align as u32;

    let mut header = [0u8; WAV_HEADER_SIZE];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&riff_size(data_size).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&format.channels.to_le_bytes());
    header[24..28].copy_from_slice(&format.sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&format.bits_per_sample.to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());
    header
}

/// RIFF chunk size for a payload of `data_size` bytes.
pub fn riff_size(data_size: u32) -> u32 {
    data_size.saturating_add(36)
}

/// Fields of a parsed header that matter for playback length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavInfo {
    pub format: PcmFormat,
    pub byte_rate: u32,
    pub data_size: u32,
}

impl WavInfo {
    pub fn duration_secs(&self) -> f64 {
        if self.byte_rate == 0 {
            return 0.0;
        }
        self.data_size as f64 / self.byte_rate as f64
    }
}

/// Parse a canonical 44-byte PCM header.
pub fn parse_header(bytes: &[u8]) -> Result<WavInfo, CaptureError> {
    if bytes.len() < WAV_HEADER_SIZE {
        return Err(CaptureError::SinkFinalizeFailed("truncated WAV header".into()));
    }
    if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" || &bytes[36..40] != b"data" {
        return Err(CaptureError::SinkFinalizeFailed("not a canonical PCM WAV header".into()));
    }

    let u16_at = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);
    let u32_at = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);

    Ok(WavInfo {
        format: PcmFormat {
            sample_rate: u32_at(24),
            channels: u16_at(22),
            bits_per_sample: u16_at(34),
        },
        byte_rate: u32_at(28),
        data_size: u32_at(40),
    })
}

/// Read the header of a WAV file on disk.
pub fn read_info(path: &Path) -> Result<WavInfo, CaptureError> {
    let mut header = [0u8; WAV_HEADER_SIZE];
    File::open(path)
        .and_then(|mut file| file.read_exact(&mut header))
        .map_err(|e| CaptureError::SinkFinalizeFailed(format!("failed to read WAV header: {}", e)))?;
    parse_header(&header)
}
