//! WASAPI microphone capture source.
//!
//! Opens a capture endpoint in shared mode on the audio worker thread and
//! hands out mono 16-bit PCM at the rate the engine asked for. Nothing runs
//! in the background: every `poll` drains the packets WASAPI has queued.

use std::collections::VecDeque;
use std::time::Duration;

use windows::core::*;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;

use rewind_core::models::audio_models::{PcmFormat, SourceInfo};
use rewind_core::models::error::CaptureError;
use rewind_core::processing::pcm::{self, LinearResampler};
use rewind_core::traits::capture_source::CaptureSource;

use crate::device_enumerator::ComGuard;

/// Device buffer requested from WASAPI, in 100-nanosecond units (2 s).
const BUFFER_DURATION: i64 = 20_000_000;

/// WASAPI microphone capture.
pub struct WasapiCaptureSource {
    device_id: Option<String>,
    device_name: String,
    is_default: bool,
    stream: Option<OpenStream>,
    pending: VecDeque<u8>,
}

// SAFETY: COM objects are created in `open` and only touched from the audio
// worker thread, which is the only caller of `CaptureSource` methods.
unsafe impl Send for WasapiCaptureSource {}

impl WasapiCaptureSource {
    /// Capture from the system default microphone.
    pub fn default_device() -> Self {
        Self {
            device_id: None,
            device_name: "Default Microphone".into(),
            is_default: true,
            stream: None,
            pending: VecDeque::new(),
        }
    }

    /// Capture from a specific microphone, as listed by `list_capture_devices`.
    pub fn with_device(info: SourceInfo) -> Self {
        Self {
            device_id: Some(info.id),
            device_name: info.name,
            is_default: info.is_default,
            stream: None,
            pending: VecDeque::new(),
        }
    }
}

impl CaptureSource for WasapiCaptureSource {
    fn open(&mut self, format: &PcmFormat) -> std::result::Result<(), CaptureError> {
        self.close();
        let stream = unsafe { OpenStream::start(self.device_id.as_deref(), format)? };
        log::info!(
            "WASAPI capture started on '{}': {} Hz x{} -> {} Hz mono",
            self.device_name,
            stream.device_rate,
            stream.channels,
            format.sample_rate
        );
        self.stream = Some(stream);
        Ok(())
    }

    fn poll(&mut self, buf: &mut [u8]) -> std::result::Result<usize, CaptureError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(0);
        };
        if self.pending.len() < buf.len() {
            unsafe { stream.read_packets(&mut self.pending)? };
        }

        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn headroom(&self) -> Duration {
        self.stream
            .as_ref()
            .map(|stream| stream.headroom)
            .unwrap_or(Duration::from_secs(1))
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            unsafe {
                let _ = stream.audio_client.Stop();
            }
            log::info!("WASAPI capture stopped on '{}'", self.device_name);
        }
        self.pending.clear();
    }

    fn device_info(&self) -> SourceInfo {
        SourceInfo {
            id: self.device_id.clone().unwrap_or_else(|| "default-mic".into()),
            name: self.device_name.clone(),
            is_default: self.is_default,
        }
    }
}

impl Drop for WasapiCaptureSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// A started shared-mode capture stream.
struct OpenStream {
    audio_client: IAudioClient,
    capture_client: IAudioCaptureClient,
    device_rate: u32,
    channels: u16,
    resampler: LinearResampler,
    headroom: Duration,
    // Dropped last, after the COM interfaces above.
    _com: ComGuard,
}

impl OpenStream {
    /// Sequence: COM init, endpoint lookup, `IAudioClient` activation,
    /// shared-mode init with the device mix format, `IAudioCaptureClient`,
    /// start.
    unsafe fn start(device_id: Option<&str>, format: &PcmFormat) -> std::result::Result<Self, CaptureError> {
        let com = ComGuard::init()?;

        let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
            .map_err(|e| unavailable("CoCreateInstance failed", e))?;

        let device = match device_id {
            Some(id) => {
                let wide_id: Vec<u16> = id.encode_utf16().chain(std::iter::once(0)).collect();
                enumerator.GetDevice(PCWSTR(wide_id.as_ptr()))
            }
            None => enumerator.GetDefaultAudioEndpoint(eCapture, eConsole),
        }
        .map_err(|e| unavailable("capture device not found", e))?;

        let audio_client: IAudioClient = device
            .Activate(CLSCTX_ALL, None)
            .map_err(|e| unavailable("Activate failed", e))?;

        let mix_format_ptr = audio_client
            .GetMixFormat()
            .map_err(|e| unavailable("GetMixFormat failed", e))?;
        let (device_rate, channels, bits) = {
            let mix_format = &*mix_format_ptr;
            (mix_format.nSamplesPerSec, mix_format.nChannels, mix_format.wBitsPerSample)
        };

        // Shared mode delivers the mix format, which is 32-bit float in practice.
        let initialized = if bits == 32 {
            audio_client
                .Initialize(
                    AUDCLNT_SHAREMODE_SHARED,
                    AUDCLNT_STREAMFLAGS_NOPERSIST,
                    BUFFER_DURATION,
                    0,
                    mix_format_ptr,
                    None,
                )
                .map_err(|e| unavailable("IAudioClient::Initialize failed", e))
        } else {
            Err(CaptureError::SourceUnavailable(format!(
                "unsupported mix format: {} bits per sample",
                bits
            )))
        };
        CoTaskMemFree(Some(mix_format_ptr as *const _));
        initialized?;

        let buffer_frames = audio_client
            .GetBufferSize()
            .map_err(|e| unavailable("GetBufferSize failed", e))?;
        let headroom = Duration::from_secs_f64(f64::from(buffer_frames) / f64::from(device_rate.max(1)));

        let capture_client: IAudioCaptureClient = audio_client
            .GetService()
            .map_err(|e| unavailable("GetService failed", e))?;

        audio_client
            .Start()
            .map_err(|e| unavailable("IAudioClient::Start failed", e))?;

        Ok(Self {
            audio_client,
            capture_client,
            device_rate,
            channels,
            resampler: LinearResampler::new(device_rate, format.sample_rate),
            headroom,
            _com: com,
        })
    }

    /// Convert every queued packet to mono 16-bit PCM and append it to `out`.
    unsafe fn read_packets(&mut self, out: &mut VecDeque<u8>) -> std::result::Result<(), CaptureError> {
        let mut packet_length = self
            .capture_client
            .GetNextPacketSize()
            .map_err(|e| transient("GetNextPacketSize failed", e))?;

        let mut resampled = Vec::new();
        let mut encoded = Vec::new();
        while packet_length > 0 {
            let mut buffer_ptr: *mut u8 = std::ptr::null_mut();
            let mut num_frames: u32 = 0;
            let mut flags: u32 = 0;

            self.capture_client
                .GetBuffer(&mut buffer_ptr, &mut num_frames, &mut flags, None, None)
                .map_err(|e| transient("GetBuffer failed", e))?;

            if num_frames > 0 && !buffer_ptr.is_null() {
                let total_samples = num_frames as usize * self.channels as usize;
                let mono = if flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0 {
                    vec![0.0f32; num_frames as usize]
                } else {
                    let samples = std::slice::from_raw_parts(buffer_ptr as *const f32, total_samples);
                    pcm::downmix_to_mono(samples, self.channels as usize)
                };
                resampled.clear();
                self.resampler.process(&mono, &mut resampled);
                encoded.clear();
                pcm::encode_i16_le(&resampled, &mut encoded);
                out.extend(encoded.iter().copied());
            }

            self.capture_client
                .ReleaseBuffer(num_frames)
                .map_err(|e| transient("ReleaseBuffer failed", e))?;

            packet_length = self
                .capture_client
                .GetNextPacketSize()
                .map_err(|e| transient("GetNextPacketSize failed", e))?;
        }
        Ok(())
    }
}

fn unavailable(context: &str, error: Error) -> CaptureError {
    CaptureError::SourceUnavailable(format!("{}: {}", context, error))
}

fn transient(context: &str, error: Error) -> CaptureError {
    CaptureError::SourceReadTransient(format!("{}: {}", context, error))
}
