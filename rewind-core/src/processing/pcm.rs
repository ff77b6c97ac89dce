//! Sample conversion helpers for capture backends that deliver float audio.
//!
//! The engine stores mono 16-bit little-endian PCM; backends use these to get
//! there from whatever the device produces.

/// Average interleaved multi-channel frames down to mono.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let scale = 1.0 / channels as f32;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}

/// Streaming linear-interpolation resampler for mono audio.
///
/// Keeps the fractional read position and the last input sample between
/// calls, so feeding a stream packet by packet yields the same samples as
/// resampling it in one piece.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    // Input samples advanced per output sample; None passes audio through.
    step: Option<f64>,
    // Read position relative to the first sample of the next block. Lies in
    // [-1, 0) when the next output falls between blocks.
    position: f64,
    last: Option<f32>,
}

impl LinearResampler {
    pub fn new(source_rate: u32, target_rate: u32) -> Self {
        let step = (source_rate != target_rate && source_rate > 0 && target_rate > 0)
            .then(|| f64::from(source_rate) / f64::from(target_rate));
        Self {
            step,
            position: 0.0,
            last: None,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.step.is_none()
    }

    /// Resample the next block of the stream and append it to `out`.
    pub fn process(&mut self, input: &[f32], out: &mut Vec<f32>) {
        let Some(step) = self.step else {
            out.extend_from_slice(input);
            return;
        };
        let Some(&newest) = input.last() else {
            return;
        };

        let previous = self.last.unwrap_or(input[0]);
        let end = (input.len() - 1) as f64;
        while self.position < end {
            let base = self.position.floor();
            let fraction = (self.position - base) as f32;
            let index = base as isize;
            let from = if index < 0 { previous } else { input[index as usize] };
            let to = input[(index + 1) as usize];
            out.push(from + (to - from) * fraction);
            self.position += step;
        }

        self.position -= input.len() as f64;
        self.last = Some(newest);
    }
}

/// Convert `[-1.0, 1.0]` floats to 16-bit little-endian PCM, clamping.
pub fn encode_i16_le(samples: &[f32], out: &mut Vec<u8>) {
    out.reserve(samples.len() * 2);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }
}

/// Decode 16-bit little-endian PCM. A trailing odd byte is ignored.
pub fn decode_i16_le(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}
