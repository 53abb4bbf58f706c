// Raw PCM fallback decoding
// Headerless signed 16-bit little-endian samples, interleaved by channel

use crate::audio::buffer::DecodedAudioBuffer;
use crate::error::{AudioError, Result};

/// Scale factor from i16 to normalized float
const I16_SCALE: f32 = 1.0 / 32768.0;

/// Layout assumed for headerless PCM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmFormat {
    /// What the speech service emits: 24 kHz mono
    pub const SPEECH: Self = Self {
        sample_rate: 24_000,
        channels: 1,
    };

    pub fn new(sample_rate: u32, channels: u16) -> Result<Self> {
        let format = Self { sample_rate, channels };
        format.validate()?;
        Ok(format)
    }

    fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 || self.channels == 0 {
            return Err(AudioError::InvalidPcmFormat {
                sample_rate: self.sample_rate,
                channels: self.channels,
            });
        }
        Ok(())
    }
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self::SPEECH
    }
}

/// Reinterpret bytes as interleaved i16 LE samples and deinterleave them.
///
/// A trailing odd byte and a trailing partial frame are dropped.
pub fn decode_pcm_i16le(bytes: &[u8], format: PcmFormat) -> Result<DecodedAudioBuffer> {
    format.validate()?;

    let channel_count = format.channels as usize;
    let samples: Vec<i16> = bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect();
    let frame_count = samples.len() / channel_count;

    let mut channels = vec![Vec::with_capacity(frame_count); channel_count];
    for (channel, data) in channels.iter_mut().enumerate() {
        for frame in 0..frame_count {
            data.push(samples[frame * channel_count + channel] as f32 * I16_SCALE);
        }
    }

    Ok(DecodedAudioBuffer::new(format.sample_rate, channels))
}

/// Interleaved i16 samples to little-endian bytes
pub fn encode_pcm_i16le(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}
