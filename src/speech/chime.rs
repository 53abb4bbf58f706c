use std::f32::consts::PI;

use async_trait::async_trait;

use crate::audio::pcm::{encode_pcm_i16le, PcmFormat};
use crate::audio::EncodedAudioPayload;
use crate::error::Result;
use crate::protocol::model::AudioGuide;
use crate::protocol::session::SpeechSource;

/// A soft two-note chime for every cue, as headerless PCM in the speech layout
pub struct ChimeSpeech {
    format: PcmFormat,
    note_ms: u32,
}

impl ChimeSpeech {
    pub fn new(format: PcmFormat) -> Self {
        Self {
            format,
            note_ms: 180,
        }
    }

    /// Interleaved i16 samples of the chime
    pub fn render(&self) -> Vec<i16> {
        let rate = self.format.sample_rate as f32;
        let channels = self.format.channels as usize;
        let note_frames = (self.format.sample_rate * self.note_ms / 1000) as usize;

        let mut samples = Vec::with_capacity(note_frames * 2 * channels);
        for freq in [660.0f32, 880.0] {
            for i in 0..note_frames {
                let t = i as f32 / rate;
                // Linear fade in/out over the note
                let envelope = (i.min(note_frames - i) as f32 / (note_frames as f32 * 0.5)).min(1.0);
                let value = (2.0 * PI * freq * t).sin() * envelope * 0.4;
                let sample = (value * i16::MAX as f32) as i16;
                samples.extend(std::iter::repeat(sample).take(channels));
            }
        }
        samples
    }
}

impl Default for ChimeSpeech {
    fn default() -> Self {
        Self::new(PcmFormat::SPEECH)
    }
}

#[async_trait]
impl SpeechSource for ChimeSpeech {
    async fn synthesize(&self, _protocol_id: &str, _cue: &AudioGuide) -> Result<Option<String>> {
        let bytes = encode_pcm_i16le(&self.render());
        Ok(Some(EncodedAudioPayload::from_bytes(bytes).to_base64()))
    }
}
