// Decoded, normalized audio ready to be handed to an output

use std::time::Duration;

/// Planar float samples in [-1.0, 1.0] at a fixed sample rate.
///
/// Every channel holds the same number of frames.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl DecodedAudioBuffer {
    /// Build a buffer from per-channel sample vectors.
    ///
    /// Channels longer than the shortest one are truncated so the frame
    /// count stays consistent across channels.
    pub fn new(sample_rate: u32, mut channels: Vec<Vec<f32>>) -> Self {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        for channel in channels.iter_mut() {
            channel.truncate(frames);
        }
        Self { sample_rate, channels }
    }

    /// A buffer of silence
    pub fn silent(sample_rate: u32, channels: usize, frames: usize) -> Self {
        Self {
            sample_rate,
            channels: vec![vec![0.0; frames]; channels],
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn number_of_channels(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// Playback length at the buffer's own sample rate
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    pub fn channel_data(&self, channel: usize) -> Option<&[f32]> {
        self.channels.get(channel).map(Vec::as_slice)
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_and_duration() {
        let buffer = DecodedAudioBuffer::silent(24_000, 1, 12_000);
        assert_eq!(buffer.frames(), 12_000);
        assert_eq!(buffer.number_of_channels(), 1);
        assert_eq!(buffer.duration(), Duration::from_millis(500));
    }

    #[test]
    fn test_uneven_channels_are_truncated() {
        let buffer = DecodedAudioBuffer::new(8_000, vec![vec![0.1, 0.2, 0.3], vec![0.4, 0.5]]);
        assert_eq!(buffer.frames(), 2);
        assert_eq!(buffer.channel_data(0), Some(&[0.1, 0.2][..]));
    }

    #[test]
    fn test_empty_buffer() {
        let buffer = DecodedAudioBuffer::new(24_000, vec![Vec::new()]);
        assert!(buffer.is_empty());
        assert_eq!(buffer.duration(), Duration::ZERO);
        assert!(buffer.channel_data(1).is_none());
    }
}
