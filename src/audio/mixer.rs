// Voice mixing for the output callback
// Each started sound is an independent voice; voices overlap freely

use parking_lot::Mutex;
use ringbuf::{traits::{Consumer, Producer, Split}, HeapRb};

use crate::audio::buffer::DecodedAudioBuffer;
use crate::audio::output::{GainStage, PlaybackHandle};
use crate::error::{AudioError, Result};

type VoiceProducer = ringbuf::HeapProd<Voice>;
type VoiceConsumer = ringbuf::HeapCons<Voice>;

/// One started sound, already laid out for the output
pub struct Voice {
    handle: PlaybackHandle,
    samples: Vec<f32>,
    gain: f32,
    cursor: usize,
}

impl Voice {
    /// `buffer` must already be at the output sample rate
    pub fn new(
        buffer: &DecodedAudioBuffer,
        gain: GainStage,
        output_channels: usize,
        handle: PlaybackHandle,
    ) -> Self {
        Self {
            handle,
            samples: interleave_for_output(buffer, output_channels),
            gain: gain.value(),
            cursor: 0,
        }
    }

    fn is_done(&self) -> bool {
        self.cursor >= self.samples.len() || self.handle.is_stop_requested()
    }

    fn mix_into(&mut self, out: &mut [f32]) {
        let remaining = &self.samples[self.cursor..];
        let n = remaining.len().min(out.len());
        for (o, s) in out[..n].iter_mut().zip(remaining) {
            *o += s * self.gain;
        }
        self.cursor += n;
    }
}

/// Map buffer channels onto the output layout, interleaved.
///
/// Mono is copied to every output channel, a mono output gets the average
/// of all source channels, anything else wraps channel indices.
pub fn interleave_for_output(buffer: &DecodedAudioBuffer, output_channels: usize) -> Vec<f32> {
    let source = buffer.channels();
    let frames = buffer.frames();
    if source.is_empty() || output_channels == 0 {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(frames * output_channels);
    for frame in 0..frames {
        if output_channels == 1 && source.len() > 1 {
            let sum: f32 = source.iter().map(|c| c[frame]).sum();
            out.push(sum / source.len() as f32);
            continue;
        }
        for channel in 0..output_channels {
            out.push(source[channel % source.len()][frame]);
        }
    }
    out
}

/// Sending half: hands new voices to the realtime side without blocking it,
/// and takes retired voices back so their samples are freed off that side.
pub struct VoiceQueue {
    producer: Mutex<VoiceProducer>,
    retired: Mutex<VoiceConsumer>,
}

impl VoiceQueue {
    pub fn push(&self, voice: Voice) -> Result<()> {
        self.collect_retired();
        self.producer
            .lock()
            .try_push(voice)
            .map_err(|_| AudioError::Output("Voice queue full".to_string()))
    }

    /// Drop every voice the mixer has finished with. Returns how many.
    pub fn collect_retired(&self) -> usize {
        let mut retired = self.retired.lock();
        let mut count = 0;
        while retired.try_pop().is_some() {
            count += 1;
        }
        count
    }
}

/// Realtime half: owned by the output callback. Never allocates or frees.
pub struct Mixer {
    voices: Vec<Voice>,
    max_voices: usize,
    incoming: VoiceConsumer,
    retired: VoiceProducer,
}

impl Mixer {
    /// Sum every active voice into `out` (interleaved, output layout).
    pub fn render(&mut self, out: &mut [f32]) {
        // Extra voices wait in the queue until a slot frees up
        while self.voices.len() < self.max_voices {
            match self.incoming.try_pop() {
                Some(voice) => self.voices.push(voice),
                None => break,
            }
        }

        out.fill(0.0);
        for voice in self.voices.iter_mut() {
            if !voice.is_done() {
                voice.mix_into(out);
            }
        }

        let mut i = 0;
        while i < self.voices.len() {
            if self.voices[i].is_done() {
                let voice = self.voices.swap_remove(i);
                voice.handle.mark_finished();
                // Only dropped here if the retired queue overflows
                let _ = self.retired.try_push(voice);
            } else {
                i += 1;
            }
        }

        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }
}

pub fn voice_queue(capacity: usize) -> (VoiceQueue, Mixer) {
    let capacity = capacity.max(1);
    let (producer, incoming) = HeapRb::<Voice>::new(capacity).split();
    let (retired_producer, retired) = HeapRb::<Voice>::new(capacity).split();
    (
        VoiceQueue {
            producer: Mutex::new(producer),
            retired: Mutex::new(retired),
        },
        Mixer {
            voices: Vec::with_capacity(capacity),
            max_voices: capacity,
            incoming,
            retired: retired_producer,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono(samples: &[f32]) -> DecodedAudioBuffer {
        DecodedAudioBuffer::new(24_000, vec![samples.to_vec()])
    }

    #[test]
    fn test_mono_is_copied_to_all_channels() {
        let out = interleave_for_output(&mono(&[0.1, 0.2]), 2);
        assert_eq!(out, vec![0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn test_stereo_to_mono_averages() {
        let buffer = DecodedAudioBuffer::new(24_000, vec![vec![0.2, 0.4], vec![0.4, 0.0]]);
        let out = interleave_for_output(&buffer, 1);
        assert!((out[0] - 0.3).abs() < 1e-6);
        assert!((out[1] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_gain_is_applied_at_mix_time() {
        let (queue, mut mixer) = voice_queue(4);
        let handle = PlaybackHandle::new(1);
        queue
            .push(Voice::new(&mono(&[0.5, -0.5, 0.25]), GainStage::new(0.5), 1, handle.clone()))
            .unwrap();

        let mut out = vec![0.0; 2];
        mixer.render(&mut out);
        assert_eq!(out, vec![0.25, -0.25]);
        assert!(!handle.is_finished());

        mixer.render(&mut out);
        assert_eq!(out, vec![0.125, 0.0]);
        assert!(handle.is_finished());
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_overlapping_voices_are_summed() {
        let (queue, mut mixer) = voice_queue(4);
        queue
            .push(Voice::new(&mono(&[0.25, 0.25]), GainStage::new(1.0), 1, PlaybackHandle::new(1)))
            .unwrap();
        queue
            .push(Voice::new(&mono(&[0.5]), GainStage::new(1.0), 1, PlaybackHandle::new(2)))
            .unwrap();

        let mut out = vec![0.0; 2];
        mixer.render(&mut out);
        assert_eq!(out, vec![0.75, 0.25]);
    }

    #[test]
    fn test_mix_is_clamped() {
        let (queue, mut mixer) = voice_queue(4);
        queue
            .push(Voice::new(&mono(&[0.8]), GainStage::new(2.0), 1, PlaybackHandle::new(1)))
            .unwrap();
        let mut out = vec![0.0; 1];
        mixer.render(&mut out);
        assert_eq!(out, vec![1.0]);
    }

    #[test]
    fn test_empty_voice_finishes_immediately() {
        let (queue, mut mixer) = voice_queue(4);
        let handle = PlaybackHandle::new(7);
        queue
            .push(Voice::new(&mono(&[]), GainStage::new(1.0), 2, handle.clone()))
            .unwrap();
        let mut out = vec![0.0; 4];
        mixer.render(&mut out);
        assert!(handle.is_finished());
        assert_eq!(out, vec![0.0; 4]);
    }

    #[test]
    fn test_stopped_voice_is_retired() {
        let (queue, mut mixer) = voice_queue(4);
        let handle = PlaybackHandle::new(3);
        queue
            .push(Voice::new(&mono(&[0.1; 8]), GainStage::new(1.0), 1, handle.clone()))
            .unwrap();
        let mut out = vec![0.0; 2];
        mixer.render(&mut out);
        handle.stop();
        mixer.render(&mut out);
        assert_eq!(out, vec![0.0, 0.0]);
        assert!(handle.is_finished());
    }

    #[test]
    fn test_full_queue_is_an_error() {
        let (queue, _mixer) = voice_queue(1);
        let voice = || Voice::new(&mono(&[0.0]), GainStage::new(1.0), 1, PlaybackHandle::new(0));
        queue.push(voice()).unwrap();
        assert!(matches!(queue.push(voice()), Err(AudioError::Output(_))));
    }

    #[test]
    fn test_retired_voices_are_handed_back() {
        let (queue, mut mixer) = voice_queue(4);
        queue
            .push(Voice::new(&mono(&[0.1]), GainStage::new(1.0), 1, PlaybackHandle::new(1)))
            .unwrap();
        queue
            .push(Voice::new(&mono(&[0.1; 4]), GainStage::new(1.0), 1, PlaybackHandle::new(2)))
            .unwrap();

        let mut out = vec![0.0; 2];
        mixer.render(&mut out);
        assert_eq!(mixer.active_voices(), 1);
        assert_eq!(queue.collect_retired(), 1);
        assert_eq!(queue.collect_retired(), 0);
    }

    #[test]
    fn test_voices_beyond_capacity_wait_their_turn() {
        let (queue, mut mixer) = voice_queue(2);
        let first = PlaybackHandle::new(1);
        queue
            .push(Voice::new(&mono(&[0.25; 2]), GainStage::new(1.0), 1, first.clone()))
            .unwrap();
        queue
            .push(Voice::new(&mono(&[0.25; 8]), GainStage::new(1.0), 1, PlaybackHandle::new(2)))
            .unwrap();

        let mut out = vec![0.0; 2];
        mixer.render(&mut out);
        assert!(first.is_finished());

        // Two slots in the queue again, one slot in the mixer
        let third = PlaybackHandle::new(3);
        queue
            .push(Voice::new(&mono(&[0.25; 4]), GainStage::new(1.0), 1, third.clone()))
            .unwrap();
        mixer.render(&mut out);
        assert_eq!(mixer.active_voices(), 2);
        assert_eq!(out, vec![0.5, 0.5]);
        mixer.render(&mut out);
        assert!(third.is_finished());
    }
}
