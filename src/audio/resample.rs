// Sample rate conversion to the output device rate using rubato

use rubato::{FftFixedIn, Resampler};

use crate::audio::buffer::DecodedAudioBuffer;
use crate::error::{AudioError, Result};

/// Input frames per resampler chunk
const CHUNK_FRAMES: usize = 1024;

/// Convert a whole buffer to `target_rate`.
///
/// The output holds `round(frames * target / source)` frames; the resampler's
/// internal delay is trimmed from the front.
pub fn resample(buffer: &DecodedAudioBuffer, target_rate: u32) -> Result<DecodedAudioBuffer> {
    let source_rate = buffer.sample_rate();
    if source_rate == target_rate || buffer.is_empty() {
        return Ok(buffer.clone());
    }
    if target_rate == 0 || source_rate == 0 {
        return Err(AudioError::Resample(format!(
            "Cannot convert {} Hz to {} Hz",
            source_rate, target_rate
        )));
    }

    let channels = buffer.number_of_channels();
    let frames = buffer.frames();
    let mut resampler = FftFixedIn::<f32>::new(
        source_rate as usize,
        target_rate as usize,
        CHUNK_FRAMES,
        2,
        channels,
    )
    .map_err(|e| AudioError::Resample(e.to_string()))?;

    let expected =
        ((frames as f64) * target_rate as f64 / source_rate as f64).round() as usize;
    let delay = resampler.output_delay();
    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay); channels];

    let mut position = 0;
    while position + resampler.input_frames_next() <= frames {
        let needed = resampler.input_frames_next();
        let chunk: Vec<&[f32]> = buffer
            .channels()
            .iter()
            .map(|c| &c[position..position + needed])
            .collect();
        let converted = resampler
            .process(chunk.as_slice(), None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        append(&mut output, converted);
        position += needed;
    }

    if position < frames {
        let tail: Vec<&[f32]> = buffer.channels().iter().map(|c| &c[position..]).collect();
        let converted = resampler
            .process_partial(Some(tail.as_slice()), None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        append(&mut output, converted);
    }

    // Flush whatever is still held back by the resampler delay
    while output[0].len() < expected + delay {
        let converted = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        if converted.first().map_or(true, Vec::is_empty) {
            break;
        }
        append(&mut output, converted);
    }

    for channel in output.iter_mut() {
        channel.drain(..delay.min(channel.len()));
        channel.resize(expected, 0.0);
    }

    Ok(DecodedAudioBuffer::new(target_rate, output))
}

fn append(output: &mut [Vec<f32>], converted: Vec<Vec<f32>>) {
    for (channel, data) in output.iter_mut().zip(converted) {
        channel.extend(data);
    }
}
