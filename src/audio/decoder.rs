// Container decoding using Symphonia
// Decodes in-memory audio files (WAV, MP3, OGG, ...) to planar f32 samples

use std::io::Cursor;

use symphonia::core::audio::{AudioBufferRef, AudioPlanes, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;

use crate::audio::buffer::DecodedAudioBuffer;

/// Outcome of the container stage. `NotRecognized` hands the bytes to the PCM fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum ContainerDecode {
    Decoded(DecodedAudioBuffer),
    NotRecognized,
}

/// Container families recognized from their leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Wav,
    Ogg,
    Flac,
    /// MP3 with a leading ID3 tag
    Mp3,
    /// Bare MPEG audio frame sync, no tag
    MpegFrame,
    Mp4,
    /// Bare AAC ADTS frame sync
    Adts,
}

impl ContainerKind {
    pub fn extension(self) -> &'static str {
        match self {
            ContainerKind::Wav => "wav",
            ContainerKind::Ogg => "ogg",
            ContainerKind::Flac => "flac",
            ContainerKind::Mp3 | ContainerKind::MpegFrame => "mp3",
            ContainerKind::Mp4 => "m4a",
            ContainerKind::Adts => "aac",
        }
    }

    /// Frame-sync detections can collide with raw sample data, so they
    /// only count when the decoder actually produces audio.
    fn is_frame_sync(self) -> bool {
        matches!(self, ContainerKind::MpegFrame | ContainerKind::Adts)
    }
}

/// Identify a container format from the first bytes of a payload
pub fn sniff_container(bytes: &[u8]) -> Option<ContainerKind> {
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
        return Some(ContainerKind::Wav);
    }
    if bytes.starts_with(b"OggS") {
        return Some(ContainerKind::Ogg);
    }
    if bytes.starts_with(b"fLaC") {
        return Some(ContainerKind::Flac);
    }
    if bytes.starts_with(b"ID3") {
        return Some(ContainerKind::Mp3);
    }
    if bytes.len() >= 8 && &bytes[4..8] == b"ftyp" {
        return Some(ContainerKind::Mp4);
    }
    if bytes.len() >= 4 && is_adts_header(&bytes[..4]) {
        return Some(ContainerKind::Adts);
    }
    if bytes.len() >= 4 && is_mpeg_frame_header(&bytes[..4]) {
        return Some(ContainerKind::MpegFrame);
    }
    None
}

fn is_adts_header(h: &[u8]) -> bool {
    // 12 sync bits, layer 00, valid sampling frequency index
    h[0] == 0xFF && (h[1] & 0xF6) == 0xF0 && ((h[2] >> 2) & 0x0F) < 13
}

fn is_mpeg_frame_header(h: &[u8]) -> bool {
    if h[0] != 0xFF || (h[1] & 0xE0) != 0xE0 {
        return false;
    }
    let version = (h[1] >> 3) & 0x03;
    let layer = (h[1] >> 1) & 0x03;
    let bitrate = h[2] >> 4;
    let sample_rate = (h[2] >> 2) & 0x03;
    version != 0x01 && layer != 0x00 && bitrate != 0x00 && bitrate != 0x0F && sample_rate != 0x03
}

/// Decode a complete in-memory container file.
///
/// Any failure to recognize or open the stream yields `NotRecognized`
/// rather than an error.
pub fn decode_container(bytes: &[u8]) -> ContainerDecode {
    let Some(kind) = sniff_container(bytes) else {
        log::debug!("No container signature in {} byte payload", bytes.len());
        return ContainerDecode::NotRecognized;
    };

    match ContainerReader::open(bytes, kind).and_then(ContainerReader::decode_all) {
        Ok(buffer) if buffer.is_empty() && kind.is_frame_sync() => {
            log::debug!("{:?} sync matched but no audio decoded", kind);
            ContainerDecode::NotRecognized
        }
        Ok(buffer) => ContainerDecode::Decoded(buffer),
        Err(e) => {
            log::debug!("{:?} container rejected: {}", kind, e);
            ContainerDecode::NotRecognized
        }
    }
}

struct ContainerReader {
    format: Box<dyn symphonia::core::formats::FormatReader>,
    decoder: Box<dyn symphonia::core::codecs::Decoder>,
    track_id: u32,
    sample_rate: Option<u32>,
    channels: Option<usize>,
}

impl ContainerReader {
    fn open(bytes: &[u8], kind: ContainerKind) -> Result<Self, String> {
        let source = Cursor::new(bytes.to_vec());
        let mss = MediaSourceStream::new(Box::new(source), Default::default());

        let mut hint = Hint::new();
        hint.with_extension(kind.extension());

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| format!("Failed to probe format: {}", e))?;

        let format = probed.format;

        // Find the first audio track
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| "No audio track found".to_string())?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate;
        let channels = track.codec_params.channels.map(|c| c.count());

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| format!("Failed to create decoder: {}", e))?;

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
        })
    }

    fn decode_all(mut self) -> Result<DecodedAudioBuffer, String> {
        let mut planes: Vec<Vec<f32>> = Vec::new();

        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(format!("Failed to read packet: {}", e)),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    if self.sample_rate.is_none() {
                        self.sample_rate = Some(spec.rate);
                    }
                    if planes.is_empty() {
                        planes = vec![Vec::new(); spec.channels.count()];
                    }
                    append_decoded(&mut planes, &decoded);
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    log::debug!("Decode error (skipping packet): {}", e);
                    continue;
                }
                Err(e) => return Err(format!("Decode failed: {}", e)),
            }
        }

        let sample_rate = self
            .sample_rate
            .filter(|rate| *rate > 0)
            .ok_or_else(|| "Unknown sample rate".to_string())?;
        if planes.is_empty() {
            planes = vec![Vec::new(); self.channels.unwrap_or(1).max(1)];
        }

        Ok(DecodedAudioBuffer::new(sample_rate, planes))
    }
}

/// Append any AudioBufferRef to planar f32 channels
fn append_decoded(out: &mut [Vec<f32>], buf: &AudioBufferRef) {
    match buf {
        AudioBufferRef::F32(b) => append_planes(out, b.planes(), b.frames(), |s: f32| s),
        AudioBufferRef::F64(b) => append_planes(out, b.planes(), b.frames(), |s: f64| s as f32),
        AudioBufferRef::S8(b) => {
            append_planes(out, b.planes(), b.frames(), |s: i8| s as f32 / 128.0)
        }
        AudioBufferRef::S16(b) => {
            append_planes(out, b.planes(), b.frames(), |s: i16| s as f32 / 32768.0)
        }
        AudioBufferRef::S24(b) => {
            append_planes(out, b.planes(), b.frames(), |s| s.inner() as f32 / 8388608.0)
        }
        AudioBufferRef::S32(b) => {
            append_planes(out, b.planes(), b.frames(), |s: i32| (s as f64 / 2147483648.0) as f32)
        }
        AudioBufferRef::U8(b) => {
            append_planes(out, b.planes(), b.frames(), |s: u8| (s as f32 - 128.0) / 128.0)
        }
        AudioBufferRef::U16(b) => {
            append_planes(out, b.planes(), b.frames(), |s: u16| (s as f32 - 32768.0) / 32768.0)
        }
        AudioBufferRef::U24(b) => append_planes(out, b.planes(), b.frames(), |s| {
            (s.inner() as f32 - 8388608.0) / 8388608.0
        }),
        AudioBufferRef::U32(b) => append_planes(out, b.planes(), b.frames(), |s: u32| {
            ((s as f64 - 2147483648.0) / 2147483648.0) as f32
        }),
    }
}

fn append_planes<T: Sample + Copy, F: Fn(T) -> f32>(
    out: &mut [Vec<f32>],
    planes: AudioPlanes<T>,
    frames: usize,
    convert: F,
) {
    for (channel, plane) in out.iter_mut().zip(planes.planes()) {
        channel.extend(plane[..frames].iter().map(|&s| convert(s)));
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// A minimal 16-bit PCM WAV file
    pub fn wav_bytes(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let block_align = channels * 2;
        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }
}
