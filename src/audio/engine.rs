// Playback engine: base64 payload in, sound out
// Container decode first, raw 16-bit PCM when the container stage gives up

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::audio::buffer::DecodedAudioBuffer;
use crate::audio::decoder::{decode_container, ContainerDecode};
use crate::audio::output::{AudioOutput, ContextState, CpalOutput, GainStage, PlaybackHandle};
use crate::audio::payload::{EncodedAudioPayload, PlaybackRequest};
use crate::audio::pcm::{decode_pcm_i16le, PcmFormat};
use crate::audio::resample::resample;
use crate::error::{AudioError, Result};

/// Opens the output context on first use
pub type OutputOpener = Box<dyn Fn(&EngineConfig) -> Result<Arc<dyn AudioOutput>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Rate requested from the output device
    pub output_sample_rate: u32,
    /// Layout assumed when the payload is not a container
    pub fallback: PcmFormat,
    pub voice_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_sample_rate: 24_000,
            fallback: PcmFormat::SPEECH,
            voice_capacity: 64,
        }
    }
}

/// Which stage produced the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodePath {
    Container,
    RawPcm,
}

#[derive(Debug, Clone)]
pub struct DecodedPlayback {
    pub buffer: DecodedAudioBuffer,
    pub path: DecodePath,
}

/// What `play` started
#[derive(Debug, Clone)]
pub struct StartedPlayback {
    pub handle: PlaybackHandle,
    pub path: DecodePath,
    /// Frames as decoded, before conversion to the output rate
    pub frames: usize,
    pub duration: Duration,
}

/// Shared by every playback request for the life of the process.
///
/// The output context is opened lazily on the first request and never torn down.
pub struct PlaybackEngine {
    config: EngineConfig,
    opener: OutputOpener,
    context: Mutex<Option<Arc<dyn AudioOutput>>>,
}

impl PlaybackEngine {
    pub fn new(config: EngineConfig, opener: OutputOpener) -> Self {
        Self {
            config,
            opener,
            context: Mutex::new(None),
        }
    }

    /// Engine on the default cpal device
    pub fn with_default_output(config: EngineConfig) -> Self {
        Self::new(
            config,
            Box::new(|config: &EngineConfig| {
                let output = CpalOutput::open(config.output_sample_rate, config.voice_capacity)?;
                Ok(Arc::new(output) as Arc<dyn AudioOutput>)
            }),
        )
    }

    /// Engine around an output that already exists
    pub fn with_output(config: EngineConfig, output: Arc<dyn AudioOutput>) -> Self {
        let engine = Self::new(
            config,
            Box::new(|_: &EngineConfig| {
                Err(AudioError::OutputUnavailable("Output already provided".to_string()))
            }),
        );
        *engine.context.lock() = Some(output);
        engine
    }

    /// Return the output context, opening it on first call and resuming it
    /// if it is suspended.
    pub fn ensure_output_context(&self) -> Result<Arc<dyn AudioOutput>> {
        let output = {
            let mut context = self.context.lock();
            match context.as_ref() {
                Some(output) => Arc::clone(output),
                None => {
                    let output = (self.opener)(&self.config)?;
                    *context = Some(Arc::clone(&output));
                    output
                }
            }
        };

        if output.state() == ContextState::Suspended {
            log::debug!("Resuming suspended output context");
            output.resume()?;
        }
        Ok(output)
    }

    /// Suspend the output context if one is open. The next playback
    /// resumes it.
    pub fn suspend_output(&self) -> Result<()> {
        let output = self.context.lock().as_ref().map(Arc::clone);
        match output {
            Some(output) if output.state() == ContextState::Running => {
                log::debug!("Suspending output context");
                output.suspend()
            }
            _ => Ok(()),
        }
    }

    /// Two-stage decode: container first, raw PCM on `NotRecognized`
    pub fn decode(&self, payload: &EncodedAudioPayload) -> Result<DecodedPlayback> {
        log::trace!("Decoding {} byte payload", payload.len());
        decode_payload(payload.as_bytes(), self.config.fallback)
    }

    /// Decode and start one sound at linear gain `volume`.
    ///
    /// Opening the output, decoding and rate conversion all run on blocking
    /// workers; the caller's task only waits on them.
    pub async fn play(self: &Arc<Self>, payload_base64: &str, volume: f32) -> Result<StartedPlayback> {
        let engine = Arc::clone(self);
        let output = tokio::task::spawn_blocking(move || engine.ensure_output_context())
            .await
            .map_err(|e| AudioError::OutputUnavailable(format!("Output task failed: {}", e)))??;

        let payload = EncodedAudioPayload::from_base64(payload_base64)?;
        let output_rate = output.sample_rate();

        let engine = Arc::clone(self);
        let (decoded, converted) = tokio::task::spawn_blocking(move || {
            let decoded = engine.decode(&payload)?;
            let converted = resample(&decoded.buffer, output_rate)?;
            Ok::<_, AudioError>((decoded, converted))
        })
        .await
        .map_err(|e| AudioError::Output(format!("Decode task failed: {}", e)))??;

        let frames = decoded.buffer.frames();
        let duration = decoded.buffer.duration();
        let handle = output.start(Arc::new(converted), GainStage::new(volume))?;
        log::debug!(
            "Started voice {} ({:?}, {} frames at {} Hz, {:?})",
            handle.id(),
            decoded.path,
            frames,
            decoded.buffer.sample_rate(),
            duration
        );

        Ok(StartedPlayback {
            handle,
            path: decoded.path,
            frames,
            duration,
        })
    }

    /// Fire-and-forget playback. Failures are logged and swallowed so a bad
    /// payload can never interrupt the caller; the task yields what started.
    pub fn submit(self: &Arc<Self>, request: PlaybackRequest) -> JoinHandle<Option<StartedPlayback>> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            match engine.play(&request.payload_base64, request.volume).await {
                Ok(started) => Some(started),
                Err(e) => {
                    log::warn!("Guidance audio skipped: {}", e);
                    None
                }
            }
        })
    }
}

fn decode_payload(bytes: &[u8], fallback: PcmFormat) -> Result<DecodedPlayback> {
    match decode_container(bytes) {
        ContainerDecode::Decoded(buffer) => Ok(DecodedPlayback {
            buffer,
            path: DecodePath::Container,
        }),
        ContainerDecode::NotRecognized => {
            log::debug!(
                "Falling back to raw PCM ({} Hz, {} ch) for {} bytes",
                fallback.sample_rate,
                fallback.channels,
                bytes.len()
            );
            Ok(DecodedPlayback {
                buffer: decode_pcm_i16le(bytes, fallback)?,
                path: DecodePath::RawPcm,
            })
        }
    }
}
