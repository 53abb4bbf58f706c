// Audio output using cpal
// The output context every guidance sound is started on

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use parking_lot::Mutex;

use crate::audio::buffer::DecodedAudioBuffer;
use crate::audio::mixer::{voice_queue, Mixer, Voice, VoiceQueue};
use crate::audio::resample::resample;
use crate::error::{AudioError, Result};

/// Power state of an output context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Running,
    Suspended,
}

/// Linear gain applied to one voice. Not clamped: values above 1.0 amplify.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainStage(f32);

impl GainStage {
    pub fn new(value: f32) -> Self {
        Self(value)
    }

    pub fn value(self) -> f32 {
        self.0
    }
}

#[derive(Debug, Default)]
struct HandleState {
    finished: AtomicBool,
    stop_requested: AtomicBool,
}

/// Observes one started sound. Dropping the handle leaves the sound playing.
#[derive(Debug, Clone)]
pub struct PlaybackHandle {
    id: u64,
    state: Arc<HandleState>,
}

impl PlaybackHandle {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            state: Arc::new(HandleState::default()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.state.finished.load(Ordering::Acquire)
    }

    /// Cut the sound off at the next output callback
    pub fn stop(&self) {
        self.state.stop_requested.store(true, Ordering::Release);
    }

    /// Resolve once the sound has played through (or was stopped)
    pub async fn finished(&self) {
        // Polled: the output callback only stores an atomic, it must not wake tasks
        while !self.is_finished() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    pub(crate) fn is_stop_requested(&self) -> bool {
        self.state.stop_requested.load(Ordering::Acquire)
    }

    pub(crate) fn mark_finished(&self) {
        self.state.finished.store(true, Ordering::Release);
    }
}

/// Where decoded buffers get played
pub trait AudioOutput: Send + Sync {
    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    fn state(&self) -> ContextState;

    fn resume(&self) -> Result<()>;

    fn suspend(&self) -> Result<()>;

    /// Connect buffer -> gain -> output and start it immediately.
    /// Every call is an independent voice. Buffers should already be at
    /// `sample_rate()`; others are converted on the calling thread.
    fn start(&self, buffer: Arc<DecodedAudioBuffer>, gain: GainStage) -> Result<PlaybackHandle>;
}

/// Lay the buffer out as a voice, converting it first when it is not
/// already at the output rate
fn prepare_voice(
    buffer: &DecodedAudioBuffer,
    gain: GainStage,
    sample_rate: u32,
    channels: u16,
    handle: PlaybackHandle,
) -> Result<Voice> {
    if buffer.sample_rate() == sample_rate {
        return Ok(Voice::new(buffer, gain, channels as usize, handle));
    }
    let converted = resample(buffer, sample_rate)?;
    Ok(Voice::new(&converted, gain, channels as usize, handle))
}

enum Control {
    Resume(mpsc::Sender<Result<()>>),
    Suspend(mpsc::Sender<Result<()>>),
}

/// Output on the default cpal device.
///
/// The stream lives on its own thread; this handle talks to it over a
/// channel and feeds it voices through a lock-free queue.
pub struct CpalOutput {
    sample_rate: u32,
    channels: u16,
    state: Mutex<ContextState>,
    control: Mutex<mpsc::Sender<Control>>,
    queue: VoiceQueue,
    next_id: AtomicU64,
}

impl CpalOutput {
    /// Open the default output device, asking for `requested_rate` when the
    /// device supports it.
    pub fn open(requested_rate: u32, voice_capacity: usize) -> Result<Self> {
        let (queue, mixer) = voice_queue(voice_capacity);
        let (ready_tx, ready_rx) = mpsc::channel();
        let (control_tx, control_rx) = mpsc::channel();

        thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || run_output_thread(requested_rate, mixer, ready_tx, control_rx))
            .map_err(|e| AudioError::OutputUnavailable(format!("Failed to spawn output thread: {}", e)))?;

        let (sample_rate, channels) = ready_rx
            .recv()
            .map_err(|_| AudioError::OutputUnavailable("Output thread exited".to_string()))??;

        log::info!("Audio output running at {} Hz, {} channel(s)", sample_rate, channels);

        Ok(Self {
            sample_rate,
            channels,
            state: Mutex::new(ContextState::Running),
            control: Mutex::new(control_tx),
            queue,
            next_id: AtomicU64::new(1),
        })
    }

    fn send(&self, make: fn(mpsc::Sender<Result<()>>) -> Control) -> Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.control
            .lock()
            .send(make(reply_tx))
            .map_err(|_| AudioError::Output("Output thread is gone".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| AudioError::Output("Output thread is gone".to_string()))?
    }
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn state(&self) -> ContextState {
        *self.state.lock()
    }

    fn resume(&self) -> Result<()> {
        self.send(Control::Resume)?;
        *self.state.lock() = ContextState::Running;
        Ok(())
    }

    fn suspend(&self) -> Result<()> {
        self.send(Control::Suspend)?;
        *self.state.lock() = ContextState::Suspended;
        Ok(())
    }

    fn start(&self, buffer: Arc<DecodedAudioBuffer>, gain: GainStage) -> Result<PlaybackHandle> {
        let handle = PlaybackHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let voice = prepare_voice(&buffer, gain, self.sample_rate, self.channels, handle.clone())?;
        self.queue.push(voice)?;
        Ok(handle)
    }
}

fn run_output_thread(
    requested_rate: u32,
    mixer: Mixer,
    ready: mpsc::Sender<Result<(u32, u16)>>,
    control: mpsc::Receiver<Control>,
) {
    let stream = match build_output(requested_rate, mixer) {
        Ok((stream, sample_rate, channels)) => {
            if ready.send(Ok((sample_rate, channels))).is_err() {
                return;
            }
            stream
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    // Runs until the owning CpalOutput is dropped
    while let Ok(command) = control.recv() {
        match command {
            Control::Resume(reply) => {
                let result = stream
                    .play()
                    .map_err(|e| AudioError::Output(format!("Failed to resume stream: {}", e)));
                let _ = reply.send(result);
            }
            Control::Suspend(reply) => {
                let result = stream
                    .pause()
                    .map_err(|e| AudioError::Output(format!("Failed to suspend stream: {}", e)));
                let _ = reply.send(result);
            }
        }
    }
    log::debug!("Audio output thread exiting");
}

fn build_output(requested_rate: u32, mixer: Mixer) -> Result<(Stream, u32, u16)> {
    let host = cpal::default_host();

    let device = host
        .default_output_device()
        .ok_or_else(|| AudioError::OutputUnavailable("No output device available".to_string()))?;
    log::info!(
        "Using output device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );

    let default_config = device.default_output_config().map_err(|e| {
        AudioError::OutputUnavailable(format!("Failed to get default output config: {}", e))
    })?;

    // Prefer the requested rate with the device's default layout
    let config = device
        .supported_output_configs()
        .ok()
        .and_then(|mut configs| {
            configs.find(|c| {
                c.channels() == default_config.channels()
                    && c.sample_format() == default_config.sample_format()
                    && c.min_sample_rate().0 <= requested_rate
                    && requested_rate <= c.max_sample_rate().0
            })
        })
        .map(|c| c.with_sample_rate(cpal::SampleRate(requested_rate)))
        .unwrap_or(default_config);

    let sample_rate = config.sample_rate().0;
    let channels = config.channels();

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config.into(), mixer)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config.into(), mixer)?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config.into(), mixer)?,
        format => {
            return Err(AudioError::OutputUnavailable(format!(
                "Unsupported sample format: {:?}",
                format
            )))
        }
    };

    stream
        .play()
        .map_err(|e| AudioError::OutputUnavailable(format!("Failed to start stream: {}", e)))?;

    Ok((stream, sample_rate, channels))
}

fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut mixer: Mixer,
) -> Result<Stream> {
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                mixer.render(&mut scratch);
                for (sample, value) in data.iter_mut().zip(scratch.iter()) {
                    *sample = T::from_sample(*value);
                }
            },
            move |err| {
                log::error!("Audio output error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::OutputUnavailable(format!("Failed to build output stream: {}", e)))
}

/// A voice started on a [`MemoryOutput`]
#[derive(Debug, Clone)]
pub struct StartedVoice {
    pub handle: PlaybackHandle,
    pub buffer: Arc<DecodedAudioBuffer>,
    pub gain: GainStage,
}

/// Headless output: records every start and renders the mix on demand
pub struct MemoryOutput {
    sample_rate: u32,
    channels: u16,
    state: Mutex<ContextState>,
    queue: VoiceQueue,
    mixer: Mutex<Mixer>,
    started: Mutex<Vec<StartedVoice>>,
    next_id: AtomicU64,
    resumes: AtomicUsize,
}

impl MemoryOutput {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        let (queue, mixer) = voice_queue(256);
        Self {
            sample_rate,
            channels,
            state: Mutex::new(ContextState::Running),
            queue,
            mixer: Mutex::new(mixer),
            started: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            resumes: AtomicUsize::new(0),
        }
    }

    /// Starts out suspended, like an output waiting for a user gesture
    pub fn suspended(sample_rate: u32, channels: u16) -> Self {
        let output = Self::new(sample_rate, channels);
        *output.state.lock() = ContextState::Suspended;
        output
    }

    pub fn started(&self) -> Vec<StartedVoice> {
        self.started.lock().clone()
    }

    pub fn resume_count(&self) -> usize {
        self.resumes.load(Ordering::Relaxed)
    }

    /// Pull `frames` frames of mixed output. A suspended output renders silence
    /// without advancing its voices.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * self.channels as usize];
        if self.state() == ContextState::Running {
            self.mixer.lock().render(&mut out);
            self.queue.collect_retired();
        }
        out
    }
}

impl AudioOutput for MemoryOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn state(&self) -> ContextState {
        *self.state.lock()
    }

    fn resume(&self) -> Result<()> {
        self.resumes.fetch_add(1, Ordering::Relaxed);
        *self.state.lock() = ContextState::Running;
        Ok(())
    }

    fn suspend(&self) -> Result<()> {
        *self.state.lock() = ContextState::Suspended;
        Ok(())
    }

    fn start(&self, buffer: Arc<DecodedAudioBuffer>, gain: GainStage) -> Result<PlaybackHandle> {
        let handle = PlaybackHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let voice = prepare_voice(&buffer, gain, self.sample_rate, self.channels, handle.clone())?;
        self.queue.push(voice)?;
        self.started.lock().push(StartedVoice {
            handle: handle.clone(),
            buffer,
            gain,
        });
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_output_plays_voice_through() {
        let output = MemoryOutput::new(24_000, 2);
        let buffer = Arc::new(DecodedAudioBuffer::new(24_000, vec![vec![0.5, 0.5, 0.5]]));
        let handle = output.start(buffer, GainStage::new(0.5)).unwrap();

        let mixed = output.render(2);
        assert_eq!(mixed, vec![0.25; 4]);
        assert!(!handle.is_finished());

        output.render(2);
        assert!(handle.is_finished());
        assert_eq!(output.started().len(), 1);
        assert_eq!(output.started()[0].gain.value(), 0.5);
    }

    #[test]
    fn test_buffers_are_resampled_to_output_rate() {
        let output = MemoryOutput::new(48_000, 1);
        let buffer = Arc::new(DecodedAudioBuffer::silent(24_000, 1, 2_400));
        let handle = output.start(buffer, GainStage::new(1.0)).unwrap();

        output.render(4_799);
        assert!(!handle.is_finished());
        output.render(1);
        assert!(handle.is_finished());
    }

    #[test]
    fn test_suspended_output_holds_voices() {
        let output = MemoryOutput::suspended(24_000, 1);
        assert_eq!(output.state(), ContextState::Suspended);
        let buffer = Arc::new(DecodedAudioBuffer::new(24_000, vec![vec![0.5]]));
        let handle = output.start(buffer, GainStage::new(1.0)).unwrap();

        assert_eq!(output.render(1), vec![0.0]);
        assert!(!handle.is_finished());

        output.resume().unwrap();
        assert_eq!(output.resume_count(), 1);
        assert_eq!(output.render(1), vec![0.5]);
    }

    #[test]
    fn test_gain_stage_is_not_clamped() {
        assert_eq!(GainStage::new(1.5).value(), 1.5);
        assert_eq!(GainStage::new(-0.25).value(), -0.25);
    }
}
