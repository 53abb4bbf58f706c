// Guided session: runs a protocol timer in real time and voices its cues

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::audio::{PlaybackEngine, PlaybackRequest, StartedPlayback};
use crate::error::Result;
use crate::protocol::model::AudioGuide;
use crate::protocol::timer::{ProtocolTimer, TimerEvent};

/// Turns cue text into a base64 audio payload
#[async_trait]
pub trait SpeechSource: Send + Sync {
    /// `Ok(None)` when there is nothing to say for this cue
    async fn synthesize(&self, protocol_id: &str, cue: &AudioGuide) -> Result<Option<String>>;
}

/// Commands accepted while a session is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionControl {
    Toggle,
    Reset,
    Mute(bool),
    Stop,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub completed: bool,
    pub elapsed: u32,
    pub cues_fired: usize,
    pub step_changes: usize,
}

/// Extra time allowed past a cue's own duration before giving up on it
const CUE_GRACE: Duration = Duration::from_secs(2);

pub struct GuidedSession {
    timer: ProtocolTimer,
    engine: Arc<PlaybackEngine>,
    speech: Arc<dyn SpeechSource>,
    volume: f32,
    haptics: bool,
    tick: Duration,
    pending: Vec<JoinHandle<Option<StartedPlayback>>>,
}

impl GuidedSession {
    pub fn new(
        timer: ProtocolTimer,
        engine: Arc<PlaybackEngine>,
        speech: Arc<dyn SpeechSource>,
        volume: f32,
        haptics: bool,
    ) -> Self {
        Self {
            timer,
            engine,
            speech,
            volume,
            haptics,
            tick: Duration::from_secs(1),
            pending: Vec::new(),
        }
    }

    /// Run until the protocol completes or `Stop` arrives. The countdown
    /// starts immediately. A closed control channel leaves the session running
    /// without controls.
    ///
    /// On completion the cues still playing are waited for; a stopped session
    /// returns right away.
    pub async fn run(mut self, mut control: mpsc::Receiver<SessionControl>) -> SessionSummary {
        let mut summary = SessionSummary::default();
        let protocol = self.timer.protocol();
        log::info!(
            "Starting {} ({}s, {} steps)",
            protocol.full_title,
            protocol.duration,
            protocol.steps.len()
        );
        self.announce_step();

        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        let event = self.timer.start();
        self.handle(event, &mut summary);

        let mut controls_open = true;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.timer.is_active() {
                        continue;
                    }
                    let event = self.timer.tick();
                    let completed = event.completed;
                    self.handle(event, &mut summary);
                    if completed {
                        log::info!("{} complete", self.timer.protocol().title);
                        summary.completed = true;
                        break;
                    }
                }
                command = control.recv(), if controls_open => match command {
                    Some(SessionControl::Toggle) => {
                        match self.timer.toggle() {
                            Some(event) => {
                                log::info!("Resumed at {}s", event.elapsed);
                                self.handle(event, &mut summary);
                            }
                            None => log::info!("Paused at {}s", self.timer.elapsed()),
                        }
                    }
                    Some(SessionControl::Reset) => {
                        self.timer.reset();
                        log::info!("Reset");
                        self.announce_step();
                    }
                    Some(SessionControl::Mute(muted)) => {
                        if self.timer.is_muted() != muted {
                            self.timer.set_muted(muted);
                            log::info!("Guidance audio {}", if muted { "muted" } else { "unmuted" });
                        }
                    }
                    Some(SessionControl::Stop) => {
                        log::info!("Session stopped at {}s", self.timer.elapsed());
                        break;
                    }
                    None => {
                        log::debug!("Control channel closed, continuing without controls");
                        controls_open = false;
                    }
                },
            }
        }

        summary.elapsed = self.timer.elapsed();
        if summary.completed {
            self.finish_pending().await;
        }
        summary
    }

    fn handle(&mut self, event: TimerEvent, summary: &mut SessionSummary) {
        if event.step_changed.is_some() {
            summary.step_changes += 1;
            self.announce_step();
            // The final second still counts as active
            if self.haptics && (self.timer.is_active() || event.completed) {
                log::info!("(haptic pulse)");
            }
        }
        if let Some(cue) = event.cue {
            summary.cues_fired += 1;
            self.voice(cue);
        }
    }

    fn announce_step(&self) {
        let index = self.timer.current_step();
        if let Some(step) = self.timer.protocol().steps.get(index) {
            log::info!(
                "Step {}: {} - {} ({:.0}% done)",
                index + 1,
                step.title,
                step.content,
                self.timer.progress()
            );
        }
    }

    /// Synthesize and play without holding up the countdown
    fn voice(&mut self, cue: AudioGuide) {
        log::info!("[{}s] {}", cue.time, cue.text);

        let speech = Arc::clone(&self.speech);
        let engine = Arc::clone(&self.engine);
        let protocol_id = self.timer.protocol().id.clone();
        let volume = self.volume;

        self.pending.push(tokio::spawn(async move {
            match speech.synthesize(&protocol_id, &cue).await {
                Ok(Some(payload)) => engine
                    .submit(PlaybackRequest::new(payload, volume))
                    .await
                    .ok()
                    .flatten(),
                Ok(None) => {
                    log::debug!("No speech for cue at {}s", cue.time);
                    None
                }
                Err(e) => {
                    log::warn!("Speech synthesis failed: {}", e);
                    None
                }
            }
        }));
    }

    /// Wait for cues still in flight to play out
    async fn finish_pending(&mut self) {
        for task in self.pending.drain(..) {
            let Ok(Some(started)) = task.await else {
                continue;
            };
            let limit = started.duration + CUE_GRACE;
            if tokio::time::timeout(limit, started.handle.finished()).await.is_err() {
                log::debug!("Voice {} still playing after {:?}", started.handle.id(), limit);
            }
        }
    }
}
