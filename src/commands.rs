// Command handlers behind the CLI
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::audio::{EncodedAudioPayload, StartedPlayback};
use crate::protocol::catalog::{builtin_protocols, find_protocol};
use crate::protocol::model::Protocol;
use crate::protocol::session::{GuidedSession, SessionControl, SessionSummary, SpeechSource};
use crate::protocol::timer::ProtocolTimer;
use crate::settings::{AppSettings, JournalEntry};
use crate::speech::{ChimeSpeech, ClipLibrary};
use crate::state::AppState;

/// Journal entries not tied to a protocol
const GENERAL_REFLECTION: &str = "General Reflection";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolSummary {
    pub id: String,
    pub icon: String,
    pub title: String,
    pub description: String,
    pub duration: u32,
    pub favorite: bool,
    pub completed: u32,
}

impl ProtocolSummary {
    fn new(protocol: &Protocol, settings: &AppSettings) -> Self {
        Self {
            id: protocol.id.clone(),
            icon: protocol.icon.clone(),
            title: protocol.title.clone(),
            description: protocol.description.clone(),
            duration: protocol.duration,
            favorite: settings.is_favorite(&protocol.id),
            completed: settings.usage.get(&protocol.id).copied().unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeStats {
    pub total_sessions: u32,
    pub favorites: usize,
    pub journal_entries: usize,
    pub usage: BTreeMap<String, u32>,
}

pub fn list_protocols(state: &AppState) -> Vec<ProtocolSummary> {
    let settings = state.settings.lock();
    builtin_protocols()
        .iter()
        .map(|p| ProtocolSummary::new(p, &settings))
        .collect()
}

pub fn show_protocol(id: &str) -> Result<Protocol> {
    Ok(find_protocol(id)?)
}

/// Read a clip from disk as a base64 payload. `.b64` files hold the text already.
pub fn read_payload(path: &Path) -> Result<String> {
    if path.extension().is_some_and(|ext| ext == "b64") {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read payload file: {:?}", path))?;
        return Ok(text.trim().to_string());
    }
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read audio file: {:?}", path))?;
    Ok(EncodedAudioPayload::from_bytes(bytes).to_base64())
}

/// Play one file and wait for it to finish
pub async fn play_file(state: &AppState, path: &Path, volume: Option<f32>) -> Result<StartedPlayback> {
    let payload = read_payload(path)?;
    let volume = volume.unwrap_or_else(|| state.settings.lock().preferences.linear_volume());

    let started = state
        .engine
        .play(&payload, volume)
        .await
        .context("Failed to play audio")?;

    let limit = started.duration + Duration::from_secs(2);
    if tokio::time::timeout(limit, started.handle.finished()).await.is_err() {
        log::warn!("Playback did not report completion within {:?}", limit);
    }
    Ok(started)
}

/// Map a line typed during a session to a control command
pub fn parse_control(line: &str) -> Option<SessionControl> {
    match line.trim() {
        "p" | "pause" | "play" => Some(SessionControl::Toggle),
        "r" | "reset" => Some(SessionControl::Reset),
        "m" | "mute" => Some(SessionControl::Mute(true)),
        "u" | "unmute" => Some(SessionControl::Mute(false)),
        "q" | "quit" => Some(SessionControl::Stop),
        _ => None,
    }
}

/// Run a protocol in real time, taking control commands from stdin
pub async fn run_protocol(
    state: &AppState,
    id: &str,
    clips: Option<PathBuf>,
    muted: bool,
) -> Result<SessionSummary> {
    let (tx, rx) = mpsc::channel(8);
    // stdin is blocking; the reader thread ends with the process
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines().map_while(|l| l.ok()) {
            match parse_control(&line) {
                Some(command) => {
                    if tx.blocking_send(command).is_err() {
                        break;
                    }
                }
                None => eprintln!("Commands: p (pause/resume), r (reset), m (mute), u (unmute), q (quit)"),
            }
        }
    });

    run_session(state, id, clips, muted, rx).await
}

/// Run a protocol to completion or `Stop`, counting completed runs
pub async fn run_session(
    state: &AppState,
    id: &str,
    clips: Option<PathBuf>,
    muted: bool,
    control: mpsc::Receiver<SessionControl>,
) -> Result<SessionSummary> {
    let protocol = find_protocol(id)?;
    let (preferences, fallback) = {
        let settings = state.settings.lock();
        (settings.preferences.clone(), settings.audio.engine_config()?.fallback)
    };

    let speech: Arc<dyn SpeechSource> = match clips {
        Some(dir) => Arc::new(ClipLibrary::new(dir)),
        None => Arc::new(ChimeSpeech::new(fallback)),
    };

    let timer = ProtocolTimer::new(protocol, muted || !preferences.audio_enabled);
    let session = GuidedSession::new(
        timer,
        Arc::clone(&state.engine),
        speech,
        preferences.linear_volume(),
        preferences.haptics,
    );

    let summary = session.run(control).await;

    if summary.completed {
        let mut count = 0;
        state.update_settings(|s| count = s.record_completion(id))?;
        log::info!("Completed {} {} time(s)", id, count);
    }
    if let Err(e) = state.engine.suspend_output() {
        log::warn!("Failed to suspend audio output: {}", e);
    }
    Ok(summary)
}

/// Toggle a protocol in the favorites; returns whether it is now a favorite
pub fn toggle_favorite(state: &AppState, id: &str) -> Result<bool> {
    find_protocol(id)?;
    let mut favorite = false;
    state.update_settings(|s| favorite = s.toggle_favorite(id))?;
    Ok(favorite)
}

pub fn practice_stats(state: &AppState) -> PracticeStats {
    let settings = state.settings.lock();
    PracticeStats {
        total_sessions: settings.total_sessions(),
        favorites: settings.favorites.len(),
        journal_entries: settings.journal.len(),
        usage: settings.usage.clone(),
    }
}

/// Save a journal entry, optionally tied to a protocol
pub fn add_journal_entry(state: &AppState, text: &str, protocol_id: Option<&str>) -> Result<JournalEntry> {
    let text = text.trim();
    if text.is_empty() {
        bail!("Journal entry is empty");
    }
    let protocol = match protocol_id {
        Some(id) => find_protocol(id)?.title,
        None => GENERAL_REFLECTION.to_string(),
    };

    let mut entry = None;
    state.update_settings(|s| entry = Some(s.add_journal_entry(&protocol, text)))?;
    entry.context("Journal entry was not saved")
}

pub fn journal_entries(state: &AppState) -> Vec<JournalEntry> {
    state.settings.lock().journal.clone()
}

pub fn show_settings(state: &AppState) -> AppSettings {
    state.settings.lock().clone()
}

pub fn set_volume(state: &AppState, volume: u8) -> Result<AppSettings> {
    if volume > 100 {
        bail!("Volume must be between 0 and 100, got {}", volume);
    }
    Ok(state.update_settings(|s| s.preferences.audio_volume = volume)?)
}

pub fn set_audio_enabled(state: &AppState, enabled: bool) -> Result<AppSettings> {
    Ok(state.update_settings(|s| s.preferences.audio_enabled = enabled)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decoder::fixtures::wav_bytes;
    use crate::audio::{DecodePath, EngineConfig, MemoryOutput, PlaybackEngine};
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("circuit-breaker-commands-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn memory_state(dir: PathBuf) -> (AppState, Arc<MemoryOutput>) {
        let output = Arc::new(MemoryOutput::new(24_000, 1));
        let engine = PlaybackEngine::with_output(EngineConfig::default(), output.clone());
        (AppState::new(engine, AppSettings::default(), dir), output)
    }

    #[test]
    fn test_list_protocols() {
        let dir = scratch_dir("list");
        let (state, _) = memory_state(dir.clone());
        let ids: Vec<String> = list_protocols(&state).into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["panic", "freeze", "insomnia"]);
        assert!(show_protocol("nope").is_err());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_favorite_toggles_and_persists() {
        let dir = scratch_dir("favorite");
        let (state, _) = memory_state(dir.clone());

        assert!(toggle_favorite(&state, "freeze").unwrap());
        let listed = list_protocols(&state);
        assert!(listed.iter().find(|p| p.id == "freeze").unwrap().favorite);
        assert!(!listed.iter().find(|p| p.id == "panic").unwrap().favorite);
        assert_eq!(AppSettings::load(&dir).unwrap().favorites, vec!["freeze"]);

        assert!(!toggle_favorite(&state, "freeze").unwrap());
        assert_eq!(practice_stats(&state).favorites, 0);
        assert!(toggle_favorite(&state, "nope").is_err());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_session_is_counted() {
        let dir = scratch_dir("usage");
        let (state, _) = memory_state(dir.clone());

        let (_tx, rx) = mpsc::channel(1);
        let summary = run_session(&state, "panic", None, true, rx).await.unwrap();
        assert!(summary.completed);

        let stats = practice_stats(&state);
        assert_eq!(stats.total_sessions, 1);
        assert_eq!(stats.usage.get("panic"), Some(&1));
        assert_eq!(list_protocols(&state)[0].completed, 1);
        assert_eq!(AppSettings::load(&dir).unwrap().usage.get("panic"), Some(&1));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_session_is_not_counted() {
        let dir = scratch_dir("stopped");
        let (state, _) = memory_state(dir.clone());

        let (tx, rx) = mpsc::channel(1);
        tx.send(SessionControl::Stop).await.unwrap();
        let summary = run_session(&state, "freeze", None, true, rx).await.unwrap();
        assert!(!summary.completed);
        assert_eq!(practice_stats(&state).total_sessions, 0);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_journal_entries() {
        let dir = scratch_dir("journal");
        let (state, _) = memory_state(dir.clone());

        assert!(add_journal_entry(&state, "   ", None).is_err());
        add_journal_entry(&state, "Calmer than this morning", None).unwrap();
        let entry = add_journal_entry(&state, " Slept after the second round ", Some("insomnia")).unwrap();
        assert_eq!(entry.text, "Slept after the second round");

        let entries = journal_entries(&state);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].protocol, find_protocol("insomnia").unwrap().title);
        assert_eq!(entries[1].protocol, "General Reflection");
        assert_eq!(practice_stats(&state).journal_entries, 2);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_parse_control() {
        assert_eq!(parse_control("p\n"), Some(SessionControl::Toggle));
        assert_eq!(parse_control(" m "), Some(SessionControl::Mute(true)));
        assert_eq!(parse_control("u"), Some(SessionControl::Mute(false)));
        assert_eq!(parse_control("quit"), Some(SessionControl::Stop));
        assert_eq!(parse_control("x"), None);
    }

    #[test]
    fn test_volume_is_validated_and_persisted() {
        let dir = scratch_dir("volume");
        let (state, _) = memory_state(dir.clone());

        assert!(set_volume(&state, 101).is_err());
        let settings = set_volume(&state, 40).unwrap();
        assert_eq!(settings.preferences.audio_volume, 40);
        assert_eq!(AppSettings::load(&dir).unwrap().preferences.audio_volume, 40);

        set_audio_enabled(&state, false).unwrap();
        assert!(!show_settings(&state).preferences.audio_enabled);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_play_file_uses_preference_volume() {
        let dir = scratch_dir("play");
        let (state, output) = memory_state(dir.clone());
        let path = dir.join("cue.wav");
        fs::write(&path, wav_bytes(24_000, 1, &[4096; 48])).unwrap();

        // Drain the output while the command waits for completion
        let renderer = {
            let output = Arc::clone(&output);
            tokio::spawn(async move {
                for _ in 0..100 {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    output.render(24);
                }
            })
        };

        let started = play_file(&state, &path, None).await.unwrap();
        assert_eq!(started.path, DecodePath::Container);
        assert_eq!(started.frames, 48);
        assert!(started.handle.is_finished());
        assert_eq!(output.started()[0].gain.value(), 0.8);

        renderer.abort();
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_read_payload_b64_file() {
        let dir = scratch_dir("payload");
        let path = dir.join("clip.b64");
        fs::write(&path, " AQID \n").unwrap();
        assert_eq!(read_payload(&path).unwrap(), "AQID");
        assert!(read_payload(&dir.join("missing.wav")).is_err());
        fs::remove_dir_all(&dir).unwrap();
    }
}
