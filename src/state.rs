// Application state management
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::audio::PlaybackEngine;
use crate::error::Result;
use crate::settings::AppSettings;

pub struct AppState {
    pub engine: Arc<PlaybackEngine>,
    pub settings: Arc<Mutex<AppSettings>>,
    pub app_dir: PathBuf,
}

impl AppState {
    pub fn new(engine: PlaybackEngine, settings: AppSettings, app_dir: PathBuf) -> Self {
        Self {
            engine: Arc::new(engine),
            settings: Arc::new(Mutex::new(settings)),
            app_dir,
        }
    }

    /// Load settings from `app_dir` and build an engine on the default device.
    /// The device itself is only opened when the first sound plays.
    pub fn load(app_dir: PathBuf) -> Result<Self> {
        let settings = AppSettings::load(&app_dir)?;
        let engine = PlaybackEngine::with_default_output(settings.audio.engine_config()?);
        Ok(Self::new(engine, settings, app_dir))
    }

    /// Apply a change to the settings and persist it
    pub fn update_settings<F: FnOnce(&mut AppSettings)>(&self, change: F) -> Result<AppSettings> {
        let mut settings = self.settings.lock();
        change(&mut settings);
        settings.save(&self.app_dir)?;
        Ok(settings.clone())
    }
}
