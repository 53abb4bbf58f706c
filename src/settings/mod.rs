// Persisted preferences, audio configuration and practice history

pub mod settings;

pub use settings::{AppSettings, AudioSettings, JournalEntry, Preferences, HOME_ENV};
