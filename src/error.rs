// Error types shared by the audio engine, protocols and settings
use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, AudioError>;

#[derive(Error, Debug)]
pub enum AudioError {
    /// Payload text was not valid standard base64
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Invalid PCM format: {sample_rate} Hz, {channels} channel(s)")]
    InvalidPcmFormat { sample_rate: u32, channels: u16 },

    /// The host refused to give us an output device or stream
    #[error("Audio output unavailable: {0}")]
    OutputUnavailable(String),

    #[error("Audio output error: {0}")]
    Output(String),

    #[error("Resampling failed: {0}")]
    Resample(String),

    #[error("Speech source failed: {0}")]
    Speech(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Unknown protocol: {0}")]
    UnknownProtocol(String),
}
