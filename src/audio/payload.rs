// Base64 speech payloads as they arrive from the speech service

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::Result;

/// Raw audio bytes, either a container file or headerless 16-bit PCM.
/// Nothing in the bytes says which.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudioPayload {
    bytes: Vec<u8>,
}

impl EncodedAudioPayload {
    /// Decode standard-alphabet base64 text
    pub fn from_base64(text: &str) -> Result<Self> {
        let bytes = STANDARD.decode(text.trim())?;
        Ok(Self { bytes })
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// One guidance sound to play: the payload text plus a linear gain.
/// The gain is passed through untouched; callers keep it in [0, 1].
#[derive(Debug, Clone)]
pub struct PlaybackRequest {
    pub payload_base64: String,
    pub volume: f32,
}

impl PlaybackRequest {
    pub fn new(payload_base64: impl Into<String>, volume: f32) -> Self {
        Self {
            payload_base64: payload_base64.into(),
            volume,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AudioError;

    #[test]
    fn test_decode_base64() {
        let payload = EncodedAudioPayload::from_base64("AAEC/w==").unwrap();
        assert_eq!(payload.as_bytes(), &[0x00, 0x01, 0x02, 0xff]);
        assert_eq!(payload.to_base64(), "AAEC/w==");
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        let payload = EncodedAudioPayload::from_base64("  AAEC/w==\n").unwrap();
        assert_eq!(payload.len(), 4);
    }

    #[test]
    fn test_empty_payload() {
        let payload = EncodedAudioPayload::from_base64("").unwrap();
        assert!(payload.is_empty());
    }

    #[test]
    fn test_invalid_base64_is_rejected() {
        let err = EncodedAudioPayload::from_base64("not base64!").unwrap_err();
        assert!(matches!(err, AudioError::Base64(_)));
    }
}
