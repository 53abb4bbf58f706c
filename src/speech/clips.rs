use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::audio::EncodedAudioPayload;
use crate::error::Result;
use crate::protocol::model::AudioGuide;
use crate::protocol::session::SpeechSource;

/// Clip extensions, in lookup order. `b64` files already hold base64 text.
const CLIP_EXTENSIONS: &[&str] = &["b64", "wav", "mp3", "ogg", "flac", "pcm"];

/// Pre-rendered cue clips laid out as `<root>/<protocol_id>/<seconds>.<ext>`
pub struct ClipLibrary {
    root: PathBuf,
}

impl ClipLibrary {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// First existing clip for this cue
    pub fn clip_path(&self, protocol_id: &str, cue: &AudioGuide) -> Option<PathBuf> {
        let dir = self.root.join(protocol_id);
        CLIP_EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("{}.{}", cue.time, ext)))
            .find(|path| path.is_file())
    }
}

#[async_trait]
impl SpeechSource for ClipLibrary {
    async fn synthesize(&self, protocol_id: &str, cue: &AudioGuide) -> Result<Option<String>> {
        let Some(path) = self.clip_path(protocol_id, cue) else {
            return Ok(None);
        };
        log::debug!("Using clip {:?}", path);

        if path.extension().is_some_and(|ext| ext == "b64") {
            let text = tokio::fs::read_to_string(&path).await?;
            return Ok(Some(text.trim().to_string()));
        }

        let bytes = tokio::fs::read(&path).await?;
        Ok(Some(EncodedAudioPayload::from_bytes(bytes).to_base64()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("circuit-breaker-clips-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("panic")).unwrap();
        dir
    }

    fn cue(time: u32) -> AudioGuide {
        AudioGuide {
            time,
            text: String::new(),
        }
    }

    #[tokio::test]
    async fn test_binary_clip_is_encoded() {
        let dir = scratch_dir("binary");
        fs::write(dir.join("panic").join("10.pcm"), [1u8, 2, 3]).unwrap();

        let library = ClipLibrary::new(&dir);
        let payload = library.synthesize("panic", &cue(10)).await.unwrap();
        assert_eq!(payload.as_deref(), Some("AQID"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_base64_clip_is_read_as_text_and_preferred() {
        let dir = scratch_dir("text");
        fs::write(dir.join("panic").join("0.b64"), "AAAA\n").unwrap();
        fs::write(dir.join("panic").join("0.wav"), [9u8; 4]).unwrap();

        let library = ClipLibrary::new(&dir);
        let payload = library.synthesize("panic", &cue(0)).await.unwrap();
        assert_eq!(payload.as_deref(), Some("AAAA"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_missing_clip_is_none() {
        let dir = scratch_dir("missing");
        let library = ClipLibrary::new(&dir);
        assert!(library.synthesize("panic", &cue(50)).await.unwrap().is_none());
        assert!(library.synthesize("freeze", &cue(0)).await.unwrap().is_none());

        fs::remove_dir_all(&dir).unwrap();
    }
}
