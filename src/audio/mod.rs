// Audio playback module
// Uses Symphonia for container decoding, rubato for rate conversion and cpal for output

pub mod buffer;
pub mod decoder;
pub mod engine;
pub mod mixer;
pub mod output;
pub mod payload;
pub mod pcm;
pub mod resample;

pub use buffer::DecodedAudioBuffer;
pub use decoder::{ContainerDecode, ContainerKind};
pub use engine::{DecodePath, EngineConfig, PlaybackEngine, StartedPlayback};
pub use output::{AudioOutput, ContextState, CpalOutput, GainStage, MemoryOutput, PlaybackHandle};
pub use payload::{EncodedAudioPayload, PlaybackRequest};
pub use pcm::PcmFormat;
