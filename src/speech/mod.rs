// Speech sources for protocol cues
// The hosted text-to-speech service stays outside this crate; these are local stand-ins

pub mod chime;
pub mod clips;

pub use chime::ChimeSpeech;
pub use clips::ClipLibrary;
