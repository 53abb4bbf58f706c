// Protocols: timed step sequences with spoken cues

pub mod catalog;
pub mod model;
pub mod session;
pub mod timer;

pub use catalog::{builtin_protocols, find_protocol};
pub use model::{AudioGuide, Protocol, Step};
pub use session::{GuidedSession, SessionControl, SessionSummary, SpeechSource};
pub use timer::{step_index_for, ProtocolTimer, TimerEvent};
