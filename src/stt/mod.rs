//! Speech-to-text engines.

pub mod engine;
pub mod whisper;

pub use engine::{MockEngine, SpeechEngine, TranscriptSegment};
pub use whisper::WhisperEngine;
