//! clearcast - realtime speech scrubbing for live audio streams
//!
//! Detects filler words and profanity in a PCM stream with whisper and
//! rewrites the offending regions (silence or a 440 Hz beep) before the
//! audio leaves the host.

pub mod audio;
pub mod config;
pub mod defaults;
pub mod detect;
pub mod error;
pub mod filter;
pub mod models;
pub mod stt;
