//! Default configuration constants for clearcast.
//!
//! This module provides shared constants used across the pipeline and the
//! configuration types to ensure consistency and eliminate duplication.

use std::time::Duration;

/// Sample rate the speech engine operates at, in Hz.
///
/// Whisper models are trained on 16 kHz mono audio; every analysis window is
/// resampled down to this rate before inference.
pub const ASR_SAMPLE_RATE: u32 = 16_000;

/// Duration of one analysis window in milliseconds.
///
/// At 16 kHz this is 16,160 samples — just over one second, enough context
/// for whisper to recognize an isolated filler word reliably.
pub const WINDOW_MS: u64 = 1010;

/// Initial overlap between consecutive analysis windows in milliseconds.
pub const INITIAL_OVERLAP_MS: u64 = 340;

/// Minimum overlap the adaptive controller will shrink to.
pub const MIN_OVERLAP_MS: u64 = 100;

/// Step size for each overlap adjustment.
pub const OVERLAP_STEP_MS: u64 = 10;

/// Ceiling on overlap as a fraction of the fresh audio in a window.
pub const MAX_OVERLAP_FRACTION: f32 = 0.75;

/// Mean-absolute-amplitude threshold below which a window is treated as
/// silence and inference is skipped.
pub const VAD_ENERGY_THRESHOLD: f32 = 0.0001;

/// Cutoff of the single-pole high-pass applied before the energy measure.
///
/// Removes DC offset and mains rumble so the gate responds to voice energy.
pub const VAD_HIGHPASS_HZ: f32 = 100.0;

/// Frequency of the substitution tone, in Hz (A4).
pub const BEEP_FREQUENCY_HZ: f32 = 440.0;

/// Peak amplitude of the substitution tone.
pub const BEEP_AMPLITUDE: f32 = 0.5;

/// How long the analysis worker sleeps when the input rings are starved.
pub const WORKER_POLL: Duration = Duration::from_millis(10);

/// Default whisper model selector.
///
/// "tiny.en" is the smallest English-only model — single-word filler
/// detection does not benefit from the larger ones.
pub const DEFAULT_MODEL: &str = "tiny.en";

/// Default transcription language code.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Default filler-word pattern, matched against the lowercased transcript.
pub const DEFAULT_FILLER_PATTERN: &str = r"\b(uh+)|(um+)|(ah+)\b";

/// Default profanity pattern, matched against the lowercased transcript.
// Words taken from https://en.wiktionary.org/wiki/Category:English_swear_words
pub const DEFAULT_BEEP_PATTERN: &str = "(fuck)|(shit)|(bitch)|(cunt)|(pussy)|(dick)|(asshole)|(whore)|(cock)|(nigger)|(nigga)|(prick)";

/// Default decoder prompt biasing whisper toward emitting filler tokens.
pub const DEFAULT_INITIAL_PROMPT: &str = "uhm, Uh, um, Uhh, um. um... uh. uh... ";

/// Number of host-rate frames in one analysis window.
pub fn window_frames(sample_rate: u32) -> usize {
    (sample_rate as u64 * WINDOW_MS / 1000) as usize
}
