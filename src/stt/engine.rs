//! Engine seam between the analysis worker and the actual recognizer.
//!
//! [`SpeechEngine`] is the trait the worker drives; [`WhisperEngine`]
//! (see [`crate::stt::whisper`]) is the production implementation and
//! [`MockEngine`] is a scriptable stand-in for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::DecodeOptions;
use crate::error::{ClearcastError, Result};

/// The first decoded segment of an analysis window.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptSegment {
    /// Raw segment text as returned by the decoder.
    pub text: String,
    /// Segment start offset in centiseconds.
    pub start_cs: i64,
    /// Segment end offset in centiseconds.
    pub end_cs: i64,
    /// Mean probability across the segment's tokens.
    pub mean_token_p: f32,
}

/// Trait for speech recognizers driven by the analysis worker.
///
/// # Contract
///
/// - `audio` is 16 kHz mono f32 PCM.
/// - `Ok(None)` means the decoder produced no segments (silence).
/// - An `Err` is fatal for this engine instance: the caller discards it and
///   the filter falls back to passthrough until the next reload.
pub trait SpeechEngine: Send {
    fn transcribe(
        &mut self,
        audio: &[f32],
        opts: &DecodeOptions,
    ) -> Result<Option<TranscriptSegment>>;

    /// Name of the loaded model.
    fn model_name(&self) -> &str;
}

/// Format a centisecond offset as `MM:SS.mmm` for transcript logs.
pub fn format_timestamp(t_cs: i64) -> String {
    let sec = t_cs / 100;
    let msec = (t_cs - sec * 100) * 10;
    let min = sec / 60;
    let sec = sec - min * 60;
    format!("{:02}:{:02}.{:03}", min, sec, msec)
}

/// Scriptable engine for tests.
///
/// Returns a fixed sequence of transcripts (the last entry repeats once the
/// script is exhausted), optionally sleeping per call to simulate a slow
/// decoder, optionally failing after a number of successful calls.
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    script: Vec<String>,
    next: usize,
    delay: Option<Duration>,
    fail_after: Option<usize>,
    calls: Arc<AtomicUsize>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return this transcript on every call.
    pub fn with_transcript(mut self, text: &str) -> Self {
        self.script = vec![text.to_string()];
        self
    }

    /// Return these transcripts in order; the last one repeats.
    pub fn with_script(mut self, script: &[&str]) -> Self {
        self.script = script.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail with an inference error after `calls` successful calls.
    pub fn with_failure_after(mut self, calls: usize) -> Self {
        self.fail_after = Some(calls);
        self
    }

    /// Share a call counter so a test can observe how often inference ran.
    pub fn with_call_counter(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.calls = counter;
        self
    }
}

impl SpeechEngine for MockEngine {
    fn transcribe(
        &mut self,
        _audio: &[f32],
        _opts: &DecodeOptions,
    ) -> Result<Option<TranscriptSegment>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        if let Some(limit) = self.fail_after {
            if call >= limit {
                return Err(ClearcastError::Inference {
                    message: "scripted engine failure".to_string(),
                });
            }
        }

        if self.script.is_empty() {
            return Ok(None);
        }

        let text = self.script[self.next.min(self.script.len() - 1)].clone();
        self.next += 1;

        Ok(Some(TranscriptSegment {
            text,
            start_cs: 0,
            end_cs: 101,
            mean_token_p: 0.9,
        }))
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}
