//! Adaptive overlap control.
//!
//! Consecutive analysis windows share an overlap so the decoder sees a word
//! even when it straddles a window boundary. Overlap is pure overhead for
//! throughput though: the worker re-transcribes it every window. This
//! controller grows the overlap while the pipeline keeps up with realtime
//! and shrinks it when a window's processing takes longer than the fresh
//! audio it covered.

use tracing::debug;

use crate::defaults::{
    INITIAL_OVERLAP_MS, MAX_OVERLAP_FRACTION, MIN_OVERLAP_MS, OVERLAP_STEP_MS,
};

#[derive(Debug, Clone, Copy)]
pub(crate) struct OverlapController {
    overlap_ms: u64,
    sample_rate: u32,
}

impl OverlapController {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            overlap_ms: INITIAL_OVERLAP_MS,
            sample_rate,
        }
    }

    /// Current overlap in milliseconds.
    pub fn ms(&self) -> u64 {
        self.overlap_ms
    }

    /// Current overlap in host-rate frames.
    pub fn frames(&self) -> usize {
        (self.overlap_ms * u64::from(self.sample_rate) / 1000) as usize
    }

    /// Feed back one window's timing.
    ///
    /// `elapsed_ms` is the wallclock spent on resample + detection +
    /// rewrite; `new_audio_ms` is the duration of the fresh audio the window
    /// consumed. Windows whose inference was skipped by the energy gate
    /// leave the overlap unchanged unless the pipeline fell behind.
    pub fn record(&mut self, elapsed_ms: u64, new_audio_ms: u64, inference_skipped: bool) {
        if elapsed_ms > new_audio_ms {
            self.overlap_ms = self
                .overlap_ms
                .saturating_sub(OVERLAP_STEP_MS)
                .max(MIN_OVERLAP_MS);
            debug!(
                elapsed_ms,
                new_audio_ms,
                overlap_ms = self.overlap_ms,
                "behind realtime, overlap reduced"
            );
        } else if !inference_skipped {
            let ceiling = (new_audio_ms as f32 * MAX_OVERLAP_FRACTION) as u64;
            self.overlap_ms = (self.overlap_ms + OVERLAP_STEP_MS)
                .min(ceiling)
                .max(MIN_OVERLAP_MS);
            debug!(
                elapsed_ms,
                new_audio_ms,
                overlap_ms = self.overlap_ms,
                "overlap increased"
            );
        }
    }
}
