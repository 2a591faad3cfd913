//! Amplitude-based voice activity gate.
//!
//! A cheap pre-filter in front of the speech engine: windows whose mean
//! absolute amplitude falls below a threshold are declared silent and never
//! reach inference. A single-pole high-pass first strips DC offset and mains
//! rumble so the measurement tracks voice energy.

use tracing::debug;

/// In-place single-pole high-pass filter.
pub fn high_pass_filter(samples: &mut [f32], cutoff_hz: f32, sample_rate: u32) {
    if samples.len() < 2 {
        return;
    }

    let rc = 1.0 / (2.0 * std::f32::consts::PI * cutoff_hz);
    let dt = 1.0 / sample_rate as f32;
    let alpha = dt / (rc + dt);

    let mut y = samples[0];
    for i in 1..samples.len() {
        y = alpha * (y + samples[i] - samples[i - 1]);
        samples[i] = y;
    }
}

/// Return true if the window carries enough energy to be worth transcribing.
///
/// When `highpass_hz` is positive the buffer is high-pass filtered in place
/// first; the engine then sees the filtered audio, which is intentional.
pub fn voice_detected(
    samples: &mut [f32],
    sample_rate: u32,
    energy_threshold: f32,
    highpass_hz: f32,
) -> bool {
    if samples.is_empty() {
        return false;
    }

    if highpass_hz > 0.0 {
        high_pass_filter(samples, highpass_hz, sample_rate);
    }

    let energy = samples.iter().map(|s| s.abs()).sum::<f32>() / samples.len() as f32;
    debug!(energy, energy_threshold, "energy gate");

    energy >= energy_threshold
}
