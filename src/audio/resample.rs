//! Downmix and resample host-rate audio for the speech engine.
//!
//! The engine expects **16 kHz mono f32**. The host delivers planar audio at
//! an arbitrary rate and channel count, so each analysis window is averaged
//! down to mono and linearly interpolated to the analysis rate. The rewrite
//! path never touches this buffer — edits are applied to the host-rate copy,
//! so there is no resampling back.
//!
//! Failures here are handled like inference failures upstream: the worker
//! releases the engine and the filter degrades to passthrough.

use crate::error::{ClearcastError, Result};

/// Converts planar host-rate windows to mono analysis-rate buffers.
#[derive(Debug, Clone, Copy)]
pub struct MonoResampler {
    src_rate: u32,
    dst_rate: u32,
}

impl MonoResampler {
    pub fn new(src_rate: u32, dst_rate: u32) -> Result<Self> {
        if src_rate == 0 || dst_rate == 0 {
            return Err(ClearcastError::Resample {
                message: format!("invalid rate pair {src_rate} Hz -> {dst_rate} Hz"),
            });
        }
        Ok(Self { src_rate, dst_rate })
    }

    /// Number of output samples produced for `frames` input frames.
    pub fn output_len(&self, frames: usize) -> usize {
        if self.src_rate == self.dst_rate {
            return frames;
        }
        let ratio = self.dst_rate as f64 / self.src_rate as f64;
        (frames as f64 * ratio).ceil() as usize
    }

    /// Downmix the first `frames` frames of `input` (planar, one slice per
    /// channel) to mono and resample into `out`.
    ///
    /// `out` is cleared and refilled; its final length is
    /// [`output_len`](Self::output_len)`(frames)`. Fails when a channel
    /// holds fewer than `frames` samples or there is no channel at all.
    pub fn process(&self, input: &[Vec<f32>], frames: usize, out: &mut Vec<f32>) -> Result<()> {
        out.clear();
        if frames == 0 {
            return Ok(());
        }
        if input.is_empty() {
            return Err(ClearcastError::Resample {
                message: "no channels to downmix".to_string(),
            });
        }
        if let Some(short) = input.iter().find(|ch| ch.len() < frames) {
            return Err(ClearcastError::Resample {
                message: format!("channel holds {} samples, window needs {frames}", short.len()),
            });
        }

        let channels = input.len() as f32;
        let mono_at = |idx: usize| -> f32 {
            input.iter().map(|ch| ch[idx]).sum::<f32>() / channels
        };

        if self.src_rate == self.dst_rate {
            out.reserve(frames);
            for i in 0..frames {
                out.push(mono_at(i));
            }
            return Ok(());
        }

        let ratio = self.dst_rate as f64 / self.src_rate as f64;
        let out_len = self.output_len(frames);
        out.reserve(out_len);

        for i in 0..out_len {
            let src_pos = i as f64 / ratio;
            let idx = src_pos as usize;
            let frac = (src_pos - idx as f64) as f32;

            let sample = if idx + 1 < frames {
                mono_at(idx) * (1.0 - frac) + mono_at(idx + 1) * frac
            } else if idx < frames {
                mono_at(idx)
            } else {
                0.0
            };
            out.push(sample);
        }
        Ok(())
    }
}
