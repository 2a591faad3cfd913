//! Whisper-based speech recognition.
//!
//! Wraps `whisper-rs` behind the [`SpeechEngine`] trait. A fresh decoder
//! state is created per call; the decode options arrive with every call so
//! settings updates take effect without reloading the model.
//!
//! # Feature Gate
//!
//! Requires the `whisper` feature (enabled by default) and cmake. Without
//! it a stub is compiled whose construction fails, which leaves the filter
//! in passthrough mode.

use std::path::Path;

use crate::config::DecodeOptions;
#[cfg(feature = "whisper")]
use crate::config::SamplingStrategy;
use crate::error::{ClearcastError, Result};
use crate::stt::engine::{SpeechEngine, TranscriptSegment};

#[cfg(feature = "whisper")]
use std::sync::Once;
#[cfg(feature = "whisper")]
use whisper_rs::{install_logging_hooks, FullParams, WhisperContext, WhisperContextParameters};

#[cfg(feature = "whisper")]
static LOGGING_HOOKS_INSTALLED: Once = Once::new();

/// Production engine backed by a `whisper_rs::WhisperContext`.
#[cfg(feature = "whisper")]
pub struct WhisperEngine {
    context: WhisperContext,
    model_name: String,
}

#[cfg(feature = "whisper")]
impl std::fmt::Debug for WhisperEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperEngine")
            .field("model_name", &self.model_name)
            .finish_non_exhaustive()
    }
}

/// Whisper engine placeholder (without the `whisper` feature).
#[cfg(not(feature = "whisper"))]
#[derive(Debug)]
pub struct WhisperEngine;

#[cfg(feature = "whisper")]
impl WhisperEngine {
    /// Load a ggml model file.
    ///
    /// # Errors
    ///
    /// Returns `ClearcastError::ModelNotFound` if `model_path` doesn't exist
    /// and `ClearcastError::ModelLoad` if whisper rejects the file.
    pub fn load(model_path: &Path, use_gpu: bool) -> Result<Self> {
        // Route whisper.cpp's own logging away from stderr (only once)
        LOGGING_HOOKS_INSTALLED.call_once(|| {
            install_logging_hooks();
        });

        if !model_path.exists() {
            return Err(ClearcastError::ModelNotFound {
                path: model_path.to_string_lossy().to_string(),
            });
        }

        let model_name = model_name_from_path(model_path);

        let mut context_params = WhisperContextParameters::default();
        context_params.use_gpu(use_gpu);
        let context = WhisperContext::new_with_params(
            model_path.to_str().ok_or_else(|| ClearcastError::ModelLoad {
                message: "Invalid UTF-8 in model path".to_string(),
            })?,
            context_params,
        )
        .map_err(|e| ClearcastError::ModelLoad {
            message: format!("Failed to load whisper model: {}", e),
        })?;

        Ok(Self {
            context,
            model_name,
        })
    }
}

#[cfg(feature = "whisper")]
impl SpeechEngine for WhisperEngine {
    fn transcribe(
        &mut self,
        audio: &[f32],
        opts: &DecodeOptions,
    ) -> Result<Option<TranscriptSegment>> {
        let strategy = match opts.strategy {
            SamplingStrategy::Greedy { best_of } => {
                whisper_rs::SamplingStrategy::Greedy { best_of }
            }
            SamplingStrategy::BeamSearch {
                beam_size,
                patience,
            } => whisper_rs::SamplingStrategy::BeamSearch {
                beam_size,
                patience,
            },
        };

        let mut params = FullParams::new(strategy);
        params.set_language(Some(opts.language.as_str()));
        params.set_translate(false);
        params.set_initial_prompt(opts.initial_prompt.as_str());
        params.set_duration_ms(crate::defaults::WINDOW_MS as i32);
        params.set_n_threads(opts.n_threads);
        params.set_n_max_text_ctx(opts.n_max_text_ctx);
        params.set_no_context(opts.no_context);
        params.set_single_segment(opts.single_segment);
        params.set_print_special(opts.print_special);
        params.set_print_progress(opts.print_progress);
        params.set_print_realtime(opts.print_realtime);
        params.set_print_timestamps(opts.print_timestamps);
        params.set_token_timestamps(opts.token_timestamps);
        params.set_thold_pt(opts.thold_pt);
        params.set_thold_ptsum(opts.thold_ptsum);
        params.set_max_len(opts.max_len);
        params.set_split_on_word(opts.split_on_word);
        params.set_max_tokens(opts.max_tokens);
        params.set_suppress_blank(opts.suppress_blank);
        params.set_suppress_nst(opts.suppress_non_speech);
        params.set_temperature(opts.temperature);
        params.set_max_initial_ts(opts.max_initial_ts);
        params.set_length_penalty(opts.length_penalty);

        let mut state = self
            .context
            .create_state()
            .map_err(|e| ClearcastError::Inference {
                message: format!("Failed to create whisper state: {}", e),
            })?;

        state
            .full(params, audio)
            .map_err(|e| ClearcastError::Inference {
                message: format!("Whisper inference failed: {}", e),
            })?;

        let Some(segment) = state.as_iter().next() else {
            return Ok(None);
        };

        let text = match segment.to_str_lossy() {
            Ok(text) => text.into_owned(),
            Err(_) => String::new(),
        };

        // mean token probability across the segment
        let n_tokens = segment.n_tokens();
        let mut prob_sum = 0.0f32;
        for i in 0..n_tokens {
            if let Some(token) = segment.get_token(i) {
                prob_sum += token.token_probability();
            }
        }
        let mean_token_p = if n_tokens > 0 {
            prob_sum / n_tokens as f32
        } else {
            0.0
        };

        Ok(Some(TranscriptSegment {
            text,
            start_cs: segment.start_timestamp(),
            end_cs: segment.end_timestamp(),
            mean_token_p,
        }))
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(not(feature = "whisper"))]
impl WhisperEngine {
    /// Stub loader: always fails, leaving the filter in passthrough mode.
    pub fn load(model_path: &Path, _use_gpu: bool) -> Result<Self> {
        let _ = model_path;
        Err(ClearcastError::ModelLoad {
            message: concat!(
                "Built without the whisper feature, no speech recognition available.\n",
                "To fix: cargo build --release (whisper is enabled by default)\n",
                "If the build fails with cmake errors, install: sudo apt install cmake"
            )
            .to_string(),
        })
    }
}

#[cfg(not(feature = "whisper"))]
impl SpeechEngine for WhisperEngine {
    fn transcribe(
        &mut self,
        _audio: &[f32],
        _opts: &DecodeOptions,
    ) -> Result<Option<TranscriptSegment>> {
        Err(ClearcastError::Inference {
            message: "whisper feature not enabled".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        "unavailable"
    }
}

fn model_name_from_path(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}
