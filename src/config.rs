use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::defaults;
use crate::error::Result;

/// Root settings structure for one filter instance.
///
/// Every field has a default so a host can supply a partial settings
/// dictionary; missing keys fall back to the values below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilterSettings {
    /// Apply the rewrite. When false the pipeline still classifies every
    /// window but passes the audio through unchanged.
    pub do_silence: bool,
    /// Skip inference on windows that fail the energy gate.
    pub vad_enabled: bool,
    /// Verbosity of the per-window pipeline logs.
    pub log_level: LogLevel,
    /// Log every classified transcript with its time offsets.
    pub log_words: bool,
    /// Filler-word pattern, matched against the lowercased transcript.
    /// Empty disables the class.
    pub detect_regex: String,
    /// Profanity pattern, matched against the lowercased transcript.
    /// Empty disables the class.
    pub beep_regex: String,
    /// Logical model name from the catalog. Changing it triggers a reload.
    pub model: String,
    /// Offload inference to the GPU when the build supports it.
    pub use_gpu: bool,
    /// Decoder options forwarded to the speech engine on every call.
    pub decode: DecodeOptions,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            do_silence: true,
            vad_enabled: true,
            log_level: LogLevel::Debug,
            log_words: true,
            detect_regex: defaults::DEFAULT_FILLER_PATTERN.to_string(),
            beep_regex: defaults::DEFAULT_BEEP_PATTERN.to_string(),
            model: defaults::DEFAULT_MODEL.to_string(),
            use_gpu: false,
            decode: DecodeOptions::default(),
        }
    }
}

/// Decoder options forwarded verbatim to the speech engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DecodeOptions {
    pub language: String,
    pub initial_prompt: String,
    pub n_threads: i32,
    pub n_max_text_ctx: i32,
    pub no_context: bool,
    pub single_segment: bool,
    pub print_special: bool,
    pub print_progress: bool,
    pub print_realtime: bool,
    pub print_timestamps: bool,
    pub token_timestamps: bool,
    pub thold_pt: f32,
    pub thold_ptsum: f32,
    pub max_len: i32,
    pub split_on_word: bool,
    pub max_tokens: i32,
    pub suppress_blank: bool,
    pub suppress_non_speech: bool,
    pub temperature: f32,
    pub max_initial_ts: f32,
    pub length_penalty: f32,
    // last so the TOML serializer emits this table after the scalar keys
    pub strategy: SamplingStrategy,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            initial_prompt: defaults::DEFAULT_INITIAL_PROMPT.to_string(),
            n_threads: 4,
            n_max_text_ctx: 16384,
            no_context: true,
            single_segment: true,
            print_special: false,
            print_progress: false,
            print_realtime: false,
            print_timestamps: false,
            token_timestamps: false,
            thold_pt: 0.01,
            thold_ptsum: 0.01,
            max_len: 0,
            split_on_word: false,
            max_tokens: 3,
            suppress_blank: false,
            suppress_non_speech: true,
            temperature: 0.5,
            max_initial_ts: 1.0,
            length_penalty: -1.0,
            strategy: SamplingStrategy::BeamSearch {
                beam_size: 5,
                patience: -1.0,
            },
        }
    }
}

/// Decoder sampling strategy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SamplingStrategy {
    Greedy { best_of: i32 },
    BeamSearch { beam_size: i32, patience: f32 },
}

/// Verbosity of the per-window pipeline logs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Debug,
    Info,
    Warn,
}

impl FilterSettings {
    /// Load settings from a TOML file.
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Save settings to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }
}
