//! Transcript classification.
//!
//! Turns the decoder's first-segment text into a verdict for the rewrite
//! stage. Matching is done on the lowercased, right-trimmed transcript, so
//! the configured patterns are effectively case-insensitive.

use regex::Regex;
use tracing::warn;

/// Verdict on one analysis window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// No transcribable audio (empty transcript or energy gate).
    Silence,
    /// Ordinary speech, left untouched.
    Speech,
    /// Matched the filler pattern; the region is silenced.
    Filler,
    /// Matched the profanity pattern; the region is replaced with a tone.
    Beep,
    /// Inference failed or was unavailable.
    Unknown,
}

/// Lowercase and right-trim a raw transcript for matching.
pub fn normalize_transcript(text: &str) -> String {
    text.to_lowercase().trim_end().to_string()
}

/// Classify a normalized transcript.
///
/// The filler pattern wins over the profanity pattern when both match.
/// `None` patterns (unset or failed to compile) never match.
pub fn classify_transcript(
    text: &str,
    filler: Option<&Regex>,
    beep: Option<&Regex>,
) -> Detection {
    if text.is_empty() {
        return Detection::Silence;
    }
    if let Some(pattern) = filler {
        if pattern.is_match(text) {
            return Detection::Filler;
        }
    }
    if let Some(pattern) = beep {
        if pattern.is_match(text) {
            return Detection::Beep;
        }
    }
    Detection::Speech
}

/// Compile a detection pattern, logging and disabling it on failure.
///
/// An empty pattern disables the class silently; an invalid pattern is a
/// configuration mistake worth a warning but never fatal.
pub fn compile_pattern(kind: &str, pattern: &str) -> Option<Regex> {
    if pattern.is_empty() {
        return None;
    }
    match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!("invalid {kind} pattern {pattern:?}, class disabled: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::{DEFAULT_BEEP_PATTERN, DEFAULT_FILLER_PATTERN};

    fn default_patterns() -> (Option<Regex>, Option<Regex>) {
        (
            compile_pattern("filler", DEFAULT_FILLER_PATTERN),
            compile_pattern("beep", DEFAULT_BEEP_PATTERN),
        )
    }

    #[test]
    fn normalize_lowercases_and_trims_right() {
        assert_eq!(normalize_transcript(" Uh, Hello!  \n"), " uh, hello!");
    }

    #[test]
    fn empty_transcript_is_silence() {
        let (filler, beep) = default_patterns();
        assert_eq!(
            classify_transcript("", filler.as_ref(), beep.as_ref()),
            Detection::Silence
        );
    }

    #[test]
    fn filler_words_match_default_pattern() {
        let (filler, beep) = default_patterns();
        for text in ["uh", "um", "uhhh", "umm...", "ah, yes"] {
            assert_eq!(
                classify_transcript(text, filler.as_ref(), beep.as_ref()),
                Detection::Filler,
                "{text:?} should classify as filler"
            );
        }
    }

    #[test]
    fn profanity_matches_default_pattern() {
        let (filler, beep) = default_patterns();
        assert_eq!(
            classify_transcript("oh shit", filler.as_ref(), beep.as_ref()),
            Detection::Beep
        );
    }

    #[test]
    fn ordinary_speech_passes() {
        let (filler, beep) = default_patterns();
        assert_eq!(
            classify_transcript("the quick brown fox", filler.as_ref(), beep.as_ref()),
            Detection::Speech
        );
    }

    #[test]
    fn uppercase_input_matches_after_normalization() {
        let (filler, beep) = default_patterns();
        let text = normalize_transcript("UM, RIGHT");
        assert_eq!(
            classify_transcript(&text, filler.as_ref(), beep.as_ref()),
            Detection::Filler
        );
    }

    #[test]
    fn filler_wins_over_beep() {
        let (filler, beep) = default_patterns();
        assert_eq!(
            classify_transcript("uh, shit", filler.as_ref(), beep.as_ref()),
            Detection::Filler
        );
    }

    #[test]
    fn disabled_classes_never_match() {
        assert_eq!(classify_transcript("uh, shit", None, None), Detection::Speech);
    }

    #[test]
    fn empty_pattern_is_disabled() {
        assert!(compile_pattern("filler", "").is_none());
    }

    #[test]
    fn invalid_pattern_is_disabled() {
        assert!(compile_pattern("filler", "(unclosed").is_none());
    }
}
