//! Whisper model metadata catalog.
//!
//! The models a host can offer in its model selector, from tiny (75 MB,
//! fast, lower accuracy) to large (3094 MB, slower, highest accuracy). The
//! `.en` suffix marks English-only models, which are faster at equal size.

/// Metadata for a whisper model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    /// Model identifier (e.g., "tiny.en", "base", "large")
    pub name: &'static str,
    /// Model size in megabytes
    pub size_mb: u32,
    /// SHA-256 checksum for integrity verification
    pub sha256: &'static str,
    /// Download URL from HuggingFace
    pub url: &'static str,
    /// Whether this model supports English only
    pub english_only: bool,
}

/// Catalog of downloadable models.
pub const MODELS: &[ModelInfo] = &[
    ModelInfo {
        name: "tiny.en",
        size_mb: 75,
        sha256: "sha256_tiny_en_placeholder",
        url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-tiny.en.bin",
        english_only: true,
    },
    ModelInfo {
        name: "tiny",
        size_mb: 75,
        sha256: "sha256_tiny_placeholder",
        url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-tiny.bin",
        english_only: false,
    },
    ModelInfo {
        name: "base.en",
        size_mb: 142,
        sha256: "sha256_base_en_placeholder",
        url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base.en.bin",
        english_only: true,
    },
    ModelInfo {
        name: "base",
        size_mb: 142,
        sha256: "sha256_base_placeholder",
        url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base.bin",
        english_only: false,
    },
    ModelInfo {
        name: "small.en",
        size_mb: 466,
        sha256: "sha256_small_en_placeholder",
        url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-small.en.bin",
        english_only: true,
    },
    ModelInfo {
        name: "small",
        size_mb: 466,
        sha256: "sha256_small_placeholder",
        url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-small.bin",
        english_only: false,
    },
    ModelInfo {
        name: "large",
        size_mb: 3094,
        sha256: "sha256_large_placeholder",
        url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-large.bin",
        english_only: false,
    },
];

/// Find a model by name.
pub fn get_model(name: &str) -> Option<&'static ModelInfo> {
    MODELS.iter().find(|m| m.name == name)
}

/// All models in the catalog, for a host's model selector.
pub fn list_models() -> &'static [ModelInfo] {
    MODELS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults;

    #[test]
    fn get_model_exists() {
        let model = get_model("tiny.en").unwrap();
        assert_eq!(model.name, "tiny.en");
        assert_eq!(model.size_mb, 75);
        assert!(model.english_only);
    }

    #[test]
    fn get_model_not_found() {
        assert!(get_model("nonexistent").is_none());
    }

    #[test]
    fn default_model_is_in_catalog() {
        assert!(get_model(defaults::DEFAULT_MODEL).is_some());
    }

    #[test]
    fn english_only_flag_matches_suffix() {
        for model in list_models() {
            assert_eq!(model.name.ends_with(".en"), model.english_only);
        }
    }

    #[test]
    fn urls_point_at_matching_files() {
        for model in list_models() {
            assert!(
                model.url.ends_with(&format!("ggml-{}.bin", model.name)),
                "URL mismatch for {}",
                model.name
            );
        }
    }
}
