//! Model acquisition.
//!
//! Models are streamed from HuggingFace into the user's cache directory,
//! hashed on the way down, and checked against the catalog digest before
//! they are considered installed. A failed digest check removes the file so
//! the next [`is_model_installed`] probe reports the truth.

use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{ClearcastError, Result};
use crate::models::catalog::{get_model, ModelInfo};

fn ggml_file_name(name: &str) -> String {
    format!("ggml-{name}.bin")
}

/// Directory where models are stored (`~/.cache/clearcast/models/`).
pub fn models_dir() -> PathBuf {
    let base = dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".cache"));
    base.join("clearcast").join("models")
}

/// Full path for a model file, or `None` if the name is not in the catalog.
pub fn model_path(name: &str) -> Option<PathBuf> {
    get_model(name).map(|info| models_dir().join(ggml_file_name(info.name)))
}

/// Check if a model is installed.
pub fn is_model_installed(name: &str) -> bool {
    model_path(name).is_some_and(|p| p.exists())
}

/// Download a whisper model into the cache directory.
///
/// Already-installed models return immediately. `progress` renders a byte
/// counter to the terminal while the transfer runs.
pub async fn download_model(name: &str, progress: bool) -> Result<PathBuf> {
    let info = get_model(name).ok_or_else(|| ClearcastError::UnknownModel {
        name: name.to_string(),
    })?;
    let target = models_dir().join(ggml_file_name(info.name));

    if target.exists() {
        info!(model = info.name, "already installed at {}", target.display());
        return Ok(target);
    }

    info!(model = info.name, size_mb = info.size_mb, "fetching model");
    let digest = fetch_to_disk(info, &target, progress).await?;

    if let Err(mismatch) = check_digest(info, &digest) {
        // never leave a corrupt file where the next exists() probe finds it
        let _ = fs::remove_file(&target);
        return Err(mismatch);
    }

    info!(model = info.name, "installed to {}", target.display());
    Ok(target)
}

/// Stream the model body onto disk, returning the SHA-256 of the bytes
/// written.
async fn fetch_to_disk(info: &ModelInfo, target: &Path, progress: bool) -> Result<String> {
    let failed = |message: String| ClearcastError::Download { message };

    if let Some(dir) = target.parent() {
        fs::create_dir_all(dir)
            .map_err(|e| failed(format!("cannot create {}: {e}", dir.display())))?;
    }

    let response = reqwest::get(info.url)
        .await
        .map_err(|e| failed(format!("request error: {e}")))?;
    let status = response.status();
    if !status.is_success() {
        return Err(failed(format!("server answered {status} for {}", info.url)));
    }

    let bar = progress.then(|| {
        let style = ProgressStyle::with_template("[{bar:30}] {bytes}/{total_bytes} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        ProgressBar::new(response.content_length().unwrap_or(0)).with_style(style)
    });

    let mut file = fs::File::create(target)
        .map_err(|e| failed(format!("cannot create {}: {e}", target.display())))?;
    let mut hasher = Sha256::new();
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| failed(format!("transfer aborted: {e}")))?;
        hasher.update(&chunk);
        file.write_all(&chunk)
            .map_err(|e| failed(format!("short write to {}: {e}", target.display())))?;
        if let Some(bar) = &bar {
            bar.inc(chunk.len() as u64);
        }
    }
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Compare a computed digest against the catalog pin.
///
/// Placeholder pins (`sha256_...`) and empty pins are not enforced.
fn check_digest(info: &ModelInfo, actual: &str) -> Result<()> {
    let pinned = info.sha256;
    if pinned.is_empty() || pinned.starts_with("sha256_") {
        return Ok(());
    }
    if pinned != actual {
        return Err(ClearcastError::Download {
            message: format!(
                "digest mismatch for {}: wanted {pinned}, got {actual}",
                info.name
            ),
        });
    }
    Ok(())
}
