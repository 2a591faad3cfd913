//! Whisper model management.

pub mod catalog;
pub mod download;

use std::path::PathBuf;
use std::thread;

use tracing::error;

use crate::error::{ClearcastError, Result};

/// Completion callback for an asynchronous model fetch.
pub type FetchCallback = Box<dyn FnOnce(Result<PathBuf>) + Send + 'static>;

/// Resolves logical model names to files on disk and fetches missing ones.
///
/// The filter only talks to this trait; tests substitute an in-memory
/// implementation.
pub trait ModelStore: Send + Sync {
    /// True if the named model is present on disk.
    fn exists(&self, name: &str) -> bool;

    /// Filesystem path of the named model.
    fn resolve(&self, name: &str) -> Result<PathBuf>;

    /// Fetch the named model in the background and report the result.
    ///
    /// `on_done` is invoked from the fetch thread; callers must not assume
    /// any particular thread.
    fn fetch(&self, name: &str, on_done: FetchCallback);
}

/// Production store backed by the catalog and the user's cache directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct CachedModelStore {
    /// Render a progress bar while downloading.
    pub show_progress: bool,
}

impl CachedModelStore {
    pub fn new() -> Self {
        Self {
            show_progress: true,
        }
    }
}

impl ModelStore for CachedModelStore {
    fn exists(&self, name: &str) -> bool {
        download::is_model_installed(name)
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        download::model_path(name).ok_or_else(|| ClearcastError::UnknownModel {
            name: name.to_string(),
        })
    }

    fn fetch(&self, name: &str, on_done: FetchCallback) {
        let name = name.to_string();
        let show_progress = self.show_progress;
        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build();
            match runtime {
                Ok(runtime) => {
                    on_done(runtime.block_on(download::download_model(&name, show_progress)));
                }
                Err(e) => {
                    error!("failed to start download runtime: {e}");
                    on_done(Err(ClearcastError::Download {
                        message: e.to_string(),
                    }));
                }
            }
        });
    }
}
