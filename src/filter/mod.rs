//! The stream filter: lifecycle, ingress, and shared pipeline state.
//!
//! Two threads meet here. The host's audio thread calls
//! [`StreamFilter::process_packet`] for every packet; a background analysis
//! worker (see [`worker`]) pulls overlapping windows out of the input rings,
//! classifies them, and publishes rewritten audio to the output rings. The
//! threads share nothing but the rings and three mutexes:
//!
//! - `input` guards the input rings and input packet queue,
//! - `output` guards the output rings and output packet queue,
//! - `engine` guards the speech engine slot and its parameters.
//!
//! No thread ever holds two of them at once, and the host thread never
//! touches the engine mutex at all, so ingress stays wait-free against a
//! running inference.

mod overlap;
pub mod packet;
mod worker;

pub use packet::AudioPacket;

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::audio::{PacketInfo, PacketQueue, SampleRing};
use crate::config::{DecodeOptions, FilterSettings, LogLevel};
use crate::detect::compile_pattern;
use crate::error::Result;
use crate::models::{CachedModelStore, ModelStore};
use crate::stt::engine::SpeechEngine;
use crate::stt::whisper::WhisperEngine;

/// Stream properties fixed for the lifetime of a filter instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    /// Sample rate the host delivers audio at, in Hz.
    pub sample_rate: u32,
    /// Number of planar channels per packet.
    pub channels: usize,
}

/// Builds a speech engine from a model file. Injectable so tests can run the
/// whole pipeline against a scripted engine.
pub type EngineLoader = Arc<dyn Fn(&Path) -> Result<Box<dyn SpeechEngine>> + Send + Sync>;

/// Snapshot of the pipeline counters, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    /// Analysis windows processed since creation.
    pub windows: u64,
    /// Current window overlap in milliseconds.
    pub overlap_ms: u64,
}

/// Runtime-tunable knobs, refreshed by `update()` and snapshotted by the
/// worker once per window.
#[derive(Debug, Clone)]
pub(crate) struct Tuning {
    pub do_silence: bool,
    pub vad_enabled: bool,
    pub log_words: bool,
    pub log_level: LogLevel,
    pub filler: Option<Regex>,
    pub beep: Option<Regex>,
}

impl Tuning {
    fn from_settings(settings: &FilterSettings) -> Self {
        Self {
            do_silence: settings.do_silence,
            vad_enabled: settings.vad_enabled,
            log_words: settings.log_words,
            log_level: settings.log_level,
            filler: compile_pattern("filler", &settings.detect_regex),
            beep: compile_pattern("beep", &settings.beep_regex),
        }
    }
}

/// Rings and packet queue for one side of the filter.
pub(crate) struct BufferSide {
    pub rings: Vec<SampleRing>,
    pub packets: PacketQueue,
}

impl BufferSide {
    fn new(channels: usize) -> Self {
        Self {
            rings: (0..channels).map(|_| SampleRing::new()).collect(),
            packets: PacketQueue::new(),
        }
    }
}

/// The speech engine and everything inference reads, under one mutex.
pub(crate) struct EngineSlot {
    pub engine: Option<Box<dyn SpeechEngine>>,
    pub opts: DecodeOptions,
    pub tuning: Tuning,
}

/// State shared between the host thread, the analysis worker, and the
/// download callback.
pub(crate) struct FilterShared {
    pub input: Mutex<BufferSide>,
    pub output: Mutex<BufferSide>,
    pub engine: Mutex<EngineSlot>,
    /// Mirrors `engine.is_some()` so ingress can check it without taking the
    /// engine mutex (which inference may hold for hundreds of ms).
    pub engine_loaded: AtomicBool,
    pub active: AtomicBool,
    pub download_pending: AtomicBool,
    /// Set once by `Drop`; stops a late download callback from resurrecting
    /// the pipeline after teardown.
    pub shutdown: AtomicBool,
    pub worker: Mutex<Option<JoinHandle<()>>>,
    pub windows: AtomicU64,
    pub overlap_ms: AtomicU64,
}

impl FilterShared {
    fn new(channels: usize, settings: &FilterSettings) -> Self {
        Self {
            input: Mutex::new(BufferSide::new(channels)),
            output: Mutex::new(BufferSide::new(channels)),
            engine: Mutex::new(EngineSlot {
                engine: None,
                opts: settings.decode.clone(),
                tuning: Tuning::from_settings(settings),
            }),
            engine_loaded: AtomicBool::new(false),
            active: AtomicBool::new(true),
            download_pending: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            worker: Mutex::new(None),
            windows: AtomicU64::new(0),
            overlap_ms: AtomicU64::new(crate::defaults::INITIAL_OVERLAP_MS),
        }
    }
}

/// Lock a pipeline mutex, recovering from poisoning.
///
/// A panicked worker must not stop audio flow, so a poisoned buffer is taken
/// as-is rather than propagated.
pub(crate) fn hold<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Emit a pipeline log line at the configured verbosity.
pub(crate) fn log_at(level: LogLevel, args: std::fmt::Arguments<'_>) {
    match level {
        LogLevel::Debug => debug!("{args}"),
        LogLevel::Info => info!("{args}"),
        LogLevel::Warn => warn!("{args}"),
    }
}

/// Realtime speech-scrubbing filter.
///
/// Create one per audio stream, feed every packet through
/// [`process_packet`](Self::process_packet), and push settings changes with
/// [`update`](Self::update). Dropping the filter joins the worker.
pub struct StreamFilter {
    shared: Arc<FilterShared>,
    format: StreamFormat,
    store: Arc<dyn ModelStore>,
    loader: EngineLoader,
    /// Current logical model name. Only the host's control thread writes it,
    /// but `update()` takes `&self` so the filter can live in an `Arc` next
    /// to the audio thread.
    model: Mutex<String>,
}

impl StreamFilter {
    /// Create a filter backed by whisper and the on-disk model cache.
    ///
    /// A missing or unloadable model is not an error: the filter starts in
    /// passthrough mode and [`update`](Self::update) can fetch the model
    /// later.
    pub fn new(format: StreamFormat, settings: &FilterSettings) -> Self {
        let use_gpu = settings.use_gpu;
        let loader: EngineLoader = Arc::new(move |path: &Path| {
            WhisperEngine::load(path, use_gpu)
                .map(|engine| Box::new(engine) as Box<dyn SpeechEngine>)
        });
        Self::with_backend(format, settings, Arc::new(CachedModelStore::new()), loader)
    }

    /// Create a filter with an injected model store and engine loader.
    pub fn with_backend(
        format: StreamFormat,
        settings: &FilterSettings,
        store: Arc<dyn ModelStore>,
        loader: EngineLoader,
    ) -> Self {
        assert!(format.channels >= 1, "filter needs at least one channel");
        assert!(format.sample_rate > 0, "filter needs a positive sample rate");

        let shared = Arc::new(FilterShared::new(format.channels, settings));
        let filter = Self {
            shared,
            format,
            store,
            loader,
            model: Mutex::new(settings.model.clone()),
        };
        info!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            model = %settings.model,
            "filter created"
        );
        filter.try_load_engine();
        filter
    }

    /// Process one host packet.
    ///
    /// Returns `Some(packet)` when output is ready — either the passthrough
    /// input (filter inactive or no engine) or the oldest rewritten packet.
    /// Returns `None` when the input was consumed but no output is buffered
    /// yet; the host emits nothing this tick and the audio arrives, delayed
    /// by roughly one analysis window, with later packets.
    pub fn process_packet(&self, packet: AudioPacket) -> Option<AudioPacket> {
        if !self.shared.active.load(Ordering::Acquire)
            || !self.shared.engine_loaded.load(Ordering::Acquire)
        {
            return Some(packet);
        }

        debug_assert_eq!(packet.data.len(), self.format.channels);

        {
            let mut input = hold(&self.shared.input);
            for (ring, channel) in input.rings.iter_mut().zip(&packet.data) {
                ring.push_back(channel);
            }
            input.packets.push_back(PacketInfo {
                frames: packet.frames,
                timestamp: packet.timestamp,
            });
        }

        let mut output = hold(&self.shared.output);
        let info = output.packets.pop_front()?;
        let frames = info.frames as usize;
        let mut data = Vec::with_capacity(self.format.channels);
        for ring in output.rings.iter_mut() {
            let mut channel = vec![0.0f32; frames];
            ring.pop_front(&mut channel);
            data.push(channel);
        }
        Some(AudioPacket {
            data,
            frames: info.frames,
            timestamp: info.timestamp,
        })
    }

    /// Apply a settings change.
    ///
    /// Patterns and decode options take effect from the next window. A model
    /// change (or a still-missing model) tears down the worker and reloads,
    /// downloading the model first if it is not installed.
    pub fn update(&self, settings: &FilterSettings) {
        {
            let mut slot = hold(&self.shared.engine);
            slot.tuning = Tuning::from_settings(settings);
            slot.opts = settings.decode.clone();
        }

        let model_changed = settings.model != *hold(&self.model);
        let engine_missing = !self.shared.engine_loaded.load(Ordering::Acquire);
        if !model_changed && !engine_missing {
            return;
        }
        if model_changed {
            info!(from = %hold(&self.model), to = %settings.model, "model changed, reloading");
        }

        {
            hold(&self.shared.engine).engine = None;
        }
        self.shared.engine_loaded.store(false, Ordering::Release);
        join_worker(&self.shared);
        *hold(&self.model) = settings.model.clone();

        if self.store.exists(&settings.model) {
            self.try_load_engine();
        } else if !self.shared.download_pending.swap(true, Ordering::AcqRel) {
            info!(model = %settings.model, "model not installed, fetching");
            let shared = Arc::clone(&self.shared);
            let loader = Arc::clone(&self.loader);
            let format = self.format;
            self.store.fetch(
                &settings.model,
                Box::new(move |result| {
                    shared.download_pending.store(false, Ordering::Release);
                    match result {
                        Ok(path) => install_engine(&shared, &loader, &path, format),
                        Err(e) => error!("model fetch failed: {e}"),
                    }
                }),
            );
        }
    }

    /// Resume filtering after [`deactivate`](Self::deactivate).
    pub fn activate(&self) {
        info!("filter activated");
        self.shared.active.store(true, Ordering::Release);
    }

    /// Bypass the filter: packets pass through untouched and unbuffered.
    pub fn deactivate(&self) {
        info!("filter deactivated");
        self.shared.active.store(false, Ordering::Release);
    }

    /// True when a speech engine is loaded and the worker is filtering.
    pub fn is_filtering(&self) -> bool {
        self.shared.engine_loaded.load(Ordering::Acquire)
    }

    /// Current pipeline counters.
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            windows: self.shared.windows.load(Ordering::Acquire),
            overlap_ms: self.shared.overlap_ms.load(Ordering::Acquire),
        }
    }

    fn try_load_engine(&self) {
        let model = hold(&self.model).clone();
        if !self.store.exists(&model) {
            warn!(
                model = %model,
                "model not installed, passthrough until update() fetches it"
            );
            return;
        }
        match self.store.resolve(&model) {
            Ok(path) => install_engine(&self.shared, &self.loader, &path, self.format),
            Err(e) => warn!("cannot resolve model path, passthrough: {e}"),
        }
    }
}

impl Drop for StreamFilter {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        {
            hold(&self.shared.engine).engine = None;
        }
        self.shared.engine_loaded.store(false, Ordering::Release);
        join_worker(&self.shared);
        debug!("filter destroyed");
    }
}

/// Load an engine from `path` and start the analysis worker.
///
/// Shared by construction, `update()`, and the download completion callback.
fn install_engine(
    shared: &Arc<FilterShared>,
    loader: &EngineLoader,
    path: &Path,
    format: StreamFormat,
) {
    if shared.shutdown.load(Ordering::Acquire) {
        return;
    }
    match loader(path) {
        Ok(engine) => {
            info!(model = engine.model_name(), "speech engine ready");
            hold(&shared.engine).engine = Some(engine);
            shared.engine_loaded.store(true, Ordering::Release);
            let handle = worker::spawn(Arc::clone(shared), format);
            *hold(&shared.worker) = Some(handle);
        }
        Err(e) => warn!("failed to load speech model, passthrough: {e}"),
    }
}

/// Join the analysis worker, if one is running.
///
/// Callers must null the engine slot first so the worker observes the empty
/// slot and exits its loop.
fn join_worker(shared: &FilterShared) {
    let handle = hold(&shared.worker).take();
    if let Some(handle) = handle {
        if handle.join().is_err() {
            warn!("analysis worker panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClearcastError;
    use crate::stt::engine::MockEngine;
    use std::path::PathBuf;

    /// Store whose model always exists at a dummy path.
    struct ReadyStore;

    impl ModelStore for ReadyStore {
        fn exists(&self, _name: &str) -> bool {
            true
        }
        fn resolve(&self, name: &str) -> Result<PathBuf> {
            Ok(PathBuf::from(format!("/models/{name}.bin")))
        }
        fn fetch(&self, name: &str, on_done: crate::models::FetchCallback) {
            on_done(self.resolve(name));
        }
    }

    /// Store with no models at all.
    struct EmptyStore;

    impl ModelStore for EmptyStore {
        fn exists(&self, _name: &str) -> bool {
            false
        }
        fn resolve(&self, name: &str) -> Result<PathBuf> {
            Err(ClearcastError::UnknownModel {
                name: name.to_string(),
            })
        }
        fn fetch(&self, name: &str, on_done: crate::models::FetchCallback) {
            on_done(self.resolve(name));
        }
    }

    fn mock_loader(engine: MockEngine) -> EngineLoader {
        Arc::new(move |_: &Path| Ok(Box::new(engine.clone()) as Box<dyn SpeechEngine>))
    }

    fn format() -> StreamFormat {
        StreamFormat {
            sample_rate: 16_000,
            channels: 1,
        }
    }

    fn ramp_packet(frames: usize, timestamp: u64) -> AudioPacket {
        let data: Vec<f32> = (0..frames).map(|i| i as f32 / frames as f32).collect();
        AudioPacket::new(vec![data], timestamp)
    }

    #[test]
    fn missing_model_creates_passthrough_filter() {
        let filter = StreamFilter::with_backend(
            format(),
            &FilterSettings::default(),
            Arc::new(EmptyStore),
            mock_loader(MockEngine::new()),
        );
        assert!(!filter.is_filtering());

        let packet = ramp_packet(480, 1000);
        let out = filter.process_packet(packet.clone()).unwrap();
        assert_eq!(out, packet);
    }

    #[test]
    fn deactivated_filter_passes_audio_through() {
        let filter = StreamFilter::with_backend(
            format(),
            &FilterSettings::default(),
            Arc::new(ReadyStore),
            mock_loader(MockEngine::new()),
        );
        assert!(filter.is_filtering());

        filter.deactivate();
        let packet = ramp_packet(480, 1000);
        let out = filter.process_packet(packet.clone()).unwrap();
        assert_eq!(out, packet);
    }

    #[test]
    fn failing_loader_creates_passthrough_filter() {
        let loader: EngineLoader = Arc::new(|_: &Path| {
            Err(ClearcastError::ModelLoad {
                message: "corrupt file".to_string(),
            })
        });
        let filter = StreamFilter::with_backend(
            format(),
            &FilterSettings::default(),
            Arc::new(ReadyStore),
            loader,
        );
        assert!(!filter.is_filtering());

        let packet = ramp_packet(480, 7);
        assert_eq!(filter.process_packet(packet.clone()).unwrap(), packet);
    }

    #[test]
    fn active_filter_buffers_input_and_returns_nothing_at_first() {
        let filter = StreamFilter::with_backend(
            format(),
            &FilterSettings::default(),
            Arc::new(ReadyStore),
            mock_loader(MockEngine::new()),
        );

        // first packet: far below one window, so nothing comes back
        assert!(filter.process_packet(ramp_packet(480, 0)).is_none());
    }

    #[test]
    fn stats_start_at_initial_overlap() {
        let filter = StreamFilter::with_backend(
            format(),
            &FilterSettings::default(),
            Arc::new(EmptyStore),
            mock_loader(MockEngine::new()),
        );
        let stats = filter.stats();
        assert_eq!(stats.windows, 0);
        assert_eq!(stats.overlap_ms, 340);
    }

    #[test]
    fn drop_joins_worker() {
        let filter = StreamFilter::with_backend(
            format(),
            &FilterSettings::default(),
            Arc::new(ReadyStore),
            mock_loader(MockEngine::new()),
        );
        let shared = Arc::clone(&filter.shared);
        drop(filter);
        assert!(hold(&shared.worker).is_none());
        assert!(hold(&shared.engine).engine.is_none());
    }
}
