//! Background analysis worker.
//!
//! Pulls overlapping analysis windows out of the input rings, classifies
//! them (energy gate, then speech recognition, then pattern matching), and
//! publishes the rewritten audio to the output rings. Runs until the engine
//! slot is emptied — by teardown, a model change, or an inference failure.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{error, info, warn};

use crate::audio::{vad, MonoResampler, PacketInfo};
use crate::defaults::{
    self, ASR_SAMPLE_RATE, BEEP_AMPLITUDE, BEEP_FREQUENCY_HZ, VAD_ENERGY_THRESHOLD,
    VAD_HIGHPASS_HZ, WORKER_POLL,
};
use crate::detect::{classify_transcript, normalize_transcript, Detection};
use crate::error::Result;
use crate::stt::engine::format_timestamp;

use super::{hold, log_at, EngineSlot, FilterShared, StreamFormat, Tuning};

pub(crate) fn spawn(shared: Arc<FilterShared>, format: StreamFormat) -> JoinHandle<()> {
    thread::spawn(move || {
        match AnalysisWorker::new(Arc::clone(&shared), format) {
            Ok(worker) => worker.run(),
            Err(e) => {
                // same policy as an inference failure: drop the engine and
                // let the filter degrade to passthrough
                error!("analysis worker cannot start: {e}");
                hold(&shared.engine).engine = None;
                shared.engine_loaded.store(false, Ordering::Release);
            }
        }
    })
}

struct AnalysisWorker {
    shared: Arc<FilterShared>,
    format: StreamFormat,
    window_frames: usize,
    overlap: super::overlap::OverlapController,
    /// Logical length of the previous window's scratch content; 0 before
    /// the first window.
    last_window_frames: usize,
    /// Per-channel host-rate window buffers, `window_frames` long.
    scratch: Vec<Vec<f32>>,
    /// Per-channel output candidates: the window copy that gets edited.
    candidate: Vec<Vec<f32>>,
    /// Mono 16 kHz analysis buffer, reused across windows.
    mono: Vec<f32>,
    resampler: MonoResampler,
}

impl AnalysisWorker {
    fn new(shared: Arc<FilterShared>, format: StreamFormat) -> Result<Self> {
        let resampler = MonoResampler::new(format.sample_rate, ASR_SAMPLE_RATE)?;
        let window_frames = defaults::window_frames(format.sample_rate);
        Ok(Self {
            overlap: super::overlap::OverlapController::new(format.sample_rate),
            last_window_frames: 0,
            scratch: vec![vec![0.0; window_frames]; format.channels],
            candidate: vec![Vec::with_capacity(window_frames); format.channels],
            mono: Vec::new(),
            resampler,
            window_frames,
            shared,
            format,
        })
    }

    fn run(mut self) {
        info!("analysis worker started");
        loop {
            if self.shared.shutdown.load(Ordering::Acquire)
                || hold(&self.shared.engine).engine.is_none()
            {
                info!("engine slot empty, analysis worker exiting");
                break;
            }
            loop {
                let buffered = hold(&self.shared.input).rings[0].len();
                if buffered < self.window_frames {
                    break;
                }
                if !self.process_window() {
                    break;
                }
            }
            thread::sleep(WORKER_POLL);
        }
    }

    /// Assemble, classify, rewrite, and publish one window.
    ///
    /// Returns false when not a single whole packet fit into the frames
    /// still needed — a no-op; the caller backs off to its sleep.
    fn process_window(&mut self) -> bool {
        let tuning = hold(&self.shared.engine).tuning.clone();

        // Window assembly. The input lock is held for the whole step so the
        // packet queue and the rings stay consistent with each other.
        let (new_frames, drained) = {
            let mut input = hold(&self.shared.input);
            let needed = if self.last_window_frames == 0 {
                self.window_frames
            } else {
                self.window_frames - self.overlap.frames()
            };

            let mut drained: Vec<PacketInfo> = Vec::new();
            let mut new_frames = 0usize;
            while let Some(packet) = input.packets.pop_front() {
                if new_frames + packet.frames as usize > needed {
                    // would overshoot; leave it for the next window
                    input.packets.push_front(packet);
                    break;
                }
                new_frames += packet.frames as usize;
                drained.push(packet);
            }

            if new_frames == 0 {
                warn!(needed, "next packet alone exceeds the analysis window");
                return false;
            }

            let carry = if self.last_window_frames == 0 {
                0
            } else {
                self.overlap.frames()
            };
            for (channel, ring) in self.scratch.iter_mut().zip(input.rings.iter_mut()) {
                if carry > 0 {
                    channel.copy_within(self.last_window_frames - carry..self.last_window_frames, 0);
                }
                ring.pop_front(&mut channel[carry..carry + new_frames]);
            }
            self.last_window_frames = carry + new_frames;
            (new_frames, drained)
        };

        let start_timestamp = drained[0].timestamp;
        log_at(
            tuning.log_level,
            format_args!(
                "window of {} frames ({} new across {} packets), start timestamp {}",
                self.last_window_frames,
                new_frames,
                drained.len(),
                start_timestamp
            ),
        );

        let window_start = Instant::now();
        let frames = self.last_window_frames;

        // Snapshot the host-rate candidate before any edit.
        for (candidate, channel) in self.candidate.iter_mut().zip(&self.scratch) {
            candidate.clear();
            candidate.extend_from_slice(&channel[..frames]);
        }

        // Analysis copy: mono at the engine's rate. A resampler failure is
        // handled like an inference failure.
        let mut skipped_inference = false;
        let verdict = match self.resampler.process(&self.scratch, frames, &mut self.mono) {
            Err(e) => {
                error!("resampling failed, releasing engine: {e}");
                self.release_engine();
                Detection::Unknown
            }
            Ok(()) => {
                if tuning.vad_enabled {
                    skipped_inference = !vad::voice_detected(
                        &mut self.mono,
                        ASR_SAMPLE_RATE,
                        VAD_ENERGY_THRESHOLD,
                        VAD_HIGHPASS_HZ,
                    );
                }
                if skipped_inference {
                    log_at(tuning.log_level, format_args!("energy gate, inference skipped"));
                    Detection::Silence
                } else {
                    self.run_inference(&tuning)
                }
            }
        };

        // Edits cover the new frames only; the overlap prefix went out with
        // the previous window.
        match verdict {
            Detection::Filler if tuning.do_silence => {
                if tuning.log_words {
                    info!("filler segment, silencing {new_frames} frames");
                }
                for channel in self.candidate.iter_mut() {
                    for sample in &mut channel[..new_frames] {
                        *sample = 0.0;
                    }
                }
            }
            Detection::Beep if tuning.do_silence => {
                if tuning.log_words {
                    info!("profanity segment, beeping {new_frames} frames");
                }
                let sample_rate = self.format.sample_rate as f32;
                for channel in self.candidate.iter_mut() {
                    for (i, sample) in channel[..new_frames].iter_mut().enumerate() {
                        *sample = BEEP_AMPLITUDE
                            * (2.0 * std::f32::consts::PI * BEEP_FREQUENCY_HZ * i as f32
                                / sample_rate)
                                .sin();
                    }
                }
            }
            _ => {}
        }

        // Publish the new frames, sliced exactly as they arrived.
        {
            let mut output = hold(&self.shared.output);
            for packet in &drained {
                output.packets.push_back(*packet);
            }
            for (ring, channel) in output.rings.iter_mut().zip(&self.candidate) {
                ring.push_back(&channel[..new_frames]);
            }
        }

        let elapsed_ms = window_start.elapsed().as_millis() as u64;
        let new_audio_ms = new_frames as u64 * 1000 / u64::from(self.format.sample_rate);
        log_at(
            tuning.log_level,
            format_args!("{new_audio_ms} ms of new audio processed in {elapsed_ms} ms"),
        );
        self.overlap.record(elapsed_ms, new_audio_ms, skipped_inference);

        self.shared
            .overlap_ms
            .store(self.overlap.ms(), Ordering::Release);
        self.shared.windows.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Empty the engine slot so the worker exits and ingress goes
    /// passthrough.
    fn release_engine(&self) {
        hold(&self.shared.engine).engine = None;
        self.shared.engine_loaded.store(false, Ordering::Release);
    }

    fn run_inference(&mut self, tuning: &Tuning) -> Detection {
        let mut slot = hold(&self.shared.engine);
        let EngineSlot { engine, opts, .. } = &mut *slot;
        let Some(active) = engine.as_mut() else {
            warn!("engine slot empty, window passes unclassified");
            return Detection::Unknown;
        };

        log_at(
            tuning.log_level,
            format_args!(
                "transcribing {} samples ({:.3} s)",
                self.mono.len(),
                self.mono.len() as f32 / ASR_SAMPLE_RATE as f32
            ),
        );

        match active.transcribe(&self.mono, opts) {
            Err(e) => {
                error!("inference failed, releasing engine: {e}");
                *engine = None;
                drop(slot);
                self.shared.engine_loaded.store(false, Ordering::Release);
                Detection::Unknown
            }
            Ok(None) => Detection::Silence,
            Ok(Some(segment)) => {
                let text = normalize_transcript(&segment.text);
                if tuning.log_words {
                    info!(
                        "[{} --> {}] ({:.3}) {}",
                        format_timestamp(segment.start_cs),
                        format_timestamp(segment.end_cs),
                        segment.mean_token_p,
                        text
                    );
                }
                classify_transcript(&text, tuning.filler.as_ref(), tuning.beep.as_ref())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterSettings;
    use crate::stt::engine::{MockEngine, SpeechEngine};
    use std::sync::atomic::AtomicUsize;

    fn settings_without_vad() -> FilterSettings {
        FilterSettings {
            vad_enabled: false,
            ..FilterSettings::default()
        }
    }

    fn shared_with_engine(
        channels: usize,
        settings: &FilterSettings,
        engine: MockEngine,
    ) -> Arc<FilterShared> {
        let shared = Arc::new(FilterShared::new(channels, settings));
        hold(&shared.engine).engine = Some(Box::new(engine) as Box<dyn SpeechEngine>);
        shared.engine_loaded.store(true, Ordering::Release);
        shared
    }

    fn worker_for(shared: &Arc<FilterShared>, sample_rate: u32, channels: usize) -> AnalysisWorker {
        AnalysisWorker::new(
            Arc::clone(shared),
            StreamFormat {
                sample_rate,
                channels,
            },
        )
        .expect("worker construction")
    }

    /// Push `count` packets of `frames` constant-valued samples each.
    fn feed_packets(shared: &Arc<FilterShared>, frames: u32, count: u64, value: f32) {
        let mut input = hold(&shared.input);
        for i in 0..count {
            for ring in input.rings.iter_mut() {
                ring.push_back(&vec![value; frames as usize]);
            }
            input.packets.push_back(PacketInfo {
                frames,
                timestamp: i * 1000,
            });
        }
    }

    #[test]
    fn assembly_aligns_to_packet_boundaries() {
        let settings = settings_without_vad();
        let shared = shared_with_engine(1, &settings, MockEngine::new());
        let mut worker = worker_for(&shared, 16_000, 1);

        // 17 packets x 1000 frames; the first window needs 16,160 frames so
        // exactly 16 packets fit
        feed_packets(&shared, 1000, 17, 0.5);
        assert!(worker.process_window());

        assert_eq!(worker.last_window_frames, 16_000);
        let output = hold(&shared.output);
        assert_eq!(output.packets.len(), 16);
        assert_eq!(output.packets.total_frames(), 16_000);
        assert_eq!(output.rings[0].len(), 16_000);
        let input = hold(&shared.input);
        assert_eq!(input.packets.len(), 1);
        assert_eq!(input.rings[0].len(), 1000);
    }

    #[test]
    fn oversized_packet_is_a_no_op() {
        let settings = settings_without_vad();
        let shared = shared_with_engine(1, &settings, MockEngine::new());
        let mut worker = worker_for(&shared, 16_000, 1);

        feed_packets(&shared, 20_000, 1, 0.5);
        assert!(!worker.process_window());

        // nothing consumed, nothing published
        let input = hold(&shared.input);
        assert_eq!(input.packets.len(), 1);
        assert_eq!(input.rings[0].len(), 20_000);
        assert!(hold(&shared.output).packets.is_empty());
        assert_eq!(worker.last_window_frames, 0);
    }

    #[test]
    fn consecutive_windows_never_duplicate_samples() {
        let settings = settings_without_vad();
        let shared = shared_with_engine(1, &settings, MockEngine::new());
        let mut worker = worker_for(&shared, 16_000, 1);

        feed_packets(&shared, 1000, 40, 0.25);
        assert!(worker.process_window());
        assert!(worker.process_window());

        let output = hold(&shared.output);
        let published = output.rings[0].len() as u64;
        assert_eq!(published, output.packets.total_frames());
        let consumed = 40_000 - hold(&shared.input).rings[0].len() as u64;
        assert_eq!(published, consumed);
    }

    #[test]
    fn second_window_carries_overlap() {
        let settings = settings_without_vad();
        let shared = shared_with_engine(1, &settings, MockEngine::new());
        let mut worker = worker_for(&shared, 16_000, 1);

        feed_packets(&shared, 1000, 40, 0.25);
        assert!(worker.process_window());
        let first_len = worker.last_window_frames;
        let carry = worker.overlap.frames();
        let expected_tail = worker.scratch[0][first_len - carry..first_len].to_vec();

        assert!(worker.process_window());
        assert_eq!(&worker.scratch[0][..carry], expected_tail.as_slice());
        // fresh frames fill the window up to needed, aligned to packets
        assert!(worker.last_window_frames <= worker.window_frames);
    }

    #[test]
    fn vad_gate_skips_inference_but_still_publishes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let settings = FilterSettings::default(); // vad on
        let engine = MockEngine::new()
            .with_transcript("should never run")
            .with_call_counter(calls.clone());
        let shared = shared_with_engine(1, &settings, engine);
        let mut worker = worker_for(&shared, 16_000, 1);

        feed_packets(&shared, 1000, 17, 0.0);
        assert!(worker.process_window());

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(hold(&shared.output).packets.len(), 16);
    }

    #[test]
    fn filler_verdict_zeroes_published_frames() {
        let settings = settings_without_vad();
        let engine = MockEngine::new().with_transcript("uh");
        let shared = shared_with_engine(1, &settings, engine);
        let mut worker = worker_for(&shared, 16_000, 1);

        feed_packets(&shared, 1000, 17, 1.0);
        assert!(worker.process_window());

        let mut output = hold(&shared.output);
        let frames = output.rings[0].len();
        let mut published = vec![0.0f32; frames];
        output.rings[0].pop_front(&mut published);
        assert!(published.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn beep_verdict_synthesizes_tone() {
        let settings = settings_without_vad();
        let engine = MockEngine::new().with_transcript("oh shit");
        let shared = shared_with_engine(1, &settings, engine);
        let mut worker = worker_for(&shared, 16_000, 1);

        feed_packets(&shared, 1000, 17, 1.0);
        assert!(worker.process_window());

        let mut output = hold(&shared.output);
        let mut published = vec![0.0f32; 32];
        output.rings[0].pop_front(&mut published);
        for (i, &sample) in published.iter().enumerate() {
            let expected = BEEP_AMPLITUDE
                * (2.0 * std::f32::consts::PI * BEEP_FREQUENCY_HZ * i as f32 / 16_000.0).sin();
            assert_eq!(sample, expected, "sample {i}");
        }
    }

    #[test]
    fn do_silence_off_leaves_audio_untouched() {
        let settings = FilterSettings {
            do_silence: false,
            vad_enabled: false,
            ..FilterSettings::default()
        };
        let engine = MockEngine::new().with_transcript("uh");
        let shared = shared_with_engine(1, &settings, engine);
        let mut worker = worker_for(&shared, 16_000, 1);

        feed_packets(&shared, 1000, 17, 0.75);
        assert!(worker.process_window());

        let mut output = hold(&shared.output);
        let frames = output.rings[0].len();
        let mut published = vec![0.0f32; frames];
        output.rings[0].pop_front(&mut published);
        assert!(published.iter().all(|&s| s == 0.75));
    }

    #[test]
    fn inference_failure_releases_engine_and_still_publishes() {
        let settings = settings_without_vad();
        let engine = MockEngine::new().with_failure_after(0);
        let shared = shared_with_engine(1, &settings, engine);
        let mut worker = worker_for(&shared, 16_000, 1);

        feed_packets(&shared, 1000, 17, 0.5);
        assert!(worker.process_window());

        assert!(hold(&shared.engine).engine.is_none());
        assert!(!shared.engine_loaded.load(Ordering::Acquire));
        // the window still went out, unmodified
        let output = hold(&shared.output);
        assert_eq!(output.packets.len(), 16);
    }

    #[test]
    fn stereo_windows_edit_every_channel() {
        let settings = settings_without_vad();
        let engine = MockEngine::new().with_transcript("um");
        let shared = shared_with_engine(2, &settings, engine);
        let mut worker = worker_for(&shared, 16_000, 2);

        feed_packets(&shared, 1000, 17, 1.0);
        assert!(worker.process_window());

        let mut output = hold(&shared.output);
        for ring_index in 0..2 {
            let frames = output.rings[ring_index].len();
            let mut published = vec![1.0f32; frames];
            output.rings[ring_index].pop_front(&mut published);
            assert!(
                published.iter().all(|&s| s == 0.0),
                "channel {ring_index} not silenced"
            );
        }
    }
}
