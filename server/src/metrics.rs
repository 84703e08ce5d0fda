// Per-run counters for the request loop

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tts_core::SynthesisStats;

use crate::error::DropReason;

#[derive(Debug, Default)]
pub struct DispatchMetrics {
    received: AtomicU64,
    emitted: AtomicU64,
    payload_bytes: AtomicU64,
    malformed: AtomicU64,
    unsupported_sample_width: AtomicU64,
    voice_load_failures: AtomicU64,
    inference_failures: AtomicU64,
    encoder_failures: AtomicU64,
    emit_failures: AtomicU64,
    worker_failures: AtomicU64,
    total_infer_ms: AtomicU64,
    total_audio_ms: AtomicU64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A well-formed request was accepted for processing.
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_synthesis(&self, stats: &SynthesisStats) {
        self.total_infer_ms
            .fetch_add((stats.infer_seconds * 1000.0) as u64, Ordering::Relaxed);
        self.total_audio_ms
            .fetch_add((stats.audio_seconds * 1000.0) as u64, Ordering::Relaxed);
    }

    pub fn record_emitted(&self, payload_len: usize) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
        self.payload_bytes.fetch_add(payload_len as u64, Ordering::Relaxed);
    }

    pub fn record_drop(&self, reason: DropReason) {
        let counter = match reason {
            DropReason::Malformed => &self.malformed,
            DropReason::UnsupportedSampleWidth => &self.unsupported_sample_width,
            DropReason::VoiceLoad => &self.voice_load_failures,
            DropReason::InferenceFailure => &self.inference_failures,
            DropReason::EncoderInitFailed => &self.encoder_failures,
            DropReason::Emit => &self.emit_failures,
            DropReason::Worker => &self.worker_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Inference time over audio time across all synthesized requests.
    pub fn overall_real_time_factor(&self) -> f64 {
        let audio = self.total_audio_ms.load(Ordering::Relaxed);
        if audio == 0 {
            return 0.0;
        }
        self.total_infer_ms.load(Ordering::Relaxed) as f64 / audio as f64
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
            payload_bytes: self.payload_bytes.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            unsupported_sample_width: self.unsupported_sample_width.load(Ordering::Relaxed),
            voice_load_failures: self.voice_load_failures.load(Ordering::Relaxed),
            inference_failures: self.inference_failures.load(Ordering::Relaxed),
            encoder_failures: self.encoder_failures.load(Ordering::Relaxed),
            emit_failures: self.emit_failures.load(Ordering::Relaxed),
            worker_failures: self.worker_failures.load(Ordering::Relaxed),
            real_time_factor: self.overall_real_time_factor(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub received: u64,
    pub emitted: u64,
    pub payload_bytes: u64,
    pub malformed: u64,
    pub unsupported_sample_width: u64,
    pub voice_load_failures: u64,
    pub inference_failures: u64,
    pub encoder_failures: u64,
    pub emit_failures: u64,
    pub worker_failures: u64,
    pub real_time_factor: f64,
}

impl MetricsSnapshot {
    /// Requests that never produced a response, malformed lines included.
    pub fn dropped(&self) -> u64 {
        self.malformed
            + self.unsupported_sample_width
            + self.voice_load_failures
            + self.inference_failures
            + self.encoder_failures
            + self.emit_failures
            + self.worker_failures
    }
}
