//! Shared fixtures for the dispatcher tests

#![allow(dead_code)]

use std::{
    io::{self, Write},
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use server::{
    frame::{read_frame, ResponseFrame},
    metrics::MetricsSnapshot,
    sink::OutputSink,
    Dispatcher,
};
use tokio::io::BufReader;
use tts_core::{AudioConfig, EncoderSettings, OggEncoder, SerialNumber, VoiceCache, VoiceEngine};

/// Voice engine producing a short tone per character of input.
///
/// Model paths containing `8bit` report one-byte samples, paths containing
/// `missing` fail to load, and text containing `FAIL` fails inference.
#[derive(Default)]
pub struct FakeEngine {
    pub loads: AtomicUsize,
}

impl FakeEngine {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl VoiceEngine for FakeEngine {
    type Model = String;

    fn load(&self, model_path: &Path, _config_path: &Path) -> anyhow::Result<(String, AudioConfig)> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let name = model_path.display().to_string();
        if name.contains("missing") {
            anyhow::bail!("model file not found: {name}");
        }
        let mut config = AudioConfig::mono_pcm16(16000);
        if name.contains("8bit") {
            config.sample_width = 1;
        }
        Ok((name, config))
    }

    fn infer(&self, _model: &String, text: &str) -> anyhow::Result<Vec<f32>> {
        if text.contains("FAIL") {
            anyhow::bail!("phonemizer rejected input");
        }
        let len = text.chars().count() * 400;
        Ok((0..len)
            .map(|i| 0.3 * (i as f32 * 440.0 * std::f32::consts::TAU / 16000.0).sin())
            .collect())
    }
}

/// Cloneable in-memory writer standing in for stdout.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn encoder() -> OggEncoder {
    OggEncoder::new(EncoderSettings {
        serial: SerialNumber::Fixed(1),
        ..EncoderSettings::default()
    })
}

pub struct FramedRun {
    pub frames: Vec<ResponseFrame>,
    pub metrics: MetricsSnapshot,
}

/// Feed `input` to a framed-mode dispatcher and parse everything it wrote.
pub async fn run_framed(engine: Arc<FakeEngine>, input: &str, encode_workers: usize) -> FramedRun {
    let out = SharedBuffer::default();
    let cache = Arc::new(VoiceCache::new(engine));
    let dispatcher = Dispatcher::new(cache, encoder(), OutputSink::framed(out.clone()), encode_workers);
    dispatcher.run(BufReader::new(input.as_bytes())).await;

    let bytes = out.contents();
    let mut reader = bytes.as_slice();
    let mut frames = Vec::new();
    while let Some(frame) = read_frame(&mut reader).expect("output is a clean frame sequence") {
        frames.push(frame);
    }
    FramedRun {
        frames,
        metrics: dispatcher.metrics().snapshot(),
    }
}

pub fn request(id: u32, model_path: &str, text: &str) -> String {
    serde_json::json!({ "id": id, "modelPath": model_path, "inputText": text }).to_string()
}
