use std::{fs, path::{Path, PathBuf}};

use anyhow::Context;
use serde::Deserialize;

/// Bytes per sample of signed 16-bit PCM, the only width the encoder accepts.
pub const PCM16_SAMPLE_WIDTH: u16 = 2;

/// Synthesis output format declared by a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Bytes per sample.
    pub sample_width: u16,
}

impl AudioConfig {
    pub fn mono_pcm16(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            sample_width: PCM16_SAMPLE_WIDTH,
        }
    }
}

/// The inference collaborator: loads voice models and turns text into samples.
///
/// Implementations are shared across the dispatching thread and encoder
/// workers, hence the `Send + Sync` bounds.
pub trait VoiceEngine: Send + Sync + 'static {
    type Model: Send + Sync + 'static;

    /// Load a model and report the audio format it synthesizes.
    fn load(&self, model_path: &Path, config_path: &Path) -> anyhow::Result<(Self::Model, AudioConfig)>;

    /// Synthesize `text`, returning interleaved samples in `[-1.0, 1.0]`.
    fn infer(&self, model: &Self::Model, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// A loaded voice, owned by the cache for the lifetime of the process.
pub struct Voice<M> {
    model_path: String,
    config: AudioConfig,
    model: M,
}

impl<M> Voice<M> {
    pub fn new(model_path: impl Into<String>, config: AudioConfig, model: M) -> Self {
        Self {
            model_path: model_path.into(),
            config,
            model,
        }
    }

    pub fn model_path(&self) -> &str {
        &self.model_path
    }

    pub fn config(&self) -> AudioConfig {
        self.config
    }

    pub fn model(&self) -> &M {
        &self.model
    }
}

// Manual Debug implementation since engine models rarely implement Debug
impl<M> std::fmt::Debug for Voice<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Voice")
            .field("model_path", &self.model_path)
            .field("config", &self.config)
            .field("model", &"<model>")
            .finish()
    }
}

/// Companion configuration file of a model: `<model>.json`.
pub fn config_path_for(model_path: &str) -> PathBuf {
    PathBuf::from(format!("{model_path}.json"))
}

#[derive(Deserialize)]
struct VoiceConfigFile {
    audio: AudioSection,
}

#[derive(Deserialize)]
struct AudioSection {
    sample_rate: u32,
    #[serde(default = "default_channels")]
    channels: u16,
    #[serde(default = "default_sample_width")]
    sample_width: u16,
}

fn default_channels() -> u16 {
    1
}

fn default_sample_width() -> u16 {
    PCM16_SAMPLE_WIDTH
}

/// Read the `audio` section of a voice config JSON.
pub fn read_audio_config<P: AsRef<Path>>(cfg_path: P) -> anyhow::Result<AudioConfig> {
    let text = fs::read_to_string(cfg_path.as_ref())
        .with_context(|| format!("Failed to read config file: {}", cfg_path.as_ref().display()))?;
    let parsed: VoiceConfigFile = serde_json::from_str(&text)
        .with_context(|| "Config file is missing a valid 'audio' section")?;

    Ok(AudioConfig {
        sample_rate: parsed.audio.sample_rate,
        channels: parsed.audio.channels,
        sample_width: parsed.audio.sample_width,
    })
}
