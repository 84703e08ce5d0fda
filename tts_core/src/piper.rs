//! Production [`VoiceEngine`] backed by `piper-rs`.

use std::path::{Path, PathBuf};

use piper_rs::synth::{PiperSpeechStreamParallel, PiperSpeechSynthesizer};
use tracing::info;

use crate::voice::{read_audio_config, AudioConfig, VoiceEngine};

/// Environment variable the espeak-ng phonemizer reads its data directory from.
pub const ESPEAK_DATA_ENV: &str = "PIPER_ESPEAKNG_DATA_DIRECTORY";

#[derive(Debug)]
pub struct PiperEngine {
    espeak_data_path: PathBuf,
}

impl PiperEngine {
    /// Initialize the shared inference subsystem.
    ///
    /// Fails when the espeak-ng data directory does not exist; nothing can be
    /// phonemized without it.
    pub fn new<P: AsRef<Path>>(espeak_data_path: P) -> anyhow::Result<Self> {
        let espeak_data_path = espeak_data_path.as_ref().to_path_buf();
        if !espeak_data_path.is_dir() {
            return Err(anyhow::anyhow!(
                "espeak-ng data directory not found: {}",
                espeak_data_path.display()
            ));
        }
        std::env::set_var(ESPEAK_DATA_ENV, &espeak_data_path);
        info!("Using espeak-ng data at {}", espeak_data_path.display());

        Ok(Self { espeak_data_path })
    }

    pub fn espeak_data_path(&self) -> &Path {
        &self.espeak_data_path
    }
}

impl VoiceEngine for PiperEngine {
    type Model = PiperSpeechSynthesizer;

    fn load(&self, model_path: &Path, config_path: &Path) -> anyhow::Result<(Self::Model, AudioConfig)> {
        if !model_path.is_file() {
            return Err(anyhow::anyhow!("model file not found: {}", model_path.display()));
        }
        let config = read_audio_config(config_path)?;
        let model = piper_rs::from_config_path(config_path)
            .map_err(|e| anyhow::anyhow!("piper load error: {e}"))?;
        let synth = PiperSpeechSynthesizer::new(model)?;

        Ok((synth, config))
    }

    fn infer(&self, model: &Self::Model, text: &str) -> anyhow::Result<Vec<f32>> {
        let iter: PiperSpeechStreamParallel = model
            .synthesize_parallel(text.to_string(), None)
            .map_err(|e| anyhow::anyhow!("piper synth error: {e}"))?;

        let mut samples: Vec<f32> = Vec::new();
        for part in iter {
            samples.extend(
                part.map_err(|e| anyhow::anyhow!("chunk error: {e}"))?
                    .into_vec(),
            );
        }
        Ok(samples)
    }
}
