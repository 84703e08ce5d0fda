use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Instant,
};

use tracing::info;

use crate::{
    error::TtsError,
    voice::{Voice, VoiceEngine},
};

// espeak-ng keeps process-wide state; only one phonemization may run at a time.
static PHONEMIZER: Mutex<()> = Mutex::new(());

fn phonemizer() -> MutexGuard<'static, ()> {
    PHONEMIZER.lock().unwrap_or_else(|e| e.into_inner())
}

/// Diagnostic timings of one synthesis call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthesisStats {
    pub real_time_factor: f64,
    pub infer_seconds: f64,
    pub audio_seconds: f64,
}

/// Interleaved 16-bit PCM plus the stats of the call that produced it.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub pcm: Vec<i16>,
    pub stats: SynthesisStats,
}

pub struct Synthesizer<E: VoiceEngine> {
    engine: Arc<E>,
}

impl<E: VoiceEngine> Synthesizer<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self { engine }
    }

    /// Run the engine on `text` and convert its output to 16-bit PCM in the
    /// voice's channel layout.
    pub fn synthesize(&self, voice: &Voice<E::Model>, text: &str) -> Result<Synthesis, TtsError> {
        let config = voice.config();
        let started = Instant::now();

        let samples = {
            let _guard = phonemizer();
            self.engine.infer(voice.model(), text)
        }
        .map_err(|source| TtsError::InferenceFailure {
            model_path: voice.model_path().to_string(),
            source,
        })?;

        let infer_seconds = started.elapsed().as_secs_f64();
        let channels = usize::from(config.channels.max(1));
        if samples.len() % channels != 0 {
            return Err(TtsError::InferenceFailure {
                model_path: voice.model_path().to_string(),
                source: anyhow::anyhow!(
                    "engine returned {} samples, not a multiple of {} channel(s)",
                    samples.len(),
                    channels
                ),
            });
        }

        let pcm = to_pcm16(&samples);
        let frames = pcm.len() / channels;
        let audio_seconds = if config.sample_rate > 0 {
            frames as f64 / f64::from(config.sample_rate)
        } else {
            0.0
        };
        let real_time_factor = if audio_seconds > 0.0 {
            infer_seconds / audio_seconds
        } else {
            0.0
        };
        let stats = SynthesisStats {
            real_time_factor,
            infer_seconds,
            audio_seconds,
        };
        info!(
            "Real-time factor: {:.3} (infer={:.3} sec, audio={:.3} sec)",
            stats.real_time_factor, stats.infer_seconds, stats.audio_seconds
        );

        Ok(Synthesis { pcm, stats })
    }
}

/// Clamp f32 [-1.0, 1.0] samples and convert them to i16.
pub fn to_pcm16(samples: &[f32]) -> Vec<i16> {
    const I16_MAX_F32: f32 = i16::MAX as f32;
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * I16_MAX_F32) as i16)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::AudioConfig;
    use std::path::Path;

    struct ScriptedEngine {
        samples: Vec<f32>,
    }

    impl VoiceEngine for ScriptedEngine {
        type Model = ();

        fn load(&self, _model_path: &Path, _config_path: &Path) -> anyhow::Result<((), AudioConfig)> {
            Ok(((), AudioConfig::mono_pcm16(10)))
        }

        fn infer(&self, _model: &(), text: &str) -> anyhow::Result<Vec<f32>> {
            if text == "fail" {
                anyhow::bail!("phonemizer rejected input");
            }
            Ok(self.samples.clone())
        }
    }

    fn voice(channels: u16) -> Voice<()> {
        let config = AudioConfig {
            sample_rate: 10,
            channels,
            sample_width: 2,
        };
        Voice::new("test.onnx", config, ())
    }

    #[test]
    fn test_to_pcm16_clamps() {
        assert_eq!(to_pcm16(&[0.0, 1.0, -1.0, 2.0, -3.0]), vec![0, 32767, -32767, 32767, -32767]);
        assert_eq!(to_pcm16(&[0.5])[0], 16383);
    }

    #[test]
    fn test_synthesize_reports_stats() {
        let engine = Arc::new(ScriptedEngine { samples: vec![0.25; 20] });
        let synth = Synthesizer::new(engine);

        let out = synth.synthesize(&voice(1), "hello").unwrap();
        assert_eq!(out.pcm.len(), 20);
        assert!((out.stats.audio_seconds - 2.0).abs() < 1e-9);
        assert!(out.stats.infer_seconds >= 0.0);
        assert!(out.stats.real_time_factor >= 0.0);
    }

    #[test]
    fn test_empty_output_has_zero_rtf() {
        let engine = Arc::new(ScriptedEngine { samples: Vec::new() });
        let synth = Synthesizer::new(engine);

        let out = synth.synthesize(&voice(1), "").unwrap();
        assert!(out.pcm.is_empty());
        assert_eq!(out.stats.audio_seconds, 0.0);
        assert_eq!(out.stats.real_time_factor, 0.0);
    }

    #[test]
    fn test_engine_error_is_inference_failure() {
        let engine = Arc::new(ScriptedEngine { samples: vec![0.0; 4] });
        let synth = Synthesizer::new(engine);

        let err = synth.synthesize(&voice(1), "fail").unwrap_err();
        assert!(matches!(err, TtsError::InferenceFailure { .. }));
        assert!(err.to_string().contains("test.onnx"));
    }

    #[test]
    fn test_channel_mismatch_is_rejected() {
        let engine = Arc::new(ScriptedEngine { samples: vec![0.0; 5] });
        let synth = Synthesizer::new(engine);

        let err = synth.synthesize(&voice(2), "hello").unwrap_err();
        assert!(matches!(err, TtsError::InferenceFailure { .. }));
    }
}
