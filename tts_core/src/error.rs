use thiserror::Error;

/// Failures that drop a single request. None of them is fatal to the process.
#[derive(Debug, Error)]
pub enum TtsError {
    #[error("voice {model_path} has sample width {width} bytes, expected 2 (16-bit PCM)")]
    UnsupportedSampleWidth { model_path: String, width: u16 },

    #[error("failed to load voice {model_path}: {source}")]
    VoiceLoad {
        model_path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("synthesis failed for voice {model_path}: {source}")]
    InferenceFailure {
        model_path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("vorbis encoder init failed ({channels} channel(s) @ {sample_rate} Hz): {reason}")]
    EncoderInitFailed {
        channels: u16,
        sample_rate: u32,
        reason: String,
    },
}

/// Coarse category of a [`TtsError`], used for logging and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnsupportedSampleWidth,
    VoiceLoad,
    InferenceFailure,
    EncoderInitFailed,
}

impl TtsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TtsError::UnsupportedSampleWidth { .. } => ErrorKind::UnsupportedSampleWidth,
            TtsError::VoiceLoad { .. } => ErrorKind::VoiceLoad,
            TtsError::InferenceFailure { .. } => ErrorKind::InferenceFailure,
            TtsError::EncoderInitFailed { .. } => ErrorKind::EncoderInitFailed,
        }
    }
}
