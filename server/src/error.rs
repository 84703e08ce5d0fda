use thiserror::Error;
use tts_core::{ErrorKind, TtsError};

/// Why a request produced no response frame.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Malformed request: {0}")]
    Malformed(String),

    #[error(transparent)]
    Tts(#[from] TtsError),

    #[error("Failed to emit response {id}: {source}")]
    Emit {
        id: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// Counter bucket for a dropped request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Malformed,
    UnsupportedSampleWidth,
    VoiceLoad,
    InferenceFailure,
    EncoderInitFailed,
    Emit,
    Worker,
}

impl RequestError {
    pub fn reason(&self) -> DropReason {
        match self {
            RequestError::Malformed(_) => DropReason::Malformed,
            RequestError::Tts(e) => match e.kind() {
                ErrorKind::UnsupportedSampleWidth => DropReason::UnsupportedSampleWidth,
                ErrorKind::VoiceLoad => DropReason::VoiceLoad,
                ErrorKind::InferenceFailure => DropReason::InferenceFailure,
                ErrorKind::EncoderInitFailed => DropReason::EncoderInitFailed,
            },
            RequestError::Emit { .. } => DropReason::Emit,
            RequestError::Worker(_) => DropReason::Worker,
        }
    }
}
