//! Text-to-speech core: voice loading and caching, synthesis, and streaming
//! Ogg/Vorbis encoding of the synthesized PCM.

pub mod cache;
pub mod error;
pub mod ogg;
pub mod piper;
pub mod synth;
pub mod voice;

pub use cache::VoiceCache;
pub use error::{ErrorKind, TtsError};
pub use ogg::{EncodedAudio, EncoderSettings, OggEncoder, SerialNumber};
pub use piper::PiperEngine;
pub use synth::{Synthesis, SynthesisStats, Synthesizer};
pub use voice::{AudioConfig, Voice, VoiceEngine};
