//! PCM to Ogg/Vorbis conversion.
//!
//! Every call to [`OggEncoder::encode`] produces one complete, independently
//! decodable logical stream: its own serial number, header pages and
//! end-of-stream page.

mod codec;

use std::time::Instant;

use tracing::{info, warn};

use crate::{error::TtsError, voice::AudioConfig};
use codec::{Page, VorbisStream};

/// Default VBR quality, on libvorbis' -0.1..=1.0 scale.
pub const DEFAULT_QUALITY: f32 = 0.4;
/// Sample frames submitted to the analysis stage per call.
pub const DEFAULT_CHUNK_FRAMES: usize = 1024;

const ENCODER_TAG: &str = concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"));

/// Serial number assigned to each new logical stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialNumber {
    /// Fresh random serial per stream.
    Random,
    /// Same serial every time; output is then byte-for-byte reproducible.
    Fixed(i32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderSettings {
    pub quality: f32,
    pub chunk_frames: usize,
    pub serial: SerialNumber,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            chunk_frames: DEFAULT_CHUNK_FRAMES,
            serial: SerialNumber::Random,
        }
    }
}

/// A complete Ogg/Vorbis stream.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedAudio(Vec<u8>);

impl EncodedAudio {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl std::fmt::Debug for EncodedAudio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedAudio").field("len", &self.0.len()).finish()
    }
}

// Pages collected in drain order
#[derive(Default)]
struct PageBuffer {
    bytes: Vec<u8>,
    pages: usize,
    eos: bool,
}

impl PageBuffer {
    fn push(&mut self, page: Page<'_>) {
        self.bytes.extend_from_slice(page.header);
        self.bytes.extend_from_slice(page.body);
        self.pages += 1;
        if page.eos {
            self.eos = true;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OggEncoder {
    settings: EncoderSettings,
}

impl OggEncoder {
    pub fn new(settings: EncoderSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &EncoderSettings {
        &self.settings
    }

    /// Encode interleaved 16-bit PCM laid out as `config` describes.
    ///
    /// A trailing partial frame (fewer samples than channels) is dropped.
    /// Empty input still yields headers and a terminal page.
    pub fn encode(&self, config: &AudioConfig, pcm: &[i16]) -> Result<EncodedAudio, TtsError> {
        let started = Instant::now();
        let init_failed = |reason: String| TtsError::EncoderInitFailed {
            channels: config.channels,
            sample_rate: config.sample_rate,
            reason,
        };

        if config.channels == 0 {
            return Err(init_failed("channel count must be at least 1".to_string()));
        }
        if config.sample_rate == 0 || config.sample_rate > i32::MAX as u32 {
            return Err(init_failed("sample rate out of range".to_string()));
        }

        let serial = match self.settings.serial {
            SerialNumber::Random => rand::random::<i32>(),
            SerialNumber::Fixed(serial) => serial,
        };
        let mut stream = VorbisStream::new(
            config.channels,
            config.sample_rate,
            self.settings.quality,
            serial,
            ENCODER_TAG,
        )
        .map_err(init_failed)?;
        stream.write_headers().map_err(init_failed)?;

        let mut out = PageBuffer::default();

        // Headers go out on their own pages before any audio
        while let Some(page) = stream.flush_page() {
            out.push(page);
        }

        let channels = usize::from(config.channels);
        let frames = pcm.len() / channels;
        let chunk_len = self.settings.chunk_frames.max(1) * channels;

        for chunk in pcm[..frames * channels].chunks(chunk_len) {
            if out.eos {
                break;
            }
            submit(&mut stream, chunk, channels);
            drain(&mut stream, &mut out);
        }

        if !out.eos {
            // Zero-length write: flush the last block and mark end of stream
            stream.wrote(0);
            drain(&mut stream, &mut out);
        }

        if !out.eos {
            warn!("Vorbis stream drained without an end-of-stream page, flushing");
            while let Some(page) = stream.flush_page() {
                out.push(page);
            }
        }

        info!(
            "Converted to OGG in {:.3} second(s) ({} frames, {} pages, {} bytes)",
            started.elapsed().as_secs_f64(),
            frames,
            out.pages,
            out.bytes.len()
        );

        Ok(EncodedAudio(out.bytes))
    }
}

/// Uninterleave one chunk into the analysis buffer, scaled to [-1.0, 1.0).
fn submit(stream: &mut VorbisStream, chunk: &[i16], channels: usize) {
    let frames = chunk.len() / channels;
    if frames == 0 {
        return;
    }
    let mut planes = stream.analysis_buffer(frames);
    for (i, frame) in chunk.chunks_exact(channels).enumerate() {
        for (plane, &sample) in planes.iter_mut().zip(frame) {
            plane[i] = f32::from(sample) / 32768.0;
        }
    }
    stream.wrote(frames);
}

/// Encode every block the analysis stage has ready and move the resulting
/// pages into `out`, stopping page output at end of stream.
fn drain(stream: &mut VorbisStream, out: &mut PageBuffer) {
    while stream.block_out() {
        stream.analyze_block();

        while stream.weld_next_packet() {
            while !out.eos {
                match stream.page_out() {
                    Some(page) => out.push(page),
                    None => break,
                }
            }
        }
    }
}
