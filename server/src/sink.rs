use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use tracing::info;
use tts_core::EncodedAudio;

use crate::frame::write_frame;

/// Where finished audio goes.
#[derive(Debug)]
pub enum OutputSink<W> {
    /// Length-prefixed, id-tagged frames on one binary stream.
    Framed(W),
    /// One `<id>.ogg` file per request, for interactive use.
    Files { dir: PathBuf },
}

impl<W: Write> OutputSink<W> {
    pub fn framed(writer: W) -> Self {
        OutputSink::Framed(writer)
    }

    pub fn files(dir: impl Into<PathBuf>) -> Self {
        OutputSink::Files { dir: dir.into() }
    }

    pub fn emit(&mut self, id: u32, audio: &EncodedAudio) -> io::Result<()> {
        match self {
            OutputSink::Framed(writer) => {
                write_frame(writer, id, audio.as_bytes())?;
                info!("Wrote frame for id {} with output size {}", id, audio.len());
            }
            OutputSink::Files { dir } => {
                let path = file_for(dir, id);
                fs::write(&path, audio.as_bytes())?;
                info!("Wrote {} ({} bytes)", path.display(), audio.len());
            }
        }
        Ok(())
    }
}

/// Output file of a request in files mode.
pub fn file_for(dir: &Path, id: u32) -> PathBuf {
    dir.join(format!("{id}.ogg"))
}
