//! Safe wrapper over the libvorbis analysis API and the libogg stream layer.
//!
//! All `unsafe` for the encoder lives here. The codec structs reference each
//! other by pointer (`dsp -> info`, `block -> dsp`), so they are boxed once
//! and never moved.

use std::{
    ffi::CString,
    mem,
    os::raw::{c_int, c_long},
    ptr, slice,
};

use tracing::warn;

use aotuv_lancer_vorbis_sys::{
    vorbis_analysis, vorbis_analysis_blockout, vorbis_analysis_buffer, vorbis_analysis_headerout,
    vorbis_analysis_init, vorbis_analysis_wrote, vorbis_bitrate_addblock,
    vorbis_bitrate_flushpacket, vorbis_block, vorbis_block_clear, vorbis_block_init,
    vorbis_comment, vorbis_comment_add_tag, vorbis_comment_clear, vorbis_comment_init,
    vorbis_dsp_clear, vorbis_dsp_state, vorbis_encode_init_vbr, vorbis_info, vorbis_info_clear,
    vorbis_info_init,
};
use ogg_next_sys::{
    ogg_packet, ogg_page, ogg_page_eos, ogg_stream_clear, ogg_stream_flush, ogg_stream_init,
    ogg_stream_packetin, ogg_stream_pageout, ogg_stream_state,
};

struct RawState {
    info: vorbis_info,
    comment: vorbis_comment,
    dsp: vorbis_dsp_state,
    block: vorbis_block,
    stream: ogg_stream_state,
}

// Which parts of RawState need clearing on drop
#[derive(Default)]
struct Live {
    info: bool,
    comment: bool,
    dsp: bool,
    block: bool,
    stream: bool,
}

/// One page drained from the logical stream. Borrowed from libogg's
/// internal buffers until the next call on the stream.
pub(crate) struct Page<'a> {
    pub header: &'a [u8],
    pub body: &'a [u8],
    pub eos: bool,
}

/// Encoder state for exactly one logical Ogg/Vorbis stream.
pub(crate) struct VorbisStream {
    raw: Box<RawState>,
    live: Live,
    channels: usize,
}

impl VorbisStream {
    /// Set up a VBR encoder, its comment header and the logical stream.
    pub(crate) fn new(
        channels: u16,
        sample_rate: u32,
        quality: f32,
        serial: i32,
        encoder_tag: &str,
    ) -> Result<Self, String> {
        let tag = CString::new("ENCODER").map_err(|e| e.to_string())?;
        let contents = CString::new(encoder_tag).map_err(|e| e.to_string())?;

        // SAFETY: these are plain C structs; all-zero is a valid pre-init state
        // and each one is initialized by its libvorbis/libogg init call below.
        let raw: Box<RawState> = Box::new(unsafe { mem::zeroed() });
        let mut this = Self {
            raw,
            live: Live::default(),
            channels: usize::from(channels),
        };
        let raw = &mut *this.raw;

        unsafe {
            vorbis_info_init(&mut raw.info);
            this.live.info = true;

            let ret = vorbis_encode_init_vbr(
                &mut raw.info,
                c_long::from(channels),
                sample_rate as c_long,
                quality,
            );
            if ret != 0 {
                return Err(format!("vorbis_encode_init_vbr failed with {ret}"));
            }

            vorbis_comment_init(&mut raw.comment);
            this.live.comment = true;
            vorbis_comment_add_tag(&mut raw.comment, tag.as_ptr(), contents.as_ptr());

            let ret = vorbis_analysis_init(&mut raw.dsp, &mut raw.info);
            if ret != 0 {
                return Err(format!("vorbis_analysis_init failed with {ret}"));
            }
            this.live.dsp = true;

            let ret = vorbis_block_init(&mut raw.dsp, &mut raw.block);
            if ret != 0 {
                return Err(format!("vorbis_block_init failed with {ret}"));
            }
            this.live.block = true;

            let ret = ogg_stream_init(&mut raw.stream, serial as c_int);
            if ret != 0 {
                return Err(format!("ogg_stream_init failed with {ret}"));
            }
            this.live.stream = true;
        }

        Ok(this)
    }

    /// Build the identification, comment and codebook packets and weld them
    /// into the stream. They stay buffered until flushed.
    pub(crate) fn write_headers(&mut self) -> Result<(), String> {
        let raw = &mut *self.raw;
        unsafe {
            let mut ident: ogg_packet = mem::zeroed();
            let mut comment: ogg_packet = mem::zeroed();
            let mut codebook: ogg_packet = mem::zeroed();

            let ret = vorbis_analysis_headerout(
                &mut raw.dsp,
                &mut raw.comment,
                &mut ident,
                &mut comment,
                &mut codebook,
            );
            if ret != 0 {
                return Err(format!("vorbis_analysis_headerout failed with {ret}"));
            }
            for packet in [&mut ident, &mut comment, &mut codebook] {
                if ogg_stream_packetin(&mut raw.stream, packet) != 0 {
                    return Err("ogg_stream_packetin rejected a header packet".to_string());
                }
            }
        }
        Ok(())
    }

    /// Force out a page even if it is not full.
    pub(crate) fn flush_page(&mut self) -> Option<Page<'_>> {
        unsafe {
            let mut page: ogg_page = mem::zeroed();
            if ogg_stream_flush(&mut self.raw.stream, &mut page) == 0 {
                return None;
            }
            Some(Page::from_raw(&page))
        }
    }

    /// Take the next complete page, if libogg has one.
    pub(crate) fn page_out(&mut self) -> Option<Page<'_>> {
        unsafe {
            let mut page: ogg_page = mem::zeroed();
            if ogg_stream_pageout(&mut self.raw.stream, &mut page) == 0 {
                return None;
            }
            Some(Page::from_raw(&page))
        }
    }

    /// Planar input buffers for `frames` sample frames, one slice per channel.
    /// `frames` must be non-zero.
    pub(crate) fn analysis_buffer(&mut self, frames: usize) -> Vec<&mut [f32]> {
        let channels = self.channels;
        unsafe {
            let buffer = vorbis_analysis_buffer(&mut self.raw.dsp, frames as c_int);
            (0..channels)
                .map(|ch| slice::from_raw_parts_mut(*buffer.add(ch), frames))
                .collect()
        }
    }

    /// Report how many frames of the analysis buffer were filled. Zero marks
    /// the end of input.
    pub(crate) fn wrote(&mut self, frames: usize) {
        unsafe {
            vorbis_analysis_wrote(&mut self.raw.dsp, frames as c_int);
        }
    }

    /// Take the next analysis block, if one is ready.
    pub(crate) fn block_out(&mut self) -> bool {
        let raw = &mut *self.raw;
        unsafe { vorbis_analysis_blockout(&mut raw.dsp, &mut raw.block) == 1 }
    }

    /// Analyze the current block with bitrate management.
    pub(crate) fn analyze_block(&mut self) {
        let raw = &mut *self.raw;
        unsafe {
            vorbis_analysis(&mut raw.block, ptr::null_mut());
            vorbis_bitrate_addblock(&mut raw.block);
        }
    }

    /// Weld the next packet the bitrate stage releases into the stream.
    /// Returns false when none is pending.
    pub(crate) fn weld_next_packet(&mut self) -> bool {
        let raw = &mut *self.raw;
        unsafe {
            let mut packet: ogg_packet = mem::zeroed();
            if vorbis_bitrate_flushpacket(&mut raw.dsp, &mut packet) <= 0 {
                return false;
            }
            let ret = ogg_stream_packetin(&mut raw.stream, &mut packet);
            if ret != 0 {
                warn!("ogg_stream_packetin rejected audio packet {} ({ret})", packet.packetno);
            }
        }
        true
    }
}

impl Drop for VorbisStream {
    fn drop(&mut self) {
        let raw = &mut *self.raw;
        // vorbis_info_clear must come last
        unsafe {
            if self.live.stream {
                ogg_stream_clear(&mut raw.stream);
            }
            if self.live.block {
                vorbis_block_clear(&mut raw.block);
            }
            if self.live.dsp {
                vorbis_dsp_clear(&mut raw.dsp);
            }
            if self.live.comment {
                vorbis_comment_clear(&mut raw.comment);
            }
            if self.live.info {
                vorbis_info_clear(&mut raw.info);
            }
        }
    }
}

impl<'a> Page<'a> {
    /// SAFETY: `page` must have just been filled by libogg and the stream it
    /// came from must not be touched while the result is alive.
    unsafe fn from_raw(page: &ogg_page) -> Page<'a> {
        Page {
            header: bytes(page.header, page.header_len),
            body: bytes(page.body, page.body_len),
            eos: ogg_page_eos(page) != 0,
        }
    }
}

unsafe fn bytes<'a>(data: *const u8, len: c_long) -> &'a [u8] {
    if data.is_null() || len <= 0 {
        return &[];
    }
    slice::from_raw_parts(data, len as usize)
}
