//! Streaming GIF writer. The container is append-only with no random
//! access, so each frame's blocks are fully flushed before the next frame
//! is requested.

use std::io::Write;

use log::debug;

use crate::block::{
    Frame, GraphicControl, ImageDesc, LogicalScreenDesc, INTRODUCER_EXTENSION, INTRODUCER_IMAGE,
    INTRODUCER_TRAILER, LABEL_APPLICATION, LABEL_GRAPHIC_CONTROL, NETSCAPE_IDENT, SIGNATURE,
    VERSION_89A,
};
use crate::error::EncodeError;
use crate::lzw;
use crate::palette::Palette;
use crate::{quantize, AnimationSource, EncoderConfig, Repeat};

/// A GIF encoder over any byte sink.
///
/// The first frame's palette becomes the global color table; later frames
/// carry their own quantized palette as a local table. Validation happens
/// before any of a frame's bytes are flushed; once a write fails, the error
/// reports how many bytes already reached the sink.
pub struct Encoder<W: Write> {
    sink: W,
    width: u16,
    height: u16,
    repeat: Repeat,
    config: EncoderConfig,
    bytes_written: u64,
    preamble_done: bool,
    global_code_size: u8,
    frames_written: u64,
}

impl<W: Write> Encoder<W> {
    /// Create an encoder for a canvas of the given size. Nothing is written
    /// until the first frame arrives, since the screen descriptor carries
    /// that frame's color table.
    pub fn new(
        sink: W,
        width: u32,
        height: u32,
        repeat: Repeat,
        config: EncoderConfig,
    ) -> Result<Self, EncodeError> {
        if width == 0 || height == 0 {
            return Err(EncodeError::ZeroDimension);
        }
        if width > u16::MAX as u32 || height > u16::MAX as u32 {
            return Err(EncodeError::TooLarge(width as usize, height as usize));
        }
        Ok(Self {
            sink,
            width: width as u16,
            height: height as u16,
            repeat,
            config,
            bytes_written: 0,
            preamble_done: false,
            global_code_size: 0,
            frames_written: 0,
        })
    }

    /// Bytes flushed to the sink so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn put(&mut self, buf: &[u8]) -> Result<(), EncodeError> {
        match self.sink.write_all(buf) {
            Ok(()) => {
                self.bytes_written += buf.len() as u64;
                Ok(())
            }
            Err(source) => Err(EncodeError::Io {
                source,
                bytes_written: self.bytes_written,
            }),
        }
    }

    /// Quantize a full-canvas RGBA raster and append it as one frame.
    ///
    /// Runs the whole per-frame pipeline: color sampling, median-cut
    /// reduction, index mapping, LZW compression, block writing.
    pub fn add_frame(&mut self, pixels: &[rgb::RGBA<u8>], delay_cs: u16) -> Result<(), EncodeError> {
        let (width, height) = (self.width as usize, self.height as usize);
        if pixels.len() != width * height {
            return Err(EncodeError::DimensionMismatch {
                len: pixels.len(),
                width,
                height,
            });
        }

        let (palette, indices) = quantize(pixels, width, height, &self.config)?;
        let mut frame = Frame::new(self.width, self.height, indices);
        frame.transparent = palette.transparent_index();
        frame.palette = Some(palette);
        frame.disposal = self.config.disposal;
        frame.delay_cs = delay_cs;
        self.write_frame(&frame)
    }

    /// Append a pre-indexed frame.
    ///
    /// The first frame must carry a palette (it becomes the global table and
    /// no local table is written for it); later frames without one fall back
    /// to that global table. Frames marked interlaced must already hold
    /// their rows in interlace order.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<(), EncodeError> {
        if frame.width == 0 || frame.height == 0 {
            return Err(EncodeError::ZeroDimension);
        }
        if frame.indices.len() != frame.pixel_count() {
            return Err(EncodeError::DimensionMismatch {
                len: frame.indices.len(),
                width: frame.width as usize,
                height: frame.height as usize,
            });
        }
        if let Some(palette) = &frame.palette {
            if palette.is_empty() || palette.len() > 256 {
                return Err(EncodeError::UnsupportedColorCount(palette.len()));
            }
        }

        let local_palette = if self.preamble_done {
            frame.palette.as_ref()
        } else {
            // First frame: its palette becomes the global color table.
            let palette = frame.palette.as_ref().ok_or(EncodeError::NoPalette)?;
            self.write_preamble(palette)?;
            None
        };

        let control = GraphicControl {
            disposal: frame.disposal,
            transparent: frame.transparent,
            delay_cs: frame.delay_cs,
        };
        self.put(&[INTRODUCER_EXTENSION, LABEL_GRAPHIC_CONTROL, 4])?;
        self.put(&control.to_bytes())?;
        self.put(&[0])?;

        let desc = ImageDesc {
            left: frame.left,
            top: frame.top,
            width: frame.width,
            height: frame.height,
            local_table_size: local_palette.map(|p| p.size_flag()),
            interlaced: frame.interlaced,
        };
        self.put(&[INTRODUCER_IMAGE])?;
        self.put(&desc.to_bytes())?;
        if let Some(palette) = local_palette {
            let table = palette.table_bytes();
            self.put(&table)?;
        }

        // The frame's effective palette dictates the code size; a palette-
        // less frame inherited the global table written in the preamble.
        let code_size = match &frame.palette {
            Some(p) => p.min_code_size(),
            None => self.global_code_size,
        };
        let compressed = lzw::compress(&frame.indices, code_size);
        self.put(&[code_size])?;
        for chunk in compressed.chunks(255) {
            self.put(&[chunk.len() as u8])?;
            self.put(chunk)?;
        }
        self.put(&[0])?;

        self.frames_written += 1;
        debug!(
            "frame {}: {}x{}+{}+{} palette={} compressed={}B",
            self.frames_written,
            frame.width,
            frame.height,
            frame.left,
            frame.top,
            frame.palette.as_ref().map_or(0, Palette::len),
            compressed.len(),
        );
        Ok(())
    }

    fn write_preamble(&mut self, palette: &Palette) -> Result<(), EncodeError> {
        self.put(SIGNATURE)?;
        self.put(VERSION_89A)?;

        let screen = LogicalScreenDesc {
            width: self.width,
            height: self.height,
            global_table_size: Some(palette.size_flag()),
            background: 0,
            aspect: 0,
        };
        self.put(&screen.to_bytes())?;
        let table = palette.table_bytes();
        self.put(&table)?;
        self.global_code_size = palette.min_code_size();

        match self.repeat {
            Repeat::Finite(0) => {}
            repeat => {
                let count = match repeat {
                    Repeat::Infinite => 0u16,
                    Repeat::Finite(n) => n,
                };
                self.put(&[INTRODUCER_EXTENSION, LABEL_APPLICATION, 11])?;
                self.put(NETSCAPE_IDENT)?;
                let c = count.to_le_bytes();
                self.put(&[3, 1, c[0], c[1], 0])?;
            }
        }

        self.preamble_done = true;
        Ok(())
    }

    /// Write the trailer, flush, and hand the sink back.
    pub fn finish(mut self) -> Result<W, EncodeError> {
        self.put(&[INTRODUCER_TRAILER])?;
        let bytes_written = self.bytes_written;
        self.sink.flush().map_err(|source| EncodeError::Io {
            source,
            bytes_written,
        })?;
        Ok(self.sink)
    }
}

/// Pull every frame out of `source` and encode the whole stream.
///
/// Returns the total bytes written. The source is the cancellation point:
/// each frame is fully flushed before the next is requested, so a source
/// that stops returning frames ends the stream cleanly.
pub fn encode<S, W>(source: &mut S, sink: W, config: &EncoderConfig) -> Result<u64, EncodeError>
where
    S: AnimationSource,
    W: Write,
{
    let (width, height) = source.dimensions();
    let mut encoder = Encoder::new(sink, width, height, source.repeat(), config.clone())?;
    let mut frames = 0u64;
    while let Some((pixels, delay_cs)) = source.next_frame() {
        encoder.add_frame(&pixels, delay_cs)?;
        frames += 1;
    }
    if frames == 0 {
        return Err(EncodeError::EmptyInput);
    }
    let bytes = encoder.bytes_written() + 1; // trailer
    encoder.finish()?;
    Ok(bytes)
}
