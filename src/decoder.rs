//! Streaming GIF reader. Dispatches strictly on block introducer bytes;
//! foreign extensions are skipped by their declared sub-block lengths, never
//! rejected.

use std::io::Read;

use log::{debug, warn};
use rgb::RGBA;

use crate::block::{
    Frame, GraphicControl, ImageDesc, LogicalScreenDesc, INTRODUCER_EXTENSION, INTRODUCER_IMAGE,
    INTRODUCER_TRAILER, LABEL_APPLICATION, LABEL_COMMENT, LABEL_GRAPHIC_CONTROL, LABEL_PLAIN_TEXT,
    NETSCAPE_IDENT, SIGNATURE, VERSION_87A, VERSION_89A,
};
use crate::canvas::Canvas;
use crate::error::DecodeError;
use crate::lzw;
use crate::palette::Palette;
use crate::{AnimationSink, Repeat};

/// Extension payloads larger than this are junk, not metadata.
const MAX_EXTENSION_BYTES: usize = 1 << 16;

/// Interlaced frames store rows in four passes.
const INTERLACE_PASSES: [(usize, usize); 4] = [(0, 8), (4, 8), (2, 4), (1, 2)];

/// A GIF decoder over any byte source.
///
/// [`next_frame`](Decoder::next_frame) surfaces the mid-level indexed
/// frames exactly as written; [`decode`](Decoder::decode) additionally runs
/// the disposal compositor and pushes finished RGBA rasters into an
/// [`AnimationSink`].
pub struct Decoder<R: Read> {
    reader: R,
    max_frame_bytes: usize,
    screen: Option<LogicalScreenDesc>,
    global_palette: Option<Palette>,
    repeat: Repeat,
    pending_control: Option<GraphicControl>,
    done: bool,
}

impl<R: Read> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            max_frame_bytes: 1 << 25,
            screen: None,
            global_palette: None,
            repeat: Repeat::Finite(0),
            pending_control: None,
            done: false,
        }
    }

    /// Cap the per-frame pixel budget (bytes of index data) accepted before
    /// allocation. Frames over the cap fail with [`DecodeError::TooLarge`].
    pub fn max_frame_bytes(mut self, limit: usize) -> Self {
        self.max_frame_bytes = limit;
        self
    }

    /// Logical screen dimensions; reads the preamble on first use.
    pub fn dimensions(&mut self) -> Result<(u16, u16), DecodeError> {
        let screen = self.read_preamble()?;
        Ok((screen.width, screen.height))
    }

    /// The global color table, if the stream declared one.
    pub fn global_palette(&mut self) -> Result<Option<&Palette>, DecodeError> {
        self.read_preamble()?;
        Ok(self.global_palette.as_ref())
    }

    /// The loop-count metadata seen so far. Final once the stream has been
    /// fully consumed; the extension usually precedes the first frame.
    pub fn repeat(&self) -> Repeat {
        self.repeat
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let mut buf = [0u8; 1];
        self.reader
            .read_exact(&mut buf)
            .map_err(DecodeError::from_read)?;
        Ok(buf[0])
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, DecodeError> {
        let mut buf = vec![0u8; len];
        self.reader
            .read_exact(&mut buf)
            .map_err(DecodeError::from_read)?;
        Ok(buf)
    }

    fn read_preamble(&mut self) -> Result<LogicalScreenDesc, DecodeError> {
        if let Some(screen) = self.screen {
            return Ok(screen);
        }

        let mut header = [0u8; 6];
        self.reader
            .read_exact(&mut header)
            .map_err(DecodeError::from_read)?;
        if &header[..3] != SIGNATURE {
            return Err(DecodeError::BadSignature);
        }
        let version = [header[3], header[4], header[5]];
        if &version != VERSION_87A && &version != VERSION_89A {
            return Err(DecodeError::UnsupportedVersion(version));
        }

        let mut buf = [0u8; 7];
        self.reader
            .read_exact(&mut buf)
            .map_err(DecodeError::from_read)?;
        let screen = LogicalScreenDesc::parse(&buf);
        debug!(
            "screen {}x{} global_table={:?}",
            screen.width, screen.height, screen.global_table_size
        );

        if let Some(size) = screen.global_table_size {
            let table = self.read_bytes(3 << (size as usize + 1))?;
            self.global_palette = Some(Palette::from_table_bytes(&table));
        }
        self.screen = Some(screen);
        Ok(screen)
    }

    /// Concatenate length-prefixed sub-blocks up to the zero terminator.
    fn read_sub_blocks(&mut self, limit: usize) -> Result<Vec<u8>, DecodeError> {
        let mut data = Vec::new();
        loop {
            let len = self.read_u8()? as usize;
            if len == 0 {
                return Ok(data);
            }
            if data.len() + len > limit {
                return Err(DecodeError::TooLarge(data.len() + len));
            }
            data.extend_from_slice(&self.read_bytes(len)?);
        }
    }

    fn skip_sub_blocks(&mut self) -> Result<(), DecodeError> {
        loop {
            let len = self.read_u8()? as usize;
            if len == 0 {
                return Ok(());
            }
            self.read_bytes(len)?;
        }
    }

    /// The next indexed frame, or `None` at the trailer.
    ///
    /// Indices come back in natural row order; interlaced frames are
    /// reordered here. The frame's palette field holds only a local table;
    /// resolution against the global table is the caller's (or
    /// [`decode`](Decoder::decode)'s) concern.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        self.read_preamble()?;
        if self.done {
            return Ok(None);
        }

        loop {
            let introducer = self.read_u8()?;
            match introducer {
                INTRODUCER_EXTENSION => self.read_extension()?,
                INTRODUCER_IMAGE => return Ok(Some(self.read_image()?)),
                INTRODUCER_TRAILER => {
                    self.done = true;
                    return Ok(None);
                }
                other => return Err(DecodeError::UnknownBlock(other)),
            }
        }
    }

    fn read_extension(&mut self) -> Result<(), DecodeError> {
        let label = self.read_u8()?;
        match label {
            LABEL_GRAPHIC_CONTROL => {
                let data = self.read_sub_blocks(MAX_EXTENSION_BYTES)?;
                if data.len() < 4 {
                    return Err(DecodeError::TruncatedStream);
                }
                let control = GraphicControl::parse(&[data[0], data[1], data[2], data[3]]);
                debug!("graphic control {control:?}");
                self.pending_control = Some(control);
            }
            LABEL_APPLICATION => {
                let data = self.read_sub_blocks(MAX_EXTENSION_BYTES)?;
                if data.len() >= 14 && &data[..11] == NETSCAPE_IDENT && data[11] == 1 {
                    let count = u16::from_le_bytes([data[12], data[13]]);
                    self.repeat = match count {
                        0 => Repeat::Infinite,
                        n => Repeat::Finite(n),
                    };
                    debug!("loop count {:?}", self.repeat);
                } else {
                    debug!("skipping application extension ({} bytes)", data.len());
                }
            }
            LABEL_COMMENT | LABEL_PLAIN_TEXT => {
                self.skip_sub_blocks()?;
            }
            other => {
                // Forward compatibility: foreign extensions are dropped, not
                // rejected.
                warn!("skipping unknown extension 0x{other:02x}");
                self.skip_sub_blocks()?;
            }
        }
        Ok(())
    }

    fn read_image(&mut self) -> Result<Frame, DecodeError> {
        let mut buf = [0u8; 9];
        self.reader
            .read_exact(&mut buf)
            .map_err(DecodeError::from_read)?;
        let desc = ImageDesc::parse(&buf);
        debug!(
            "image {}x{}+{}+{} local_table={:?} interlaced={}",
            desc.width, desc.height, desc.left, desc.top, desc.local_table_size, desc.interlaced
        );

        let pixel_count = desc.width as usize * desc.height as usize;
        if pixel_count > self.max_frame_bytes {
            return Err(DecodeError::TooLarge(pixel_count));
        }

        let local_palette = match desc.local_table_size {
            Some(size) => {
                let table = self.read_bytes(3 << (size as usize + 1))?;
                Some(Palette::from_table_bytes(&table))
            }
            None => None,
        };

        let min_code_size = self.read_u8()?;
        let data = self.read_sub_blocks(2 * pixel_count + 1024)?;
        let indices = lzw::decompress(&data, min_code_size, pixel_count)?;
        if indices.len() != pixel_count {
            return Err(DecodeError::TruncatedFrame {
                expected: pixel_count,
                got: indices.len(),
            });
        }

        let control = self.pending_control.take().unwrap_or_default();
        let mut frame = Frame::new(desc.width, desc.height, indices);
        frame.left = desc.left;
        frame.top = desc.top;
        frame.palette = local_palette;
        frame.disposal = control.disposal;
        frame.transparent = control.transparent;
        frame.delay_cs = control.delay_cs;
        frame.interlaced = desc.interlaced;
        if desc.interlaced {
            frame.indices = deinterlace(&frame.indices, desc.width as usize, desc.height as usize);
        }
        Ok(frame)
    }

    /// Decode the whole stream: every frame is composited per its
    /// predecessor's disposal method and pushed into `sink`, followed by
    /// `complete` with the stream's loop count.
    pub fn decode<S: AnimationSink>(mut self, sink: &mut S) -> Result<(), DecodeError> {
        let screen = self.read_preamble()?;

        let background = match &self.global_palette {
            Some(palette) => {
                let [r, g, b] = palette.color(screen.background);
                RGBA { r, g, b, a: 255 }
            }
            None => RGBA {
                r: 0,
                g: 0,
                b: 0,
                a: 0,
            },
        };
        let mut canvas = Canvas::new(screen.width, screen.height, background);

        while let Some(frame) = self.next_frame()? {
            let palette = frame
                .palette
                .as_ref()
                .or(self.global_palette.as_ref())
                .ok_or(DecodeError::MissingPalette)?;
            canvas.compose(&frame, palette)?;
            sink.frame(screen.width, screen.height, canvas.pixels(), frame.delay_cs);
        }
        sink.complete(self.repeat);
        Ok(())
    }
}

/// Reorder interlaced rows (four passes: every 8th from 0, every 8th from
/// 4, every 4th from 2, every 2nd from 1) into natural order.
fn deinterlace(indices: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut out = vec![0u8; indices.len()];
    let mut src_row = 0;
    for (start, step) in INTERLACE_PASSES {
        let mut y = start;
        while y < height {
            out[y * width..][..width].copy_from_slice(&indices[src_row * width..][..width]);
            src_row += 1;
            y += step;
        }
    }
    out
}
