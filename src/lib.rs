#![forbid(unsafe_code)]

//! Animated GIF codec: median-cut color quantization, error-diffusion
//! dithering, and a streaming LZW-compressed container writer/reader.
//!
//! The encode pipeline runs per frame: raster -> [`ColorSet`] ->
//! [`median_cut`] -> [`Palette`] -> [`dither::map_indices`] -> LZW ->
//! container blocks. Decoding inverts it and reconstructs each output
//! raster through the disposal-method compositor ([`canvas::Canvas`]).
//!
//! ```
//! use zengif::{Decoder, Encoder, EncoderConfig, Repeat};
//!
//! let mut out = Vec::new();
//! let mut encoder =
//!     Encoder::new(&mut out, 2, 2, Repeat::Infinite, EncoderConfig::new()).unwrap();
//! let red = rgb::RGBA { r: 255, g: 0, b: 0, a: 255 };
//! encoder.add_frame(&vec![red; 4], 10).unwrap();
//! encoder.finish().unwrap();
//!
//! let mut decoder = Decoder::new(&out[..]);
//! let frame = decoder.next_frame().unwrap().unwrap();
//! assert_eq!((frame.width, frame.height), (2, 2));
//! ```

pub mod block;
pub mod canvas;
pub mod decoder;
pub mod dither;
pub mod encoder;
pub mod error;
pub mod histogram;
pub mod lzw;
pub mod median_cut;
pub mod palette;

pub use block::{DisposalMethod, Frame};
pub use decoder::Decoder;
pub use dither::{DitherLevel, DitherMode};
pub use encoder::{encode, Encoder};
pub use error::{DecodeError, EncodeError};
pub use histogram::ColorSet;
pub use median_cut::{median_cut, SplitPolicy};
pub use palette::Palette;

use std::io::Read;

/// How often an animation repeats after its first play-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    /// Repeat n more times. `Finite(0)` plays once and writes no loop
    /// metadata at all.
    Finite(u16),
    /// Loop forever (wire value 0 in the loop extension).
    Infinite,
}

impl Default for Repeat {
    fn default() -> Self {
        Repeat::Finite(0)
    }
}

/// Per-stream quantization and framing settings.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Maximum palette colors per frame (1..=256).
    pub max_colors: usize,
    /// Pixel-mapping mode.
    pub dither: DitherMode,
    /// Where median-cut boxes are split.
    pub split: SplitPolicy,
    /// Disposal method stamped on every encoded frame.
    pub disposal: DisposalMethod,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            max_colors: 256,
            dither: DitherMode::default(),
            split: SplitPolicy::default(),
            disposal: DisposalMethod::None,
        }
    }
}

impl EncoderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_colors(mut self, n: usize) -> Self {
        self.max_colors = n;
        self
    }

    pub fn dither(mut self, mode: DitherMode) -> Self {
        self.dither = mode;
        self
    }

    pub fn split(mut self, policy: SplitPolicy) -> Self {
        self.split = policy;
        self
    }

    pub fn disposal(mut self, disposal: DisposalMethod) -> Self {
        self.disposal = disposal;
        self
    }
}

/// Pull interface the encoder consumes: frames arrive one at a time and
/// each is fully written before the next is requested.
pub trait AnimationSource {
    /// Canvas size; every frame raster must match it.
    fn dimensions(&self) -> (u32, u32);

    /// Loop metadata for the stream.
    fn repeat(&self) -> Repeat {
        Repeat::Finite(0)
    }

    /// The next raster and its display delay in hundredths of a second, or
    /// `None` at the end. Returning `None` is also the cancellation point.
    fn next_frame(&mut self) -> Option<(Vec<rgb::RGBA<u8>>, u16)>;

    /// Rewind a restartable source. Optional.
    fn reset(&mut self) {}
}

/// Push interface the decoder drives with reconstructed rasters, in order.
pub trait AnimationSink {
    /// One composited canvas state and the frame's display delay.
    fn frame(&mut self, width: u16, height: u16, pixels: &[rgb::RGBA<u8>], delay_cs: u16);

    /// End of stream, with the loop count the stream declared.
    fn complete(&mut self, repeat: Repeat);
}

/// Quantize one RGBA raster: build the color set, reduce it, and map every
/// pixel to a palette index.
///
/// Fully transparent pixels get a dedicated transparent slot at index 0; a
/// raster that is transparent everywhere yields a palette of just that
/// slot.
pub fn quantize(
    pixels: &[rgb::RGBA<u8>],
    width: usize,
    height: usize,
    config: &EncoderConfig,
) -> Result<(Palette, Vec<u8>), EncodeError> {
    if width == 0 || height == 0 {
        return Err(EncodeError::ZeroDimension);
    }
    if pixels.len() != width * height {
        return Err(EncodeError::DimensionMismatch {
            len: pixels.len(),
            width,
            height,
        });
    }
    if config.max_colors == 0 || config.max_colors > 256 {
        return Err(EncodeError::UnsupportedColorCount(config.max_colors));
    }

    let set = ColorSet::build_sampled(pixels, width);
    let has_transparent = set.has_transparent();

    let palette = if set.is_empty() {
        if !has_transparent {
            return Err(EncodeError::EmptyInput);
        }
        Palette::new(Vec::new(), true)
    } else {
        // One slot is reserved for transparency when needed.
        let budget = if has_transparent {
            config.max_colors.saturating_sub(1).max(1)
        } else {
            config.max_colors
        };
        let colors = median_cut(set, budget, config.split)?;
        Palette::new(colors, has_transparent)
    };

    let indices = dither::map_indices(pixels, width, height, &palette, config.dither);
    Ok((palette, indices))
}

/// Decode a whole GIF stream into `sink` with default limits.
pub fn decode<R: Read, S: AnimationSink>(reader: R, sink: &mut S) -> Result<(), DecodeError> {
    Decoder::new(reader).decode(sink)
}
