use std::io;

use thiserror::Error;

/// Errors raised while quantizing or writing a GIF stream.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("frame dimensions cannot be zero")]
    ZeroDimension,

    #[error("pixel buffer length {len} does not match dimensions {width}x{height}")]
    DimensionMismatch {
        len: usize,
        width: usize,
        height: usize,
    },

    #[error("palette size must be between 1 and 256, got {0}")]
    UnsupportedColorCount(usize),

    #[error("no colors to build a palette from")]
    EmptyInput,

    #[error("canvas dimensions {0}x{1} exceed the format's 16-bit limit")]
    TooLarge(usize, usize),

    #[error("frame has no palette and no global color table was written")]
    NoPalette,

    /// The sink failed mid-write. `bytes_written` counts everything flushed
    /// before the failure, so a caller on a non-seekable sink can decide to
    /// truncate or discard the partial output.
    #[error("write failed after {bytes_written} bytes")]
    Io {
        #[source]
        source: io::Error,
        bytes_written: u64,
    },
}

/// Errors raised while reading a GIF stream.
///
/// Unknown or foreign extension blocks are never errors; the reader skips
/// them by their declared sub-block lengths.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("GIF signature not found")]
    BadSignature,

    #[error("unsupported GIF version {:?}", String::from_utf8_lossy(.0))]
    UnsupportedVersion([u8; 3]),

    #[error("unexpected end of stream")]
    TruncatedStream,

    #[error("frame declared {expected} pixels but the data stream held {got}")]
    TruncatedFrame { expected: usize, got: usize },

    #[error("frame has no local color table and the stream has no global one")]
    MissingPalette,

    #[error("frame of {0} bytes exceeds the decoder's size limit")]
    TooLarge(usize),

    #[error("invalid LZW minimum code size {0}")]
    InvalidCodeSize(u8),

    #[error("LZW code {0} references a table entry that does not exist")]
    InvalidLzwCode(u16),

    #[error("unknown block introducer 0x{0:02x}")]
    UnknownBlock(u8),

    #[error("frame bounds lie outside the logical screen")]
    FrameOutOfBounds,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl DecodeError {
    /// Fold `UnexpectedEof` into the format-level truncation error; every
    /// other I/O failure passes through untouched.
    pub(crate) fn from_read(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            DecodeError::TruncatedStream
        } else {
            DecodeError::Io(err)
        }
    }
}
