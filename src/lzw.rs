//! Variable-bit-width LZW over palette-index streams.
//!
//! Codes are packed LSB-first across byte boundaries. The code width starts
//! at `min_code_size + 1` bits and grows with the translation table up to 12
//! bits; a clear code resets the table and width. The translation table is
//! owned by one compress/decompress call and dropped with it.

use std::collections::HashMap;

use crate::error::DecodeError;

/// Maximum code width the format allows.
pub const MAX_CODE_SIZE: u8 = 12;

const MAX_TABLE: u16 = 1 << MAX_CODE_SIZE;

/// Accumulates codes LSB-first into bytes.
struct BitWriter {
    out: Vec<u8>,
    acc: u32,
    nbits: u8,
}

impl BitWriter {
    fn new() -> Self {
        Self {
            out: Vec::new(),
            acc: 0,
            nbits: 0,
        }
    }

    fn write(&mut self, code: u16, width: u8) {
        self.acc |= (code as u32) << self.nbits;
        self.nbits += width;
        while self.nbits >= 8 {
            self.out.push(self.acc as u8);
            self.acc >>= 8;
            self.nbits -= 8;
        }
    }

    fn finish(mut self) -> Vec<u8> {
        if self.nbits > 0 {
            self.out.push(self.acc as u8);
        }
        self.out
    }
}

/// Reads codes LSB-first from a byte slice.
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    acc: u32,
    nbits: u8,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            acc: 0,
            nbits: 0,
        }
    }

    /// The next `width`-bit code, or `None` once the stream runs dry.
    fn read(&mut self, width: u8) -> Option<u16> {
        while self.nbits < width {
            let byte = *self.data.get(self.pos)?;
            self.acc |= (byte as u32) << self.nbits;
            self.nbits += 8;
            self.pos += 1;
        }
        let code = (self.acc & ((1 << width) - 1)) as u16;
        self.acc >>= width;
        self.nbits -= width;
        Some(code)
    }
}

/// Compress a palette-index stream.
///
/// Emits a leading clear code, data codes, and a trailing end code. When the
/// table reaches 4096 entries a clear code is emitted and the table resets;
/// the width-growth schedule mirrors [`decompress`] exactly.
pub fn compress(indices: &[u8], min_code_size: u8) -> Vec<u8> {
    debug_assert!((2..=8).contains(&min_code_size));

    let clear_code: u16 = 1 << min_code_size;
    let eoi_code: u16 = clear_code + 1;
    let mut width = min_code_size + 1;
    let mut next_code = eoi_code + 1;
    let mut table: HashMap<(u16, u8), u16> = HashMap::new();

    let mut out = BitWriter::new();
    out.write(clear_code, width);

    let Some((&first, rest)) = indices.split_first() else {
        out.write(eoi_code, width);
        return out.finish();
    };
    debug_assert!(u16::from(first) < clear_code);
    let mut prev = u16::from(first);

    for &sym in rest {
        debug_assert!(u16::from(sym) < clear_code);
        if let Some(&code) = table.get(&(prev, sym)) {
            prev = code;
            continue;
        }

        out.write(prev, width);
        if next_code < MAX_TABLE {
            // The decoder's table runs one entry behind, so its width
            // transition lines up with this pre-insert check.
            if width < MAX_CODE_SIZE && next_code == 1 << width {
                width += 1;
            }
            table.insert((prev, sym), next_code);
            next_code += 1;
        } else {
            out.write(clear_code, width);
            table.clear();
            width = min_code_size + 1;
            next_code = eoi_code + 1;
        }
        prev = u16::from(sym);
    }

    out.write(prev, width);
    // The decoder adds an entry for this final code and may widen before it
    // reads the end code.
    if width < MAX_CODE_SIZE && next_code == 1 << width {
        width += 1;
    }
    out.write(eoi_code, width);
    out.finish()
}

/// Decompress a code stream into palette indices.
///
/// `max_output` bounds the result (a frame's declared pixel count); blowing
/// past it means the stream disagrees with the frame bounds. A stream that
/// ends without an end code stops at exhaustion, and a full table without a
/// clear code (deferred clear) keeps translating with the table frozen.
pub fn decompress(
    data: &[u8],
    min_code_size: u8,
    max_output: usize,
) -> Result<Vec<u8>, DecodeError> {
    if !(2..=8).contains(&min_code_size) {
        return Err(DecodeError::InvalidCodeSize(min_code_size));
    }

    let clear_code: u16 = 1 << min_code_size;
    let eoi_code: u16 = clear_code + 1;

    // prefix/suffix chains; entry i expands to expand(prefix[i]) + suffix[i].
    let mut prefix = vec![0u16; MAX_TABLE as usize];
    let mut suffix = vec![0u8; MAX_TABLE as usize];
    for i in 0..clear_code {
        suffix[i as usize] = i as u8;
    }

    let mut width = min_code_size + 1;
    let mut next_code = eoi_code + 1;
    let mut prev: Option<u16> = None;

    let mut out = Vec::with_capacity(max_output);
    let mut stack = Vec::with_capacity(MAX_TABLE as usize);
    let mut reader = BitReader::new(data);

    while let Some(code) = reader.read(width) {
        if code == clear_code {
            width = min_code_size + 1;
            next_code = eoi_code + 1;
            prev = None;
            continue;
        }
        if code == eoi_code {
            break;
        }

        let kwkwk = code == next_code;
        if code > next_code || (kwkwk && prev.is_none()) {
            return Err(DecodeError::InvalidLzwCode(code));
        }

        // Expand the code (or, for the just-about-to-exist code, its
        // predecessor) by walking the prefix chain back to a root.
        let mut cur = if kwkwk { prev.unwrap() } else { code };
        stack.clear();
        loop {
            stack.push(suffix[cur as usize]);
            if cur < clear_code {
                break;
            }
            cur = prefix[cur as usize];
        }
        let first = *stack.last().unwrap();

        while let Some(byte) = stack.pop() {
            out.push(byte);
        }
        if kwkwk {
            out.push(first);
        }
        if out.len() > max_output {
            return Err(DecodeError::TruncatedFrame {
                expected: max_output,
                got: out.len(),
            });
        }

        if let Some(p) = prev {
            if next_code < MAX_TABLE {
                prefix[next_code as usize] = p;
                suffix[next_code as usize] = first;
                if width < MAX_CODE_SIZE && next_code == (1 << width) - 1 {
                    width += 1;
                }
                next_code += 1;
            }
        }
        prev = Some(code);
    }

    Ok(out)
}
