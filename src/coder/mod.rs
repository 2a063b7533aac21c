//! Compression coders: the push-based interface every per-entry algorithm
//! implements, plus the built-in store and deflate coders.
//!
//! An [`Encoder`] or [`Decoder`] is a stateless factory registered per
//! [`CompressionMethod`]. Each stream gets its own context from
//! `create_context`, is driven through `initialize`, any number of
//! `encode`/`decode` calls and `finalize`, and is then dropped. Output is handed
//! to the [`FlushCallback`] whenever the coder decides it has enough ready.
//!
//! Contexts own every resource they allocate, so dropping a context on an
//! error path releases it even when `finalize` is never reached.

mod deflate;
mod store;
#[cfg(feature = "zstd-support")]
mod zstd;

pub use deflate::{DeflateDecoder, DeflateEncoder};
pub use store::{StoreDecoder, StoreEncoder};
#[cfg(feature = "zstd-support")]
pub use self::zstd::{ZstdDecoder, ZstdEncoder};

use crate::error::{ErrorPage, Result};
use std::fmt;
use std::io::Write;

/// Numeric code identifying an entry's compression algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompressionMethod(pub u16);

impl CompressionMethod {
    /// No compression
    pub const STORE: Self = Self(0);
    pub const SHRINK: Self = Self(1);
    pub const REDUCE_1: Self = Self(2);
    pub const REDUCE_2: Self = Self(3);
    pub const REDUCE_3: Self = Self(4);
    pub const REDUCE_4: Self = Self(5);
    pub const IMPLODE: Self = Self(6);
    /// DEFLATE compression (most common)
    pub const DEFLATE: Self = Self(8);
    pub const DEFLATE64: Self = Self(9);
    pub const IBM_TERSE_OLD: Self = Self(10);
    pub const BZIP2: Self = Self(12);
    pub const LZMA: Self = Self(14);
    pub const IBM_TERSE_NEW: Self = Self(18);
    pub const LZ77: Self = Self(19);
    /// Zstandard, as assigned by the vendor extension range
    pub const ZSTD: Self = Self(93);
    pub const WAVPACK: Self = Self(97);
    pub const PPMD: Self = Self(98);

    pub fn code(self) -> u16 {
        self.0
    }

    fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::STORE => "store",
            Self::SHRINK => "shrink",
            Self::REDUCE_1 | Self::REDUCE_2 | Self::REDUCE_3 | Self::REDUCE_4 => "reduce",
            Self::IMPLODE => "implode",
            Self::DEFLATE => "deflate",
            Self::DEFLATE64 => "deflate64",
            Self::IBM_TERSE_OLD | Self::IBM_TERSE_NEW => "ibm terse",
            Self::BZIP2 => "bzip2",
            Self::LZMA => "lzma",
            Self::LZ77 => "lz77",
            Self::ZSTD => "zstd",
            Self::WAVPACK => "wavpack",
            Self::PPMD => "ppmd",
            _ => return None,
        })
    }
}

impl From<u16> for CompressionMethod {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", self.0, name),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Normalized compression level in `-1..=9`.
///
/// `-1` asks the coder for its default, `0` for no compression and `9` for
/// maximum compression. Each coder maps this onto its own scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompressionLevel(i8);

impl CompressionLevel {
    pub const DEFAULT: Self = Self(-1);
    pub const NONE: Self = Self(0);
    pub const MIN: Self = Self(1);
    pub const VERY_LOW: Self = Self(2);
    pub const LOW: Self = Self(3);
    pub const MEDIUM_LOW: Self = Self(4);
    pub const MEDIUM: Self = Self(5);
    pub const MEDIUM_HIGH: Self = Self(6);
    pub const HIGH: Self = Self(7);
    pub const VERY_HIGH: Self = Self(8);
    pub const MAX: Self = Self(9);

    /// Clamp any integer into the normalized range
    pub fn new(level: i32) -> Self {
        Self(level.clamp(-1, 9) as i8)
    }

    pub fn value(self) -> i8 {
        self.0
    }

    pub fn is_default(self) -> bool {
        self.0 < 0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Receives output produced by a coder context
pub type FlushCallback<'a> = Box<dyn FnMut(&[u8]) -> Result<()> + 'a>;

/// Factory for compression contexts of one algorithm
pub trait Encoder: Send + Sync {
    /// Method-specific hint bits (bits 1-2) to record in the entry's flags
    fn bit_flags_for_level(&self, _level: CompressionLevel) -> u16 {
        0
    }

    fn create_context<'a>(
        &self,
        bit_flags: u16,
        level: CompressionLevel,
        flush: FlushCallback<'a>,
    ) -> Box<dyn EncoderContext + 'a>;
}

/// State of one in-progress compression stream
pub trait EncoderContext {
    fn initialize(&mut self) -> Result<()>;

    /// Compress a chunk of any size, including zero
    fn encode(&mut self, bytes: &[u8]) -> Result<()>;

    /// Flush everything still buffered and release the stream
    fn finalize(&mut self) -> Result<()>;
}

/// Factory for decompression contexts of one algorithm
pub trait Decoder: Send + Sync {
    /// Best-effort reconstruction of the level an entry was written with
    fn level_for_bit_flags(&self, _bit_flags: u16) -> CompressionLevel {
        CompressionLevel::DEFAULT
    }

    fn create_context<'a>(&self, bit_flags: u16, flush: FlushCallback<'a>)
        -> Box<dyn DecoderContext + 'a>;
}

/// State of one in-progress decompression stream
pub trait DecoderContext {
    fn initialize(&mut self) -> Result<()>;

    /// Decompress a chunk. An empty chunk is valid and does not by itself end
    /// the stream. Once [`DecoderContext::has_finished`] is true this is a no-op.
    fn decode(&mut self, bytes: &[u8]) -> Result<()>;

    /// Whether the coder has seen the end of its stream
    fn has_finished(&self) -> bool;

    fn finalize(&mut self) -> Result<()>;
}

/// Buffered sink for coder output with a flush threshold
///
/// Coders write into it and hand it to their [`FlushCallback`] once
/// `should_flush` reports enough data has accumulated.
pub(crate) struct CompressedBuffer {
    buffer: Vec<u8>,
    flush_threshold: usize,
}

impl CompressedBuffer {
    pub(crate) const DEFAULT_THRESHOLD: usize = 64 * 1024;

    pub(crate) fn new() -> Self {
        Self::with_threshold(Self::DEFAULT_THRESHOLD)
    }

    pub(crate) fn with_threshold(flush_threshold: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(flush_threshold.min(256 * 1024)),
            flush_threshold,
        }
    }

    pub(crate) fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    pub(crate) fn should_flush(&self) -> bool {
        self.buffer.len() >= self.flush_threshold
    }

    /// Hand buffered bytes to `flush` if any are pending
    pub(crate) fn drain_into(&mut self, flush: &mut FlushCallback<'_>) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let data = self.take();
        flush(&data)
    }
}

impl Write for CompressedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Compress a whole buffer with `encoder`
pub fn compress_bytes(data: &[u8], encoder: &dyn Encoder, level: CompressionLevel) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    {
        let flags = encoder.bit_flags_for_level(level);
        let mut context = encoder.create_context(
            flags,
            level,
            Box::new(|chunk: &[u8]| {
                out.extend_from_slice(chunk);
                Ok(())
            }),
        );
        context
            .initialize()
            .and_then(|_| context.encode(data))
            .and_then(|_| context.finalize())
            .map_err(|e| e.with_page(ErrorPage::Compress))?;
    }
    Ok(out)
}

/// Decompress a whole buffer with `decoder`
pub fn decompress_bytes(data: &[u8], decoder: &dyn Decoder) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    {
        let mut context = decoder.create_context(
            0,
            Box::new(|chunk: &[u8]| {
                out.extend_from_slice(chunk);
                Ok(())
            }),
        );
        context
            .initialize()
            .and_then(|_| context.decode(data))
            .and_then(|_| context.finalize())
            .map_err(|e| e.with_page(ErrorPage::Decompress))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_is_clamped() {
        assert_eq!(CompressionLevel::new(-5), CompressionLevel::DEFAULT);
        assert_eq!(CompressionLevel::new(42), CompressionLevel::MAX);
        assert_eq!(CompressionLevel::new(4).value(), 4);
        assert!(CompressionLevel::default().is_default());
    }

    #[test]
    fn method_display() {
        assert_eq!(CompressionMethod::DEFLATE.to_string(), "8 (deflate)");
        assert_eq!(CompressionMethod(77).to_string(), "77");
    }

    #[test]
    fn buffer_flushes_at_threshold() {
        let mut buffer = CompressedBuffer::with_threshold(4);
        buffer.write_all(b"abc").unwrap();
        assert!(!buffer.should_flush());
        buffer.write_all(b"d").unwrap();
        assert!(buffer.should_flush());
        let mut seen = Vec::new();
        {
            let mut flush: FlushCallback<'_> = Box::new(|chunk: &[u8]| {
                seen.extend_from_slice(chunk);
                Ok(())
            });
            buffer.drain_into(&mut flush).unwrap();
        }
        assert_eq!(seen, b"abcd");
        assert!(buffer.take().is_empty());
    }

    #[test]
    fn store_round_trip_in_memory() {
        let data = b"plain bytes".to_vec();
        let packed = compress_bytes(&data, &StoreEncoder, CompressionLevel::DEFAULT).unwrap();
        assert_eq!(packed, data);
        assert_eq!(decompress_bytes(&packed, &StoreDecoder).unwrap(), data);
    }

    #[test]
    fn deflate_round_trip_in_memory() {
        let data = b"The quick brown fox jumps over the lazy dog. ".repeat(200);
        let packed = compress_bytes(&data, &DeflateEncoder, CompressionLevel::MAX).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(decompress_bytes(&packed, &DeflateDecoder).unwrap(), data);
    }
}
