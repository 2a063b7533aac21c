//! Method 93: Zstandard (requires the `zstd-support` feature)

use super::{
    CompressedBuffer, CompressionLevel, Decoder, DecoderContext, Encoder, EncoderContext,
    FlushCallback,
};
use crate::error::{Result, ZipError};
use std::io::Write;

#[derive(Debug, Default, Clone, Copy)]
pub struct ZstdEncoder;

#[derive(Debug, Default, Clone, Copy)]
pub struct ZstdDecoder;

/// Spread the normalized 1..=9 range over zstd's 1..=19
fn zstd_level(level: CompressionLevel) -> i32 {
    match level.value() {
        l if l < 0 => zstd::DEFAULT_COMPRESSION_LEVEL,
        0 => 1,
        l => 1 + (l as i32 - 1) * 18 / 8,
    }
}

impl Encoder for ZstdEncoder {
    fn create_context<'a>(
        &self,
        _bit_flags: u16,
        level: CompressionLevel,
        flush: FlushCallback<'a>,
    ) -> Box<dyn EncoderContext + 'a> {
        Box::new(ZstdEncoderContext {
            level: zstd_level(level),
            encoder: None,
            flush,
        })
    }
}

struct ZstdEncoderContext<'a> {
    level: i32,
    encoder: Option<zstd::Encoder<'static, CompressedBuffer>>,
    flush: FlushCallback<'a>,
}

impl EncoderContext for ZstdEncoderContext<'_> {
    fn initialize(&mut self) -> Result<()> {
        let mut encoder = zstd::Encoder::new(CompressedBuffer::new(), self.level)
            .map_err(|e| ZipError::EncodeFailed(e.to_string()))?;
        // ZIP uses CRC32, not the zstd frame checksum
        encoder
            .include_checksum(false)
            .map_err(|e| ZipError::EncodeFailed(e.to_string()))?;
        self.encoder = Some(encoder);
        Ok(())
    }

    fn encode(&mut self, bytes: &[u8]) -> Result<()> {
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| ZipError::EncodeFailed("zstd context not initialized".to_string()))?;
        encoder
            .write_all(bytes)
            .map_err(|e| ZipError::EncodeFailed(e.to_string()))?;
        let buffer = encoder.get_mut();
        if buffer.should_flush() {
            buffer.drain_into(&mut self.flush)?;
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        let encoder = self
            .encoder
            .take()
            .ok_or_else(|| ZipError::EncodeFailed("zstd context not initialized".to_string()))?;
        let mut buffer = encoder
            .finish()
            .map_err(|e| ZipError::EncodeFailed(e.to_string()))?;
        buffer.drain_into(&mut self.flush)
    }
}

impl Decoder for ZstdDecoder {
    fn create_context<'a>(
        &self,
        _bit_flags: u16,
        flush: FlushCallback<'a>,
    ) -> Box<dyn DecoderContext + 'a> {
        Box::new(ZstdDecoderContext {
            decoder: None,
            flush,
        })
    }
}

struct ZstdDecoderContext<'a> {
    decoder: Option<zstd::stream::write::Decoder<'static, CompressedBuffer>>,
    flush: FlushCallback<'a>,
}

impl DecoderContext for ZstdDecoderContext<'_> {
    fn initialize(&mut self) -> Result<()> {
        let decoder = zstd::stream::write::Decoder::new(CompressedBuffer::new())
            .map_err(|e| ZipError::DecodeFailed(e.to_string()))?;
        self.decoder = Some(decoder);
        Ok(())
    }

    fn decode(&mut self, bytes: &[u8]) -> Result<()> {
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| ZipError::DecodeFailed("zstd context not initialized".to_string()))?;
        decoder
            .write_all(bytes)
            .map_err(|e| ZipError::DecodeFailed(e.to_string()))?;
        decoder.get_mut().drain_into(&mut self.flush)
    }

    /// Frames may be concatenated, so the end is only known from the
    /// compressed size
    fn has_finished(&self) -> bool {
        false
    }

    fn finalize(&mut self) -> Result<()> {
        if let Some(mut decoder) = self.decoder.take() {
            decoder
                .flush()
                .map_err(|e| ZipError::DecodeFailed(e.to_string()))?;
            decoder.into_inner().drain_into(&mut self.flush)?;
        }
        Ok(())
    }
}
