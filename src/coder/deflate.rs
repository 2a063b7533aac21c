//! Method 8: raw DEFLATE streams via flate2

use super::{
    CompressedBuffer, CompressionLevel, Decoder, DecoderContext, Encoder, EncoderContext,
    FlushCallback,
};
use crate::error::{Result, ZipError};
use flate2::write::DeflateEncoder as DeflateWriter;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use std::io::Write;

const FLAG_BITS_NORMAL: u16 = 0b000;
const FLAG_BITS_MAX: u16 = 0b010;
const FLAG_BITS_FAST: u16 = 0b100;
const FLAG_BITS_SUPER_FAST: u16 = 0b110;

const DECODE_BUFFER_SIZE: usize = 32 * 1024;

/// DEFLATE encoder for [`CompressionMethod::DEFLATE`](super::CompressionMethod::DEFLATE)
#[derive(Debug, Default, Clone, Copy)]
pub struct DeflateEncoder;

/// DEFLATE decoder for [`CompressionMethod::DEFLATE`](super::CompressionMethod::DEFLATE)
#[derive(Debug, Default, Clone, Copy)]
pub struct DeflateDecoder;

fn deflate_level(level: CompressionLevel) -> u32 {
    if level.is_default() {
        6
    } else {
        level.value() as u32
    }
}

impl Encoder for DeflateEncoder {
    fn bit_flags_for_level(&self, level: CompressionLevel) -> u16 {
        match level.value() {
            1 => FLAG_BITS_SUPER_FAST,
            2 => FLAG_BITS_FAST,
            8 | 9 => FLAG_BITS_MAX,
            _ => FLAG_BITS_NORMAL,
        }
    }

    fn create_context<'a>(
        &self,
        _bit_flags: u16,
        level: CompressionLevel,
        flush: FlushCallback<'a>,
    ) -> Box<dyn EncoderContext + 'a> {
        Box::new(DeflateEncoderContext {
            level: Compression::new(deflate_level(level)),
            encoder: None,
            flush,
        })
    }
}

struct DeflateEncoderContext<'a> {
    level: Compression,
    encoder: Option<DeflateWriter<CompressedBuffer>>,
    flush: FlushCallback<'a>,
}

impl EncoderContext for DeflateEncoderContext<'_> {
    fn initialize(&mut self) -> Result<()> {
        self.encoder = Some(DeflateWriter::new(CompressedBuffer::new(), self.level));
        Ok(())
    }

    fn encode(&mut self, bytes: &[u8]) -> Result<()> {
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| ZipError::EncodeFailed("deflate context not initialized".to_string()))?;
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
            .ok_or_else(|| ZipError::EncodeFailed("deflate context not initialized".to_string()))?;
        let mut buffer = encoder
            .finish()
            .map_err(|e| ZipError::EncodeFailed(e.to_string()))?;
        buffer.drain_into(&mut self.flush)
    }
}

impl Decoder for DeflateDecoder {
    fn level_for_bit_flags(&self, bit_flags: u16) -> CompressionLevel {
        match bit_flags & FLAG_BITS_SUPER_FAST {
            FLAG_BITS_MAX => CompressionLevel::MAX,
            FLAG_BITS_FAST => CompressionLevel::VERY_LOW,
            FLAG_BITS_SUPER_FAST => CompressionLevel::MIN,
            _ => CompressionLevel::DEFAULT,
        }
    }

    fn create_context<'a>(
        &self,
        _bit_flags: u16,
        flush: FlushCallback<'a>,
    ) -> Box<dyn DecoderContext + 'a> {
        Box::new(DeflateDecoderContext {
            stream: None,
            buffer: Vec::new(),
            finished: false,
            flush,
        })
    }
}

struct DeflateDecoderContext<'a> {
    stream: Option<Decompress>,
    buffer: Vec<u8>,
    finished: bool,
    flush: FlushCallback<'a>,
}

impl DecoderContext for DeflateDecoderContext<'_> {
    fn initialize(&mut self) -> Result<()> {
        // raw deflate, no zlib header
        self.stream = Some(Decompress::new(false));
        self.buffer = vec![0u8; DECODE_BUFFER_SIZE];
        self.finished = false;
        Ok(())
    }

    fn decode(&mut self, mut input: &[u8]) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| ZipError::DecodeFailed("deflate context not initialized".to_string()))?;

        loop {
            let before_in = stream.total_in();
            let before_out = stream.total_out();
            let status = stream
                .decompress(input, &mut self.buffer, FlushDecompress::None)
                .map_err(|e| ZipError::DecodeFailed(e.to_string()))?;
            let consumed = (stream.total_in() - before_in) as usize;
            let produced = (stream.total_out() - before_out) as usize;
            input = &input[consumed..];

            if produced > 0 {
                (self.flush)(&self.buffer[..produced])?;
            }
            if status == Status::StreamEnd {
                self.finished = true;
                return Ok(());
            }
            // no progress means the inflater needs more input
            if consumed == 0 && produced == 0 {
                return Ok(());
            }
        }
    }

    fn has_finished(&self) -> bool {
        self.finished
    }

    fn finalize(&mut self) -> Result<()> {
        let started = self.stream.take().is_some();
        self.buffer = Vec::new();
        if started && !self.finished {
            return Err(ZipError::DecodeFailed("deflate stream ended early".to_string()));
        }
        Ok(())
    }
}
