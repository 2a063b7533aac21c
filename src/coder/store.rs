//! Method 0: bytes pass through unchanged

use super::{
    CompressionLevel, Decoder, DecoderContext, Encoder, EncoderContext, FlushCallback,
};
use crate::error::Result;

/// Identity encoder for [`CompressionMethod::STORE`](super::CompressionMethod::STORE)
#[derive(Debug, Default, Clone, Copy)]
pub struct StoreEncoder;

/// Identity decoder for [`CompressionMethod::STORE`](super::CompressionMethod::STORE)
#[derive(Debug, Default, Clone, Copy)]
pub struct StoreDecoder;

struct StoreContext<'a> {
    flush: FlushCallback<'a>,
}

impl StoreContext<'_> {
    fn pass(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        (self.flush)(bytes)
    }
}

impl Encoder for StoreEncoder {
    fn create_context<'a>(
        &self,
        _bit_flags: u16,
        _level: CompressionLevel,
        flush: FlushCallback<'a>,
    ) -> Box<dyn EncoderContext + 'a> {
        Box::new(StoreContext { flush })
    }
}

impl EncoderContext for StoreContext<'_> {
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    fn encode(&mut self, bytes: &[u8]) -> Result<()> {
        self.pass(bytes)
    }

    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}

impl Decoder for StoreDecoder {
    fn level_for_bit_flags(&self, _bit_flags: u16) -> CompressionLevel {
        CompressionLevel::NONE
    }

    fn create_context<'a>(
        &self,
        _bit_flags: u16,
        flush: FlushCallback<'a>,
    ) -> Box<dyn DecoderContext + 'a> {
        Box::new(StoreContext { flush })
    }
}

impl DecoderContext for StoreContext<'_> {
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    fn decode(&mut self, bytes: &[u8]) -> Result<()> {
        self.pass(bytes)
    }

    /// Stored data carries no end marker; the reader stops at the
    /// compressed size instead
    fn has_finished(&self) -> bool {
        false
    }

    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}
