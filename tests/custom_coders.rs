use std::sync::Arc;
use tempfile::tempdir;
use zipkit::{
    compress_bytes, decompress_bytes, CompressionLevel, CompressionMethod, CompressionRegistry,
    Decoder, DecoderContext, Encoder, EncoderContext, ErrorCode, FlushCallback, Result,
    ZipEntrySource, ZipError, ZipReader, ZipWriter,
};

/// Vendor method used for these tests
const XOR_METHOD: CompressionMethod = CompressionMethod(97);

/// Toy coder that XORs every byte with a key
struct XorCoder(u8);

struct XorContext<'a> {
    key: u8,
    flush: FlushCallback<'a>,
}

impl XorContext<'_> {
    fn apply(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let mixed: Vec<u8> = bytes.iter().map(|b| b ^ self.key).collect();
        (self.flush)(&mixed)
    }
}

impl Encoder for XorCoder {
    fn create_context<'a>(
        &self,
        _bit_flags: u16,
        _level: CompressionLevel,
        flush: FlushCallback<'a>,
    ) -> Box<dyn EncoderContext + 'a> {
        Box::new(XorContext { key: self.0, flush })
    }
}

impl Decoder for XorCoder {
    fn create_context<'a>(&self, _bit_flags: u16, flush: FlushCallback<'a>) -> Box<dyn DecoderContext + 'a> {
        Box::new(XorContext { key: self.0, flush })
    }
}

impl EncoderContext for XorContext<'_> {
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    fn encode(&mut self, bytes: &[u8]) -> Result<()> {
        self.apply(bytes)
    }

    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}

impl DecoderContext for XorContext<'_> {
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    fn decode(&mut self, bytes: &[u8]) -> Result<()> {
        self.apply(bytes)
    }

    fn has_finished(&self) -> bool {
        false
    }

    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}

fn xor_registry() -> Arc<CompressionRegistry> {
    let registry = Arc::new(CompressionRegistry::new());
    registry.set_encoder(XOR_METHOD, Some(Arc::new(XorCoder(0x5A))));
    registry.set_decoder(XOR_METHOD, Some(Arc::new(XorCoder(0x5A))));
    registry
}

#[test]
fn registered_coder_is_used_for_its_method() {
    let dir = tempdir().unwrap();
    let zip_path = dir.path().join("xor.zip");
    let registry = xor_registry();

    let mut writer = ZipWriter::create(&zip_path)
        .unwrap()
        .with_registry(Arc::clone(&registry));
    writer
        .add_entry(&ZipEntrySource::from_data("secret.txt", b"plain text".to_vec()).with_method(XOR_METHOD))
        .unwrap();
    writer.close().unwrap();

    let raw = std::fs::read(&zip_path).unwrap();
    assert!(!raw.windows(10).any(|w| w == b"plain text"));

    let mut reader = ZipReader::new(&zip_path).with_registry(registry);
    reader.open().unwrap();
    let directory = reader.read_central_directory().unwrap();
    let record = &directory.records()[0];
    assert_eq!(record.compression_method, XOR_METHOD);
    assert_eq!(record.compressed_size, 10);
    assert_eq!(reader.read_data(record).unwrap(), b"plain text");
}

#[test]
fn unknown_method_is_reported_on_read() {
    let dir = tempdir().unwrap();
    let zip_path = dir.path().join("vendor.zip");

    let mut writer = ZipWriter::create(&zip_path).unwrap().with_registry(xor_registry());
    writer
        .add_entry(&ZipEntrySource::from_data("v.bin", b"vendor".to_vec()).with_method(XOR_METHOD))
        .unwrap();
    writer.close().unwrap();

    // the default registry knows nothing about method 97
    let mut reader = ZipReader::from_path(&zip_path).unwrap();
    let record = reader.record_at(0).unwrap();
    assert!(record.compression_level.is_default());
    let err = reader.read_data(&record).unwrap_err();
    assert!(matches!(err, ZipError::DecoderNotRegistered(m) if m == XOR_METHOD));
    assert_eq!(err.code(), ErrorCode::UNZIP_DECOMPRESSION_METHOD_NOT_SUPPORTED);
}

#[test]
fn in_memory_helpers_accept_any_coder() {
    let packed = compress_bytes(b"abc", &XorCoder(1), CompressionLevel::DEFAULT).unwrap();
    assert_eq!(packed, vec![b'a' ^ 1, b'b' ^ 1, b'c' ^ 1]);
    assert_eq!(decompress_bytes(&packed, &XorCoder(1)).unwrap(), b"abc");
}

#[test]
fn registry_lists_methods() {
    let registry = xor_registry();
    assert!(registry.encoder_methods().contains(&CompressionMethod::STORE));
    assert!(registry.encoder_methods().contains(&CompressionMethod::DEFLATE));
    assert!(registry.decoder_methods().contains(&XOR_METHOD));

    registry.set_decoder(XOR_METHOD, None);
    assert!(registry.decoder_for(XOR_METHOD).is_none());
    assert!(registry.encoder_for(XOR_METHOD).is_some());
}
