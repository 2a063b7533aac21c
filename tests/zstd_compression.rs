#[cfg(feature = "zstd-support")]
#[test]
fn test_zstd_roundtrip() {
    use zipkit::{CompressionLevel, CompressionMethod, ZipEntrySource, ZipReader, ZipWriter};
    use tempfile::tempdir;

    let dir = tempdir().unwrap();
    let zip_path = dir.path().join("zstd_test.zip");

    // Write a ZIP with Zstd compression
    {
        let mut writer = ZipWriter::create(&zip_path).expect("Failed to create writer");

        writer
            .add_entry(
                &ZipEntrySource::from_data("test1.txt", b"Hello from Zstd compression!".to_vec())
                    .with_method(CompressionMethod::ZSTD),
            )
            .unwrap();

        // Write some compressible data
        writer
            .add_entry(
                &ZipEntrySource::from_data("test2.bin", vec![42u8; 10000])
                    .with_method(CompressionMethod::ZSTD)
                    .with_level(CompressionLevel::MEDIUM),
            )
            .unwrap();

        writer.close().unwrap();
    }

    // Read the ZIP back
    {
        let mut reader = ZipReader::from_path(&zip_path).expect("Failed to open zip");
        let directory = reader.read_central_directory().unwrap();
        let entries = directory.records();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "test1.txt");
        assert_eq!(entries[0].compression_method, CompressionMethod::ZSTD);
        assert_eq!(entries[1].name, "test2.bin");
        assert_eq!(entries[1].compression_method.code(), 93);

        let data1 = reader.read_data(&entries[0]).unwrap();
        assert_eq!(data1, b"Hello from Zstd compression!");

        let data2 = reader.read_data(&entries[1]).unwrap();
        assert_eq!(data2.len(), 10000);
        assert!(data2.iter().all(|&b| b == 42));

        // Verify compression actually happened (compressed should be much smaller)
        assert!(entries[1].compressed_size < entries[1].uncompressed_size / 2);
    }
}

#[cfg(feature = "zstd-support")]
#[test]
fn test_zstd_streaming_read() {
    use std::io::Read;
    use tempfile::tempdir;
    use zipkit::{CompressionMethod, ZipEntrySource, ZipReader, ZipWriter};

    let dir = tempdir().unwrap();
    let zip_path = dir.path().join("zstd_stream.zip");

    {
        let mut writer = ZipWriter::create(&zip_path).expect("Failed to create writer");
        writer
            .add_entry(
                &ZipEntrySource::from_data("large.bin", vec![0x55u8; 50000])
                    .with_method(CompressionMethod::ZSTD),
            )
            .unwrap();
        writer.close().unwrap();
    }

    // Read with streaming API
    {
        let mut reader = ZipReader::from_path(&zip_path).expect("Failed to open zip");
        let index = reader.index_for_record("large.bin").unwrap();
        let record = reader.record_at(index).unwrap();
        let mut stream = reader.record_reader(&record).expect("Failed to get stream");

        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer).unwrap();

        assert_eq!(buffer.len(), 50000);
        assert!(buffer.iter().all(|&b| b == 0x55));
    }
}

#[cfg(not(feature = "zstd-support"))]
#[test]
fn test_zstd_needs_feature() {
    use tempfile::tempdir;
    use zipkit::{CompressionMethod, ZipEntrySource, ZipError, ZipWriter};

    let dir = tempdir().unwrap();
    let mut writer = ZipWriter::create(dir.path().join("no_zstd.zip")).unwrap();
    let err = writer
        .add_entry(&ZipEntrySource::from_data("z", b"z".to_vec()).with_method(CompressionMethod::ZSTD))
        .unwrap_err();
    assert!(matches!(err, ZipError::EncoderNotRegistered(CompressionMethod::ZSTD)));
}
