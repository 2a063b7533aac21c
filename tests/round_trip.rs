use std::io::{Cursor, Read, Write};
use std::ops::ControlFlow;
use tempfile::tempdir;
use zipkit::{
    CompressionLevel, CompressionMethod, ReaderOptions, ZipEntrySource, ZipError, ZipReader,
    ZipWriter,
};

fn pseudo_random(size: usize) -> Vec<u8> {
    let mut state = 0x2545F491u32;
    (0..size)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect()
}

#[test]
fn deflate_and_store_entries() {
    let dir = tempdir().unwrap();
    let zip_path = dir.path().join("mixed.zip");

    {
        let mut writer = ZipWriter::create(&zip_path).unwrap();
        writer
            .add_entry(
                &ZipEntrySource::from_data("a.txt", vec![b'A'; 100])
                    .with_method(CompressionMethod::DEFLATE)
                    .with_level(CompressionLevel::MAX),
            )
            .unwrap();
        writer
            .add_entry(
                &ZipEntrySource::from_data("b.bin", Vec::new())
                    .with_method(CompressionMethod::STORE),
            )
            .unwrap();
        writer.close().unwrap();
    }

    let mut reader = ZipReader::from_path(&zip_path).unwrap();
    let directory = reader.read_central_directory().unwrap();
    assert_eq!(directory.record_count(), 2);

    let a = &directory.records()[0];
    assert_eq!(a.name, "a.txt");
    assert_eq!(a.compression_method, CompressionMethod::DEFLATE);
    assert_eq!(a.compression_level, CompressionLevel::MAX);
    assert_eq!(a.uncompressed_size, 100);
    assert!(a.compressed_size < 100);
    assert_eq!(a.crc32, crc32fast::hash(&[b'A'; 100]));
    assert_eq!(reader.read_data(a).unwrap(), vec![b'A'; 100]);

    let b = &directory.records()[1];
    assert_eq!(b.name, "b.bin");
    assert_eq!(b.compression_method, CompressionMethod::STORE);
    assert_eq!(b.compressed_size, 0);
    assert_eq!(b.uncompressed_size, 0);
    assert_eq!(b.crc32, 0);
    assert!(reader.read_data(b).unwrap().is_empty());

    assert_eq!(directory.total_uncompressed_size(), 100);
    assert_eq!(directory.total_compressed_size(), a.compressed_size);
}

#[test]
fn every_level_round_trips() {
    let dir = tempdir().unwrap();
    let zip_path = dir.path().join("levels.zip");
    let data = b"The quick brown fox jumps over the lazy dog. ".repeat(500);

    let mut writer = ZipWriter::create(&zip_path).unwrap();
    for level in -1..=9 {
        writer
            .add_entry(
                &ZipEntrySource::from_data(format!("level_{level}.txt"), data.clone())
                    .with_level(CompressionLevel::new(level)),
            )
            .unwrap();
    }
    writer.close().unwrap();

    let mut reader = ZipReader::from_path(&zip_path).unwrap();
    let directory = reader.read_central_directory().unwrap();
    assert_eq!(directory.record_count(), 11);
    for record in directory.records() {
        assert_eq!(reader.read_data(record).unwrap(), data, "{}", record.name);
    }
}

#[test]
fn large_incompressible_entry_in_small_chunks() {
    let dir = tempdir().unwrap();
    let zip_path = dir.path().join("large.zip");
    let data = pseudo_random(3 * 1024 * 1024 + 17);

    let mut writer = ZipWriter::create(&zip_path).unwrap();
    writer.set_read_buffer_size(4096);
    writer
        .add_entry(&ZipEntrySource::from_data("random.bin", data.clone()))
        .unwrap();
    writer.close().unwrap();

    let mut reader = ZipReader::new(&zip_path).with_options(ReaderOptions {
        read_buffer_size: 1000,
        ..ReaderOptions::default()
    });
    reader.open().unwrap();
    let directory = reader.read_central_directory().unwrap();
    let record = &directory.records()[0];

    let mut chunks = 0usize;
    let mut out = Vec::new();
    reader
        .enumerate_byte_ranges(record, |_| ControlFlow::Continue(()), |chunk| {
            chunks += 1;
            out.extend_from_slice(chunk);
            ControlFlow::Continue(())
        })
        .unwrap();
    assert!(chunks > 1);
    assert_eq!(out, data);
}

#[test]
fn file_sources_keep_modification_time() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("report.csv");
    std::fs::File::create(&source)
        .unwrap()
        .write_all(b"id,value\n1,2\n")
        .unwrap();

    let zip_path = dir.path().join("files.zip");
    let mut writer = ZipWriter::create(&zip_path).unwrap();
    let entry = ZipEntrySource::from_file(&source);
    let written_time = entry.timestamp().unwrap();
    writer.add_entry(&entry).unwrap();
    writer
        .add_entry(&ZipEntrySource::from_file_with_name(&source, "nested/copy.csv"))
        .unwrap();
    writer.close().unwrap();

    let mut reader = ZipReader::from_path(&zip_path).unwrap();
    let record = reader.record_at(0).unwrap();
    assert_eq!(record.name, "report.csv");
    let stored = record.timestamp().unwrap();
    let drift = (written_time - stored).num_seconds();
    assert!((0..2).contains(&drift), "timestamp drifted by {drift}s");
    assert_eq!(reader.read_data(&record).unwrap(), b"id,value\n1,2\n");

    assert_eq!(reader.index_for_record("nested/copy.csv").unwrap(), 1);
}

#[test]
fn comments_survive() {
    let mut writer = ZipWriter::from_writer(Cursor::new(Vec::new()));
    writer
        .add_entry(&ZipEntrySource::from_data("c.txt", b"c".to_vec()).with_comment("entry note"))
        .unwrap();
    writer.set_global_comment(Some("archive note")).unwrap();
    let bytes = writer.finish().unwrap().into_inner();

    let dir = tempdir().unwrap();
    let zip_path = dir.path().join("comments.zip");
    std::fs::write(&zip_path, bytes).unwrap();

    let mut reader = ZipReader::from_path(&zip_path).unwrap();
    let directory = reader.read_central_directory().unwrap();
    assert_eq!(directory.global_comment(), Some("archive note"));
    assert_eq!(directory.records()[0].comment.as_deref(), Some("entry note"));
}

#[test]
fn lookup_by_name() {
    let dir = tempdir().unwrap();
    let zip_path = dir.path().join("names.zip");
    let mut writer = ZipWriter::create(&zip_path).unwrap();
    for name in ["Readme.md", "src/main.rs", "readme.md"] {
        writer
            .add_entry(&ZipEntrySource::from_data(name, name.as_bytes().to_vec()))
            .unwrap();
    }
    writer.close().unwrap();

    let reader = ZipReader::from_path(&zip_path).unwrap();
    assert_eq!(reader.index_for_record("readme.md").unwrap(), 2);
    assert!(matches!(
        reader.index_for_record("README.MD"),
        Err(ZipError::EntryNotFound(_))
    ));

    let mut reader = ZipReader::new(&zip_path).with_options(ReaderOptions {
        case_insensitive_names: true,
        ..ReaderOptions::default()
    });
    reader.open().unwrap();
    reader.read_central_directory().unwrap();
    // first match wins
    assert_eq!(reader.index_for_record("README.MD").unwrap(), 0);

    let mut visited = Vec::new();
    reader
        .enumerate_records(|record, index| {
            visited.push((index, record.name.clone()));
            if index == 1 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();
    assert_eq!(
        visited,
        vec![(0, "Readme.md".to_string()), (1, "src/main.rs".to_string())]
    );
}

#[test]
fn record_reader_streams_entry() {
    let dir = tempdir().unwrap();
    let zip_path = dir.path().join("stream.zip");
    let data = pseudo_random(200_000);
    let mut writer = ZipWriter::create(&zip_path).unwrap();
    writer
        .add_entry(&ZipEntrySource::from_data("stream.bin", data.clone()))
        .unwrap();
    writer.close().unwrap();

    let mut reader = ZipReader::from_path(&zip_path).unwrap();
    let record = reader.record_at(0).unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 333];
    {
        let mut stream = reader.record_reader(&record).unwrap();
        loop {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
    }
    assert_eq!(out, data);

    // the reader is usable again once the stream is dropped
    assert_eq!(reader.read_data(&record).unwrap(), data);
}

#[test]
fn read_progress_is_monotonic() {
    let dir = tempdir().unwrap();
    let zip_path = dir.path().join("progress.zip");
    let data = pseudo_random(500_000);
    let mut writer = ZipWriter::create(&zip_path).unwrap();
    writer
        .add_entry(&ZipEntrySource::from_data("p.bin", data.clone()))
        .unwrap();
    writer.close().unwrap();

    let mut reader = ZipReader::from_path(&zip_path).unwrap();
    let record = reader.record_at(0).unwrap();
    let mut last = 0u64;
    let mut reports = 0;
    let out = reader
        .read_data_with_progress(&record, |progress| {
            assert!(progress.bytes_complete >= last);
            assert_eq!(progress.total_bytes, Some(data.len() as u64));
            last = progress.bytes_complete;
            reports += 1;
            ControlFlow::Continue(())
        })
        .unwrap();
    assert_eq!(out, data);
    assert_eq!(last, data.len() as u64);
    assert!(reports > 0);
}

#[test]
fn read_cancellation_stops_delivery() {
    let dir = tempdir().unwrap();
    let zip_path = dir.path().join("cancel.zip");
    let mut writer = ZipWriter::create(&zip_path).unwrap();
    writer
        .add_entry(&ZipEntrySource::from_data("big.bin", pseudo_random(1_000_000)))
        .unwrap();
    writer.close().unwrap();

    let mut reader = ZipReader::new(&zip_path).with_options(ReaderOptions {
        read_buffer_size: 1024,
        ..ReaderOptions::default()
    });
    reader.open().unwrap();
    reader.read_central_directory().unwrap();
    let record = reader.record_at(0).unwrap();

    let mut reports = 0;
    let err = reader
        .read_data_with_progress(&record, |_| {
            reports += 1;
            ControlFlow::Break(())
        })
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.code().0, 499);
    assert_eq!(reports, 1);

    // the archive itself is untouched and still readable
    assert_eq!(reader.read_data(&record).unwrap().len(), 1_000_000);
}

#[test]
fn stopping_from_byte_callback_is_not_an_error() {
    let dir = tempdir().unwrap();
    let zip_path = dir.path().join("stop.zip");
    let mut writer = ZipWriter::create(&zip_path).unwrap();
    writer
        .add_entry(&ZipEntrySource::from_data("big.bin", pseudo_random(1_000_000)))
        .unwrap();
    writer.close().unwrap();

    let mut reader = ZipReader::from_path(&zip_path).unwrap();
    let record = reader.record_at(0).unwrap();
    let mut seen = 0usize;
    reader
        .enumerate_byte_ranges(&record, |_| ControlFlow::Continue(()), |chunk| {
            seen += chunk.len();
            ControlFlow::Break(())
        })
        .unwrap();
    assert!(seen > 0 && seen < 1_000_000);
}

#[test]
fn in_memory_writer_output_is_readable() {
    let mut writer = ZipWriter::from_writer(Vec::new());
    writer
        .add_entry(&ZipEntrySource::from_data("mem.txt", b"from memory".to_vec()))
        .unwrap();
    let bytes = writer.finish().unwrap();

    let dir = tempdir().unwrap();
    let zip_path = dir.path().join("mem.zip");
    std::fs::write(&zip_path, bytes).unwrap();
    let mut reader = ZipReader::from_path(&zip_path).unwrap();
    let record = reader.record_at(0).unwrap();
    assert_eq!(reader.read_data(&record).unwrap(), b"from memory");
}
