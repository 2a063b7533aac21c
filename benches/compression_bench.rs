use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::NamedTempFile;
use zipkit::{CompressionLevel, CompressionMethod, ZipEntrySource, ZipReader, ZipWriter};

fn generate_compressible_data(size: usize) -> Vec<u8> {
    // Pattern that compresses well
    let pattern = b"The quick brown fox jumps over the lazy dog. ";
    let mut data = Vec::with_capacity(size);
    while data.len() < size {
        data.extend_from_slice(pattern);
    }
    data.truncate(size);
    data
}

fn generate_random_data(size: usize) -> Vec<u8> {
    // Pseudo-random data that doesn't compress well
    let mut data = Vec::with_capacity(size);
    let mut state = 0x12345678u32;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

fn write_archive(path: &std::path::Path, data: &[u8], method: CompressionMethod, level: i32) {
    let mut writer = ZipWriter::create(path).unwrap();
    writer
        .add_entry(
            &ZipEntrySource::from_data("test.bin", data.to_vec())
                .with_method(method)
                .with_level(CompressionLevel::new(level)),
        )
        .unwrap();
    writer.close().unwrap();
}

fn write_configs() -> Vec<(&'static str, CompressionMethod, i32)> {
    #[allow(unused_mut)]
    let mut configs = vec![
        ("store", CompressionMethod::STORE, 0),
        ("deflate_level_1", CompressionMethod::DEFLATE, 1),
        ("deflate_level_6", CompressionMethod::DEFLATE, 6),
        ("deflate_level_9", CompressionMethod::DEFLATE, 9),
    ];
    #[cfg(feature = "zstd-support")]
    configs.push(("zstd_level_5", CompressionMethod::ZSTD, 5));
    configs
}

fn bench_write(c: &mut Criterion) {
    let sizes = vec![
        10 * 1024,       // 10KB
        1024 * 1024,     // 1MB
        8 * 1024 * 1024, // 8MB
    ];

    for size in sizes {
        for (kind, data) in [
            ("compressible", generate_compressible_data(size)),
            ("random", generate_random_data(size)),
        ] {
            let mut group = c.benchmark_group(format!("write_{}_{}", kind, format_size(size)));
            group.throughput(Throughput::Bytes(size as u64));

            for (name, method, level) in write_configs() {
                group.bench_with_input(BenchmarkId::new(name, size), &data, |b, data| {
                    b.iter(|| {
                        let temp = NamedTempFile::new().unwrap();
                        write_archive(temp.path(), black_box(data), method, level);
                    });
                });
            }

            group.finish();
        }
    }
}

fn bench_read(c: &mut Criterion) {
    let sizes = vec![100 * 1024, 4 * 1024 * 1024];

    for size in sizes {
        let mut group = c.benchmark_group(format!("read_compressible_{}", format_size(size)));
        group.throughput(Throughput::Bytes(size as u64));
        let data = generate_compressible_data(size);

        for (name, method, level) in write_configs() {
            let temp = NamedTempFile::new().unwrap();
            write_archive(temp.path(), &data, method, level);

            group.bench_function(BenchmarkId::new(name, size), |b| {
                b.iter(|| {
                    let mut reader = ZipReader::from_path(temp.path()).unwrap();
                    let record = reader.record_at(0).unwrap();
                    black_box(reader.read_data(&record).unwrap());
                });
            });
        }

        group.finish();
    }
}

fn bench_multiple_entries(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_multiple_entries");

    let entry_count = 100;
    let entry_size = 10 * 1024; // 10KB per entry
    group.throughput(Throughput::Bytes((entry_count * entry_size) as u64));

    let data = generate_compressible_data(entry_size);

    group.bench_function("deflate_100_entries", |b| {
        b.iter(|| {
            let temp = NamedTempFile::new().unwrap();
            let mut writer = ZipWriter::create(temp.path()).unwrap();
            for i in 0..entry_count {
                writer
                    .add_entry(&ZipEntrySource::from_data(format!("file_{}.txt", i), black_box(data.clone())))
                    .unwrap();
            }
            writer.close().unwrap();
        });
    });

    group.finish();
}

fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{}KB", bytes / 1024)
    } else {
        format!("{}MB", bytes / (1024 * 1024))
    }
}

criterion_group!(benches, bench_write, bench_read, bench_multiple_entries);
criterion_main!(benches);
