//! # zipkit: Streaming ZIP Archive Codec
//!
//! `zipkit` writes and reads classic (non-ZIP64) ZIP archives one entry at a
//! time with a bounded memory footprint. Compression is pluggable: every entry
//! names a compression method, and the coder for that method is looked up in a
//! [`CompressionRegistry`].
//!
//! ## Features
//!
//! - **Single-pass writing**: sources are read once; CRC32 and sizes follow the
//!   data in a data descriptor, so the output never needs to seek
//! - **Streaming read**: entries are decoded chunk by chunk, with CRC32 and
//!   size verification after the last chunk
//! - **Pluggable coders**: store and deflate built in, zstd behind the
//!   `zstd-support` feature, and any [`Encoder`]/[`Decoder`] you register
//! - **Progress and cancellation**: every streaming call takes an optional
//!   callback that can stop the operation
//! - **Classified errors**: every [`ZipError`] maps to a numeric [`ErrorCode`]
//!   whose page identifies the operation area
//!
//! ## Quick Start
//!
//! ### Writing a ZIP file
//!
//! ```no_run
//! use zipkit::{CompressionLevel, CompressionMethod, ZipEntrySource, ZipWriter};
//!
//! let mut writer = ZipWriter::create("output.zip")?;
//!
//! writer.add_entry(
//!     &ZipEntrySource::from_data("a.txt", vec![b'A'; 100]).with_level(CompressionLevel::MAX),
//! )?;
//! writer.add_entry(
//!     &ZipEntrySource::from_data("b.bin", Vec::new()).with_method(CompressionMethod::STORE),
//! )?;
//! writer.add_entry(&ZipEntrySource::from_file("notes.txt"))?;
//!
//! writer.close()?;
//! # Ok::<(), zipkit::ZipError>(())
//! ```
//!
//! ### Reading a ZIP file
//!
//! ```no_run
//! use zipkit::{SaveOptions, ZipReader};
//!
//! let mut reader = ZipReader::from_path("archive.zip")?;
//! let directory = reader.read_central_directory()?;
//!
//! for record in directory.records() {
//!     println!("{}: {} bytes", record.name, record.uncompressed_size);
//! }
//!
//! let index = reader.index_for_record("a.txt")?;
//! let record = reader.record_at(index)?;
//! let data = reader.read_data(&record)?;
//! reader.save_record(&record, "out", SaveOptions::default())?;
//! # Ok::<(), zipkit::ZipError>(())
//! ```
//!
//! ### Using arbitrary writers (in-memory, network, etc.)
//!
//! ```no_run
//! use std::io::Cursor;
//! use zipkit::{ZipEntrySource, ZipWriter};
//!
//! let mut writer = ZipWriter::from_writer(Cursor::new(Vec::new()));
//! writer.add_entry(&ZipEntrySource::from_data("data.txt", b"In-memory ZIP content".to_vec()))?;
//!
//! // finish() returns the writer, allowing you to extract the data
//! let zip_bytes = writer.finish()?.into_inner();
//! println!("Created ZIP with {} bytes", zip_bytes.len());
//! # Ok::<(), zipkit::ZipError>(())
//! ```

pub mod coder;
pub mod dostime;
pub mod entry;
pub mod error;
pub mod format;
pub mod progress;
pub mod reader;
pub mod registry;
pub mod writer;

pub use coder::{
    compress_bytes, decompress_bytes, CompressionLevel, CompressionMethod, Decoder,
    DecoderContext, Encoder, EncoderContext, FlushCallback,
};
pub use entry::ZipEntrySource;
pub use error::{ErrorCode, ErrorPage, Result, ZipError, ERROR_DOMAIN};
pub use progress::{Progress, ProgressControl};
pub use reader::{
    CentralDirectory, CentralDirectoryRecord, ReaderOptions, RecordReader, SaveOptions, ZipReader,
};
pub use registry::CompressionRegistry;
pub use writer::{ZipWriter, ZipWriterMode};
