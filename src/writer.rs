//! Single-pass ZIP writer
//!
//! Every entry is written as local header, compressed data and a data
//! descriptor carrying the CRC32 and sizes, so sources are read exactly once
//! and the output never has to seek. The central directory and end of central
//! directory record follow on close.
//!
//! Failure policy: an error found before an entry's header is written (bad
//! name, unreadable source, unregistered encoder, oversized source) fails only
//! that `add_entry` call. Any error after that point, including cancellation
//! from a progress callback, aborts the archive: the writer moves to a failed
//! state, the partial file is removed for path-based writers, and no end of
//! central directory record is ever written.

use crate::coder::{CompressionLevel, Encoder};
use crate::dostime::DosDateTime;
use crate::entry::ZipEntrySource;
use crate::error::{ErrorPage, Result, ZipError};
use crate::format::{
    CentralDirectoryFileRecord, Crc32, DataDescriptor, EndOfCentralDirectoryRecord,
    LocalFileHeader, FLAG_DATA_DESCRIPTOR, FLAG_LEVEL_HINT_MASK, FLAG_UTF8, MAX_COMMENT_LEN,
    VERSION_FOR_EXTRACTION, VERSION_MADE_BY,
};
use crate::progress::{no_progress, Progress, ProgressControl};
use crate::registry::CompressionRegistry;
use std::fs::File;
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;
const MAX_ENTRIES: usize = u16::MAX as usize - 1;

/// How to open the destination. Only creating a new archive is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZipWriterMode {
    /// Create the file, truncating anything already there
    #[default]
    Create,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Created,
    Opened,
    Closed,
    Failed,
}

/// Tracks the absolute offset of everything written
#[derive(Debug)]
struct CountingWriter<W: Write> {
    inner: W,
    position: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.position += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Streaming ZIP writer that compresses entries on the fly
///
/// ```no_run
/// use zipkit::{CompressionLevel, ZipEntrySource, ZipWriter};
///
/// let mut writer = ZipWriter::create("output.zip")?;
/// writer.add_entry(
///     &ZipEntrySource::from_data("hello.txt", b"Hello, World!".to_vec())
///         .with_level(CompressionLevel::MAX),
/// )?;
/// writer.set_global_comment(Some("made by zipkit"))?;
/// writer.close()?;
/// # Ok::<(), zipkit::ZipError>(())
/// ```
#[derive(Debug)]
pub struct ZipWriter<W: Write = BufWriter<File>> {
    path: Option<PathBuf>,
    output: Option<CountingWriter<W>>,
    state: WriterState,
    records: Vec<CentralDirectoryFileRecord>,
    global_comment: Option<String>,
    registry: Arc<CompressionRegistry>,
    read_buffer_size: usize,
}

impl ZipWriter<BufWriter<File>> {
    /// Writer for the archive at `path`; nothing is created until [`ZipWriter::open`]
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self::with_output(Some(path.as_ref().to_path_buf()), None, WriterState::Created)
    }

    /// Create the archive at `path` and open it for writing
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut writer = Self::new(path);
        writer.open(ZipWriterMode::Create)?;
        Ok(writer)
    }

    /// Create or truncate the destination file
    pub fn open(&mut self, mode: ZipWriterMode) -> Result<()> {
        match self.state {
            WriterState::Created => {}
            WriterState::Opened => return Ok(()),
            WriterState::Closed => return Err(ZipError::WriterClosed),
            WriterState::Failed => return Err(ZipError::WriterAborted),
        }
        let ZipWriterMode::Create = mode;
        let path = self.path.clone().ok_or(ZipError::WriterNotOpen)?;
        let file = File::create(&path).map_err(|source| ZipError::CannotCreateArchive {
            path: path.clone(),
            source,
        })?;
        log::debug!("created archive {}", path.display());
        self.output = Some(CountingWriter {
            inner: BufWriter::new(file),
            position: 0,
        });
        self.state = WriterState::Opened;
        Ok(())
    }

    /// Path of the archive being written
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl<W: Write> ZipWriter<W> {
    /// Write an archive into an arbitrary writer (in-memory buffer, socket, ...).
    /// The writer starts out open.
    pub fn from_writer(writer: W) -> Self {
        Self::with_output(
            None,
            Some(CountingWriter {
                inner: writer,
                position: 0,
            }),
            WriterState::Opened,
        )
    }

    fn with_output(path: Option<PathBuf>, output: Option<CountingWriter<W>>, state: WriterState) -> Self {
        Self {
            path,
            output,
            state,
            records: Vec::new(),
            global_comment: None,
            registry: CompressionRegistry::shared(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    /// Resolve encoders from `registry` instead of the process-wide one
    pub fn with_registry(mut self, registry: Arc<CompressionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Chunk size used when pulling bytes from entry sources
    pub fn set_read_buffer_size(&mut self, size: usize) -> &mut Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Comment stored in the end of central directory record. Must be set
    /// before closing.
    pub fn set_global_comment<S: Into<String>>(&mut self, comment: Option<S>) -> Result<()> {
        let comment = comment.map(Into::into);
        if let Some(ref c) = comment {
            if c.len() > MAX_COMMENT_LEN {
                return Err(ZipError::InvalidEntry(
                    "archive comment is longer than 65535 bytes".to_string(),
                ));
            }
        }
        self.global_comment = comment;
        Ok(())
    }

    /// Number of entries written so far
    pub fn entry_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_open(&self) -> bool {
        self.state == WriterState::Opened
    }

    /// Compress `entry` into the archive
    pub fn add_entry(&mut self, entry: &ZipEntrySource) -> Result<()> {
        self.add_entry_with_progress(entry, no_progress)
    }

    /// Compress `entry` into the archive, reporting progress after each chunk.
    ///
    /// Returning [`ControlFlow::Break`](std::ops::ControlFlow::Break) from
    /// `progress` cancels the entry and aborts the whole archive.
    pub fn add_entry_with_progress<F>(&mut self, entry: &ZipEntrySource, mut progress: F) -> Result<()>
    where
        F: FnMut(Progress) -> ProgressControl,
    {
        self.add_entry_inner(entry, &mut progress)
            .map_err(|e| e.with_page(ErrorPage::Zip))
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            WriterState::Opened => Ok(()),
            WriterState::Created => Err(ZipError::WriterNotOpen),
            WriterState::Closed => Err(ZipError::WriterClosed),
            WriterState::Failed => Err(ZipError::WriterAborted),
        }
    }

    fn add_entry_inner(
        &mut self,
        entry: &ZipEntrySource,
        progress: &mut dyn FnMut(Progress) -> ProgressControl,
    ) -> Result<()> {
        self.ensure_open()?;
        entry.validate()?;

        // 0xFFFF in the record counts marks a ZIP64 archive
        if self.records.len() >= MAX_ENTRIES {
            return Err(ZipError::ArchiveTooLarge("more than 65534 entries"));
        }
        let name = entry.name().as_bytes().to_vec();
        let comment = entry.comment().map(|c| c.as_bytes().to_vec()).unwrap_or_default();
        if name.len() > u16::MAX as usize || comment.len() > u16::MAX as usize {
            return Err(ZipError::InvalidEntry(format!(
                "name or comment of {} is longer than 65535 bytes",
                entry.name()
            )));
        }

        let method = entry.compression_method();
        let encoder = self
            .registry
            .encoder_for(method)
            .ok_or(ZipError::EncoderNotRegistered(method))?;

        let total_bytes = entry.size_in_bytes();
        if total_bytes.map_or(false, |size| size >= u32::MAX as u64) {
            return Err(ZipError::EntryTooLarge {
                name: entry.name().to_string(),
            });
        }

        let offset = self.output.as_ref().ok_or(ZipError::WriterNotOpen)?.position;
        if offset >= u32::MAX as u64 {
            return Err(ZipError::ArchiveTooLarge("local header offset"));
        }
        let mut source = entry.open()?;

        log::trace!("adding entry {} with method {}", entry.name(), method);

        let level = entry.compression_level();
        let flags =
            FLAG_DATA_DESCRIPTOR | FLAG_UTF8 | (encoder.bit_flags_for_level(level) & FLAG_LEVEL_HINT_MASK);
        let timestamp = entry
            .timestamp()
            .map(|t| DosDateTime::from_datetime(&t))
            .unwrap_or(DosDateTime::NONE);
        let header = LocalFileHeader {
            version_needed: VERSION_FOR_EXTRACTION,
            flags,
            compression_method: method.code(),
            dos_time: timestamp.time,
            dos_date: timestamp.date,
            descriptor: DataDescriptor::default(),
            name,
            extra: Vec::new(),
        };

        let output = self.output.as_mut().ok_or(ZipError::WriterNotOpen)?;
        let streamed = Self::stream_entry(
            output,
            &header,
            encoder.as_ref(),
            level,
            entry.name(),
            &mut source,
            total_bytes,
            self.read_buffer_size,
            progress,
        );

        match streamed {
            Ok(descriptor) => {
                log::trace!(
                    "entry {}: {} -> {} bytes, crc 0x{:08x}",
                    entry.name(),
                    descriptor.uncompressed_size,
                    descriptor.compressed_size,
                    descriptor.crc32
                );
                self.records.push(CentralDirectoryFileRecord {
                    version_made_by: VERSION_MADE_BY,
                    version_needed: header.version_needed,
                    flags: header.flags,
                    compression_method: header.compression_method,
                    dos_time: header.dos_time,
                    dos_date: header.dos_date,
                    descriptor,
                    disk_number_start: 0,
                    internal_attributes: 0,
                    external_attributes: 0,
                    local_header_offset: offset as u32,
                    name: header.name,
                    extra: Vec::new(),
                    comment,
                });
                Ok(())
            }
            Err(err) => {
                log::debug!("aborting archive after failure in entry {}: {}", entry.name(), err);
                self.abort();
                Err(err)
            }
        }
    }

    /// Write header, compressed data and data descriptor for one entry
    #[allow(clippy::too_many_arguments)]
    fn stream_entry(
        output: &mut CountingWriter<W>,
        header: &LocalFileHeader,
        encoder: &dyn Encoder,
        level: CompressionLevel,
        name: &str,
        source: &mut dyn Read,
        total_bytes: Option<u64>,
        read_buffer_size: usize,
        progress: &mut dyn FnMut(Progress) -> ProgressControl,
    ) -> Result<DataDescriptor> {
        let mut buf = Vec::with_capacity(header.encoded_len());
        header.encode_into(&mut buf)?;
        output.write_all(&buf)?;

        let too_large = || ZipError::EntryTooLarge {
            name: name.to_string(),
        };
        let mut crc = Crc32::new();
        let mut uncompressed: u64 = 0;
        let mut compressed: u64 = 0;
        {
            let mut context = encoder.create_context(
                header.flags,
                level,
                Box::new(|chunk: &[u8]| {
                    compressed += chunk.len() as u64;
                    if compressed >= u32::MAX as u64 {
                        return Err(too_large());
                    }
                    output.write_all(chunk)?;
                    Ok(())
                }),
            );
            context.initialize()?;

            let mut chunk = vec![0u8; read_buffer_size];
            loop {
                let n = match source.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                };
                crc.update(&chunk[..n]);
                uncompressed += n as u64;
                if uncompressed >= u32::MAX as u64 {
                    return Err(too_large());
                }
                context.encode(&chunk[..n])?;

                let report = Progress {
                    total_bytes,
                    bytes_complete: uncompressed,
                    bytes_this_pass: n as u64,
                };
                if progress(report).is_break() {
                    return Err(ZipError::cancelled());
                }
            }
            context.finalize()?;
        }

        let descriptor = DataDescriptor {
            crc32: crc.value(),
            compressed_size: compressed as u32,
            uncompressed_size: uncompressed as u32,
        };
        buf.clear();
        descriptor.encode_into(&mut buf);
        output.write_all(&buf)?;
        Ok(descriptor)
    }

    /// Drop the output and remove the partial archive
    fn abort(&mut self) {
        self.state = WriterState::Failed;
        self.output = None;
        if let Some(path) = &self.path {
            if let Err(e) = std::fs::remove_file(path) {
                log::warn!("failed to remove partial archive {}: {}", path.display(), e);
            }
        }
    }

    fn write_central_directory(&mut self) -> Result<()> {
        let output = self.output.as_mut().ok_or(ZipError::WriterNotOpen)?;
        let central_directory_offset = output.position;
        if central_directory_offset >= u32::MAX as u64 {
            return Err(ZipError::ArchiveTooLarge("central directory offset"));
        }

        let mut buf = Vec::new();
        for record in &self.records {
            record.encode_into(&mut buf)?;
        }
        let central_directory_size = buf.len() as u64;
        if central_directory_size >= u32::MAX as u64 {
            return Err(ZipError::ArchiveTooLarge("central directory size"));
        }
        output.write_all(&buf)?;

        let count = self.records.len() as u16;
        let eocd = EndOfCentralDirectoryRecord {
            disk_number: 0,
            central_directory_disk: 0,
            records_on_disk: count,
            total_records: count,
            central_directory_size: central_directory_size as u32,
            central_directory_offset: central_directory_offset as u32,
            comment: self
                .global_comment
                .as_ref()
                .map(|c| c.as_bytes().to_vec())
                .unwrap_or_default(),
        };
        buf.clear();
        eocd.encode_into(&mut buf)?;
        output.write_all(&buf)?;
        output.flush()?;

        log::debug!(
            "wrote central directory: {} records, {} bytes at offset {}",
            count,
            central_directory_size,
            central_directory_offset
        );
        Ok(())
    }

    /// Write the central directory and end of central directory record.
    ///
    /// Path-based writers close their file. Calling again after success is a
    /// no-op.
    pub fn close(&mut self) -> Result<()> {
        self.close_inner().map_err(|e| e.with_page(ErrorPage::Zip))
    }

    fn close_inner(&mut self) -> Result<()> {
        self.write_trailer()?;
        if self.path.is_some() {
            self.output = None;
        }
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<()> {
        match self.state {
            WriterState::Closed => return Ok(()),
            WriterState::Created => return Err(ZipError::WriterNotOpen),
            WriterState::Failed => return Err(ZipError::WriterAborted),
            WriterState::Opened => {}
        }
        if let Err(err) = self.write_central_directory() {
            self.abort();
            return Err(err);
        }
        self.state = WriterState::Closed;
        Ok(())
    }

    /// Close and return the underlying writer.
    ///
    /// Path-based writers hand back their flushed file as well. Once
    /// [`close`](Self::close) has released a path-based writer's file there
    /// is nothing left to return and this fails with `WriterClosed`.
    pub fn finish(mut self) -> Result<W> {
        self.write_trailer().map_err(|e| e.with_page(ErrorPage::Zip))?;
        self.output
            .take()
            .map(|output| output.inner)
            .ok_or(ZipError::WriterClosed)
    }

    /// Best-effort close for error paths: tries to finish the archive and
    /// ignores any failure. Safe to call in any state.
    pub fn forcibly_close(&mut self) {
        if self.state == WriterState::Opened {
            if let Err(e) = self.close_inner() {
                log::debug!("ignoring error while forcibly closing archive: {}", e);
            }
        }
        self.output = None;
    }
}
