//! ZIP reader that loads the central directory once and streams entries on demand
//!
//! The end of central directory record is located by scanning backward from
//! the end of the file, the central directory is parsed in full, and entry data
//! is decoded chunk by chunk through the registered [`Decoder`](crate::coder::Decoder). CRC32 and
//! size checks happen after the last chunk has been delivered.

use crate::coder::{CompressionLevel, CompressionMethod, DecoderContext};
use crate::dostime::DosDateTime;
use crate::error::{ErrorPage, Result, ZipError};
use crate::format::{
    eocd_candidate_fit, CentralDirectoryFileRecord, Crc32, EndOfCentralDirectoryRecord, EocdFit,
    LocalFileHeader, CENTRAL_DIRECTORY_SIGNATURE, END_OF_CENTRAL_DIRECTORY_SIGNATURE, FLAG_ENCRYPTED,
};
use crate::progress::{no_progress, Progress, ProgressControl};
use crate::registry::CompressionRegistry;
use chrono::NaiveDateTime;
use std::cell::RefCell;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Take, Write};
use std::ops::ControlFlow;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

/// Bytes read per step of the backward end of central directory scan
const EOCD_SCAN_CHUNK: u64 = 4 * 1024;

/// Reader configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Match names in [`ZipReader::index_for_record`] ignoring case
    pub case_insensitive_names: bool,
    /// Compressed bytes read from the archive per decode step
    pub read_buffer_size: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            case_insensitive_names: false,
            read_buffer_size: 64 * 1024,
        }
    }
}

/// How [`ZipReader::save_record`] places files on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaveOptions {
    /// Replace a file that already exists at the destination
    pub overwrite_existing: bool,
    /// Drop directory components of the entry name and write into the
    /// destination directory directly
    pub ignore_intermediate_path: bool,
}

/// Metadata of one entry as recorded in the central directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectoryRecord {
    pub name: String,
    pub comment: Option<String>,
    pub compression_method: CompressionMethod,
    /// Best-effort reconstruction from the header's level hint bits
    pub compression_level: CompressionLevel,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub local_header_offset: u64,
    pub flags: u16,
    pub modified: DosDateTime,
    pub external_attributes: u32,
    raw_name: Vec<u8>,
}

impl CentralDirectoryRecord {
    fn from_file_record(record: CentralDirectoryFileRecord, registry: &CompressionRegistry) -> Self {
        let compression_method = CompressionMethod(record.compression_method);
        let compression_level = registry
            .decoder_for(compression_method)
            .map(|decoder| decoder.level_for_bit_flags(record.flags))
            .unwrap_or(CompressionLevel::DEFAULT);
        let comment = if record.comment.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&record.comment).into_owned())
        };
        Self {
            name: String::from_utf8_lossy(&record.name).into_owned(),
            comment,
            compression_method,
            compression_level,
            compressed_size: record.descriptor.compressed_size as u64,
            uncompressed_size: record.descriptor.uncompressed_size as u64,
            crc32: record.descriptor.crc32,
            local_header_offset: record.local_header_offset as u64,
            flags: record.flags,
            modified: DosDateTime {
                date: record.dos_date,
                time: record.dos_time,
            },
            external_attributes: record.external_attributes,
            raw_name: record.name,
        }
    }

    /// Modification time, if one was stored
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        self.modified.to_datetime()
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    pub fn is_directory(&self) -> bool {
        self.name.ends_with('/')
    }

    pub fn is_zero_length(&self) -> bool {
        self.uncompressed_size == 0
    }

    /// Resource fork / extended attribute entry added by macOS Archive Utility
    pub fn is_macos_attribute(&self) -> bool {
        self.name.starts_with("__MACOSX/")
    }

    pub fn is_macos_ds_store(&self) -> bool {
        self.name.rsplit('/').next() == Some(".DS_Store")
    }
}

/// Parsed central directory plus archive-level metadata
#[derive(Debug, Clone, Default)]
pub struct CentralDirectory {
    records: Vec<CentralDirectoryRecord>,
    global_comment: Option<String>,
    total_compressed_size: u64,
    total_uncompressed_size: u64,
}

impl CentralDirectory {
    /// Records in central directory order
    pub fn records(&self) -> &[CentralDirectoryRecord] {
        &self.records
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn get(&self, index: usize) -> Option<&CentralDirectoryRecord> {
        self.records.get(index)
    }

    pub fn global_comment(&self) -> Option<&str> {
        self.global_comment.as_deref()
    }

    pub fn total_compressed_size(&self) -> u64 {
        self.total_compressed_size
    }

    pub fn total_uncompressed_size(&self) -> u64 {
        self.total_uncompressed_size
    }
}

/// ZIP archive reader
///
/// ```no_run
/// use zipkit::ZipReader;
///
/// let mut reader = ZipReader::from_path("archive.zip")?;
/// let directory = reader.read_central_directory()?;
/// for record in directory.records() {
///     let data = reader.read_data(record)?;
///     println!("{}: {} bytes", record.name, data.len());
/// }
/// # Ok::<(), zipkit::ZipError>(())
/// ```
#[derive(Debug)]
pub struct ZipReader {
    path: PathBuf,
    file: Option<BufReader<File>>,
    file_len: u64,
    central_directory: Option<Arc<CentralDirectory>>,
    registry: Arc<CompressionRegistry>,
    options: ReaderOptions,
}

impl ZipReader {
    /// Reader for the archive at `path`; nothing is opened until [`ZipReader::open`]
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: None,
            file_len: 0,
            central_directory: None,
            registry: CompressionRegistry::shared(),
            options: ReaderOptions::default(),
        }
    }

    /// Open the archive and load its central directory
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = Self::new(path);
        reader.open()?;
        reader.read_central_directory()?;
        Ok(reader)
    }

    pub fn with_options(mut self, options: ReaderOptions) -> Self {
        self.options = options;
        self
    }

    /// Resolve decoders from `registry` instead of the process-wide one
    pub fn with_registry(mut self, registry: Arc<CompressionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Open the archive file read-only. Opening an open reader is a no-op.
    pub fn open(&mut self) -> Result<()> {
        if self.file.is_some() {
            return Ok(());
        }
        let file = File::open(&self.path).map_err(|source| ZipError::CannotOpenArchive {
            path: self.path.clone(),
            source,
        })?;
        self.file_len = file
            .metadata()
            .map_err(|source| ZipError::CannotOpenArchive {
                path: self.path.clone(),
                source,
            })?
            .len();
        log::debug!("opened archive {} ({} bytes)", self.path.display(), self.file_len);
        self.file = Some(BufReader::new(file));
        Ok(())
    }

    /// Locate and parse the central directory. Later calls return the
    /// already-loaded directory.
    pub fn read_central_directory(&mut self) -> Result<Arc<CentralDirectory>> {
        if let Some(directory) = &self.central_directory {
            return Ok(Arc::clone(directory));
        }
        let file = self.file.as_mut().ok_or(ZipError::ReaderNotOpen)?;
        let directory = Arc::new(
            load_central_directory(file, self.file_len, &self.registry)
                .map_err(|e| e.with_page(ErrorPage::Unzip))?,
        );
        log::debug!(
            "loaded central directory of {}: {} records",
            self.path.display(),
            directory.record_count()
        );
        self.central_directory = Some(Arc::clone(&directory));
        Ok(directory)
    }

    /// The loaded central directory, if any
    pub fn central_directory(&self) -> Option<&CentralDirectory> {
        self.central_directory.as_deref()
    }

    fn loaded_directory(&self) -> Result<&CentralDirectory> {
        if self.file.is_none() {
            return Err(ZipError::ReaderNotOpen);
        }
        self.central_directory
            .as_deref()
            .ok_or(ZipError::CentralDirectoryNotLoaded)
    }

    pub fn record_count(&self) -> Result<usize> {
        Ok(self.loaded_directory()?.record_count())
    }

    /// Record at `index` in central directory order
    pub fn record_at(&self, index: usize) -> Result<CentralDirectoryRecord> {
        let directory = self.loaded_directory()?;
        directory
            .get(index)
            .cloned()
            .ok_or(ZipError::IndexOutOfBounds {
                index,
                count: directory.record_count(),
            })
    }

    /// Index of the first record named `name`
    pub fn index_for_record(&self, name: &str) -> Result<usize> {
        let directory = self.loaded_directory()?;
        let position = if self.options.case_insensitive_names {
            let wanted = name.to_lowercase();
            directory
                .records
                .iter()
                .position(|r| r.name.to_lowercase() == wanted)
        } else {
            directory.records.iter().position(|r| r.name == name)
        };
        position.ok_or_else(|| ZipError::EntryNotFound(name.to_string()))
    }

    /// Visit records in central directory order until `visit` breaks
    pub fn enumerate_records<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&CentralDirectoryRecord, usize) -> ControlFlow<()>,
    {
        for (index, record) in self.loaded_directory()?.records.iter().enumerate() {
            if visit(record, index).is_break() {
                break;
            }
        }
        Ok(())
    }

    /// Decompress a whole entry into memory
    pub fn read_data(&mut self, record: &CentralDirectoryRecord) -> Result<Vec<u8>> {
        self.read_data_with_progress(record, no_progress)
    }

    pub fn read_data_with_progress<P>(
        &mut self,
        record: &CentralDirectoryRecord,
        mut progress: P,
    ) -> Result<Vec<u8>>
    where
        P: FnMut(Progress) -> ProgressControl,
    {
        let mut data = Vec::with_capacity(record.uncompressed_size.min(64 * 1024 * 1024) as usize);
        self.stream_record(record, &mut progress, &mut |chunk: &[u8]| {
            data.extend_from_slice(chunk);
            ControlFlow::Continue(())
        })
        .map_err(|e| e.with_page(ErrorPage::Unzip))?;
        Ok(data)
    }

    /// Deliver an entry's decompressed bytes to `callback` chunk by chunk.
    ///
    /// `callback` returning `Break` stops delivery early without an error and
    /// skips the integrity check. `progress` returning `Break` cancels with
    /// [`ZipError::Cancelled`]. A CRC32 or size mismatch is reported after
    /// every decoded byte has been delivered.
    pub fn enumerate_byte_ranges<P, F>(
        &mut self,
        record: &CentralDirectoryRecord,
        mut progress: P,
        mut callback: F,
    ) -> Result<()>
    where
        P: FnMut(Progress) -> ProgressControl,
        F: FnMut(&[u8]) -> ControlFlow<()>,
    {
        self.stream_record(record, &mut progress, &mut callback)
            .map_err(|e| e.with_page(ErrorPage::Unzip))
    }

    fn stream_record(
        &mut self,
        record: &CentralDirectoryRecord,
        progress: &mut dyn FnMut(Progress) -> ProgressControl,
        callback: &mut dyn FnMut(&[u8]) -> ControlFlow<()>,
    ) -> Result<()> {
        let mut stream = self.open_stream(record)?;
        while let Some(chunk) = stream.next_chunk()? {
            if callback(&chunk).is_break() {
                log::trace!("delivery of {} stopped by caller", record.name);
                return Ok(());
            }
            if progress(stream.progress(chunk.len())).is_break() {
                return Err(ZipError::cancelled());
            }
        }
        Ok(())
    }

    /// Streaming [`Read`] adapter over one entry's decompressed bytes.
    ///
    /// Integrity failures surface as an [`io::Error`] of kind `InvalidData`
    /// from the read that reaches the end of the entry.
    pub fn record_reader(&mut self, record: &CentralDirectoryRecord) -> Result<RecordReader<'_>> {
        let stream = self
            .open_stream(record)
            .map_err(|e| e.with_page(ErrorPage::Unzip))?;
        Ok(RecordReader {
            stream,
            current: Vec::new(),
            pos: 0,
        })
    }

    /// Extract an entry below `destination_dir`, returning the written path.
    ///
    /// Directory entries create the directory, unless
    /// `ignore_intermediate_path` is set, in which case they are skipped and
    /// `destination_dir` is returned. A partially written file is removed
    /// when extraction fails.
    pub fn save_record<D: AsRef<Path>>(
        &mut self,
        record: &CentralDirectoryRecord,
        destination_dir: D,
        options: SaveOptions,
    ) -> Result<PathBuf> {
        self.save_record_with_progress(record, destination_dir, options, no_progress)
    }

    pub fn save_record_with_progress<D, P>(
        &mut self,
        record: &CentralDirectoryRecord,
        destination_dir: D,
        options: SaveOptions,
        mut progress: P,
    ) -> Result<PathBuf>
    where
        D: AsRef<Path>,
        P: FnMut(Progress) -> ProgressControl,
    {
        self.save_inner(record, destination_dir.as_ref(), options, &mut progress)
            .map_err(|e| e.with_page(ErrorPage::Decompress))
    }

    fn save_inner(
        &mut self,
        record: &CentralDirectoryRecord,
        destination_dir: &Path,
        options: SaveOptions,
        progress: &mut dyn FnMut(Progress) -> ProgressControl,
    ) -> Result<PathBuf> {
        let relative = safe_relative_path(&record.name, options.ignore_intermediate_path)?;
        let target = destination_dir.join(relative);

        if record.is_directory() {
            if options.ignore_intermediate_path {
                log::trace!("skipping directory {} while flattening", record.name);
                return Ok(destination_dir.to_path_buf());
            }
            fs::create_dir_all(&target).map_err(|source| ZipError::CannotCreateDirectory {
                path: target.clone(),
                source,
            })?;
            return Ok(target);
        }
        if target.exists() && !options.overwrite_existing {
            return Err(ZipError::WouldOverwrite(target));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| ZipError::CannotCreateDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut stream = self.open_stream(record)?;
        let file = File::create(&target).map_err(|source| ZipError::CannotCreateFile {
            path: target.clone(),
            source,
        })?;
        let mut out = BufWriter::new(file);
        let copied = copy_stream(&mut stream, &mut out, progress);
        drop(out);

        if let Err(err) = copied {
            if let Err(e) = fs::remove_file(&target) {
                log::warn!("failed to remove partial file {}: {}", target.display(), e);
            }
            return Err(err);
        }
        log::trace!("saved {} to {}", record.name, target.display());
        Ok(target)
    }

    /// Seek to the entry, validate its local header and set up decoding
    fn open_stream(&mut self, record: &CentralDirectoryRecord) -> Result<EntryStream<'_>> {
        if record.is_encrypted() {
            return Err(ZipError::EncryptionUnsupported(record.name.clone()));
        }
        let decoder = self
            .registry
            .decoder_for(record.compression_method)
            .ok_or(ZipError::DecoderNotRegistered(record.compression_method))?;
        let read_buffer_size = self.options.read_buffer_size.max(1);
        let file = self.file.as_mut().ok_or(ZipError::ReaderNotOpen)?;

        file.seek(SeekFrom::Start(record.local_header_offset))?;
        let header = LocalFileHeader::read_from(file)?;
        validate_local_header(&header, record)?;

        let pending = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&pending);
        let mut context = decoder.create_context(
            header.flags,
            Box::new(move |chunk: &[u8]| {
                sink.borrow_mut().extend_from_slice(chunk);
                Ok(())
            }),
        );
        context.initialize()?;

        log::trace!(
            "streaming {} ({} -> {} bytes, method {})",
            record.name,
            record.compressed_size,
            record.uncompressed_size,
            record.compression_method
        );
        let buffer_len = read_buffer_size.min(record.compressed_size.max(1) as usize);
        Ok(EntryStream {
            name: record.name.clone(),
            expected_crc: record.crc32,
            expected_size: record.uncompressed_size,
            input: file.take(record.compressed_size),
            context,
            pending,
            read_buf: vec![0u8; buffer_len],
            crc: Crc32::new(),
            delivered: 0,
            stage: Stage::Decoding,
        })
    }

    /// Release the file handle and the loaded directory. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.file.take().is_some() {
            log::debug!("closed archive {}", self.path.display());
        }
        self.central_directory = None;
    }

    /// Release everything without logging; for error and cleanup paths
    pub fn forcibly_close(&mut self) {
        self.file = None;
        self.central_directory = None;
    }
}

fn validate_local_header(header: &LocalFileHeader, record: &CentralDirectoryRecord) -> Result<()> {
    let mismatch = |field| ZipError::LocalHeaderMismatch {
        name: record.name.clone(),
        field,
    };
    if header.flags & FLAG_ENCRYPTED != 0 {
        return Err(ZipError::EncryptionUnsupported(record.name.clone()));
    }
    if header.compression_method != record.compression_method.code() {
        return Err(mismatch("compression method"));
    }
    if header.name != record.raw_name {
        return Err(mismatch("name"));
    }
    if !header.uses_data_descriptor() {
        if header.descriptor.crc32 != record.crc32 {
            return Err(mismatch("crc32"));
        }
        if header.descriptor.compressed_size as u64 != record.compressed_size {
            return Err(mismatch("compressed size"));
        }
        if header.descriptor.uncompressed_size as u64 != record.uncompressed_size {
            return Err(mismatch("uncompressed size"));
        }
    }
    Ok(())
}

fn copy_stream<W: Write>(
    stream: &mut EntryStream<'_>,
    out: &mut W,
    progress: &mut dyn FnMut(Progress) -> ProgressControl,
) -> Result<()> {
    while let Some(chunk) = stream.next_chunk()? {
        out.write_all(&chunk)?;
        if progress(stream.progress(chunk.len())).is_break() {
            return Err(ZipError::cancelled());
        }
    }
    out.flush()?;
    Ok(())
}

/// Relative path for an entry name; rejects absolute names and `..`
fn safe_relative_path(name: &str, flatten: bool) -> Result<PathBuf> {
    let unsafe_path = || ZipError::UnsafeEntryPath(name.to_string());
    if name.starts_with('/') || name.starts_with('\\') {
        return Err(unsafe_path());
    }
    let mut relative = PathBuf::new();
    for segment in name.split(|c| c == '/' || c == '\\') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => relative.push(part),
            _ => return Err(unsafe_path()),
        }
    }
    if flatten {
        relative = relative.file_name().map(PathBuf::from).unwrap_or_default();
    }
    if relative.as_os_str().is_empty() {
        return Err(unsafe_path());
    }
    Ok(relative)
}

/// Scan backward over the tail of the file for the end of central directory
/// record. A candidate ending exactly at end of file whose central directory
/// offset lands on a central directory signature wins outright. Failing that,
/// candidates are ranked: anchored before unanchored, exact before trailing
/// bytes, nearest to the end first.
fn find_end_of_central_directory<R: Read + Seek>(
    file: &mut R,
    file_len: u64,
) -> Result<EndOfCentralDirectoryRecord> {
    let search_len = file_len.min(EndOfCentralDirectoryRecord::MAX_SEARCH_DISTANCE as u64);
    let search_start = file_len - search_len;
    let signature = END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes();

    let mut window: Vec<u8> = Vec::new();
    let mut window_start = file_len;
    let mut best: Option<(u8, EndOfCentralDirectoryRecord)> = None;

    while window_start > search_start {
        let chunk_start = window_start.saturating_sub(EOCD_SCAN_CHUNK).max(search_start);
        let mut chunk = vec![0u8; (window_start - chunk_start) as usize];
        file.seek(SeekFrom::Start(chunk_start))?;
        file.read_exact(&mut chunk)?;
        chunk.extend_from_slice(&window);
        window = chunk;
        let scanned_from = window_start;
        window_start = chunk_start;

        // positions new to this pass, nearest to the end first
        for pos in (chunk_start..scanned_from).rev() {
            let i = (pos - chunk_start) as usize;
            if window.len() < i + signature.len() || window[i..i + 4] != signature {
                continue;
            }
            let exact = match eocd_candidate_fit(&window[i..], pos, file_len) {
                EocdFit::Exact => true,
                EocdFit::Loose => false,
                EocdFit::Invalid => continue,
            };
            let record = match EndOfCentralDirectoryRecord::decode(&window[i..]) {
                Ok(record) => record,
                Err(_) => continue,
            };
            let anchored = points_at_central_directory(file, &record, file_len)?;
            let rank = match (anchored, exact) {
                (true, true) => return Ok(record),
                (true, false) => 1,
                (false, true) => 2,
                (false, false) => 3,
            };
            if best.as_ref().map_or(true, |(current, _)| rank < *current) {
                best = Some((rank, record));
            }
        }
    }

    match best {
        Some((rank, record)) => {
            log::debug!("using end of central directory candidate of rank {}", rank);
            Ok(record)
        }
        None => Err(ZipError::NotAZipFile),
    }
}

/// Whether the record's central directory offset lands on a central
/// directory record signature. Empty and ZIP64 directories cannot be checked.
fn points_at_central_directory<R: Read + Seek>(
    file: &mut R,
    record: &EndOfCentralDirectoryRecord,
    file_len: u64,
) -> Result<bool> {
    if record.total_records == 0 || record.has_zip64_markers() {
        return Ok(true);
    }
    let offset = record.central_directory_offset as u64;
    if offset + 4 > file_len {
        return Ok(false);
    }
    let mut magic = [0u8; 4];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut magic)?;
    Ok(u32::from_le_bytes(magic) == CENTRAL_DIRECTORY_SIGNATURE)
}

fn load_central_directory<R: Read + Seek>(
    file: &mut R,
    file_len: u64,
    registry: &CompressionRegistry,
) -> Result<CentralDirectory> {
    let eocd = find_end_of_central_directory(file, file_len)?;
    if eocd.disk_number != 0
        || eocd.central_directory_disk != 0
        || eocd.records_on_disk != eocd.total_records
    {
        return Err(ZipError::MultiDiskUnsupported);
    }
    if eocd.has_zip64_markers() {
        return Err(ZipError::Zip64Unsupported);
    }

    let expected = eocd.total_records as u64;
    let cd_size = eocd.central_directory_size as u64;
    file.seek(SeekFrom::Start(eocd.central_directory_offset as u64))?;
    let mut section = file.take(cd_size);

    let mut records = Vec::with_capacity(eocd.total_records as usize);
    let mut consumed = 0u64;
    for found in 0..expected {
        let record = match CentralDirectoryFileRecord::read_from(&mut section) {
            Ok(record) => record,
            Err(ZipError::BadSignature { .. }) | Err(ZipError::Truncated(_)) => {
                return Err(ZipError::RecordCountMismatch { expected, found });
            }
            Err(e) => return Err(e),
        };
        consumed += record.encoded_len() as u64;
        records.push(CentralDirectoryRecord::from_file_record(record, registry));
    }
    if consumed != cd_size {
        return Err(ZipError::CorruptCentralDirectory(format!(
            "{} records occupy {} bytes, directory declares {}",
            expected, consumed, cd_size
        )));
    }

    let global_comment = if eocd.comment.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(&eocd.comment).into_owned())
    };
    Ok(CentralDirectory {
        total_compressed_size: records.iter().map(|r| r.compressed_size).sum(),
        total_uncompressed_size: records.iter().map(|r| r.uncompressed_size).sum(),
        records,
        global_comment,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Decoding,
    Finalized,
    Done,
}

/// Pumps compressed bytes through a decoder context and hands out the
/// decoded chunks, checking CRC32 and size once the data runs out
struct EntryStream<'r> {
    name: String,
    expected_crc: u32,
    expected_size: u64,
    input: Take<&'r mut BufReader<File>>,
    context: Box<dyn DecoderContext>,
    pending: Rc<RefCell<Vec<u8>>>,
    read_buf: Vec<u8>,
    crc: Crc32,
    delivered: u64,
    stage: Stage,
}

impl EntryStream<'_> {
    fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let next = self.advance();
        if next.is_err() {
            self.stage = Stage::Done;
        }
        next
    }

    fn advance(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            let chunk = std::mem::take(&mut *self.pending.borrow_mut());
            if !chunk.is_empty() {
                self.crc.update(&chunk);
                self.delivered += chunk.len() as u64;
                return Ok(Some(chunk));
            }
            match self.stage {
                Stage::Decoding => self.pump()?,
                Stage::Finalized => {
                    self.stage = Stage::Done;
                    self.verify()?;
                    return Ok(None);
                }
                Stage::Done => return Ok(None),
            }
        }
    }

    fn pump(&mut self) -> Result<()> {
        if self.context.has_finished() {
            return self.finish_decoding();
        }
        let n = loop {
            match self.input.read(&mut self.read_buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        if n == 0 {
            if self.input.limit() > 0 {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("archive ends inside the data of {}", self.name),
                )
                .into());
            }
            return self.finish_decoding();
        }
        self.context.decode(&self.read_buf[..n])
    }

    fn finish_decoding(&mut self) -> Result<()> {
        self.context.finalize()?;
        self.stage = Stage::Finalized;
        Ok(())
    }

    fn verify(&self) -> Result<()> {
        if self.delivered != self.expected_size {
            log::warn!(
                "{}: expected {} bytes, decoded {}",
                self.name,
                self.expected_size,
                self.delivered
            );
            return Err(ZipError::SizeMismatch {
                name: self.name.clone(),
                expected: self.expected_size,
                actual: self.delivered,
            });
        }
        let actual = self.crc.value();
        if actual != self.expected_crc {
            log::warn!(
                "{}: CRC32 0x{:08x} does not match stored 0x{:08x}",
                self.name,
                actual,
                self.expected_crc
            );
            return Err(ZipError::CrcMismatch {
                name: self.name.clone(),
                expected: self.expected_crc,
                actual,
            });
        }
        Ok(())
    }

    fn progress(&self, this_pass: usize) -> Progress {
        Progress {
            total_bytes: Some(self.expected_size),
            bytes_complete: self.delivered,
            bytes_this_pass: this_pass as u64,
        }
    }
}

/// [`Read`] over one entry's decompressed bytes, from [`ZipReader::record_reader`]
pub struct RecordReader<'r> {
    stream: EntryStream<'r>,
    current: Vec<u8>,
    pos: usize,
}

impl Read for RecordReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos == self.current.len() {
            match self.stream.next_chunk() {
                Ok(Some(chunk)) => {
                    self.current = chunk;
                    self.pos = 0;
                }
                Ok(None) => return Ok(0),
                Err(ZipError::Io { source, .. }) => return Err(source),
                Err(e) => return Err(io::Error::new(ErrorKind::InvalidData, e)),
            }
        }
        let n = buf.len().min(self.current.len() - self.pos);
        buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl std::fmt::Debug for RecordReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordReader")
            .field("name", &self.stream.name)
            .field("delivered", &self.stream.delivered)
            .finish()
    }
}
