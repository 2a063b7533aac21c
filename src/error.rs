//! Error types for zipkit
//!
//! Every error maps to a numeric [`ErrorCode`]. Codes are grouped into pages of
//! [`ERROR_PAGE_SIZE`], one page per operation area, so a caller can classify an
//! error with `code / ERROR_PAGE_SIZE` without matching on every variant.

use crate::coder::CompressionMethod;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error domain reported alongside every [`ErrorCode`]
pub const ERROR_DOMAIN: &str = "zipkit";

/// Number of codes reserved per [`ErrorPage`]
pub const ERROR_PAGE_SIZE: i32 = 100;

/// Result type for zipkit operations
pub type Result<T> = std::result::Result<T, ZipError>;

/// Operation area an error code belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorPage {
    None = 0,
    /// In-memory compression of a buffer
    Compress = 1,
    /// Decompression, including saving records to disk
    Decompress = 2,
    /// Archive writing
    Zip = 3,
    /// Archive reading
    Unzip = 4,
}

impl ErrorPage {
    fn from_index(index: i32) -> Self {
        match index {
            1 => ErrorPage::Compress,
            2 => ErrorPage::Decompress,
            3 => ErrorPage::Zip,
            4 => ErrorPage::Unzip,
            _ => ErrorPage::None,
        }
    }

    fn base(self) -> i32 {
        self as i32 * ERROR_PAGE_SIZE
    }

    /// The last code of the page is reserved for cancellation
    pub fn cancelled_code(self) -> ErrorCode {
        ErrorCode(self.base() + ERROR_PAGE_SIZE - 1)
    }
}

/// Numeric error code, see the constants for the known values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    pub const UNKNOWN: ErrorCode = ErrorCode(0);

    pub const COMPRESS_UNKNOWN: ErrorCode = ErrorCode(100);
    pub const COMPRESS_FAILED: ErrorCode = ErrorCode(101);

    pub const DECOMPRESS_UNKNOWN: ErrorCode = ErrorCode(200);
    pub const DECOMPRESS_FAILED: ErrorCode = ErrorCode(201);
    pub const DECOMPRESS_CANNOT_CREATE_DESTINATION_DIRECTORY: ErrorCode = ErrorCode(202);
    pub const DECOMPRESS_CANNOT_CREATE_FILE: ErrorCode = ErrorCode(203);
    pub const DECOMPRESS_CANNOT_OVERWRITE_EXISTING_FILE: ErrorCode = ErrorCode(204);
    pub const DECOMPRESS_UNSAFE_ENTRY_PATH: ErrorCode = ErrorCode(205);

    pub const ZIP_UNKNOWN: ErrorCode = ErrorCode(300);
    pub const ZIP_CANNOT_CREATE_ZIP: ErrorCode = ErrorCode(301);
    pub const ZIP_NOT_OPEN: ErrorCode = ErrorCode(302);
    pub const ZIP_INVALID_ENTRY: ErrorCode = ErrorCode(303);
    pub const ZIP_FAILED_TO_WRITE_ZIP: ErrorCode = ErrorCode(304);
    pub const ZIP_DOES_NOT_SUPPORT_ZIP64: ErrorCode = ErrorCode(305);
    pub const ZIP_DOES_NOT_SUPPORT_COMPRESSION_METHOD: ErrorCode = ErrorCode(306);
    pub const ZIP_FAILED_TO_COMPRESS_ENTRY: ErrorCode = ErrorCode(307);
    pub const ZIP_ARCHIVE_ABORTED: ErrorCode = ErrorCode(308);

    pub const UNZIP_UNKNOWN: ErrorCode = ErrorCode(400);
    pub const UNZIP_CANNOT_OPEN_ZIP: ErrorCode = ErrorCode(401);
    pub const UNZIP_INVALID_ZIP_FILE: ErrorCode = ErrorCode(402);
    pub const UNZIP_MUST_OPEN_BEFORE_MANIPULATING: ErrorCode = ErrorCode(403);
    pub const UNZIP_CANNOT_READ_CENTRAL_DIRECTORY: ErrorCode = ErrorCode(404);
    pub const UNZIP_RECORD_COUNTS_DO_NOT_ALIGN: ErrorCode = ErrorCode(405);
    pub const UNZIP_MULTIPLE_DISKS_NOT_SUPPORTED: ErrorCode = ErrorCode(406);
    pub const UNZIP_ZIP64_NOT_SUPPORTED: ErrorCode = ErrorCode(407);
    pub const UNZIP_DECOMPRESSION_METHOD_NOT_SUPPORTED: ErrorCode = ErrorCode(408);
    pub const UNZIP_ENCRYPTION_NOT_SUPPORTED: ErrorCode = ErrorCode(409);
    pub const UNZIP_INDEX_OUT_OF_BOUNDS: ErrorCode = ErrorCode(410);
    pub const UNZIP_RECORD_NOT_FOUND: ErrorCode = ErrorCode(411);
    pub const UNZIP_CANNOT_READ_FILE_ENTRY: ErrorCode = ErrorCode(412);
    pub const UNZIP_CANNOT_DECOMPRESS_FILE_ENTRY: ErrorCode = ErrorCode(413);
    pub const UNZIP_FAILED_INTEGRITY_CHECK: ErrorCode = ErrorCode(414);

    /// Page this code belongs to
    pub fn page(self) -> ErrorPage {
        ErrorPage::from_index(self.0 / ERROR_PAGE_SIZE)
    }

    pub fn is_in_page(self, page: ErrorPage) -> bool {
        self.page() == page
    }

    pub fn is_cancellation(self) -> bool {
        self.0 % ERROR_PAGE_SIZE == ERROR_PAGE_SIZE - 1
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", ERROR_DOMAIN, self.0)
    }
}

/// Which structural record a signature check failed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    LocalFileHeader,
    DataDescriptor,
    CentralDirectoryFileRecord,
    EndOfCentralDirectory,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RecordKind::LocalFileHeader => "local file header",
            RecordKind::DataDescriptor => "data descriptor",
            RecordKind::CentralDirectoryFileRecord => "central directory file record",
            RecordKind::EndOfCentralDirectory => "end of central directory record",
        };
        f.write_str(name)
    }
}

/// Error types that can occur during ZIP operations
#[derive(Debug, Error)]
pub enum ZipError {
    /// I/O error, tagged with the operation area that hit it
    #[error("I/O error: {source}")]
    Io {
        page: ErrorPage,
        #[source]
        source: io::Error,
    },

    #[error("cannot create archive {}: {}", path.display(), source)]
    CannotCreateArchive {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot open archive {}: {}", path.display(), source)]
    CannotOpenArchive {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("archive writer is not open")]
    WriterNotOpen,

    #[error("archive writer was aborted by an earlier failure")]
    WriterAborted,

    #[error("archive writer is already closed")]
    WriterClosed,

    #[error("archive reader is not open")]
    ReaderNotOpen,

    #[error("central directory has not been read")]
    CentralDirectoryNotLoaded,

    /// Entry cannot be zipped (missing name, unreadable source, ...)
    #[error("invalid entry: {0}")]
    InvalidEntry(String),

    #[error("entry {name} needs 64-bit size fields, which are not supported")]
    EntryTooLarge { name: String },

    #[error("archive needs 64-bit fields ({0}), which are not supported")]
    ArchiveTooLarge(&'static str),

    #[error("no encoder registered for compression method {0}")]
    EncoderNotRegistered(CompressionMethod),

    #[error("no decoder registered for compression method {0}")]
    DecoderNotRegistered(CompressionMethod),

    #[error("encode failed: {0}")]
    EncodeFailed(String),

    #[error("decode failed: {0}")]
    DecodeFailed(String),

    /// No end of central directory record found
    #[error("not a ZIP file")]
    NotAZipFile,

    #[error("invalid {record} signature: 0x{found:08x}")]
    BadSignature { record: RecordKind, found: u32 },

    /// Record was cut short by the end of its buffer or file
    #[error("truncated {0}")]
    Truncated(RecordKind),

    #[error("corrupt central directory: expected {expected} records, found {found}")]
    RecordCountMismatch { expected: u64, found: u64 },

    #[error("corrupt central directory: {0}")]
    CorruptCentralDirectory(String),

    #[error("multi-disk archives are not supported")]
    MultiDiskUnsupported,

    #[error("ZIP64 archives are not supported")]
    Zip64Unsupported,

    #[error("entry {0} is encrypted, which is not supported")]
    EncryptionUnsupported(String),

    #[error("record index {index} out of bounds ({count} records)")]
    IndexOutOfBounds { index: usize, count: usize },

    #[error("entry not found: {0}")]
    EntryNotFound(String),

    #[error("local file header of {name} disagrees with central directory on {field}")]
    LocalHeaderMismatch { name: String, field: &'static str },

    #[error("CRC32 mismatch for {name}: expected 0x{expected:08x}, got 0x{actual:08x}")]
    CrcMismatch {
        name: String,
        expected: u32,
        actual: u32,
    },

    #[error("size mismatch for {name}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },

    #[error("refusing to overwrite existing file {}", .0.display())]
    WouldOverwrite(PathBuf),

    #[error("cannot create directory {}: {}", path.display(), source)]
    CannotCreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot create file {}: {}", path.display(), source)]
    CannotCreateFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("entry name {0} escapes the destination directory")]
    UnsafeEntryPath(String),

    #[error("operation cancelled")]
    Cancelled { page: ErrorPage },
}

impl ZipError {
    /// Numeric code of this error
    pub fn code(&self) -> ErrorCode {
        match self {
            ZipError::Io { page, .. } => match page {
                ErrorPage::None => ErrorCode::UNKNOWN,
                ErrorPage::Compress => ErrorCode::COMPRESS_FAILED,
                ErrorPage::Decompress => ErrorCode::DECOMPRESS_FAILED,
                ErrorPage::Zip => ErrorCode::ZIP_FAILED_TO_WRITE_ZIP,
                ErrorPage::Unzip => ErrorCode::UNZIP_CANNOT_READ_FILE_ENTRY,
            },
            ZipError::CannotCreateArchive { .. } => ErrorCode::ZIP_CANNOT_CREATE_ZIP,
            ZipError::CannotOpenArchive { .. } => ErrorCode::UNZIP_CANNOT_OPEN_ZIP,
            ZipError::WriterNotOpen | ZipError::WriterClosed => ErrorCode::ZIP_NOT_OPEN,
            ZipError::WriterAborted => ErrorCode::ZIP_ARCHIVE_ABORTED,
            ZipError::ReaderNotOpen | ZipError::CentralDirectoryNotLoaded => {
                ErrorCode::UNZIP_MUST_OPEN_BEFORE_MANIPULATING
            }
            ZipError::InvalidEntry(_) => ErrorCode::ZIP_INVALID_ENTRY,
            ZipError::EntryTooLarge { .. } | ZipError::ArchiveTooLarge(_) => {
                ErrorCode::ZIP_DOES_NOT_SUPPORT_ZIP64
            }
            ZipError::EncoderNotRegistered(_) => ErrorCode::ZIP_DOES_NOT_SUPPORT_COMPRESSION_METHOD,
            ZipError::DecoderNotRegistered(_) => {
                ErrorCode::UNZIP_DECOMPRESSION_METHOD_NOT_SUPPORTED
            }
            ZipError::EncodeFailed(_) => ErrorCode::ZIP_FAILED_TO_COMPRESS_ENTRY,
            ZipError::DecodeFailed(_) => ErrorCode::UNZIP_CANNOT_DECOMPRESS_FILE_ENTRY,
            ZipError::NotAZipFile => ErrorCode::UNZIP_INVALID_ZIP_FILE,
            ZipError::BadSignature { record, .. } | ZipError::Truncated(record) => match record {
                RecordKind::LocalFileHeader | RecordKind::DataDescriptor => {
                    ErrorCode::UNZIP_CANNOT_READ_FILE_ENTRY
                }
                RecordKind::CentralDirectoryFileRecord | RecordKind::EndOfCentralDirectory => {
                    ErrorCode::UNZIP_CANNOT_READ_CENTRAL_DIRECTORY
                }
            },
            ZipError::RecordCountMismatch { .. } => ErrorCode::UNZIP_RECORD_COUNTS_DO_NOT_ALIGN,
            ZipError::CorruptCentralDirectory(_) => ErrorCode::UNZIP_CANNOT_READ_CENTRAL_DIRECTORY,
            ZipError::MultiDiskUnsupported => ErrorCode::UNZIP_MULTIPLE_DISKS_NOT_SUPPORTED,
            ZipError::Zip64Unsupported => ErrorCode::UNZIP_ZIP64_NOT_SUPPORTED,
            ZipError::EncryptionUnsupported(_) => ErrorCode::UNZIP_ENCRYPTION_NOT_SUPPORTED,
            ZipError::IndexOutOfBounds { .. } => ErrorCode::UNZIP_INDEX_OUT_OF_BOUNDS,
            ZipError::EntryNotFound(_) => ErrorCode::UNZIP_RECORD_NOT_FOUND,
            ZipError::LocalHeaderMismatch { .. } => ErrorCode::UNZIP_CANNOT_READ_FILE_ENTRY,
            ZipError::CrcMismatch { .. } | ZipError::SizeMismatch { .. } => {
                ErrorCode::UNZIP_FAILED_INTEGRITY_CHECK
            }
            ZipError::WouldOverwrite(_) => ErrorCode::DECOMPRESS_CANNOT_OVERWRITE_EXISTING_FILE,
            ZipError::CannotCreateDirectory { .. } => {
                ErrorCode::DECOMPRESS_CANNOT_CREATE_DESTINATION_DIRECTORY
            }
            ZipError::CannotCreateFile { .. } => ErrorCode::DECOMPRESS_CANNOT_CREATE_FILE,
            ZipError::UnsafeEntryPath(_) => ErrorCode::DECOMPRESS_UNSAFE_ENTRY_PATH,
            ZipError::Cancelled { page } => page.cancelled_code(),
        }
    }

    /// Page of [`ZipError::code`]
    pub fn page(&self) -> ErrorPage {
        self.code().page()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ZipError::Cancelled { .. })
    }

    /// Stamp untagged I/O errors and cancellations with the page of the
    /// operation area that surfaced them
    pub(crate) fn with_page(self, page: ErrorPage) -> Self {
        match self {
            ZipError::Io {
                page: ErrorPage::None,
                source,
            } => ZipError::Io { page, source },
            ZipError::Cancelled {
                page: ErrorPage::None,
            } => ZipError::Cancelled { page },
            other => other,
        }
    }

    pub(crate) fn cancelled() -> Self {
        ZipError::Cancelled {
            page: ErrorPage::None,
        }
    }
}

impl From<io::Error> for ZipError {
    fn from(err: io::Error) -> Self {
        ZipError::Io {
            page: ErrorPage::None,
            source: err,
        }
    }
}
