//! Byte-exact encoding and decoding of the ZIP structural records
//!
//! Nothing here touches a file: records are encoded into `Vec<u8>` buffers and
//! decoded from byte slices or any [`Read`] source. All integers are
//! little-endian.

use crate::error::{RecordKind, Result, ZipError};
use crc32fast::Hasher;
use std::io::Read;

/// ZIP local file header signature
pub const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;

/// ZIP data descriptor signature (optional in the record)
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074b50;

/// ZIP central directory signature
pub const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x02014b50;

/// ZIP end of central directory signature
pub const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06054b50;

/// Zip 2.0
pub const VERSION_FOR_EXTRACTION: u16 = 20;
pub const VERSION_MADE_BY: u16 = 20;

/// Bit 0: entry is encrypted
pub const FLAG_ENCRYPTED: u16 = 1 << 0;
/// Bits 1-2: method specific sub-level hint
pub const FLAG_LEVEL_HINT_MASK: u16 = 0b110;
/// Bit 3: crc and sizes follow the data in a data descriptor
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
/// Bit 11: name and comment are UTF-8
pub const FLAG_UTF8: u16 = 1 << 11;

/// Largest comment the EOCD length field can describe
pub const MAX_COMMENT_LEN: usize = u16::MAX as usize;

/// Little-endian field cursor over a record buffer
struct Fields<'a> {
    buf: &'a [u8],
    pos: usize,
    kind: RecordKind,
}

impl<'a> Fields<'a> {
    fn new(buf: &'a [u8], kind: RecordKind) -> Self {
        Self { buf, pos: 0, kind }
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos + len;
        if end > self.buf.len() {
            return Err(ZipError::Truncated(self.kind));
        }
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn signature(&mut self, expected: u32) -> Result<()> {
        let found = self.u32()?;
        if found != expected {
            return Err(ZipError::BadSignature {
                record: self.kind,
                found,
            });
        }
        Ok(())
    }
}

fn len_u16(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len).map_err(|_| ZipError::InvalidEntry(format!("{} is longer than 65535 bytes", what)))
}

fn read_exact_or_truncated<R: Read>(reader: &mut R, buf: &mut [u8], kind: RecordKind) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ZipError::Truncated(kind)
        } else {
            ZipError::from(e)
        }
    })
}

/// CRC32 and sizes of an entry's data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
}

impl DataDescriptor {
    /// Size without the optional signature
    pub const SIZE: usize = 12;
    pub const SIZE_WITH_SIGNATURE: usize = 16;

    /// Encode with the leading signature, which is what every common reader
    /// expects from a single-pass writer
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&DATA_DESCRIPTOR_SIGNATURE.to_le_bytes());
        out.extend_from_slice(&self.crc32.to_le_bytes());
        out.extend_from_slice(&self.compressed_size.to_le_bytes());
        out.extend_from_slice(&self.uncompressed_size.to_le_bytes());
    }

    /// Decode a descriptor that may or may not start with its signature.
    /// Returns the descriptor and the number of bytes it occupied.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let mut fields = Fields::new(buf, RecordKind::DataDescriptor);
        let first = fields.u32()?;
        let crc32 = if first == DATA_DESCRIPTOR_SIGNATURE && buf.len() >= Self::SIZE_WITH_SIGNATURE {
            fields.u32()?
        } else {
            first
        };
        let descriptor = DataDescriptor {
            crc32,
            compressed_size: fields.u32()?,
            uncompressed_size: fields.u32()?,
        };
        Ok((descriptor, fields.pos))
    }
}

/// Per-entry header written immediately before the entry's compressed data
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub dos_time: u16,
    pub dos_date: u16,
    /// Zero when [`FLAG_DATA_DESCRIPTOR`] is set
    pub descriptor: DataDescriptor,
    pub name: Vec<u8>,
    pub extra: Vec<u8>,
}

impl LocalFileHeader {
    pub const FIXED_SIZE: usize = 30;

    pub fn uses_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    /// Total encoded size including name and extra field
    pub fn encoded_len(&self) -> usize {
        Self::FIXED_SIZE + self.name.len() + self.extra.len()
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        let name_len = len_u16(self.name.len(), "entry name")?;
        let extra_len = len_u16(self.extra.len(), "extra field")?;
        out.reserve(self.encoded_len());
        out.extend_from_slice(&LOCAL_FILE_HEADER_SIGNATURE.to_le_bytes());
        out.extend_from_slice(&self.version_needed.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.compression_method.to_le_bytes());
        out.extend_from_slice(&self.dos_time.to_le_bytes());
        out.extend_from_slice(&self.dos_date.to_le_bytes());
        out.extend_from_slice(&self.descriptor.crc32.to_le_bytes());
        out.extend_from_slice(&self.descriptor.compressed_size.to_le_bytes());
        out.extend_from_slice(&self.descriptor.uncompressed_size.to_le_bytes());
        out.extend_from_slice(&name_len.to_le_bytes());
        out.extend_from_slice(&extra_len.to_le_bytes());
        out.extend_from_slice(&self.name);
        out.extend_from_slice(&self.extra);
        Ok(())
    }

    /// Decode the fixed prefix, returning the header (without name and extra)
    /// plus the name and extra lengths still to be read
    fn decode_fixed(buf: &[u8]) -> Result<(Self, usize, usize)> {
        let mut fields = Fields::new(buf, RecordKind::LocalFileHeader);
        fields.signature(LOCAL_FILE_HEADER_SIGNATURE)?;
        let mut header = LocalFileHeader {
            version_needed: fields.u16()?,
            flags: fields.u16()?,
            compression_method: fields.u16()?,
            dos_time: fields.u16()?,
            dos_date: fields.u16()?,
            ..Default::default()
        };
        header.descriptor = DataDescriptor {
            crc32: fields.u32()?,
            compressed_size: fields.u32()?,
            uncompressed_size: fields.u32()?,
        };
        let name_len = fields.u16()? as usize;
        let extra_len = fields.u16()? as usize;
        Ok((header, name_len, extra_len))
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let (mut header, name_len, extra_len) = Self::decode_fixed(buf)?;
        let mut fields = Fields::new(&buf[Self::FIXED_SIZE..], RecordKind::LocalFileHeader);
        header.name = fields.bytes(name_len)?.to_vec();
        header.extra = fields.bytes(extra_len)?.to_vec();
        Ok(header)
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut fixed = [0u8; Self::FIXED_SIZE];
        read_exact_or_truncated(reader, &mut fixed, RecordKind::LocalFileHeader)?;
        let (mut header, name_len, extra_len) = Self::decode_fixed(&fixed)?;
        header.name = vec![0u8; name_len];
        read_exact_or_truncated(reader, &mut header.name, RecordKind::LocalFileHeader)?;
        header.extra = vec![0u8; extra_len];
        read_exact_or_truncated(reader, &mut header.extra, RecordKind::LocalFileHeader)?;
        Ok(header)
    }
}

/// Authoritative per-entry metadata stored in the central directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CentralDirectoryFileRecord {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub dos_time: u16,
    pub dos_date: u16,
    pub descriptor: DataDescriptor,
    pub disk_number_start: u16,
    pub internal_attributes: u16,
    pub external_attributes: u32,
    pub local_header_offset: u32,
    pub name: Vec<u8>,
    pub extra: Vec<u8>,
    pub comment: Vec<u8>,
}

impl CentralDirectoryFileRecord {
    pub const FIXED_SIZE: usize = 46;

    pub fn encoded_len(&self) -> usize {
        Self::FIXED_SIZE + self.name.len() + self.extra.len() + self.comment.len()
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        let name_len = len_u16(self.name.len(), "entry name")?;
        let extra_len = len_u16(self.extra.len(), "extra field")?;
        let comment_len = len_u16(self.comment.len(), "entry comment")?;
        out.reserve(self.encoded_len());
        out.extend_from_slice(&CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes());
        out.extend_from_slice(&self.version_made_by.to_le_bytes());
        out.extend_from_slice(&self.version_needed.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.compression_method.to_le_bytes());
        out.extend_from_slice(&self.dos_time.to_le_bytes());
        out.extend_from_slice(&self.dos_date.to_le_bytes());
        out.extend_from_slice(&self.descriptor.crc32.to_le_bytes());
        out.extend_from_slice(&self.descriptor.compressed_size.to_le_bytes());
        out.extend_from_slice(&self.descriptor.uncompressed_size.to_le_bytes());
        out.extend_from_slice(&name_len.to_le_bytes());
        out.extend_from_slice(&extra_len.to_le_bytes());
        out.extend_from_slice(&comment_len.to_le_bytes());
        out.extend_from_slice(&self.disk_number_start.to_le_bytes());
        out.extend_from_slice(&self.internal_attributes.to_le_bytes());
        out.extend_from_slice(&self.external_attributes.to_le_bytes());
        out.extend_from_slice(&self.local_header_offset.to_le_bytes());
        out.extend_from_slice(&self.name);
        out.extend_from_slice(&self.extra);
        out.extend_from_slice(&self.comment);
        Ok(())
    }

    fn decode_fixed(buf: &[u8]) -> Result<(Self, [usize; 3])> {
        let mut fields = Fields::new(buf, RecordKind::CentralDirectoryFileRecord);
        fields.signature(CENTRAL_DIRECTORY_SIGNATURE)?;
        let mut record = CentralDirectoryFileRecord {
            version_made_by: fields.u16()?,
            version_needed: fields.u16()?,
            flags: fields.u16()?,
            compression_method: fields.u16()?,
            dos_time: fields.u16()?,
            dos_date: fields.u16()?,
            ..Default::default()
        };
        record.descriptor = DataDescriptor {
            crc32: fields.u32()?,
            compressed_size: fields.u32()?,
            uncompressed_size: fields.u32()?,
        };
        let lens = [
            fields.u16()? as usize,
            fields.u16()? as usize,
            fields.u16()? as usize,
        ];
        record.disk_number_start = fields.u16()?;
        record.internal_attributes = fields.u16()?;
        record.external_attributes = fields.u32()?;
        record.local_header_offset = fields.u32()?;
        Ok((record, lens))
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let (mut record, [name_len, extra_len, comment_len]) = Self::decode_fixed(buf)?;
        let mut fields = Fields::new(&buf[Self::FIXED_SIZE..], RecordKind::CentralDirectoryFileRecord);
        record.name = fields.bytes(name_len)?.to_vec();
        record.extra = fields.bytes(extra_len)?.to_vec();
        record.comment = fields.bytes(comment_len)?.to_vec();
        Ok(record)
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let kind = RecordKind::CentralDirectoryFileRecord;
        let mut fixed = [0u8; Self::FIXED_SIZE];
        read_exact_or_truncated(reader, &mut fixed, kind)?;
        let (mut record, [name_len, extra_len, comment_len]) = Self::decode_fixed(&fixed)?;
        record.name = vec![0u8; name_len];
        read_exact_or_truncated(reader, &mut record.name, kind)?;
        record.extra = vec![0u8; extra_len];
        read_exact_or_truncated(reader, &mut record.extra, kind)?;
        record.comment = vec![0u8; comment_len];
        read_exact_or_truncated(reader, &mut record.comment, kind)?;
        Ok(record)
    }
}

/// Archive trailer pointing at the central directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndOfCentralDirectoryRecord {
    pub disk_number: u16,
    pub central_directory_disk: u16,
    pub records_on_disk: u16,
    pub total_records: u16,
    pub central_directory_size: u32,
    pub central_directory_offset: u32,
    pub comment: Vec<u8>,
}

impl EndOfCentralDirectoryRecord {
    pub const FIXED_SIZE: usize = 22;

    /// The signature must appear within this many bytes of the end of the file
    pub const MAX_SEARCH_DISTANCE: usize = Self::FIXED_SIZE + MAX_COMMENT_LEN;

    pub fn encoded_len(&self) -> usize {
        Self::FIXED_SIZE + self.comment.len()
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        let comment_len = len_u16(self.comment.len(), "archive comment")?;
        out.reserve(self.encoded_len());
        out.extend_from_slice(&END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes());
        out.extend_from_slice(&self.disk_number.to_le_bytes());
        out.extend_from_slice(&self.central_directory_disk.to_le_bytes());
        out.extend_from_slice(&self.records_on_disk.to_le_bytes());
        out.extend_from_slice(&self.total_records.to_le_bytes());
        out.extend_from_slice(&self.central_directory_size.to_le_bytes());
        out.extend_from_slice(&self.central_directory_offset.to_le_bytes());
        out.extend_from_slice(&comment_len.to_le_bytes());
        out.extend_from_slice(&self.comment);
        Ok(())
    }

    /// Decode the fixed record and as much of the comment as `buf` holds.
    /// Returns the record and the declared comment length, which may exceed
    /// what was available.
    pub fn decode_partial(buf: &[u8]) -> Result<(Self, usize)> {
        let mut fields = Fields::new(buf, RecordKind::EndOfCentralDirectory);
        fields.signature(END_OF_CENTRAL_DIRECTORY_SIGNATURE)?;
        let mut record = EndOfCentralDirectoryRecord {
            disk_number: fields.u16()?,
            central_directory_disk: fields.u16()?,
            records_on_disk: fields.u16()?,
            total_records: fields.u16()?,
            central_directory_size: fields.u32()?,
            central_directory_offset: fields.u32()?,
            comment: Vec::new(),
        };
        let comment_len = fields.u16()? as usize;
        let available = comment_len.min(buf.len() - Self::FIXED_SIZE);
        record.comment = fields.bytes(available)?.to_vec();
        Ok((record, comment_len))
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let (record, comment_len) = Self::decode_partial(buf)?;
        if record.comment.len() != comment_len {
            return Err(ZipError::Truncated(RecordKind::EndOfCentralDirectory));
        }
        Ok(record)
    }

    /// Whether the 16-bit/32-bit fields carry ZIP64 placeholder values
    pub fn has_zip64_markers(&self) -> bool {
        self.records_on_disk == u16::MAX
            || self.total_records == u16::MAX
            || self.central_directory_size == u32::MAX
            || self.central_directory_offset == u32::MAX
    }
}

/// How well an EOCD candidate found by the backward scan fits the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EocdFit {
    /// Record and comment end exactly at end of file
    Exact,
    /// Record is plausible but followed by trailing bytes
    Loose,
    Invalid,
}

/// Judge an EOCD candidate located `offset` bytes into a file of `file_len` bytes.
/// `buf` starts at the candidate signature.
pub fn eocd_candidate_fit(buf: &[u8], offset: u64, file_len: u64) -> EocdFit {
    let (record, comment_len) = match EndOfCentralDirectoryRecord::decode_partial(buf) {
        Ok(decoded) => decoded,
        Err(_) => return EocdFit::Invalid,
    };
    let end = offset + EndOfCentralDirectoryRecord::FIXED_SIZE as u64 + comment_len as u64;
    if end > file_len {
        return EocdFit::Invalid;
    }
    if !record.has_zip64_markers() {
        let cd_end =
            record.central_directory_offset as u64 + record.central_directory_size as u64;
        if cd_end > offset {
            return EocdFit::Invalid;
        }
    }
    if end == file_len {
        EocdFit::Exact
    } else {
        EocdFit::Loose
    }
}

/// Running CRC32 (IEEE) over a stream fed in chunks of any size
#[derive(Clone, Default)]
pub struct Crc32 {
    hasher: Hasher,
}

impl Crc32 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// CRC of everything fed so far; does not reset the accumulator
    pub fn value(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}

impl std::fmt::Debug for Crc32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Crc32(0x{:08x})", self.value())
    }
}
