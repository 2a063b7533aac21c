//! Sources of data to be archived

use crate::coder::{CompressionLevel, CompressionMethod};
use crate::error::{Result, ZipError};
use chrono::{DateTime, Local, NaiveDateTime};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
enum EntryData {
    Bytes(Vec<u8>),
    File(PathBuf),
}

/// Something to be added to an archive: a name plus a byte source.
///
/// Defaults to deflate at the default level. In-memory entries are
/// timestamped at creation; file entries use the file's modification time.
#[derive(Debug, Clone)]
pub struct ZipEntrySource {
    name: String,
    comment: Option<String>,
    compression_method: CompressionMethod,
    compression_level: CompressionLevel,
    timestamp: Option<NaiveDateTime>,
    data: EntryData,
}

impl ZipEntrySource {
    /// Entry from an in-memory buffer
    pub fn from_data(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self::with_data(name.into(), EntryData::Bytes(data.into()), Some(Local::now().naive_local()))
    }

    /// Entry from a file, named after the file's last path component
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_file_with_name(path, name)
    }

    /// Entry from a file stored under `name`
    pub fn from_file_with_name(path: impl AsRef<Path>, name: impl Into<String>) -> Self {
        let path = path.as_ref().to_path_buf();
        let timestamp = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .map(|t| DateTime::<Local>::from(t).naive_local());
        Self::with_data(name.into(), EntryData::File(path), timestamp)
    }

    fn with_data(name: String, data: EntryData, timestamp: Option<NaiveDateTime>) -> Self {
        Self {
            name,
            comment: None,
            compression_method: CompressionMethod::DEFLATE,
            compression_level: CompressionLevel::DEFAULT,
            timestamp,
            data,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_method(mut self, method: CompressionMethod) -> Self {
        self.compression_method = method;
        self
    }

    pub fn with_level(mut self, level: CompressionLevel) -> Self {
        self.compression_level = level;
        self
    }

    /// Override the modification time; `None` stores no timestamp
    pub fn with_timestamp(mut self, timestamp: Option<NaiveDateTime>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn compression_method(&self) -> CompressionMethod {
        self.compression_method
    }

    pub fn compression_level(&self) -> CompressionLevel {
        self.compression_level
    }

    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamp
    }

    /// Byte length if it can be known before streaming
    pub fn size_in_bytes(&self) -> Option<u64> {
        match &self.data {
            EntryData::Bytes(bytes) => Some(bytes.len() as u64),
            EntryData::File(path) => std::fs::metadata(path).ok().map(|m| m.len()),
        }
    }

    /// Check the entry has a name and a usable source
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ZipError::InvalidEntry("entry name is empty".to_string()));
        }
        if let EntryData::File(path) = &self.data {
            let metadata = std::fs::metadata(path).map_err(|e| {
                ZipError::InvalidEntry(format!("cannot read {}: {}", path.display(), e))
            })?;
            if !metadata.is_file() {
                return Err(ZipError::InvalidEntry(format!(
                    "{} is not a regular file",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    pub fn can_be_zipped(&self) -> bool {
        self.validate().is_ok()
    }

    /// Open the byte source for streaming
    pub(crate) fn open(&self) -> Result<Box<dyn Read + '_>> {
        match &self.data {
            EntryData::Bytes(bytes) => Ok(Box::new(&bytes[..])),
            EntryData::File(path) => {
                let file = File::open(path).map_err(|e| {
                    ZipError::InvalidEntry(format!("cannot open {}: {}", path.display(), e))
                })?;
                Ok(Box::new(BufReader::new(file)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn data_entry_defaults() {
        let entry = ZipEntrySource::from_data("a.txt", b"abc".to_vec());
        assert_eq!(entry.name(), "a.txt");
        assert_eq!(entry.compression_method(), CompressionMethod::DEFLATE);
        assert!(entry.compression_level().is_default());
        assert_eq!(entry.size_in_bytes(), Some(3));
        assert!(entry.timestamp().is_some());
        assert!(entry.can_be_zipped());
    }

    #[test]
    fn empty_name_cannot_be_zipped() {
        let entry = ZipEntrySource::from_data("", Vec::new());
        assert!(matches!(entry.validate(), Err(ZipError::InvalidEntry(_))));
    }

    #[test]
    fn file_entry_uses_file_name_and_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        File::create(&path).unwrap().write_all(b"hello").unwrap();

        let entry = ZipEntrySource::from_file(&path);
        assert_eq!(entry.name(), "notes.txt");
        assert_eq!(entry.size_in_bytes(), Some(5));
        assert!(entry.timestamp().is_some());

        let mut contents = Vec::new();
        entry.open().unwrap().read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"hello");
    }

    #[test]
    fn missing_file_is_invalid() {
        let dir = tempdir().unwrap();
        let entry = ZipEntrySource::from_file(dir.path().join("missing.bin"));
        assert!(!entry.can_be_zipped());
        assert_eq!(entry.size_in_bytes(), None);
    }
}
