//! Record keys.
//!
//! A key is a fixed header followed by three length-prefixed strings:
//!
//! ```text
//! nbytes i32 | version i16 | objlen i32 | datime u32 | keylen i16 | cycle i16
//! | seekkey | seekpdir | class | name | title
//! ```
//!
//! The two seek fields are i32, or i64 when `version > 1000`. The payload
//! starts `keylen` bytes after the key and is compressed whenever
//! `objlen != nbytes - keylen`.

use super::{Directory, FileContext, Record};
use crate::error::{Error, Result};
use crate::object::ReadContext;
use crate::source::{ByteCursor, LazyDecompressedView};
use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Key versions above this use 64-bit seek fields.
pub const LARGE_KEY_VERSION: i16 = 1000;

/// Decoded key header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyHeader {
    /// Total size of key plus (possibly compressed) payload.
    pub nbytes: i32,
    /// Key format version.
    pub version: i16,
    /// Uncompressed payload size.
    pub objlen: i32,
    /// Packed write date and time.
    pub datime: u32,
    /// Size of the key itself.
    pub keylen: i16,
    /// Cycle number.
    pub cycle: i16,
    /// File offset of this key.
    pub seek_key: i64,
    /// File offset of the parent directory.
    pub seek_pdir: i64,
    /// Class of the stored object.
    pub class_name: String,
    /// Object name.
    pub name: String,
    /// Object title.
    pub title: String,
}

impl KeyHeader {
    /// Parses a key header at the cursor.
    pub fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let nbytes = cursor.read_i32()?;
        let version = cursor.read_i16()?;
        let objlen = cursor.read_i32()?;
        let datime = cursor.read_u32()?;
        let keylen = cursor.read_i16()?;
        let cycle = cursor.read_i16()?;
        let (seek_key, seek_pdir) = if version > LARGE_KEY_VERSION {
            (cursor.read_i64()?, cursor.read_i64()?)
        } else {
            (cursor.read_i32()? as i64, cursor.read_i32()? as i64)
        };
        let class_name = cursor.read_string()?;
        let name = cursor.read_string()?;
        let title = cursor.read_string()?;
        Ok(Self {
            nbytes,
            version,
            objlen,
            datime,
            keylen,
            cycle,
            seek_key,
            seek_pdir,
            class_name,
            name,
            title,
        })
    }

    /// Whether the payload is stored compressed.
    pub fn is_compressed(&self) -> bool {
        self.objlen as i64 != self.nbytes as i64 - self.keylen as i64
    }

    /// Size of the payload as stored in the file.
    pub fn stored_len(&self) -> usize {
        (self.nbytes as i64 - self.keylen as i64).max(0) as usize
    }
}

/// A record's payload, ready to be read.
#[derive(Debug)]
pub enum Payload {
    /// Stored payload: a window of the file itself.
    Plain {
        /// The whole file.
        data: Bytes,
        /// Index of the first payload byte.
        index: usize,
        /// File offset of the key, so relative positions count from it.
        origin: i64,
    },
    /// Compressed payload, decompressed on first read.
    Compressed(LazyDecompressedView),
}

impl Payload {
    /// A cursor at the first payload byte.
    pub fn cursor(&self) -> Result<ByteCursor<'_>> {
        match self {
            Payload::Plain { data, index, origin } => {
                Ok(ByteCursor::with_origin(data, *index, *origin))
            }
            Payload::Compressed(view) => view.cursor(),
        }
    }
}

/// A key bound to the file it came from.
#[derive(Clone, Serialize)]
pub struct Key {
    #[serde(flatten)]
    header: KeyHeader,
    #[serde(skip)]
    file: Arc<FileContext>,
}

impl Key {
    pub(crate) fn new(header: KeyHeader, file: Arc<FileContext>) -> Self {
        Self { header, file }
    }

    /// Parses a key header at `index` of the file.
    pub fn read_at(file: &Arc<FileContext>, index: usize) -> Result<Self> {
        let mut cursor = ByteCursor::new(file.data(), index);
        Ok(Self::new(KeyHeader::read(&mut cursor)?, Arc::clone(file)))
    }

    pub(crate) fn file(&self) -> &Arc<FileContext> {
        &self.file
    }

    /// The decoded header.
    pub fn header(&self) -> &KeyHeader {
        &self.header
    }

    /// Object name.
    pub fn name(&self) -> &str {
        &self.header.name
    }

    /// Object title.
    pub fn title(&self) -> &str {
        &self.header.title
    }

    /// Class of the stored object.
    pub fn class_name(&self) -> &str {
        &self.header.class_name
    }

    /// Cycle number.
    pub fn cycle(&self) -> i16 {
        self.header.cycle
    }

    /// Whether the key points at a subdirectory.
    pub fn is_directory(&self) -> bool {
        matches!(self.class_name(), "TDirectory" | "TDirectoryFile")
    }

    /// Builds the payload: a file window, or a lazy view when compressed.
    pub fn payload(&self) -> Result<Payload> {
        let h = &self.header;
        if h.seek_key < 0 || h.keylen < 0 {
            return Err(Error::corruption(format!(
                "key {:?} has seek {} and key length {}",
                h.name, h.seek_key, h.keylen
            )));
        }
        let start = (h.seek_key as usize).saturating_add(h.keylen as usize);
        let stored = h.stored_len();
        let data = self.file.data();
        if start.checked_add(stored).map_or(true, |end| end > data.len()) {
            return Err(Error::TruncatedRead { index: start, len: stored, available: data.len() });
        }
        if h.is_compressed() {
            Ok(Payload::Compressed(LazyDecompressedView::framed(
                data.clone(),
                start,
                stored,
                h.objlen.max(0) as usize,
                -(h.keylen as i64),
            )))
        } else {
            Ok(Payload::Plain { data: data.clone(), index: start, origin: h.seek_key })
        }
    }

    /// Reads the record this key points at.
    ///
    /// Subdirectory keys yield a [`Directory`]; everything else goes through
    /// the class registry with a fresh reference table.
    pub fn get(&self) -> Result<Record> {
        if self.is_directory() {
            return Ok(Record::Directory(Directory::read_subdirectory(self)?));
        }
        let factory = self.file.registry().get(self.class_name()).ok_or_else(|| {
            Error::UnsupportedClass {
                class: self.class_name().to_string(),
                offset: self.header.seek_key,
            }
        })?;
        log::debug!(
            "reading {} {};{} ({} bytes{})",
            self.class_name(),
            self.name(),
            self.cycle(),
            self.header.objlen,
            if self.header.is_compressed() { ", compressed" } else { "" }
        );
        let payload = self.payload()?;
        let mut cursor = payload.cursor()?;
        let mut ctx = ReadContext::new(&self.file);
        let object = factory.read(&mut cursor, &mut ctx)?;
        Ok(Record::Object(object))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key").field("header", &self.header).finish()
    }
}
