//! Directories and their key tables.
//!
//! A directory record is
//!
//! ```text
//! version i16 | ctime u32 | mtime u32 | nbyteskeys i32 | nbytesname i32
//! | seekdir | seekparent | seekkeys
//! ```
//!
//! with i32 seeks, or i64 seeks when `version > 1000`. The key table at
//! `seekkeys` is a key header of its own, then an i32 count, then that many
//! key headers.

use super::key::{Key, KeyHeader, LARGE_KEY_VERSION};
use super::{FileContext, Record};
use crate::error::{Error, Result};
use crate::source::ByteCursor;
use serde::Serialize;
use std::sync::Arc;

/// Allowed range for a directory's name block size.
const NAME_BLOCK_RANGE: std::ops::RangeInclusive<i32> = 10..=1000;

/// Decoded directory record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryHeader {
    /// Record version.
    pub version: i16,
    /// Packed creation time.
    pub ctime: u32,
    /// Packed modification time.
    pub mtime: u32,
    /// Size of the key table.
    pub nbytes_keys: i32,
    /// Size of the directory's key plus name and title.
    pub nbytes_name: i32,
    /// File offset of this directory's key.
    pub seek_dir: i64,
    /// File offset of the parent directory.
    pub seek_parent: i64,
    /// File offset of the key table.
    pub seek_keys: i64,
}

impl DirectoryHeader {
    /// Parses a directory record at the cursor.
    pub fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let version = cursor.read_i16()?;
        let ctime = cursor.read_u32()?;
        let mtime = cursor.read_u32()?;
        let nbytes_keys = cursor.read_i32()?;
        let nbytes_name = cursor.read_i32()?;
        let (seek_dir, seek_parent, seek_keys) = if version > LARGE_KEY_VERSION {
            (cursor.read_i64()?, cursor.read_i64()?, cursor.read_i64()?)
        } else {
            (
                cursor.read_i32()? as i64,
                cursor.read_i32()? as i64,
                cursor.read_i32()? as i64,
            )
        };
        if !NAME_BLOCK_RANGE.contains(&nbytes_name) {
            return Err(Error::corruption(format!(
                "directory name block of {} bytes is outside {:?}",
                nbytes_name, NAME_BLOCK_RANGE
            )));
        }
        Ok(Self { version, ctime, mtime, nbytes_keys, nbytes_name, seek_dir, seek_parent, seek_keys })
    }
}

/// A directory: a named list of keys.
#[derive(Debug, Clone, Serialize)]
pub struct Directory {
    name: String,
    header: DirectoryHeader,
    keys: Vec<Key>,
}

impl Directory {
    /// Builds a directory from its record and loads its key table.
    pub(crate) fn load(file: &Arc<FileContext>, name: String, header: DirectoryHeader) -> Result<Self> {
        let keys = if header.seek_keys > 0 {
            read_key_table(file, header.seek_keys as usize)?
        } else {
            Vec::new()
        };
        log::debug!("directory {:?}: {} keys", name, keys.len());
        Ok(Self { name, header, keys })
    }

    /// Reads the subdirectory a `TDirectory` key points at.
    pub(crate) fn read_subdirectory(key: &Key) -> Result<Self> {
        let payload = key.payload()?;
        let mut cursor = payload.cursor()?;
        let header = DirectoryHeader::read(&mut cursor)?;
        Self::load(key.file(), key.name().to_string(), header)
    }

    /// Directory name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decoded directory record.
    pub fn header(&self) -> &DirectoryHeader {
        &self.header
    }

    /// All keys, in table order.
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when the directory has no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Finds a key by name and optional cycle.
    ///
    /// Without a cycle the highest cycle wins; among equal cycles, the last
    /// key in the table.
    pub fn key(&self, name: &str, cycle: Option<i16>) -> Result<&Key> {
        let mut found: Option<&Key> = None;
        for key in self.keys.iter().filter(|k| k.name() == name) {
            match cycle {
                Some(c) if key.cycle() == c => found = Some(key),
                Some(_) => {}
                None => {
                    if found.map_or(true, |f| key.cycle() >= f.cycle()) {
                        found = Some(key);
                    }
                }
            }
        }
        found.ok_or_else(|| Error::KeyNotFound { name: name.to_string(), cycle })
    }

    /// Reads a record by path.
    ///
    /// Paths may name subdirectories with `/` and end in `;cycle`.
    pub fn get(&self, path: &str) -> Result<Record> {
        let (path, cycle) = split_cycle(path);
        self.get_cycle_inner(path, cycle)
    }

    /// Reads a record by path with an explicit cycle.
    pub fn get_cycle(&self, path: &str, cycle: i16) -> Result<Record> {
        let (path, _) = split_cycle(path);
        self.get_cycle_inner(path, Some(cycle))
    }

    fn get_cycle_inner(&self, path: &str, cycle: Option<i16>) -> Result<Record> {
        let mut parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        let last = parts.pop().ok_or_else(|| Error::KeyNotFound { name: path.to_string(), cycle })?;
        if parts.is_empty() {
            return self.key(last, cycle)?.get();
        }
        let mut dir = self.subdirectory(parts[0])?;
        for part in &parts[1..] {
            dir = dir.subdirectory(part)?;
        }
        dir.key(last, cycle)?.get()
    }

    /// Opens a direct subdirectory by name.
    pub fn subdirectory(&self, name: &str) -> Result<Directory> {
        let key = self.key(name, None)?;
        if !key.is_directory() {
            return Err(Error::invalid_argument(format!(
                "{} is a {}, not a directory",
                name,
                key.class_name()
            )));
        }
        Self::read_subdirectory(key)
    }

    /// `(name;cycle, class)` for every key.
    pub fn contents(&self) -> Vec<(String, String)> {
        self.keys
            .iter()
            .map(|k| (format!("{};{}", k.name(), k.cycle()), k.class_name().to_string()))
            .collect()
    }

    /// Like [`contents`](Self::contents), descending into subdirectories.
    pub fn all_contents(&self) -> Result<Vec<(String, String)>> {
        let mut out = Vec::new();
        for key in &self.keys {
            let label = format!("{};{}", key.name(), key.cycle());
            out.push((label, key.class_name().to_string()));
            if key.is_directory() {
                let sub = Self::read_subdirectory(key)?;
                for (name, class) in sub.all_contents()? {
                    out.push((format!("{}/{}", key.name(), name), class));
                }
            }
        }
        Ok(out)
    }
}

fn read_key_table(file: &Arc<FileContext>, seek_keys: usize) -> Result<Vec<Key>> {
    let mut cursor = ByteCursor::new(file.data(), seek_keys);
    let table = KeyHeader::read(&mut cursor)?;
    if table.keylen < 0 {
        return Err(Error::corruption(format!("negative key length {} at {}", table.keylen, seek_keys)));
    }
    cursor.set_index(seek_keys + table.keylen as usize);
    let nkeys = cursor.read_i32()?;
    if nkeys < 0 {
        return Err(Error::corruption(format!("negative key count {} at {}", nkeys, seek_keys)));
    }
    // a key header is at least 26 bytes
    let mut keys = Vec::with_capacity((nkeys as usize).min(cursor.remaining() / 26));
    for _ in 0..nkeys {
        keys.push(Key::new(KeyHeader::read(&mut cursor)?, Arc::clone(file)));
    }
    Ok(keys)
}

fn split_cycle(path: &str) -> (&str, Option<i16>) {
    match path.rsplit_once(';') {
        Some((name, cycle)) => match cycle.parse::<i16>() {
            Ok(c) => (name, Some(c)),
            Err(_) => (path, None),
        },
        None => (path, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_cycle() {
        assert_eq!(split_cycle("events"), ("events", None));
        assert_eq!(split_cycle("events;2"), ("events", Some(2)));
        assert_eq!(split_cycle("dir/events;12"), ("dir/events", Some(12)));
        assert_eq!(split_cycle("odd;name"), ("odd;name", None));
    }

    fn record(version: i16, nbytes_name: i32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&version.to_be_bytes());
        out.extend_from_slice(&1u32.to_be_bytes());
        out.extend_from_slice(&2u32.to_be_bytes());
        out.extend_from_slice(&80i32.to_be_bytes());
        out.extend_from_slice(&nbytes_name.to_be_bytes());
        if version > LARGE_KEY_VERSION {
            for v in [100i64, 0, 7_000_000_000] {
                out.extend_from_slice(&v.to_be_bytes());
            }
        } else {
            for v in [100i32, 0, 900] {
                out.extend_from_slice(&v.to_be_bytes());
            }
        }
        out
    }

    #[test]
    fn test_directory_record() {
        let data = record(5, 58);
        let header = DirectoryHeader::read(&mut ByteCursor::new(&data, 0)).unwrap();
        assert_eq!(header.nbytes_keys, 80);
        assert_eq!(header.seek_keys, 900);

        let data = record(1005, 58);
        let header = DirectoryHeader::read(&mut ByteCursor::new(&data, 0)).unwrap();
        assert_eq!(header.seek_keys, 7_000_000_000);
    }

    #[test]
    fn test_name_block_range() {
        for bad in [9, 1001] {
            let data = record(5, bad);
            let err = DirectoryHeader::read(&mut ByteCursor::new(&data, 0)).unwrap_err();
            assert!(matches!(err, Error::Corruption(_)));
        }
        let data = record(5, 10);
        assert!(DirectoryHeader::read(&mut ByteCursor::new(&data, 0)).is_ok());
    }
}
