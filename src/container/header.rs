//! Container file header.
//!
//! Small layout (file version below 1000000):
//!
//! ```text
//! "root" | version i32 | begin i32 | end i32 | seekfree i32 | nbytesfree i32
//!        | nfree i32 | nbytesname i32 | units u8 | compress i32
//!        | seekinfo i32 | nbytesinfo i32 | uuid (2 + 16)
//! ```
//!
//! The large layout widens `end`, `seekfree` and `seekinfo` to i64.

use crate::compression::Compression;
use crate::error::{Error, Result};
use crate::source::ByteCursor;
use serde::Serialize;

/// File magic.
pub const MAGIC: &[u8; 4] = b"root";

/// Versions at or above this use 64-bit seek fields.
pub const LARGE_FILE_VERSION: i32 = 1_000_000;

/// Decoded file header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerHeader {
    /// Raw format version, including the large-file offset.
    pub version: i32,
    /// Offset of the first record (the top directory's key).
    pub begin: i64,
    /// Declared end of the file.
    pub end: i64,
    /// Offset of the free-segments record.
    pub seek_free: i64,
    /// Size of the free-segments record.
    pub nbytes_free: i32,
    /// Number of free segments.
    pub nfree: i32,
    /// Size of the top directory's key plus its name and title.
    pub nbytes_name: i32,
    /// Width of seek fields in bytes (4 or 8).
    pub units: u8,
    /// File-level compression setting.
    pub compression: Compression,
    /// Offset of the streamer info record.
    pub seek_info: i64,
    /// Size of the streamer info record.
    pub nbytes_info: i32,
    /// Version of the unique id.
    pub uuid_version: u16,
    /// Unique id of the file.
    pub uuid: [u8; 16],
}

impl ContainerHeader {
    /// Parses the header at the cursor and checks its internal consistency.
    pub fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let magic = cursor.read_bytes(4)?;
        if magic != MAGIC {
            let mut found = [0u8; 4];
            found.copy_from_slice(magic);
            return Err(Error::BadMagic { found });
        }

        let version = cursor.read_i32()?;
        let begin = cursor.read_i32()? as i64;
        let large = version >= LARGE_FILE_VERSION;
        let read_seek = |cursor: &mut ByteCursor<'_>| -> Result<i64> {
            if large {
                cursor.read_i64()
            } else {
                Ok(cursor.read_i32()? as i64)
            }
        };

        let end = read_seek(cursor)?;
        let seek_free = read_seek(cursor)?;
        let nbytes_free = cursor.read_i32()?;
        let nfree = cursor.read_i32()?;
        let nbytes_name = cursor.read_i32()?;
        let units = cursor.read_u8()?;
        let compression = Compression::from_code(cursor.read_i32()?);
        let seek_info = read_seek(cursor)?;
        let nbytes_info = cursor.read_i32()?;
        let uuid_version = cursor.read_u16()?;
        let mut uuid = [0u8; 16];
        uuid.copy_from_slice(cursor.read_bytes(16)?);

        let header = Self {
            version,
            begin,
            end,
            seek_free,
            nbytes_free,
            nfree,
            nbytes_name,
            units,
            compression,
            seek_info,
            nbytes_info,
            uuid_version,
            uuid,
        };
        header.check_lengths()?;
        Ok(header)
    }

    /// Format version without the large-file offset.
    pub fn format_version(&self) -> i32 {
        self.version % LARGE_FILE_VERSION
    }

    /// Whether seek fields are 64-bit.
    pub fn is_large(&self) -> bool {
        self.version >= LARGE_FILE_VERSION
    }

    /// Size of the top directory record that follows the name block.
    pub fn directory_record_size(&self) -> i64 {
        let seeks = if self.format_version() >= 40000 { 3 * 8 } else { 3 * 4 };
        2 + 4 + 4 + 4 + 4 + seeks
    }

    fn check_lengths(&self) -> Result<()> {
        let nbytes = self.nbytes_name as i64 + self.directory_record_size();
        if self.begin < 0 || self.nbytes_name < 0 || self.begin + nbytes > self.end {
            return Err(Error::HeaderLengthMismatch { begin: self.begin, nbytes, end: self.end });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_header(version: i32, begin: i32, end: i32, nbytes_name: i32, compress: i32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&version.to_be_bytes());
        out.extend_from_slice(&begin.to_be_bytes());
        out.extend_from_slice(&end.to_be_bytes());
        out.extend_from_slice(&0i32.to_be_bytes()); // seekfree
        out.extend_from_slice(&0i32.to_be_bytes()); // nbytesfree
        out.extend_from_slice(&0i32.to_be_bytes()); // nfree
        out.extend_from_slice(&nbytes_name.to_be_bytes());
        out.push(4);
        out.extend_from_slice(&compress.to_be_bytes());
        out.extend_from_slice(&0i32.to_be_bytes()); // seekinfo
        out.extend_from_slice(&0i32.to_be_bytes()); // nbytesinfo
        out.extend_from_slice(&[0u8; 18]);
        out
    }

    #[test]
    fn test_small_header() {
        let data = small_header(61206, 100, 4000, 60, 101);
        let header = ContainerHeader::read(&mut ByteCursor::new(&data, 0)).unwrap();
        assert_eq!(header.version, 61206);
        assert_eq!(header.begin, 100);
        assert_eq!(header.end, 4000);
        assert_eq!(header.nbytes_name, 60);
        assert_eq!(header.compression, Compression::from_code(101));
        assert!(!header.is_large());
    }

    #[test]
    fn test_large_header() {
        let mut data = Vec::new();
        data.extend_from_slice(MAGIC);
        data.extend_from_slice(&1_061_206i32.to_be_bytes());
        data.extend_from_slice(&100i32.to_be_bytes());
        data.extend_from_slice(&5_000_000_000i64.to_be_bytes());
        data.extend_from_slice(&0i64.to_be_bytes());
        data.extend_from_slice(&0i32.to_be_bytes());
        data.extend_from_slice(&0i32.to_be_bytes());
        data.extend_from_slice(&70i32.to_be_bytes());
        data.push(8);
        data.extend_from_slice(&404i32.to_be_bytes());
        data.extend_from_slice(&4_999_000_000i64.to_be_bytes());
        data.extend_from_slice(&0i32.to_be_bytes());
        data.extend_from_slice(&[0u8; 18]);

        let header = ContainerHeader::read(&mut ByteCursor::new(&data, 0)).unwrap();
        assert!(header.is_large());
        assert_eq!(header.format_version(), 61206);
        assert_eq!(header.end, 5_000_000_000);
        assert_eq!(header.seek_info, 4_999_000_000);
        assert_eq!(header.units, 8);
    }

    #[test]
    fn test_bad_magic() {
        let mut data = small_header(61206, 100, 4000, 60, 0);
        data[..4].copy_from_slice(b"ROOT");
        let err = ContainerHeader::read(&mut ByteCursor::new(&data, 0)).unwrap_err();
        assert!(matches!(err, Error::BadMagic { found } if &found == b"ROOT"));
    }

    #[test]
    fn test_header_length_mismatch() {
        // begin + name block runs past the declared end
        let data = small_header(61206, 100, 150, 60, 0);
        let err = ContainerHeader::read(&mut ByteCursor::new(&data, 0)).unwrap_err();
        assert!(matches!(err, Error::HeaderLengthMismatch { begin: 100, end: 150, .. }));
    }

    #[test]
    fn test_truncated_header() {
        let data = small_header(61206, 100, 4000, 60, 0);
        let err = ContainerHeader::read(&mut ByteCursor::new(&data[..20], 0)).unwrap_err();
        assert!(matches!(err, Error::TruncatedRead { .. }));
    }
}
