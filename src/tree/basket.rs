//! Baskets: the stored chunks of a branch's column data.
//!
//! ```text
//! seek            key: nbytes, version, objlen, datime, keylen, cycle, ...
//! seek+keylen-19  basket: version, buffer size, nevbuf size, nevbuf, last, flag
//! seek+keylen     payload (objlen bytes once decompressed):
//!                   data                      border = last - keylen bytes
//!                   [count, offsets.., 0]     only for variable-size entries
//! ```

use crate::compression::decompress_blocks;
use crate::container::FileContext;
use crate::error::{Error, Result};
use crate::object::{ReadContext, Streamed};
use crate::source::ByteCursor;
use bytes::Bytes;
use std::any::Any;
use std::sync::Arc;

/// Bytes from the basket fields to the end of the key.
const BASKET_FIELDS_SIZE: usize = 19;

/// Key and basket fields at the start of a stored basket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasketHeader {
    /// Stored size including the key.
    pub nbytes: i32,
    /// Key version.
    pub key_version: i16,
    /// Uncompressed payload size.
    pub objlen: i32,
    /// Write timestamp.
    pub datime: u32,
    /// Key length, including the basket fields.
    pub keylen: i16,
    /// Key cycle.
    pub cycle: i16,
    /// Basket class version.
    pub version: u16,
    /// Buffer size the producer allocated.
    pub buffer_size: i32,
    /// Entry size for fixed-size entries, or more than 8 when entries vary.
    pub nevbuf_size: i32,
    /// Number of entries.
    pub nevbuf: i32,
    /// End of the data, relative to the key start.
    pub last: i32,
}

impl BasketHeader {
    /// Reads the header starting at `start` without moving any cursor.
    pub fn peek(cursor: &ByteCursor<'_>, start: usize) -> Result<Self> {
        let keylen = cursor.i16_at(start + 14)?;
        let fields = (start + keylen.max(0) as usize)
            .checked_sub(BASKET_FIELDS_SIZE)
            .filter(|&i| i >= start + 18)
            .ok_or_else(|| Error::corruption(format!("basket key at {} is {} bytes", start, keylen)))?;
        Ok(Self {
            nbytes: cursor.i32_at(start)?,
            key_version: cursor.i16_at(start + 4)?,
            objlen: cursor.i32_at(start + 6)?,
            datime: cursor.u32_at(start + 10)?,
            keylen,
            cycle: cursor.i16_at(start + 16)?,
            version: cursor.u16_at(fields)?,
            buffer_size: cursor.i32_at(fields + 2)?,
            nevbuf_size: cursor.i32_at(fields + 6)?,
            nevbuf: cursor.i32_at(fields + 10)?,
            last: cursor.i32_at(fields + 14)?,
        })
    }

    /// Length of the entry data in the payload.
    pub fn border(&self) -> Result<usize> {
        usize::try_from(self.last as i64 - self.keylen as i64)
            .map_err(|_| Error::corruption(format!("basket data ends at {} inside its {}-byte key", self.last, self.keylen)))
    }

    /// Whether the payload is stored compressed.
    pub fn is_compressed(&self) -> bool {
        self.objlen as i64 != self.nbytes as i64 - self.keylen as i64
    }

    /// Whether entries have variable size and need an offset table.
    pub fn has_entry_offsets(&self) -> bool {
        self.nevbuf_size > 8
    }
}

/// Entry data of one basket with its entry offsets.
#[derive(Debug, Clone)]
pub struct BasketData {
    /// Data bytes of every entry.
    pub data: Bytes,
    /// `entries + 1` positions into `data`, when entries vary in size.
    pub offsets: Option<Vec<usize>>,
}

impl BasketData {
    /// Splits a payload into data and the trailing offset table.
    pub fn split(payload: Bytes, header: &BasketHeader) -> Result<Self> {
        let border = header.border()?;
        if border > payload.len() {
            return Err(Error::corruption(format!(
                "basket data ends at {} past its {}-byte payload",
                border,
                payload.len()
            )));
        }
        if payload.len() == border {
            return Ok(Self { data: payload, offsets: None });
        }
        let table = &payload[border..];
        if table.len() < 8 || table.len() % 4 != 0 {
            return Err(Error::basket_boundary(
                "",
                0,
                format!("{} bytes after basket data cannot hold an offset table", table.len()),
            ));
        }
        // the count includes the final word, which is replaced by the data end
        let count = i32::from_be_bytes([table[0], table[1], table[2], table[3]]);
        let words = table.len() / 4 - 1;
        if usize::try_from(count).map_or(true, |c| c != words) {
            return Err(Error::basket_boundary(
                "",
                0,
                format!("offset table declares {} positions but holds {}", count, words),
            ));
        }

        let keylen = header.keylen as i64;
        let mut offsets = Vec::with_capacity(words);
        for word in table[4..table.len() - 4].chunks_exact(4) {
            let raw = i32::from_be_bytes([word[0], word[1], word[2], word[3]]) as i64;
            let offset = usize::try_from(raw - keylen)
                .map_err(|_| Error::corruption(format!("entry offset {} inside the basket key", raw)))?;
            offsets.push(offset);
        }
        offsets.push(border);
        if let Some(i) = offsets.windows(2).position(|w| w[0] > w[1]) {
            return Err(Error::basket_boundary(
                "",
                0,
                format!("entry {} starts at {} after the next entry at {}", i, offsets[i], offsets[i + 1]),
            ));
        }
        Ok(Self { data: payload.slice(..border), offsets: Some(offsets) })
    }
}

/// Loads the payload of the basket stored at `seek`, through the file's cache.
pub(crate) fn load(file: &FileContext, seek: i64) -> Result<(BasketHeader, Bytes)> {
    let data = file.data();
    let start = usize::try_from(seek)
        .map_err(|_| Error::corruption(format!("negative basket offset {}", seek)))?;
    let header = BasketHeader::peek(&ByteCursor::new(data, start), start)?;
    let payload = file.cache().get_or_load(start as u64, || {
        let begin = start + header.keylen as usize;
        let stored = usize::try_from(header.nbytes as i64 - header.keylen as i64)
            .map_err(|_| Error::corruption(format!("basket at {} is shorter than its key", start)))?;
        let end = begin.saturating_add(stored);
        if end > data.len() {
            return Err(Error::TruncatedRead { index: begin, len: stored, available: data.len() });
        }
        if header.is_compressed() {
            let objlen = usize::try_from(header.objlen)
                .map_err(|_| Error::corruption(format!("negative payload size at {}", start)))?;
            Ok(Bytes::from(decompress_blocks(&data[begin..end], objlen, begin as u64)?))
        } else {
            Ok(data.slice(begin..end))
        }
    })?;
    Ok((header, payload))
}

/// A `TBasket` stored inside its branch record instead of on its own.
///
/// Producers that stop without flushing leave their last baskets in the
/// branch's basket list, already uncompressed.
#[derive(Debug, Clone)]
pub struct EmbeddedBasket {
    /// Basket fields.
    pub header: BasketHeader,
    payload: Bytes,
}

impl EmbeddedBasket {
    /// Reads a streamed `TBasket`.
    pub fn read(cursor: &mut ByteCursor<'_>, _ctx: &mut ReadContext<'_>) -> Result<Self> {
        let start = cursor.index();
        let header = BasketHeader::peek(cursor, start)?;
        let keylen = header.keylen as usize;
        cursor.set_index(start + keylen);

        let table = if header.has_entry_offsets() {
            let n = usize::try_from(header.nevbuf).unwrap_or(0);
            let table = cursor.read_bytes(n * 4 + 8)?;
            // the last word read belongs to the copied key that follows
            cursor.set_index(cursor.index() - 4);
            Some(table)
        } else {
            None
        };
        cursor.skip(keylen)?;
        let data = cursor.read_bytes(header.border()?)?;

        let mut payload = data.to_vec();
        if let Some(table) = table {
            payload.extend_from_slice(table);
        }
        Ok(Self { header, payload: Bytes::from(payload) })
    }

    /// Number of entries.
    pub fn entries(&self) -> usize {
        self.header.nevbuf.max(0) as usize
    }

    /// Entry data and offsets.
    pub fn data(&self) -> Result<BasketData> {
        BasketData::split(self.payload.clone(), &self.header)
    }

    /// Length of the entry data.
    pub fn data_len(&self) -> usize {
        self.header.border().unwrap_or(0)
    }
}

impl Streamed for EmbeddedBasket {
    fn class_name(&self) -> &str {
        "TBasket"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
