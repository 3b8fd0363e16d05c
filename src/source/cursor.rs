//! Big-endian read cursor over an immutable byte buffer.
//!
//! Every scalar reader exists in two forms: a consuming form (`read_u32`)
//! that advances the cursor, and a peeking form (`u32_at`) that reads at an
//! absolute index and leaves the cursor where it is.
//!
//! The cursor also carries an `origin`. Object references inside a record
//! are positions relative to the start of the record's key, so
//! [`ByteCursor::position`] reports `index - origin` rather than the raw
//! index.

use crate::error::{Error, Result};

/// A fixed-width big-endian value that can be decoded from raw bytes.
pub trait Element: Sized + Copy {
    /// Width of one encoded value in bytes.
    const SIZE: usize;

    /// Decodes one value from exactly `SIZE` big-endian bytes.
    fn from_be_slice(bytes: &[u8]) -> Self;

    /// Decodes one value from exactly `SIZE` little-endian bytes.
    fn from_le_slice(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($($ty:ty),*) => {
        $(
            impl Element for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn from_be_slice(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_be_bytes(raw)
                }

                #[inline]
                fn from_le_slice(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_element!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl Element for bool {
    const SIZE: usize = 1;

    #[inline]
    fn from_be_slice(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }

    #[inline]
    fn from_le_slice(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

/// Decodes a whole buffer of big-endian values.
///
/// The caller guarantees `bytes.len()` is a multiple of `T::SIZE`.
pub fn decode_be<T: Element>(bytes: &[u8]) -> Vec<T> {
    bytes.chunks_exact(T::SIZE).map(T::from_be_slice).collect()
}

/// Decodes a whole buffer of little-endian values.
pub fn decode_le<T: Element>(bytes: &[u8]) -> Vec<T> {
    bytes.chunks_exact(T::SIZE).map(T::from_le_slice).collect()
}

macro_rules! scalar_readers {
    ($(($read:ident, $at:ident, $ty:ty)),* $(,)?) => {
        $(
            #[doc = concat!("Reads a big-endian `", stringify!($ty), "` and advances.")]
            #[inline]
            pub fn $read(&mut self) -> Result<$ty> {
                let value = self.$at(self.index)?;
                self.index += std::mem::size_of::<$ty>();
                Ok(value)
            }

            #[doc = concat!("Peeks a big-endian `", stringify!($ty), "` at `index`.")]
            #[inline]
            pub fn $at(&self, index: usize) -> Result<$ty> {
                let bytes = self.span(index, std::mem::size_of::<$ty>())?;
                Ok(<$ty as Element>::from_be_slice(bytes))
            }
        )*
    };
}

/// A read position over an immutable byte buffer.
///
/// Cursors are cheap to copy; the buffer is never mutated.
#[derive(Debug, Clone, Copy)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    index: usize,
    origin: i64,
}

impl<'a> ByteCursor<'a> {
    /// Creates a cursor at `index` with origin 0.
    pub fn new(data: &'a [u8], index: usize) -> Self {
        Self { data, index, origin: 0 }
    }

    /// Creates a cursor at `index` whose relative positions are measured from `origin`.
    pub fn with_origin(data: &'a [u8], index: usize, origin: i64) -> Self {
        Self { data, index, origin }
    }

    /// Returns a copy of this cursor moved to `index`.
    pub fn copied_to(&self, index: usize) -> Self {
        Self { data: self.data, index, origin: self.origin }
    }

    /// The underlying buffer.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Current absolute index.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Moves the cursor to an absolute index.
    pub fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    /// Origin used for relative positions.
    pub fn origin(&self) -> i64 {
        self.origin
    }

    /// Current position relative to the origin.
    pub fn position(&self) -> i64 {
        self.index as i64 - self.origin
    }

    /// Converts a relative position back into an absolute index.
    pub fn absolute(&self, position: i64) -> Result<usize> {
        let index = position + self.origin;
        if index < 0 {
            return Err(Error::corruption(format!(
                "relative position {} lies before the buffer (origin {})",
                position, self.origin
            )));
        }
        Ok(index as usize)
    }

    /// Bytes between the cursor and the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.index)
    }

    /// True when no bytes remain.
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Advances by `n` bytes.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.span(self.index, n)?;
        self.index += n;
        Ok(())
    }

    fn span(&self, index: usize, len: usize) -> Result<&'a [u8]> {
        match index.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(&self.data[index..end]),
            _ => Err(Error::TruncatedRead { index, len, available: self.data.len() }),
        }
    }

    /// Reads `n` raw bytes and advances.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let bytes = self.span(self.index, n)?;
        self.index += n;
        Ok(bytes)
    }

    /// Peeks `n` raw bytes at `index`.
    pub fn bytes_at(&self, index: usize, n: usize) -> Result<&'a [u8]> {
        self.span(index, n)
    }

    scalar_readers!(
        (read_u8, u8_at, u8),
        (read_i8, i8_at, i8),
        (read_u16, u16_at, u16),
        (read_i16, i16_at, i16),
        (read_u32, u32_at, u32),
        (read_i32, i32_at, i32),
        (read_u64, u64_at, u64),
        (read_i64, i64_at, i64),
        (read_f32, f32_at, f32),
        (read_f64, f64_at, f64),
    );

    /// Reads a one-byte boolean and advances.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads `n` big-endian values and advances.
    pub fn read_array<T: Element>(&mut self, n: usize) -> Result<Vec<T>> {
        let bytes = self.read_bytes(n.saturating_mul(T::SIZE))?;
        Ok(decode_be(bytes))
    }

    /// Peeks `n` big-endian values at `index`.
    pub fn array_at<T: Element>(&self, index: usize, n: usize) -> Result<Vec<T>> {
        Ok(decode_be(self.span(index, n.saturating_mul(T::SIZE))?))
    }

    /// Reads a length-prefixed string and advances.
    ///
    /// The length is one byte, or `255` followed by a four-byte length.
    pub fn read_string(&mut self) -> Result<String> {
        let (value, next) = self.string_at(self.index)?;
        self.index = next;
        Ok(value)
    }

    /// Peeks a length-prefixed string at `index`, returning it with the index after it.
    pub fn string_at(&self, index: usize) -> Result<(String, usize)> {
        let (len, start) = match self.u8_at(index)? {
            255 => (self.u32_at(index + 1)? as usize, index + 5),
            n => (n as usize, index + 1),
        };
        let bytes = self.span(start, len)?;
        Ok((String::from_utf8_lossy(bytes).into_owned(), start + len))
    }

    /// Reads a null-terminated string and advances past the terminator.
    pub fn read_cstring(&mut self) -> Result<String> {
        let (value, next) = self.cstring_at(self.index)?;
        self.index = next;
        Ok(value)
    }

    /// Peeks a null-terminated string at `index`, returning it with the index after the terminator.
    pub fn cstring_at(&self, index: usize) -> Result<(String, usize)> {
        let tail = self.data.get(index..).unwrap_or_default();
        match tail.iter().position(|&b| b == 0) {
            Some(len) => Ok((String::from_utf8_lossy(&tail[..len]).into_owned(), index + len + 1)),
            None => Err(Error::TruncatedRead {
                index,
                len: tail.len() + 1,
                available: self.data.len(),
            }),
        }
    }
}
