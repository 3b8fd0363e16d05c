//! Interpretations: how a branch's basket bytes become typed arrays.
//!
//! An [`Interpretation`] is a closed family. Flat dtypes decode fixed-width
//! items, jagged interpretations group the items of an inner interpretation
//! into rows, and object interpretations hand byte slices to a decode
//! callback. Members compose, so `jagged(jagged(dtype))` and
//! `jagged(object)` are expressible.

mod array;
mod jagged;

pub use array::{Array, DType, Endianness, Value};
pub use jagged::JaggedArray;

use crate::error::{Error, Result};
use crate::source::ByteCursor;
use std::fmt;
use std::sync::Arc;

/// Per-entry header written in front of each `std::vector` (byte count, version).
pub const STL_VECTOR_HEADER: usize = 10;

/// Decodes one item from the cursor.
pub type ObjectDecoder = Arc<dyn Fn(&mut ByteCursor<'_>) -> Result<Value> + Send + Sync>;

/// A flat, fixed-width element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsDtype {
    /// Element type.
    pub dtype: DType,
    /// Byte order on disk.
    pub endianness: Endianness,
}

/// How the rows of a jagged interpretation are delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JaggedCount {
    /// Every row holds exactly `n` items.
    Constant(usize),
    /// Rows follow the basket's entry offset table, each skipping a header.
    Offsets {
        /// Bytes dropped at the start of every entry.
        skip_bytes: usize,
    },
    /// Each row is led by an inline 32-bit item count.
    Prefixed,
}

/// Items produced by a callback.
#[derive(Clone)]
pub struct AsObject {
    name: String,
    decode: ObjectDecoder,
}

impl AsObject {
    /// Wraps a decode callback under a descriptive name.
    pub fn new(name: impl Into<String>, decode: ObjectDecoder) -> Self {
        Self { name: name.into(), decode }
    }

    /// Descriptive name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn decode(&self, cursor: &mut ByteCursor<'_>) -> Result<Value> {
        (self.decode)(cursor)
    }
}

impl fmt::Debug for AsObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AsObject({})", self.name)
    }
}

impl PartialEq for AsObject {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// How to decode a branch's raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    /// Fixed-width items.
    Dtype(AsDtype),
    /// Rows of an inner interpretation.
    Jagged(Box<Interpretation>, JaggedCount),
    /// Items produced by a callback.
    Object(AsObject),
}

fn boundary(detail: impl Into<String>) -> Error {
    Error::basket_boundary("", 0, detail)
}

impl Interpretation {
    /// Big-endian items of `dtype`.
    pub fn dtype(dtype: DType) -> Self {
        Interpretation::Dtype(AsDtype { dtype, endianness: Endianness::Big })
    }

    /// Rows of `inner`.
    pub fn jagged(inner: Interpretation, count: JaggedCount) -> Self {
        Interpretation::Jagged(Box::new(inner), count)
    }

    /// `std::vector` entries: rows from the offset table past the vector header.
    pub fn vector(inner: Interpretation) -> Self {
        Self::jagged(inner, JaggedCount::Offsets { skip_bytes: STL_VECTOR_HEADER })
    }

    /// Items produced by `decode`.
    pub fn object(name: impl Into<String>, decode: ObjectDecoder) -> Self {
        Interpretation::Object(AsObject::new(name, decode))
    }

    /// Length-prefixed strings.
    pub fn string() -> Self {
        Self::object("string", Arc::new(|cursor: &mut ByteCursor<'_>| Ok(Value::Str(cursor.read_string()?))))
    }

    /// Fixed item width in bytes, when there is one.
    pub fn item_size(&self) -> Option<usize> {
        match self {
            Interpretation::Dtype(d) => Some(d.dtype.size()),
            Interpretation::Jagged(inner, JaggedCount::Constant(n)) => inner.item_size().map(|s| s * n),
            _ => None,
        }
    }

    /// Whether decoding needs the basket's entry offset table.
    pub fn needs_offsets(&self) -> bool {
        matches!(self, Interpretation::Jagged(_, JaggedCount::Offsets { .. }))
    }

    /// Element type of the innermost flat items.
    pub fn inner_dtype(&self) -> Option<DType> {
        match self {
            Interpretation::Dtype(d) => Some(d.dtype),
            Interpretation::Jagged(inner, _) => inner.inner_dtype(),
            Interpretation::Object(_) => None,
        }
    }

    /// An empty array of the shape this interpretation produces.
    pub fn empty(&self) -> Array {
        match self {
            Interpretation::Dtype(d) => Array::empty(d.dtype),
            Interpretation::Jagged(inner, _) => Array::Jagged(JaggedArray::empty(inner.empty())),
            Interpretation::Object(_) => Array::Objects(Vec::new()),
        }
    }

    /// Decodes every item in `bytes`.
    pub fn decode(&self, bytes: &[u8]) -> Result<Array> {
        let mut cursor = ByteCursor::new(bytes, 0);
        let out = self.read_items(&mut cursor, None)?;
        if !cursor.is_exhausted() {
            return Err(boundary(format!("{} trailing bytes", cursor.remaining())));
        }
        Ok(out)
    }

    /// Decodes the entries of one basket.
    ///
    /// `offsets` holds `entries + 1` positions into `data` when the basket
    /// carries an entry offset table.
    pub fn decode_basket(&self, data: &[u8], offsets: Option<&[usize]>, entries: usize) -> Result<Array> {
        match (self, offsets) {
            (Interpretation::Jagged(inner, JaggedCount::Offsets { skip_bytes }), Some(offsets)) => {
                let slices = entry_slices(data, offsets, entries, *skip_bytes)?;
                let mut parts = Vec::with_capacity(slices.len());
                let mut sizes = Vec::with_capacity(slices.len());
                for (start, stop) in slices {
                    let part = inner.decode(&data[start..stop])?;
                    sizes.push(part.len());
                    parts.push(part);
                }
                let contents = Array::concat(inner.empty(), parts)?;
                Ok(Array::Jagged(JaggedArray::from_sizes(contents, sizes)?))
            }
            (Interpretation::Jagged(_, JaggedCount::Offsets { .. }), None) => {
                Err(boundary("basket has no entry offset table"))
            }
            (Interpretation::Object(object), Some(offsets)) => {
                let slices = entry_slices(data, offsets, entries, 0)?;
                let mut values = Vec::with_capacity(slices.len());
                for (start, stop) in slices {
                    let mut cursor = ByteCursor::new(&data[start..stop], 0);
                    values.push(object.decode(&mut cursor)?);
                }
                Ok(Array::Objects(values))
            }
            _ => {
                let mut cursor = ByteCursor::new(data, 0);
                let out = self.read_items(&mut cursor, Some(entries)).map_err(|e| match e {
                    Error::TruncatedRead { .. } => {
                        boundary(format!("{} entries overrun {} bytes of content", entries, data.len()))
                    }
                    other => other,
                })?;
                if !cursor.is_exhausted() {
                    return Err(boundary(format!(
                        "{} entries leave {} trailing bytes",
                        entries,
                        cursor.remaining()
                    )));
                }
                Ok(out)
            }
        }
    }

    /// Reads `count` items, or everything left in the cursor.
    fn read_items(&self, cursor: &mut ByteCursor<'_>, count: Option<usize>) -> Result<Array> {
        match self {
            Interpretation::Dtype(d) => {
                let width = d.dtype.size();
                let n = match count {
                    Some(n) => n,
                    None if cursor.remaining() % width != 0 => {
                        return Err(boundary(format!(
                            "{} bytes is not a whole number of {} items",
                            cursor.remaining(),
                            d.dtype
                        )))
                    }
                    None => cursor.remaining() / width,
                };
                let bytes = cursor.read_bytes(n.saturating_mul(width))?;
                Ok(Array::decode(d.dtype, d.endianness, bytes))
            }
            Interpretation::Object(object) => {
                let mut values = Vec::new();
                match count {
                    Some(n) => {
                        for _ in 0..n {
                            values.push(object.decode(cursor)?);
                        }
                    }
                    None => {
                        while !cursor.is_exhausted() {
                            values.push(object.decode(cursor)?);
                        }
                    }
                }
                Ok(Array::Objects(values))
            }
            Interpretation::Jagged(inner, JaggedCount::Constant(n)) => {
                if *n == 0 {
                    return Err(Error::invalid_argument("fixed-size rows need a nonzero length"));
                }
                let contents = inner.read_items(cursor, count.map(|rows| rows.saturating_mul(*n)))?;
                if contents.len() % n != 0 {
                    return Err(boundary(format!("{} items do not fill rows of {}", contents.len(), n)));
                }
                let rows = contents.len() / n;
                Ok(Array::Jagged(JaggedArray::from_sizes(contents, vec![*n; rows])?))
            }
            Interpretation::Jagged(inner, JaggedCount::Prefixed) => {
                let mut parts = Vec::new();
                let mut sizes = Vec::new();
                loop {
                    let more = match count {
                        Some(rows) => sizes.len() < rows,
                        None => !cursor.is_exhausted(),
                    };
                    if !more {
                        break;
                    }
                    let k = cursor.read_u32()? as usize;
                    let part = inner.read_items(cursor, Some(k))?;
                    sizes.push(part.len());
                    parts.push(part);
                }
                let contents = Array::concat(inner.empty(), parts)?;
                Ok(Array::Jagged(JaggedArray::from_sizes(contents, sizes)?))
            }
            Interpretation::Jagged(_, JaggedCount::Offsets { .. }) => Err(Error::invalid_argument(
                "offset-table rows can only be the outermost interpretation",
            )),
        }
    }
}

impl fmt::Display for Interpretation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interpretation::Dtype(d) => match d.endianness {
                Endianness::Big => write!(f, ">{}", d.dtype),
                Endianness::Little => write!(f, "<{}", d.dtype),
            },
            Interpretation::Jagged(inner, JaggedCount::Constant(n)) => write!(f, "{}[{}]", inner, n),
            Interpretation::Jagged(inner, JaggedCount::Offsets { skip_bytes }) => {
                write!(f, "jagged({}, skip {})", inner, skip_bytes)
            }
            Interpretation::Jagged(inner, JaggedCount::Prefixed) => write!(f, "prefixed({})", inner),
            Interpretation::Object(object) => write!(f, "object({})", object.name),
        }
    }
}

/// Byte ranges of each entry, checked against the content length.
fn entry_slices(data: &[u8], offsets: &[usize], entries: usize, skip: usize) -> Result<Vec<(usize, usize)>> {
    if offsets.len() <= entries {
        return Err(boundary(format!(
            "offset table has {} positions for {} entries",
            offsets.len(),
            entries
        )));
    }
    let mut slices = Vec::with_capacity(entries);
    for e in 0..entries {
        let start = offsets[e] + skip;
        let stop = offsets[e + 1];
        if stop > data.len() || start > stop {
            return Err(boundary(format!(
                "entry {} spans {}..{} but the basket holds {} bytes",
                e,
                start,
                stop,
                data.len()
            )));
        }
        slices.push((start, stop));
    }
    Ok(slices)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn be_i32(values: &[i32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    #[test]
    fn test_flat_decode() {
        let data: Vec<u8> = [1.5f64, -2.0].iter().flat_map(|v| v.to_be_bytes()).collect();
        let interp = Interpretation::dtype(DType::F64);
        assert_eq!(interp.decode_basket(&data, None, 2).unwrap(), Array::F64(vec![1.5, -2.0]));
        assert_eq!(interp.item_size(), Some(8));
    }

    #[test]
    fn test_flat_entry_count_mismatch() {
        let data = be_i32(&[1, 2, 3]);
        let interp = Interpretation::dtype(DType::I32);
        assert!(matches!(interp.decode_basket(&data, None, 2), Err(Error::BasketBoundary { .. })));
        assert!(matches!(interp.decode_basket(&data, None, 4), Err(Error::BasketBoundary { .. })));
    }

    #[test]
    fn test_vector_offsets() {
        // entry 0: [1, 2], entry 1: [], entry 2: [3]
        let mut data = Vec::new();
        let mut offsets = vec![0];
        for row in [&[1, 2][..], &[][..], &[3][..]] {
            data.extend_from_slice(&[0u8; STL_VECTOR_HEADER]);
            data.extend(be_i32(row));
            offsets.push(data.len());
        }
        let interp = Interpretation::vector(Interpretation::dtype(DType::I32));
        let out = interp.decode_basket(&data, Some(&offsets), 3).unwrap();
        let jagged = out.as_jagged().unwrap();
        assert_eq!(jagged.sizes(), &[2, 0, 1]);
        assert_eq!(jagged.starts(), &[0, 2, 2]);
        assert_eq!(jagged.contents(), &Array::I32(vec![1, 2, 3]));
    }

    #[test]
    fn test_offsets_past_content() {
        let data = be_i32(&[1, 2]);
        let interp = Interpretation::jagged(Interpretation::dtype(DType::I32), JaggedCount::Offsets { skip_bytes: 0 });
        let err = interp.decode_basket(&data, Some(&[0, 4, 12]), 2).unwrap_err();
        assert!(matches!(err, Error::BasketBoundary { .. }));
        assert!(interp.decode_basket(&data, None, 2).is_err());
    }

    #[test]
    fn test_constant_rows() {
        let data = be_i32(&[1, 2, 3, 4, 5, 6]);
        let interp = Interpretation::jagged(Interpretation::dtype(DType::I32), JaggedCount::Constant(3));
        let out = interp.decode_basket(&data, None, 2).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.as_jagged().unwrap().row(1), Some(Array::I32(vec![4, 5, 6])));
        assert_eq!(interp.item_size(), Some(12));
    }

    #[test]
    fn test_nested_prefixed() {
        // vector<vector<int>> {{7}, {8, 9}}: byte count, version, outer count, rows
        let mut data = vec![0x40, 0, 0, 22, 0, 9];
        data.extend(2u32.to_be_bytes());
        data.extend(1u32.to_be_bytes());
        data.extend(be_i32(&[7]));
        data.extend(2u32.to_be_bytes());
        data.extend(be_i32(&[8, 9]));
        let inner = Interpretation::jagged(Interpretation::dtype(DType::I32), JaggedCount::Prefixed);
        let interp = Interpretation::vector(inner);
        let out = interp.decode_basket(&data, Some(&[0, data.len()]), 1).unwrap();
        let outer = out.as_jagged().unwrap();
        assert_eq!(outer.sizes(), &[2]);
        let rows = outer.contents().as_jagged().unwrap();
        assert_eq!(rows.row(0), Some(Array::I32(vec![7])));
        assert_eq!(rows.row(1), Some(Array::I32(vec![8, 9])));
    }

    #[test]
    fn test_strings_per_entry() {
        let data = [2, b'h', b'i', 0, 3, b'a', b'b', b'c'];
        let out = Interpretation::string().decode_basket(&data, Some(&[0, 3, 4, 8]), 3).unwrap();
        assert_eq!(
            out.as_objects().unwrap(),
            &[Value::Str("hi".into()), Value::Str(String::new()), Value::Str("abc".into())]
        );
    }

    #[test]
    fn test_nested_offsets_rejected() {
        let inner = Interpretation::vector(Interpretation::dtype(DType::U8));
        let interp = Interpretation::jagged(inner, JaggedCount::Constant(2));
        assert!(matches!(interp.decode(&[0; 4]), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_display() {
        let interp = Interpretation::vector(Interpretation::dtype(DType::F32));
        assert_eq!(interp.to_string(), "jagged(>f4, skip 10)");
        assert!(interp.needs_offsets());
        assert_eq!(interp.inner_dtype(), Some(DType::F32));
        assert_eq!(interp.empty(), Array::Jagged(JaggedArray::empty(Array::F32(vec![]))));
    }
}
