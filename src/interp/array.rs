//! Element types and decoded arrays.

use super::jagged::JaggedArray;
use crate::error::{Error, Result};
use crate::source::{decode_be, decode_le};
use serde::Serialize;
use std::fmt;

/// Element type of a flat column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DType {
    /// One-byte boolean.
    Bool,
    /// Signed 8-bit integer.
    I8,
    /// Unsigned 8-bit integer.
    U8,
    /// Signed 16-bit integer.
    I16,
    /// Unsigned 16-bit integer.
    U16,
    /// Signed 32-bit integer.
    I32,
    /// Unsigned 32-bit integer.
    U32,
    /// Signed 64-bit integer.
    I64,
    /// Unsigned 64-bit integer.
    U64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
}

impl DType {
    /// Encoded width in bytes.
    pub fn size(&self) -> usize {
        match self {
            DType::Bool | DType::I8 | DType::U8 => 1,
            DType::I16 | DType::U16 => 2,
            DType::I32 | DType::U32 | DType::F32 => 4,
            DType::I64 | DType::U64 | DType::F64 => 8,
        }
    }

    /// Short name, as in `f8` style descriptors.
    pub fn name(&self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::I8 => "i1",
            DType::U8 => "u1",
            DType::I16 => "i2",
            DType::U16 => "u2",
            DType::I32 => "i4",
            DType::U32 => "u4",
            DType::I64 => "i8",
            DType::U64 => "u8",
            DType::F32 => "f4",
            DType::F64 => "f8",
        }
    }

    /// Maps a C++ or ROOT basic type name.
    pub fn from_type_name(name: &str) -> Option<Self> {
        let dtype = match name.trim() {
            "bool" | "Bool_t" => DType::Bool,
            "char" | "Char_t" | "signed char" => DType::I8,
            "unsigned char" | "UChar_t" | "Byte_t" => DType::U8,
            "short" | "Short_t" | "short int" => DType::I16,
            "unsigned short" | "UShort_t" | "unsigned short int" => DType::U16,
            "int" | "Int_t" => DType::I32,
            "unsigned int" | "unsigned" | "UInt_t" => DType::U32,
            "long" | "Long_t" | "long long" | "Long64_t" | "long int" => DType::I64,
            "unsigned long" | "ULong_t" | "unsigned long long" | "ULong64_t" => DType::U64,
            "float" | "Float_t" | "Double32_t" => DType::F32,
            "double" | "Double_t" => DType::F64,
            _ => return None,
        };
        Some(dtype)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Byte order of encoded values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Endianness {
    /// Most significant byte first; what the container writes.
    #[default]
    Big,
    /// Least significant byte first.
    Little,
}

/// A decoded non-numeric item.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A string.
    Str(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// A nested array.
    Array(Array),
}

/// A decoded column.
#[derive(Debug, Clone, PartialEq)]
pub enum Array {
    /// Booleans.
    Bool(Vec<bool>),
    /// Signed bytes.
    I8(Vec<i8>),
    /// Unsigned bytes.
    U8(Vec<u8>),
    /// Signed 16-bit integers.
    I16(Vec<i16>),
    /// Unsigned 16-bit integers.
    U16(Vec<u16>),
    /// Signed 32-bit integers.
    I32(Vec<i32>),
    /// Unsigned 32-bit integers.
    U32(Vec<u32>),
    /// Signed 64-bit integers.
    I64(Vec<i64>),
    /// Unsigned 64-bit integers.
    U64(Vec<u64>),
    /// 32-bit floats.
    F32(Vec<f32>),
    /// 64-bit floats.
    F64(Vec<f64>),
    /// Variable-length rows.
    Jagged(JaggedArray),
    /// Items decoded by an object interpretation.
    Objects(Vec<Value>),
}

macro_rules! accessor {
    ($name:ident, $variant:ident, $ty:ty) => {
        #[doc = concat!("The values, if this is a `", stringify!($variant), "` array.")]
        pub fn $name(&self) -> Option<&[$ty]> {
            match self {
                Array::$variant(v) => Some(v),
                _ => None,
            }
        }
    };
}

impl Array {
    /// Decodes a buffer whose length is a multiple of the element width.
    pub fn decode(dtype: DType, endianness: Endianness, bytes: &[u8]) -> Self {
        macro_rules! dec {
            ($variant:ident) => {
                Array::$variant(match endianness {
                    Endianness::Big => decode_be(bytes),
                    Endianness::Little => decode_le(bytes),
                })
            };
        }
        match dtype {
            DType::Bool => dec!(Bool),
            DType::I8 => dec!(I8),
            DType::U8 => dec!(U8),
            DType::I16 => dec!(I16),
            DType::U16 => dec!(U16),
            DType::I32 => dec!(I32),
            DType::U32 => dec!(U32),
            DType::I64 => dec!(I64),
            DType::U64 => dec!(U64),
            DType::F32 => dec!(F32),
            DType::F64 => dec!(F64),
        }
    }

    /// An empty flat array of `dtype`.
    pub fn empty(dtype: DType) -> Self {
        Self::decode(dtype, Endianness::Big, &[])
    }

    /// Element type of a flat array.
    pub fn dtype(&self) -> Option<DType> {
        Some(match self {
            Array::Bool(_) => DType::Bool,
            Array::I8(_) => DType::I8,
            Array::U8(_) => DType::U8,
            Array::I16(_) => DType::I16,
            Array::U16(_) => DType::U16,
            Array::I32(_) => DType::I32,
            Array::U32(_) => DType::U32,
            Array::I64(_) => DType::I64,
            Array::U64(_) => DType::U64,
            Array::F32(_) => DType::F32,
            Array::F64(_) => DType::F64,
            Array::Jagged(_) | Array::Objects(_) => return None,
        })
    }

    /// Number of top-level items (rows for jagged arrays).
    pub fn len(&self) -> usize {
        match self {
            Array::Bool(v) => v.len(),
            Array::I8(v) => v.len(),
            Array::U8(v) => v.len(),
            Array::I16(v) => v.len(),
            Array::U16(v) => v.len(),
            Array::I32(v) => v.len(),
            Array::U32(v) => v.len(),
            Array::I64(v) => v.len(),
            Array::U64(v) => v.len(),
            Array::F32(v) => v.len(),
            Array::F64(v) => v.len(),
            Array::Jagged(j) => j.len(),
            Array::Objects(v) => v.len(),
        }
    }

    /// True when there are no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// An empty array of the same shape.
    pub fn empty_like(&self) -> Self {
        match self {
            Array::Jagged(j) => Array::Jagged(JaggedArray::empty(j.contents().empty_like())),
            Array::Objects(_) => Array::Objects(Vec::new()),
            flat => Self::empty(flat.dtype().unwrap_or(DType::U8)),
        }
    }

    /// Items `start..stop`. Jagged slices share their contents buffer.
    pub fn slice(&self, start: usize, stop: usize) -> Self {
        let stop = stop.min(self.len());
        let start = start.min(stop);
        macro_rules! cut {
            ($variant:ident, $v:expr) => {
                Array::$variant($v[start..stop].to_vec())
            };
        }
        match self {
            Array::Bool(v) => cut!(Bool, v),
            Array::I8(v) => cut!(I8, v),
            Array::U8(v) => cut!(U8, v),
            Array::I16(v) => cut!(I16, v),
            Array::U16(v) => cut!(U16, v),
            Array::I32(v) => cut!(I32, v),
            Array::U32(v) => cut!(U32, v),
            Array::I64(v) => cut!(I64, v),
            Array::U64(v) => cut!(U64, v),
            Array::F32(v) => cut!(F32, v),
            Array::F64(v) => cut!(F64, v),
            Array::Jagged(j) => Array::Jagged(j.slice(start, stop)),
            Array::Objects(v) => cut!(Objects, v),
        }
    }

    /// Appends another array of the same shape.
    pub fn append(&mut self, other: Array) -> Result<()> {
        match (self, other) {
            (Array::Bool(a), Array::Bool(b)) => a.extend(b),
            (Array::I8(a), Array::I8(b)) => a.extend(b),
            (Array::U8(a), Array::U8(b)) => a.extend(b),
            (Array::I16(a), Array::I16(b)) => a.extend(b),
            (Array::U16(a), Array::U16(b)) => a.extend(b),
            (Array::I32(a), Array::I32(b)) => a.extend(b),
            (Array::U32(a), Array::U32(b)) => a.extend(b),
            (Array::I64(a), Array::I64(b)) => a.extend(b),
            (Array::U64(a), Array::U64(b)) => a.extend(b),
            (Array::F32(a), Array::F32(b)) => a.extend(b),
            (Array::F64(a), Array::F64(b)) => a.extend(b),
            (Array::Objects(a), Array::Objects(b)) => a.extend(b),
            (Array::Jagged(a), Array::Jagged(b)) => a.append(b)?,
            (a, b) => {
                return Err(Error::invalid_argument(format!(
                    "cannot append {} to {}",
                    b.kind(),
                    a.kind()
                )))
            }
        }
        Ok(())
    }

    /// Concatenates `parts` onto `empty`, which fixes the shape.
    pub fn concat(empty: Array, parts: impl IntoIterator<Item = Array>) -> Result<Array> {
        let mut out = empty;
        for part in parts {
            out.append(part)?;
        }
        Ok(out)
    }

    fn kind(&self) -> String {
        match self {
            Array::Jagged(j) => format!("jagged<{}>", j.contents().kind()),
            Array::Objects(_) => "objects".to_string(),
            flat => flat.dtype().map(|d| d.name().to_string()).unwrap_or_default(),
        }
    }

    /// Numeric values widened to f64.
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        Some(match self {
            Array::Bool(v) => v.iter().map(|&x| if x { 1.0 } else { 0.0 }).collect(),
            Array::I8(v) => v.iter().map(|&x| x as f64).collect(),
            Array::U8(v) => v.iter().map(|&x| x as f64).collect(),
            Array::I16(v) => v.iter().map(|&x| x as f64).collect(),
            Array::U16(v) => v.iter().map(|&x| x as f64).collect(),
            Array::I32(v) => v.iter().map(|&x| x as f64).collect(),
            Array::U32(v) => v.iter().map(|&x| x as f64).collect(),
            Array::I64(v) => v.iter().map(|&x| x as f64).collect(),
            Array::U64(v) => v.iter().map(|&x| x as f64).collect(),
            Array::F32(v) => v.iter().map(|&x| x as f64).collect(),
            Array::F64(v) => v.clone(),
            Array::Jagged(_) | Array::Objects(_) => return None,
        })
    }

    accessor!(as_bool, Bool, bool);
    accessor!(as_i8, I8, i8);
    accessor!(as_u8, U8, u8);
    accessor!(as_i16, I16, i16);
    accessor!(as_u16, U16, u16);
    accessor!(as_i32, I32, i32);
    accessor!(as_u32, U32, u32);
    accessor!(as_i64, I64, i64);
    accessor!(as_u64, U64, u64);
    accessor!(as_f32, F32, f32);
    accessor!(as_f64, F64, f64);
    accessor!(as_objects, Objects, Value);

    /// The jagged array, if this is one.
    pub fn as_jagged(&self) -> Option<&JaggedArray> {
        match self {
            Array::Jagged(j) => Some(j),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_big_and_little() {
        let bytes = [0x3f, 0xf0, 0, 0, 0, 0, 0, 0];
        assert_eq!(Array::decode(DType::F64, Endianness::Big, &bytes), Array::F64(vec![1.0]));
        let le = 1.0f64.to_le_bytes();
        assert_eq!(Array::decode(DType::F64, Endianness::Little, &le), Array::F64(vec![1.0]));
        assert_eq!(
            Array::decode(DType::U16, Endianness::Big, &[0, 1, 0, 2]),
            Array::U16(vec![1, 2])
        );
    }

    #[test]
    fn test_append_and_slice() {
        let mut a = Array::I32(vec![1, 2]);
        a.append(Array::I32(vec![3])).unwrap();
        assert_eq!(a, Array::I32(vec![1, 2, 3]));
        assert_eq!(a.slice(1, 10), Array::I32(vec![2, 3]));
        assert!(a.append(Array::F64(vec![1.0])).is_err());
    }

    #[test]
    fn test_concat_empty() {
        let out = Array::concat(Array::empty(DType::F32), Vec::new()).unwrap();
        assert_eq!(out, Array::F32(vec![]));
        assert!(out.is_empty());
    }

    #[test]
    fn test_type_names() {
        assert_eq!(DType::from_type_name("int"), Some(DType::I32));
        assert_eq!(DType::from_type_name("Double_t"), Some(DType::F64));
        assert_eq!(DType::from_type_name("unsigned long long"), Some(DType::U64));
        assert_eq!(DType::from_type_name("TLorentzVector"), None);
        assert_eq!(DType::I64.size(), 8);
        assert_eq!(DType::F32.to_string(), "f4");
    }

    #[test]
    fn test_to_f64() {
        assert_eq!(Array::I16(vec![-1, 2]).to_f64_vec(), Some(vec![-1.0, 2.0]));
        assert_eq!(Array::Objects(vec![]).to_f64_vec(), None);
    }
}
