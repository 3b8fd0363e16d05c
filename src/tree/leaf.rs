//! Leaves: the element type of one field of a branch.

use crate::error::{Error, Result};
use crate::interp::DType;
use crate::object::{downcast, read_object_any, Named, ReadContext, Streamed, VersionHeader};
use crate::source::ByteCursor;
use std::any::Any;
use std::sync::Arc;

/// Offset ROOT adds to a basic type code for fixed-size arrays.
const FIXED_ARRAY_OFFSET: i32 = 20;

/// Which leaf class a [`Leaf`] was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKind {
    /// `TLeafO`
    Bool,
    /// `TLeafB`
    Byte,
    /// `TLeafS`
    Short,
    /// `TLeafI`
    Int,
    /// `TLeafL`
    Long,
    /// `TLeafF`
    Float,
    /// `TLeafD`
    Double,
    /// `TLeafC`: a string per entry.
    Char,
    /// `TLeafElement`: a member of a split class.
    Element {
        /// Element index in the class's streamer info.
        id: i32,
        /// Basic type code.
        ty: i32,
    },
}

impl LeafKind {
    /// Class name on disk.
    pub fn class_name(&self) -> &'static str {
        match self {
            LeafKind::Bool => "TLeafO",
            LeafKind::Byte => "TLeafB",
            LeafKind::Short => "TLeafS",
            LeafKind::Int => "TLeafI",
            LeafKind::Long => "TLeafL",
            LeafKind::Float => "TLeafF",
            LeafKind::Double => "TLeafD",
            LeafKind::Char => "TLeafC",
            LeafKind::Element { .. } => "TLeafElement",
        }
    }
}

/// Maps a basic type code to a dtype.
///
/// Codes above 20 denote fixed-size arrays of the code minus 20.
pub fn element_dtype(code: i32) -> Option<DType> {
    let code = if code > FIXED_ARRAY_OFFSET && code <= 2 * FIXED_ARRAY_OFFSET {
        code - FIXED_ARRAY_OFFSET
    } else {
        code
    };
    Some(match code {
        1 => DType::I8,
        2 => DType::I16,
        3 | 6 => DType::I32,
        4 | 16 => DType::I64,
        5 | 9 => DType::F32,
        8 => DType::F64,
        11 => DType::U8,
        12 => DType::U16,
        13 | 15 => DType::U32,
        14 | 17 => DType::U64,
        18 => DType::Bool,
        _ => return None,
    })
}

/// A leaf of any class.
#[derive(Debug, Clone)]
pub struct Leaf {
    /// Leaf class.
    pub kind: LeafKind,
    /// Leaf name.
    pub name: String,
    /// Leaf title, e.g. `x[n]/D`.
    pub title: String,
    /// Fixed number of items per entry.
    pub len: i32,
    /// Width of one item in bytes.
    pub len_type: i32,
    /// Offset within the branch buffer.
    pub offset: i32,
    /// Whether `minimum..maximum` bounds the values.
    pub is_range: bool,
    /// Whether integer values are unsigned.
    pub is_unsigned: bool,
    /// Leaf holding the per-entry item count, for variable-length arrays.
    pub count: Option<Arc<Leaf>>,
    /// Smallest value written, widened.
    pub minimum: f64,
    /// Largest value written, widened.
    pub maximum: f64,
}

impl Leaf {
    /// Reads the shared `TLeaf` record, with default kind and limits.
    fn read_base(cursor: &mut ByteCursor<'_>, ctx: &mut ReadContext<'_>) -> Result<Self> {
        let header = VersionHeader::read(cursor)?;
        let named = Named::read(cursor)?;
        let len = cursor.read_i32()?;
        let len_type = cursor.read_i32()?;
        let offset = cursor.read_i32()?;
        let is_range = cursor.read_bool()?;
        let is_unsigned = cursor.read_bool()?;
        let count = match read_object_any(cursor, ctx)? {
            Some(obj) => {
                let class = obj.class_name().to_string();
                Some(downcast::<Leaf>(obj).ok_or_else(|| {
                    Error::corruption(format!("leaf {:?} counted by a {}", named.name, class))
                })?)
            }
            None => None,
        };
        header.check_end(cursor, "TLeaf")?;
        Ok(Self {
            kind: LeafKind::Double,
            name: named.name,
            title: named.title,
            len,
            len_type,
            offset,
            is_range,
            is_unsigned,
            count,
            minimum: 0.0,
            maximum: 0.0,
        })
    }

    /// Reads a leaf of a concrete class.
    pub fn read(kind: LeafKind, cursor: &mut ByteCursor<'_>, ctx: &mut ReadContext<'_>) -> Result<Self> {
        let header = VersionHeader::read(cursor)?;
        let mut leaf = Self::read_base(cursor, ctx)?;
        leaf.kind = kind;
        let (minimum, maximum) = match kind {
            LeafKind::Bool => (cursor.read_bool()? as u8 as f64, cursor.read_bool()? as u8 as f64),
            LeafKind::Byte => (cursor.read_i8()? as f64, cursor.read_i8()? as f64),
            LeafKind::Short => (cursor.read_i16()? as f64, cursor.read_i16()? as f64),
            LeafKind::Int | LeafKind::Char => (cursor.read_i32()? as f64, cursor.read_i32()? as f64),
            LeafKind::Long => (cursor.read_i64()? as f64, cursor.read_i64()? as f64),
            LeafKind::Float => (cursor.read_f32()? as f64, cursor.read_f32()? as f64),
            LeafKind::Double => (cursor.read_f64()?, cursor.read_f64()?),
            LeafKind::Element { .. } => {
                let id = cursor.read_i32()?;
                let ty = cursor.read_i32()?;
                leaf.kind = LeafKind::Element { id, ty };
                (0.0, 0.0)
            }
        };
        leaf.minimum = minimum;
        leaf.maximum = maximum;
        header.check_end(cursor, kind.class_name())?;
        Ok(leaf)
    }

    /// Element type of one item; `None` for strings and unknown element codes.
    pub fn dtype(&self) -> Option<DType> {
        let pick = |signed, unsigned| if self.is_unsigned { unsigned } else { signed };
        match self.kind {
            LeafKind::Bool => Some(DType::Bool),
            LeafKind::Byte => Some(pick(DType::I8, DType::U8)),
            LeafKind::Short => Some(pick(DType::I16, DType::U16)),
            LeafKind::Int => Some(pick(DType::I32, DType::U32)),
            LeafKind::Long => Some(pick(DType::I64, DType::U64)),
            LeafKind::Float => Some(DType::F32),
            LeafKind::Double => Some(DType::F64),
            LeafKind::Char => None,
            LeafKind::Element { ty, .. } => element_dtype(ty),
        }
    }
}

impl Streamed for Leaf {
    fn class_name(&self) -> &str {
        self.kind.class_name()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
