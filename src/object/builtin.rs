//! Builtin classes: names, attribute mixins, collections, strings and arrays.

use super::deserialize::{read_object_any, skip_tobject, ReadContext, VersionHeader};
use super::registry::ClassRegistry;
use super::ObjectRef;
use crate::error::Result;
use crate::source::{ByteCursor, Element};
use std::sync::Arc;

/// `TNamed`: a name and a title.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Named {
    /// Object name.
    pub name: String,
    /// Object title.
    pub title: String,
}

impl Named {
    /// Reads a `TNamed` record.
    pub fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let header = VersionHeader::read(cursor)?;
        skip_tobject(cursor)?;
        let name = cursor.read_string()?;
        let title = cursor.read_string()?;
        header.check_end(cursor, "TNamed")?;
        Ok(Self { name, title })
    }
}

crate::impl_streamed!(Named, "TNamed");

/// `TAttLine`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineAttributes {
    /// Line color index.
    pub color: i16,
    /// Line style.
    pub style: i16,
    /// Line width.
    pub width: i16,
}

impl LineAttributes {
    /// Reads a `TAttLine` record.
    pub fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let header = VersionHeader::read(cursor)?;
        let attrs = Self {
            color: cursor.read_i16()?,
            style: cursor.read_i16()?,
            width: cursor.read_i16()?,
        };
        header.check_end(cursor, "TAttLine")?;
        Ok(attrs)
    }
}

crate::impl_streamed!(LineAttributes, "TAttLine");

/// `TAttFill`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillAttributes {
    /// Fill color index.
    pub color: i16,
    /// Fill style.
    pub style: i16,
}

impl FillAttributes {
    /// Reads a `TAttFill` record.
    pub fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let header = VersionHeader::read(cursor)?;
        let attrs = Self { color: cursor.read_i16()?, style: cursor.read_i16()? };
        header.check_end(cursor, "TAttFill")?;
        Ok(attrs)
    }
}

crate::impl_streamed!(FillAttributes, "TAttFill");

/// `TAttMarker`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MarkerAttributes {
    /// Marker color index.
    pub color: i16,
    /// Marker style.
    pub style: i16,
    /// Marker size.
    pub size: f32,
}

impl MarkerAttributes {
    /// Reads a `TAttMarker` record.
    pub fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let header = VersionHeader::read(cursor)?;
        let attrs = Self {
            color: cursor.read_i16()?,
            style: cursor.read_i16()?,
            size: cursor.read_f32()?,
        };
        header.check_end(cursor, "TAttMarker")?;
        Ok(attrs)
    }
}

crate::impl_streamed!(MarkerAttributes, "TAttMarker");

/// `TObjArray`: a list of possibly-null objects.
#[derive(Debug, Clone, Default)]
pub struct ObjArray {
    /// Array name (usually empty).
    pub name: String,
    /// Lower bound of the index range.
    pub low: i32,
    /// Items; `None` for null slots and unresolved references.
    pub items: Vec<Option<ObjectRef>>,
}

impl ObjArray {
    /// Reads a `TObjArray` record.
    pub fn read(cursor: &mut ByteCursor<'_>, ctx: &mut ReadContext<'_>) -> Result<Self> {
        let header = VersionHeader::read(cursor)?;
        if header.version >= 3 {
            skip_tobject(cursor)?;
        }
        let name = if header.version >= 2 { cursor.read_string()? } else { String::new() };
        let size = cursor.read_i32()?.max(0) as usize;
        let low = cursor.read_i32()?;
        let mut items = Vec::with_capacity(size.min(cursor.remaining() / 4));
        for _ in 0..size {
            items.push(read_object_any(cursor, ctx)?);
        }
        header.check_end(cursor, "TObjArray")?;
        Ok(Self { name, low, items })
    }

    /// Non-null items.
    pub fn iter(&self) -> impl Iterator<Item = &ObjectRef> {
        self.items.iter().flatten()
    }

    /// Number of slots, including nulls.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the array has no slots.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

crate::impl_streamed!(ObjArray, "TObjArray");

/// `TList` and `THashList`: objects with per-item option strings.
#[derive(Debug, Clone, Default)]
pub struct ObjList {
    /// List name.
    pub name: String,
    /// Items with their option strings.
    pub items: Vec<(Option<ObjectRef>, String)>,
}

impl ObjList {
    /// Reads a `TList` record.
    pub fn read(cursor: &mut ByteCursor<'_>, ctx: &mut ReadContext<'_>) -> Result<Self> {
        let header = VersionHeader::read(cursor)?;
        skip_tobject(cursor)?;
        let name = cursor.read_string()?;
        let size = cursor.read_i32()?.max(0) as usize;
        let mut items = Vec::with_capacity(size.min(cursor.remaining() / 4));
        for _ in 0..size {
            let item = read_object_any(cursor, ctx)?;
            let n = cursor.read_u8()? as usize;
            let option = String::from_utf8_lossy(cursor.read_bytes(n)?).into_owned();
            items.push((item, option));
        }
        header.check_end(cursor, "TList")?;
        Ok(Self { name, items })
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the list is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

crate::impl_streamed!(ObjList, "TList");

/// `TObjString`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjString(pub String);

impl ObjString {
    /// Reads a `TObjString` record.
    pub fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let header = VersionHeader::read(cursor)?;
        skip_tobject(cursor)?;
        let value = cursor.read_string()?;
        header.check_end(cursor, "TObjString")?;
        Ok(Self(value))
    }
}

crate::impl_streamed!(ObjString, "TObjString");

/// `ROOT::TIOFeatures`: a bit set of I/O options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoFeatures {
    /// Feature bits.
    pub bits: u8,
}

impl IoFeatures {
    /// Entry offsets of counted branches are not stored; readers rebuild them from the counts.
    pub const GENERATE_OFFSET_MAP: u8 = 1;

    /// Whether counted branches rely on rebuilt entry offsets.
    pub fn generates_offset_map(&self) -> bool {
        self.bits & Self::GENERATE_OFFSET_MAP != 0
    }

    /// Reads a `ROOT::TIOFeatures` record.
    pub fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let header = VersionHeader::read(cursor)?;
        if header.version == 0 {
            // Version 0 is followed by the class checksum.
            cursor.skip(4)?;
        }
        let bits = cursor.read_u8()?;
        header.check_end(cursor, "ROOT::TIOFeatures")?;
        Ok(Self { bits })
    }
}

crate::impl_streamed!(IoFeatures, "ROOT::TIOFeatures");

/// Reads an inline `TArray*`: a 32-bit length followed by the values.
pub fn read_tarray<T: Element>(cursor: &mut ByteCursor<'_>) -> Result<Vec<T>> {
    let n = cursor.read_i32()?.max(0) as usize;
    cursor.read_array(n)
}

/// Skips an inline `TArray*` of `width`-byte values.
pub fn skip_tarray(cursor: &mut ByteCursor<'_>, width: usize) -> Result<()> {
    let n = cursor.read_i32()?.max(0) as usize;
    cursor.skip(n * width)
}

pub(super) fn register_classes(registry: &mut ClassRegistry) {
    registry.register_fn("TNamed", |cursor, _| Ok(Arc::new(Named::read(cursor)?)));
    registry.register_fn("TAttLine", |cursor, _| Ok(Arc::new(LineAttributes::read(cursor)?)));
    registry.register_fn("TAttFill", |cursor, _| Ok(Arc::new(FillAttributes::read(cursor)?)));
    registry.register_fn("TAttMarker", |cursor, _| Ok(Arc::new(MarkerAttributes::read(cursor)?)));
    registry.register_fn("TObjArray", |cursor, ctx| Ok(Arc::new(ObjArray::read(cursor, ctx)?)));
    registry.register_fn("TList", |cursor, ctx| Ok(Arc::new(ObjList::read(cursor, ctx)?)));
    registry.register_fn("THashList", |cursor, ctx| Ok(Arc::new(ObjList::read(cursor, ctx)?)));
    registry.register_fn("TObjString", |cursor, _| Ok(Arc::new(ObjString::read(cursor)?)));
    registry.register_fn("ROOT::TIOFeatures", |cursor, _| Ok(Arc::new(IoFeatures::read(cursor)?)));
}
