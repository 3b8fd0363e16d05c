//! Object-graph deserializer.
//!
//! `read_object_any` implements the tag protocol:
//!
//! ```text
//! [bytecount u32]? tag u32
//!   tag == 0                  null
//!   tag == 1                  reference to the object under construction
//!   tag & CLASS_MASK == 0     back-reference to an object
//!   tag == NEW_CLASS_TAG      class name (C string) + object
//!   otherwise                 back-reference to a class + object
//! ```
//!
//! The leading byte count is present when its word has `BYTE_COUNT_MASK`
//! set; then the reference keys are `position + MAP_OFFSET`. Without it,
//! keys are sequential slots.

use super::refs::{RefEntry, RefTable};
use super::registry::{ClassFactory, ClassRegistry};
use super::{
    ObjectRef, BYTE_COUNT_MASK, BYTE_COUNT_VMASK, CLASS_MASK, IS_REFERENCED, MAP_OFFSET,
    NEW_CLASS_TAG,
};
use crate::container::FileContext;
use crate::error::{Error, Result};
use crate::source::ByteCursor;
use std::sync::Arc;

/// State shared by every factory while one record is read.
pub struct ReadContext<'f> {
    file: &'f Arc<FileContext>,
    refs: RefTable,
    discard_depth: usize,
}

impl<'f> ReadContext<'f> {
    /// A fresh context with an empty reference table.
    pub fn new(file: &'f Arc<FileContext>) -> Self {
        Self { file, refs: RefTable::new(), discard_depth: 0 }
    }

    /// The file being read.
    pub fn file(&self) -> &'f Arc<FileContext> {
        self.file
    }

    /// The class registry.
    pub fn registry(&self) -> &'f ClassRegistry {
        self.file.registry()
    }

    /// The reference table.
    pub fn refs(&self) -> &RefTable {
        &self.refs
    }

    /// Whether unknown classes are skipped rather than rejected.
    pub fn is_discarding(&self) -> bool {
        self.discard_depth > 0
    }
}

/// A versioned record header.
///
/// Records start with a 32-bit word. With `BYTE_COUNT_MASK` set, the rest of
/// the word is the record's length after the word and a 16-bit version
/// follows. Otherwise the record is unversioned-legacy: the first two bytes
/// are the version and no length is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionHeader {
    /// Relative position of the header word.
    pub start: i64,
    /// Byte count after the header word, when present.
    pub byte_count: Option<u32>,
    /// Class version.
    pub version: u16,
}

impl VersionHeader {
    /// Reads a header at the cursor.
    pub fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let start = cursor.position();
        let word = cursor.read_u32()?;
        if word & BYTE_COUNT_MASK != 0 {
            let version = cursor.read_u16()?;
            Ok(Self { start, byte_count: Some(word & !BYTE_COUNT_MASK), version })
        } else {
            let index = cursor.index() - 4;
            cursor.set_index(index);
            let version = cursor.read_u16()?;
            Ok(Self { start, byte_count: None, version })
        }
    }

    /// Reads a header and rejects versions below `minimum`.
    pub fn read_min(cursor: &mut ByteCursor<'_>, class: &str, minimum: u16) -> Result<Self> {
        let header = Self::read(cursor)?;
        if header.version < minimum {
            return Err(Error::UnsupportedVersion {
                class: class.to_string(),
                version: header.version,
                minimum,
            });
        }
        Ok(header)
    }

    /// Verifies that exactly the declared number of bytes has been consumed.
    pub fn check_end(&self, cursor: &ByteCursor<'_>, class: &str) -> Result<()> {
        if let Some(count) = self.byte_count {
            let expected = count as i64 + 4;
            let observed = cursor.position() - self.start;
            if observed != expected {
                return Err(Error::ByteCountMismatch {
                    class: class.to_string(),
                    start: self.start,
                    expected,
                    observed,
                });
            }
        }
        Ok(())
    }

    /// Moves the cursor to the declared end of the record.
    pub fn skip_to_end(&self, cursor: &mut ByteCursor<'_>, class: &str) -> Result<()> {
        let count = self.byte_count.ok_or_else(|| {
            Error::corruption(format!("cannot skip {} without a byte count", class))
        })?;
        let end = cursor.absolute(self.start + count as i64 + 4)?;
        if end > cursor.data().len() {
            return Err(Error::TruncatedRead {
                index: cursor.index(),
                len: end.saturating_sub(cursor.index()),
                available: cursor.data().len(),
            });
        }
        cursor.set_index(end);
        Ok(())
    }
}

/// Skips the base `TObject` fields.
pub fn skip_tobject(cursor: &mut ByteCursor<'_>) -> Result<()> {
    let version = cursor.read_u16()?;
    if version & BYTE_COUNT_VMASK != 0 {
        cursor.skip(4)?;
    }
    let _unique_id = cursor.read_u32()?;
    let bits = cursor.read_u32()?;
    if bits & IS_REFERENCED != 0 {
        cursor.skip(2)?;
    }
    Ok(())
}

/// Reads one embedded object: null, a back-reference, or a new object.
pub fn read_object_any(
    cursor: &mut ByteCursor<'_>,
    ctx: &mut ReadContext<'_>,
) -> Result<Option<ObjectRef>> {
    let beg = cursor.position();
    let word = cursor.read_u32()?;

    let (tag, byte_count, start) = if word & BYTE_COUNT_MASK == 0 || word == NEW_CLASS_TAG {
        (word, None, 0)
    } else {
        let start = cursor.position();
        (cursor.read_u32()?, Some(word & !BYTE_COUNT_MASK), start)
    };

    if tag & CLASS_MASK == 0 {
        return resolve_object_ref(cursor, ctx, tag, beg, byte_count);
    }

    let (class_name, entry) = if tag == NEW_CLASS_TAG {
        let offset = cursor.position();
        let name = cursor.read_cstring()?;
        let entry = match ctx.registry().get(&name) {
            Some(factory) => RefEntry::Class(factory),
            None if ctx.is_discarding() && byte_count.is_some() => RefEntry::Unknown(name.clone()),
            None => return Err(Error::UnsupportedClass { class: name, offset }),
        };
        let slot = match byte_count {
            Some(_) => start as u32 + MAP_OFFSET,
            None => ctx.refs.next_slot(),
        };
        log::trace!("new class {:?} at {} (slot {})", name, offset, slot);
        ctx.refs.insert(slot, entry.clone());
        (name, entry)
    } else {
        let slot = tag & !CLASS_MASK;
        match ctx.refs.get(slot) {
            Some(RefEntry::Class(factory)) => {
                (factory.class_name().to_string(), RefEntry::Class(Arc::clone(factory)))
            }
            Some(RefEntry::Unknown(name)) if ctx.is_discarding() && byte_count.is_some() => {
                (name.clone(), RefEntry::Unknown(name.clone()))
            }
            Some(RefEntry::Unknown(name)) => {
                return Err(Error::UnsupportedClass { class: name.clone(), offset: beg })
            }
            _ => return Err(Error::InvalidClassReference { tag: slot, offset: beg }),
        }
    };

    let factory: Arc<dyn ClassFactory> = match entry {
        RefEntry::Class(factory) => factory,
        _ => {
            log::warn!("skipping object of unknown class {:?} at {}", class_name, beg);
            let header = VersionHeader { start: beg, byte_count, version: 0 };
            header.skip_to_end(cursor, &class_name)?;
            return Ok(None);
        }
    };

    let object = factory.read(cursor, ctx)?;
    if let Some(count) = byte_count {
        VersionHeader { start: beg, byte_count: Some(count), version: 0 }
            .check_end(cursor, &class_name)?;
    }
    let slot = match byte_count {
        Some(_) => beg as u32 + MAP_OFFSET,
        None => ctx.refs.next_slot(),
    };
    ctx.refs.insert(slot, RefEntry::Object(Arc::clone(&object)));
    Ok(Some(object))
}

fn resolve_object_ref(
    cursor: &mut ByteCursor<'_>,
    ctx: &mut ReadContext<'_>,
    tag: u32,
    beg: i64,
    byte_count: Option<u32>,
) -> Result<Option<ObjectRef>> {
    match tag {
        0 => return Ok(None),
        1 => return Err(Error::SelfReferenceUnsupported { offset: beg }),
        _ => {}
    }
    match ctx.refs.get(tag) {
        Some(RefEntry::Object(obj)) => {
            log::trace!("object reference {:#x} at {} -> {}", tag, beg, obj.class_name());
            Ok(Some(Arc::clone(obj)))
        }
        Some(_) => Err(Error::InvalidObjectReference { tag, offset: beg }),
        None if (tag - MAP_OFFSET) as i64 >= beg => {
            Err(Error::InvalidObjectReference { tag, offset: beg })
        }
        None => {
            // Referent was inside skipped content, or is still being read.
            log::trace!("unresolved reference {:#x} at {}", tag, beg);
            let end = beg + byte_count.unwrap_or(0) as i64 + 4;
            cursor.set_index(cursor.absolute(end)?);
            Ok(None)
        }
    }
}

/// Reads one embedded object and drops it.
///
/// Unknown classes with a byte count are skipped instead of rejected.
pub fn discard_object_any(cursor: &mut ByteCursor<'_>, ctx: &mut ReadContext<'_>) -> Result<()> {
    ctx.discard_depth += 1;
    let result = read_object_any(cursor, ctx);
    ctx.discard_depth -= 1;
    result.map(|_| ())
}
