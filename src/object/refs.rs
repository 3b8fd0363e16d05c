//! Per-record reference table.

use super::registry::ClassFactory;
use super::ObjectRef;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// What a reference slot holds.
#[derive(Clone)]
pub enum RefEntry {
    /// A class introduced by name.
    Class(Arc<dyn ClassFactory>),
    /// A class introduced by name that has no factory; objects of it were skipped.
    Unknown(String),
    /// A fully read object.
    Object(ObjectRef),
}

impl fmt::Debug for RefEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefEntry::Class(factory) => write!(f, "Class({})", factory.class_name()),
            RefEntry::Unknown(name) => write!(f, "Unknown({})", name),
            RefEntry::Object(obj) => write!(f, "Object({})", obj.class_name()),
        }
    }
}

/// Maps reference keys to classes and objects.
///
/// Keys are byte positions plus [`MAP_OFFSET`](super::MAP_OFFSET), or
/// sequential slots for unversioned entries. The table lives exactly as
/// long as the deserialization of one record.
#[derive(Debug, Default)]
pub struct RefTable {
    entries: HashMap<u32, RefEntry>,
}

impl RefTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a slot.
    pub fn get(&self, tag: u32) -> Option<&RefEntry> {
        self.entries.get(&tag)
    }

    /// Stores an entry, replacing whatever the slot held.
    pub fn insert(&mut self, tag: u32, entry: RefEntry) {
        self.entries.insert(tag, entry);
    }

    /// Slot used for entries read without a byte count.
    pub fn next_slot(&self) -> u32 {
        self.entries.len() as u32 + 1
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
