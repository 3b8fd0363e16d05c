//! Streamed objects and the object-graph protocol.
//!
//! Records are serialized object graphs. Each embedded object is preceded
//! by a tag that either introduces a new class by name, refers back to a
//! class seen earlier in the same record, or refers back to an object seen
//! earlier. Back-references are resolved through a per-record table keyed by
//! byte position relative to the start of the record's key.

mod builtin;
mod deserialize;
mod refs;
mod registry;

pub use builtin::{
    read_tarray, skip_tarray, FillAttributes, IoFeatures, LineAttributes, MarkerAttributes,
    Named, ObjArray, ObjList, ObjString,
};
pub use deserialize::{
    discard_object_any, read_object_any, skip_tobject, ReadContext, VersionHeader,
};
pub use refs::{RefEntry, RefTable};
pub use registry::{ClassFactory, ClassRegistry, FnFactory, ReadFn};

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Set in a 32-bit header word when it carries a byte count.
pub const BYTE_COUNT_MASK: u32 = 0x4000_0000;
/// Set in a 16-bit TObject version when a 4-byte extension follows.
pub const BYTE_COUNT_VMASK: u16 = 0x4000;
/// Set in a tag that refers to a class rather than an object.
pub const CLASS_MASK: u32 = 0x8000_0000;
/// Tag introducing a class by name.
pub const NEW_CLASS_TAG: u32 = 0xFFFF_FFFF;
/// TObject bit: a process id follows.
pub const IS_REFERENCED: u32 = 1 << 4;
/// TObject bit: object lives on the heap.
pub const IS_ON_HEAP: u32 = 0x0100_0000;
/// Offset added to byte positions to form reference keys.
pub const MAP_OFFSET: u32 = 2;

/// An object produced by a class factory.
pub trait Streamed: Any + Send + Sync + fmt::Debug {
    /// Class name the object was read as.
    fn class_name(&self) -> &str;

    /// Upcast for downcasting by reference.
    fn as_any(&self) -> &dyn Any;

    /// Upcast for downcasting a shared handle.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// A shared handle to any streamed object.
pub type ObjectRef = Arc<dyn Streamed>;

/// Downcasts a shared handle to a concrete type.
pub fn downcast<T: Streamed>(obj: ObjectRef) -> Option<Arc<T>> {
    obj.into_any().downcast::<T>().ok()
}

/// Downcasts a borrowed object to a concrete type.
pub fn downcast_ref<T: Streamed>(obj: &dyn Streamed) -> Option<&T> {
    obj.as_any().downcast_ref::<T>()
}

/// Implements [`Streamed`] for a type with a fixed class name.
#[macro_export]
macro_rules! impl_streamed {
    ($ty:ty, $class:expr) => {
        impl $crate::object::Streamed for $ty {
            fn class_name(&self) -> &str {
                $class
            }

            fn as_any(&self) -> &dyn std::any::Any {
                self
            }

            fn into_any(
                self: std::sync::Arc<Self>,
            ) -> std::sync::Arc<dyn std::any::Any + Send + Sync> {
                self
            }
        }
    };
}
