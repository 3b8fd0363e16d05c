//! Class registry: class name to factory.

use super::deserialize::ReadContext;
use super::ObjectRef;
use crate::error::Result;
use crate::source::ByteCursor;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Reads one object of a class from the cursor.
pub trait ClassFactory: Send + Sync {
    /// Class name this factory reads.
    fn class_name(&self) -> &str;

    /// Reads an object, leaving the cursor after it.
    fn read(&self, cursor: &mut ByteCursor<'_>, ctx: &mut ReadContext<'_>) -> Result<ObjectRef>;
}

/// Signature of a plain-function factory.
pub type ReadFn = fn(&mut ByteCursor<'_>, &mut ReadContext<'_>) -> Result<ObjectRef>;

/// A factory backed by a function pointer.
pub struct FnFactory {
    name: String,
    read: ReadFn,
}

impl FnFactory {
    /// Creates a factory for `name`.
    pub fn new(name: impl Into<String>, read: ReadFn) -> Self {
        Self { name: name.into(), read }
    }
}

impl ClassFactory for FnFactory {
    fn class_name(&self) -> &str {
        &self.name
    }

    fn read(&self, cursor: &mut ByteCursor<'_>, ctx: &mut ReadContext<'_>) -> Result<ObjectRef> {
        (self.read)(cursor, ctx)
    }
}

/// Class name to factory map consulted while reading records.
///
/// Populated once, before any file is opened, and read-only afterwards.
#[derive(Default, Clone)]
pub struct ClassRegistry {
    factories: HashMap<String, Arc<dyn ClassFactory>>,
}

impl ClassRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every builtin and tree class.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        super::builtin::register_classes(&mut registry);
        crate::tree::register_classes(&mut registry);
        registry
    }

    /// Adds or replaces a factory under its own class name.
    pub fn register(&mut self, factory: Arc<dyn ClassFactory>) {
        self.factories.insert(factory.class_name().to_string(), factory);
    }

    /// Adds or replaces a plain-function factory.
    pub fn register_fn(&mut self, name: &str, read: ReadFn) {
        self.register(Arc::new(FnFactory::new(name, read)));
    }

    /// Removes a class.
    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn ClassFactory>> {
        self.factories.remove(name)
    }

    /// Looks up a factory.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ClassFactory>> {
        self.factories.get(name).cloned()
    }

    /// Whether a class is known.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered class names, sorted.
    pub fn class_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassRegistry").field("classes", &self.class_names()).finish()
    }
}
