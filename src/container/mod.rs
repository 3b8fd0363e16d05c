//! Container files: header, top directory and record lookup.
//!
//! ```text
//! offset 0      file header ("root", version, begin, end, ...)
//! begin         top directory key + name + title     (nbytes_name bytes)
//! begin+nbn     top directory record
//! ...           records: key + payload, possibly compressed
//! seek_keys     key table of the top directory
//! ```

mod directory;
mod header;
mod key;

pub use directory::{Directory, DirectoryHeader};
pub use header::{ContainerHeader, LARGE_FILE_VERSION, MAGIC};
pub use key::{Key, KeyHeader, Payload, LARGE_KEY_VERSION};

use crate::cache::{BasketCache, CacheStats};
use crate::compression::Compression;
use crate::config::ReadOptions;
use crate::error::{Error, Result};
use crate::object::{downcast, ClassRegistry, ObjectRef, Streamed};
use crate::source::{open_bytes, ByteCursor};
use crate::tree::Tree;
use bytes::Bytes;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Shared state of one open file: its bytes, class registry, basket cache
/// and options. Everything read from the file keeps an `Arc` to it.
pub struct FileContext {
    data: Bytes,
    registry: Arc<ClassRegistry>,
    cache: BasketCache,
    options: ReadOptions,
}

impl FileContext {
    /// Wraps a file's bytes.
    pub fn new(data: Bytes, options: ReadOptions, registry: Arc<ClassRegistry>) -> Self {
        Self { data, registry, cache: BasketCache::new(options.basket_cache_size), options }
    }

    /// The whole file.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Class factories used to read records.
    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    /// Cache of decompressed baskets.
    pub fn cache(&self) -> &BasketCache {
        &self.cache
    }

    /// Options the file was opened with.
    pub fn options(&self) -> &ReadOptions {
        &self.options
    }
}

impl fmt::Debug for FileContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileContext").field("len", &self.data.len()).finish()
    }
}

/// What a key resolves to.
#[derive(Debug, Clone)]
pub enum Record {
    /// A subdirectory.
    Directory(Directory),
    /// A streamed object.
    Object(ObjectRef),
}

impl Record {
    /// Class name of the record.
    pub fn class_name(&self) -> &str {
        match self {
            Record::Directory(_) => "TDirectory",
            Record::Object(obj) => obj.class_name(),
        }
    }

    /// The directory, or an error for objects.
    pub fn into_directory(self) -> Result<Directory> {
        match self {
            Record::Directory(dir) => Ok(dir),
            Record::Object(obj) => Err(Error::invalid_argument(format!(
                "expected a directory, found {}",
                obj.class_name()
            ))),
        }
    }

    /// The object, or an error for directories.
    pub fn into_object(self) -> Result<ObjectRef> {
        match self {
            Record::Object(obj) => Ok(obj),
            Record::Directory(dir) => Err(Error::invalid_argument(format!(
                "{} is a directory, not an object",
                dir.name()
            ))),
        }
    }

    /// The object downcast to a concrete type.
    pub fn downcast<T: Streamed>(self) -> Result<Arc<T>> {
        let obj = self.into_object()?;
        let class = obj.class_name().to_string();
        downcast::<T>(obj).ok_or_else(|| {
            Error::invalid_argument(format!(
                "{} is not a {}",
                class,
                std::any::type_name::<T>()
            ))
        })
    }
}

/// An open container file.
#[derive(Debug)]
pub struct Container {
    header: ContainerHeader,
    top_key: KeyHeader,
    root: Directory,
    file: Arc<FileContext>,
}

impl Container {
    /// Opens a file with the default class registry.
    pub fn open<P: AsRef<Path>>(path: P, options: ReadOptions) -> Result<Self> {
        Self::open_with_registry(path, options, Arc::new(ClassRegistry::with_defaults()))
    }

    /// Opens a file with a custom class registry.
    pub fn open_with_registry<P: AsRef<Path>>(
        path: P,
        options: ReadOptions,
        registry: Arc<ClassRegistry>,
    ) -> Result<Self> {
        options.validate()?;
        let data = open_bytes(path.as_ref(), options.use_mmap)?;
        log::debug!("opening {} ({} bytes)", path.as_ref().display(), data.len());
        Self::from_bytes_with_registry(data, options, registry)
    }

    /// Reads a container held in memory.
    pub fn from_bytes(data: impl Into<Bytes>, options: ReadOptions) -> Result<Self> {
        Self::from_bytes_with_registry(data, options, Arc::new(ClassRegistry::with_defaults()))
    }

    /// Reads a container held in memory with a custom class registry.
    pub fn from_bytes_with_registry(
        data: impl Into<Bytes>,
        options: ReadOptions,
        registry: Arc<ClassRegistry>,
    ) -> Result<Self> {
        options.validate()?;
        let file = Arc::new(FileContext::new(data.into(), options, registry));

        let header = ContainerHeader::read(&mut ByteCursor::new(file.data(), 0))?;
        let begin = header.begin as usize;
        let top_key = KeyHeader::read(&mut ByteCursor::new(file.data(), begin))?;
        let record_at = begin.checked_add(header.nbytes_name as usize).ok_or(Error::HeaderLengthMismatch {
            begin: header.begin,
            nbytes: header.nbytes_name as i64,
            end: header.end,
        })?;
        let mut cursor = ByteCursor::new(file.data(), record_at);
        let record = DirectoryHeader::read(&mut cursor)?;
        let root = Directory::load(&file, top_key.name.clone(), record)?;

        log::debug!(
            "container {:?}: version {}, compression {:?}, {} top-level keys",
            top_key.name,
            header.version,
            header.compression,
            root.len()
        );
        Ok(Self { header, top_key, root, file })
    }

    /// Decoded file header.
    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// Name stored in the top directory's key.
    pub fn name(&self) -> &str {
        &self.top_key.name
    }

    /// Title stored in the top directory's key.
    pub fn title(&self) -> &str {
        &self.top_key.title
    }

    /// File-level compression setting.
    pub fn compression(&self) -> Compression {
        self.header.compression
    }

    /// The top directory.
    pub fn root(&self) -> &Directory {
        &self.root
    }

    /// Keys of the top directory.
    pub fn keys(&self) -> &[Key] {
        self.root.keys()
    }

    /// `(name;cycle, class)` for every top-level key.
    pub fn contents(&self) -> Vec<(String, String)> {
        self.root.contents()
    }

    /// Reads a record by path (`dir/name;cycle`).
    pub fn get(&self, path: &str) -> Result<Record> {
        self.root.get(path)
    }

    /// Reads a record by path with an explicit cycle.
    pub fn get_cycle(&self, path: &str, cycle: i16) -> Result<Record> {
        self.root.get_cycle(path, cycle)
    }

    /// Reads a tree by path.
    pub fn tree(&self, path: &str) -> Result<Arc<Tree>> {
        self.get(path)?.downcast::<Tree>()
    }

    /// Basket cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.file.cache().stats()
    }

    /// Shared file state.
    pub fn file(&self) -> &Arc<FileContext> {
        &self.file
    }
}
