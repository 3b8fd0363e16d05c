//! Byte sources: whole-file buffers, read cursors and lazily decompressed views.

mod compressed;
mod cursor;

pub use compressed::{Decompressor, LazyDecompressedView};
pub use cursor::{decode_be, decode_le, ByteCursor, Element};

use crate::error::Result;
use bytes::Bytes;
use std::fs::File;
use std::path::Path;

/// Opens a file as one immutable buffer.
///
/// With `use_mmap` the file is memory-mapped and the mapping is owned by
/// the returned `Bytes`; otherwise the file is read into memory.
pub fn open_bytes<P: AsRef<Path>>(path: P, use_mmap: bool) -> Result<Bytes> {
    let path = path.as_ref();
    if !use_mmap {
        return Ok(Bytes::from(std::fs::read(path)?));
    }
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        // Mapping an empty file fails on some platforms.
        return Ok(Bytes::new());
    }
    // SAFETY: the mapping is read-only and the file is treated as immutable
    // for the lifetime of the container.
    let mmap = unsafe { memmap2::Mmap::map(&file)? };
    log::debug!("memory-mapped {} ({} bytes)", path.display(), mmap.len());
    Ok(Bytes::from_owner(mmap))
}
