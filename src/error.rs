//! Error types for rootio.
//!
//! Every failure carries enough context (class or codec name, byte offset,
//! expected and observed counts) to locate the offending bytes in the file.

use std::io;
use thiserror::Error;

/// The result type used throughout rootio.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// The container itself cannot be decoded (header, top directory).
    Container,
    /// A single record or branch cannot be decoded; the rest of the file may be fine.
    Record,
    /// The bytes contradict themselves.
    Corrupt,
    /// The operating system refused a read.
    Io,
}

/// The error type for rootio operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The file does not start with the container magic.
    #[error("bad magic: expected \"root\", found {found:?}")]
    BadMagic {
        /// The first four bytes of the file.
        found: [u8; 4],
    },

    /// The header's name block does not fit inside the declared file end.
    #[error("header length mismatch: begin {begin} + name block {nbytes} exceeds end {end}")]
    HeaderLengthMismatch {
        /// Offset of the first record.
        begin: i64,
        /// Size of the name block plus directory record.
        nbytes: i64,
        /// Declared end of the file.
        end: i64,
    },

    /// No key with the requested name (and cycle) exists.
    #[error("key not found: {name}{}", cycle_suffix(.cycle))]
    KeyNotFound {
        /// Requested name or path.
        name: String,
        /// Requested cycle, if one was given.
        cycle: Option<i16>,
    },

    /// No branch with the requested name exists in the tree.
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    /// The class registry has no factory for a class name.
    #[error("unsupported class {class:?} at offset {offset}")]
    UnsupportedClass {
        /// Class name as stored in the file.
        class: String,
        /// Byte offset of the class tag.
        offset: i64,
    },

    /// A record was written with a class version older than the reader supports.
    #[error("unsupported {class} version {version} (minimum {minimum})")]
    UnsupportedVersion {
        /// Class whose version was rejected.
        class: String,
        /// Version found in the file.
        version: u16,
        /// Oldest version the reader understands.
        minimum: u16,
    },

    /// A versioned record consumed a different number of bytes than it declared.
    #[error("byte count mismatch in {class} starting at {start}: expected {expected}, observed {observed}")]
    ByteCountMismatch {
        /// Class being read.
        class: String,
        /// Relative position of the record's byte-count word.
        start: i64,
        /// Declared length including the byte-count word.
        expected: i64,
        /// Length actually consumed.
        observed: i64,
    },

    /// A class back-reference does not name a previously registered class.
    #[error("invalid class reference {tag:#x} at offset {offset}")]
    InvalidClassReference {
        /// The masked reference tag.
        tag: u32,
        /// Relative position of the tag.
        offset: i64,
    },

    /// An object reference points forward or at a class slot.
    #[error("invalid object reference {tag:#x} at offset {offset}")]
    InvalidObjectReference {
        /// The reference tag.
        tag: u32,
        /// Relative position of the tag.
        offset: i64,
    },

    /// An object refers to itself while under construction.
    #[error("self reference at offset {offset} is not supported")]
    SelfReferenceUnsupported {
        /// Relative position of the reference.
        offset: i64,
    },

    /// The compression algorithm is unknown or not compiled in.
    #[error("unsupported codec {codec} at offset {offset}")]
    UnsupportedCodec {
        /// Codec name or block tag.
        codec: String,
        /// File offset of the compressed data.
        offset: u64,
    },

    /// A codec rejected its input or produced the wrong number of bytes.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// A read ran past the end of the available bytes.
    #[error("truncated read: {len} bytes at index {index}, only {available} available")]
    TruncatedRead {
        /// Absolute index of the read.
        index: usize,
        /// Requested length.
        len: usize,
        /// Total bytes in the underlying buffer.
        available: usize,
    },

    /// Entry offsets index outside the basket's content.
    #[error("basket {basket} of branch {branch:?}: {detail}")]
    BasketBoundary {
        /// Branch name.
        branch: String,
        /// Basket index within the branch.
        basket: usize,
        /// What went out of bounds.
        detail: String,
    },

    /// The branch has no automatic interpretation.
    #[error("no interpretation available for branch {branch:?}: {reason}")]
    NoInterpretation {
        /// Branch name.
        branch: String,
        /// Why none could be derived.
        reason: String,
    },

    /// Data corruption was detected.
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn cycle_suffix(cycle: &Option<i16>) -> String {
    cycle.map(|c| format!(";{}", c)).unwrap_or_default()
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Creates a new basket boundary error.
    pub fn basket_boundary(branch: &str, basket: usize, detail: impl Into<String>) -> Self {
        Error::BasketBoundary { branch: branch.to_string(), basket, detail: detail.into() }
    }

    /// Classifies the error.
    pub fn scope(&self) -> ErrorScope {
        match self {
            Error::Io(_) => ErrorScope::Io,
            Error::BadMagic { .. } | Error::HeaderLengthMismatch { .. } => ErrorScope::Container,
            Error::KeyNotFound { .. }
            | Error::BranchNotFound(_)
            | Error::UnsupportedClass { .. }
            | Error::UnsupportedVersion { .. }
            | Error::UnsupportedCodec { .. }
            | Error::NoInterpretation { .. }
            | Error::InvalidArgument(_) => ErrorScope::Record,
            Error::ByteCountMismatch { .. }
            | Error::InvalidClassReference { .. }
            | Error::InvalidObjectReference { .. }
            | Error::SelfReferenceUnsupported { .. }
            | Error::Decompression(_)
            | Error::TruncatedRead { .. }
            | Error::BasketBoundary { .. }
            | Error::Corruption(_)
            | Error::Internal(_) => ErrorScope::Corrupt,
        }
    }
}
