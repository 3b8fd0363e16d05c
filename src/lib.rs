//! # rootio - A Reader for ROOT Columnar Containers
//!
//! rootio reads the self-describing container format used by ROOT: a file
//! header, a hierarchy of directories whose keys point at serialized object
//! graphs, and trees whose branches store column data in compressed baskets.
//!
//! ## Architecture
//!
//! The reader consists of several layers:
//!
//! - **Source**: Byte cursors over the file and lazily decompressed views
//! - **Compression**: zlib, LZMA and LZ4 block framing
//! - **Container**: Header, keys and directories
//! - **Object**: The object-graph protocol and a class registry
//! - **Tree**: Trees, branches, leaves and basket decoding
//! - **Interpretation**: Turning basket bytes into typed and jagged arrays
//! - **Basket Cache**: Caches decompressed baskets
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use rootio::{Container, ReadOptions};
//!
//! # fn main() -> Result<(), rootio::Error> {
//! let file = Container::open("events.root", ReadOptions::default())?;
//! for (name, class) in file.contents() {
//!     println!("{} ({})", name, class);
//! }
//!
//! let tree = file.tree("events")?;
//! let px = tree.branch("px")?.array()?;
//! println!("{} entries", px.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod cache;
pub mod compression;
pub mod config;
pub mod container;
pub mod error;
pub mod interp;
pub mod object;
pub mod source;
pub mod tree;

// Re-exports
pub use config::ReadOptions;
pub use container::{Container, Directory, Key, Record};
pub use error::{Error, ErrorScope, Result};
pub use interp::{Array, DType, Interpretation, JaggedArray, JaggedCount, Value};
pub use object::ClassRegistry;
pub use tree::{Branch, Leaf, Tree};

use std::path::Path;

/// Opens a container file with default options.
pub fn open<P: AsRef<Path>>(path: P) -> Result<Container> {
    Container::open(path, ReadOptions::default())
}
