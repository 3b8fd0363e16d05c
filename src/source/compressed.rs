//! Lazily decompressed view over a compressed span of a byte source.
//!
//! The view holds the compressed bytes and a decompression routine. The
//! first call that needs the content runs the routine exactly once and
//! stores the result; later calls, from any thread, reuse it.

use super::cursor::ByteCursor;
use crate::compression::decompress_blocks;
use crate::error::{Error, Result};
use bytes::Bytes;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;

/// Decompression routine injected into a view: compressed bytes and the
/// expected output length in, decompressed bytes out.
pub type Decompressor = Arc<dyn Fn(&[u8], usize) -> Result<Vec<u8>> + Send + Sync>;

/// A compressed span that decompresses itself on first access.
pub struct LazyDecompressedView {
    source: Bytes,
    start: usize,
    compressed_len: usize,
    uncompressed_len: usize,
    origin: i64,
    decompress: Decompressor,
    content: OnceCell<Bytes>,
}

impl LazyDecompressedView {
    /// Creates a view over `source[start..start + compressed_len]`.
    ///
    /// `origin` is stored for cursors handed out by [`cursor`](Self::cursor);
    /// record payloads use `-keylen` so relative positions count from the key start.
    pub fn new(
        source: Bytes,
        start: usize,
        compressed_len: usize,
        uncompressed_len: usize,
        origin: i64,
        decompress: Decompressor,
    ) -> Self {
        Self {
            source,
            start,
            compressed_len,
            uncompressed_len,
            origin,
            decompress,
            content: OnceCell::new(),
        }
    }

    /// Creates a view that decodes the framed block format.
    pub fn framed(
        source: Bytes,
        start: usize,
        compressed_len: usize,
        uncompressed_len: usize,
        origin: i64,
    ) -> Self {
        let offset = start as u64;
        let decompress: Decompressor =
            Arc::new(move |src: &[u8], expected: usize| decompress_blocks(src, expected, offset));
        Self::new(source, start, compressed_len, uncompressed_len, origin, decompress)
    }

    /// Whether decompression has already happened.
    pub fn is_evaluated(&self) -> bool {
        self.content.get().is_some()
    }

    /// Declared decompressed length.
    pub fn uncompressed_len(&self) -> usize {
        self.uncompressed_len
    }

    /// Origin handed to cursors over the content.
    pub fn origin(&self) -> i64 {
        self.origin
    }

    /// The decompressed content, decompressing on first call.
    pub fn content(&self) -> Result<&Bytes> {
        self.content.get_or_try_init(|| {
            let end = self.start + self.compressed_len;
            let compressed = self.source.get(self.start..end).ok_or(Error::TruncatedRead {
                index: self.start,
                len: self.compressed_len,
                available: self.source.len(),
            })?;
            log::trace!(
                "decompressing {} bytes at {} into {}",
                self.compressed_len,
                self.start,
                self.uncompressed_len
            );
            let out = (self.decompress)(compressed, self.uncompressed_len)?;
            if out.len() != self.uncompressed_len {
                return Err(Error::Decompression(format!(
                    "span at {} produced {} bytes, expected {}",
                    self.start,
                    out.len(),
                    self.uncompressed_len
                )));
            }
            Ok(Bytes::from(out))
        })
    }

    /// A cursor at index 0 of the decompressed content.
    pub fn cursor(&self) -> Result<ByteCursor<'_>> {
        Ok(ByteCursor::with_origin(self.content()?, 0, self.origin))
    }
}

impl fmt::Debug for LazyDecompressedView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyDecompressedView")
            .field("start", &self.start)
            .field("compressed_len", &self.compressed_len)
            .field("uncompressed_len", &self.uncompressed_len)
            .field("origin", &self.origin)
            .field("evaluated", &self.is_evaluated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::BlockHeader;
    use proptest::prelude::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn framed_zlib(data: &[u8]) -> Vec<u8> {
        let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::fast());
        enc.write_all(data).unwrap();
        let body = enc.finish().unwrap();
        let mut out = BlockHeader::encode(*b"ZL", 8, body.len(), data.len()).to_vec();
        out.extend_from_slice(&body);
        out
    }

    fn counting_view(source: Bytes, start: usize, len: usize, out_len: usize) -> (LazyDecompressedView, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let decompress: Decompressor = Arc::new(move |src: &[u8], expected: usize| {
            counter.fetch_add(1, Ordering::SeqCst);
            decompress_blocks(src, expected, 0)
        });
        (LazyDecompressedView::new(source, start, len, out_len, -10, decompress), calls)
    }

    #[test]
    fn test_not_evaluated_until_accessed() {
        let data = b"hello lazy world".to_vec();
        let framed = framed_zlib(&data);
        let (view, calls) = counting_view(Bytes::from(framed.clone()), 0, framed.len(), data.len());
        assert!(!view.is_evaluated());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let mut cursor = view.cursor().unwrap();
        assert_eq!(cursor.index(), 0);
        assert_eq!(cursor.position(), 10);
        assert_eq!(cursor.read_bytes(5).unwrap(), b"hello");
        assert!(view.is_evaluated());
    }

    #[test]
    fn test_span_inside_larger_source() {
        let data = vec![42u8; 100];
        let framed = framed_zlib(&data);
        let mut source = vec![0xAA; 7];
        source.extend_from_slice(&framed);
        source.extend_from_slice(&[0xBB; 5]);
        let view = LazyDecompressedView::framed(Bytes::from(source), 7, framed.len(), 100, 0);
        assert_eq!(view.content().unwrap().as_ref(), &data[..]);
    }

    #[test]
    fn test_failure_is_not_cached_as_success() {
        let view = LazyDecompressedView::framed(Bytes::from_static(b"ZL\x08"), 0, 3, 10, 0);
        assert!(view.content().is_err());
        assert!(!view.is_evaluated());
    }

    #[test]
    fn test_concurrent_access_decompresses_once() {
        let data: Vec<u8> = (0..4096u32).map(|i| (i * 31 % 251) as u8).collect();
        let framed = framed_zlib(&data);
        let (view, calls) = counting_view(Bytes::from(framed.clone()), 0, framed.len(), data.len());
        let view = Arc::new(view);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let view = Arc::clone(&view);
                std::thread::spawn(move || view.content().unwrap().clone())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().as_ref(), &data[..]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    proptest! {
        #[test]
        fn prop_repeated_access_is_idempotent(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let framed = framed_zlib(&data);
            let (view, calls) = counting_view(Bytes::from(framed.clone()), 0, framed.len(), data.len());
            let first = view.content().unwrap().clone();
            let second = view.content().unwrap().clone();
            prop_assert_eq!(first.as_ref(), &data[..]);
            prop_assert_eq!(first, second);
            prop_assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }
}
