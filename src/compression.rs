//! Compression descriptors and block decompression.
//!
//! A container declares a numeric compression code (`algorithm * 100 +
//! level`). Compressed payloads are a run of blocks, each led by a 9-byte
//! frame header:
//!
//! ```text
//! +--------+--------+----------------------+------------------------+
//! | tag(2) | method | compressed size (3)  | uncompressed size (3)  |
//! +--------+--------+----------------------+------------------------+
//! ```
//!
//! Both sizes are little-endian. The tag names the codec of that block, so a
//! payload is decoded by its own framing rather than by the file-level code.

use crate::error::{Error, Result};
use serde::Serialize;
use std::io::Read;

/// Size of the per-block frame header.
pub const BLOCK_HEADER_SIZE: usize = 9;

/// LZ4 blocks carry a 64-bit checksum between the header and the data.
#[cfg(feature = "lz4-compression")]
const LZ4_CHECKSUM_SIZE: usize = 8;

/// Bound on output preallocated per compressed input byte.
const MAX_BLOCK_RATIO: usize = 64;

/// Compression algorithm family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Algorithm {
    /// Stored without compression.
    Store,
    /// zlib (deflate) stream.
    Deflate,
    /// xz (LZMA) stream.
    Lzma,
    /// LZ4 block with checksum.
    Lz4,
    /// The pre-zlib legacy codec; recognised but not decodable.
    Legacy,
    /// Any other algorithm number.
    Unknown(u32),
}

/// A decompression routine: compressed bytes and expected output size in,
/// decompressed bytes out.
pub type DecompressFn = fn(&[u8], usize) -> Result<Vec<u8>>;

impl Algorithm {
    /// Selects the algorithm named by a block tag.
    pub fn from_block_tag(tag: [u8; 2]) -> Self {
        match &tag {
            b"ZL" => Algorithm::Deflate,
            b"XZ" => Algorithm::Lzma,
            b"L4" => Algorithm::Lz4,
            b"CS" => Algorithm::Legacy,
            _ => Algorithm::Unknown(u16::from_be_bytes(tag) as u32),
        }
    }

    /// Human-readable codec name.
    pub fn name(&self) -> String {
        match self {
            Algorithm::Store => "store".into(),
            Algorithm::Deflate => "zlib".into(),
            Algorithm::Lzma => "lzma".into(),
            Algorithm::Lz4 => "lz4".into(),
            Algorithm::Legacy => "legacy".into(),
            Algorithm::Unknown(n) => format!("unknown({})", n),
        }
    }

    /// Returns the decompression routine, or `UnsupportedCodec`.
    pub fn decompressor(&self) -> Result<DecompressFn> {
        match self {
            Algorithm::Store => Ok(store),
            Algorithm::Deflate => Ok(inflate),
            #[cfg(feature = "lzma")]
            Algorithm::Lzma => Ok(unxz),
            #[cfg(feature = "lz4-compression")]
            Algorithm::Lz4 => Ok(unlz4),
            _ => Err(Error::UnsupportedCodec { codec: self.name(), offset: 0 }),
        }
    }
}

/// A container's compression setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Compression {
    /// Algorithm family.
    pub algorithm: Algorithm,
    /// Level, 0 to 99.
    pub level: u32,
}

impl Compression {
    /// No compression.
    pub const NONE: Compression = Compression { algorithm: Algorithm::Store, level: 0 };

    /// Splits a numeric `fCompress` code into algorithm and level.
    pub fn from_code(code: i32) -> Self {
        let code = code.max(0) as u32;
        let level = code % 100;
        let algorithm = if level == 0 {
            Algorithm::Store
        } else {
            match code / 100 {
                0 | 1 => Algorithm::Deflate,
                2 => Algorithm::Lzma,
                3 => Algorithm::Legacy,
                4 => Algorithm::Lz4,
                n => Algorithm::Unknown(n),
            }
        };
        Self { algorithm, level }
    }

    /// The numeric code this setting is written as.
    pub fn code(&self) -> i32 {
        let algorithm = match self.algorithm {
            Algorithm::Store => 0,
            Algorithm::Deflate => 1,
            Algorithm::Lzma => 2,
            Algorithm::Legacy => 3,
            Algorithm::Lz4 => 4,
            Algorithm::Unknown(n) => n,
        };
        (algorithm * 100 + self.level) as i32
    }

    /// Returns the decompression routine for this setting.
    pub fn decompressor(&self) -> Result<DecompressFn> {
        self.algorithm.decompressor()
    }
}

fn store(src: &[u8], expected: usize) -> Result<Vec<u8>> {
    check_len("store", src.len(), expected)?;
    Ok(src.to_vec())
}

fn inflate(src: &[u8], expected: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected);
    flate2::read::ZlibDecoder::new(src)
        .read_to_end(&mut out)
        .map_err(|e| Error::Decompression(format!("zlib: {}", e)))?;
    check_len("zlib", out.len(), expected)?;
    Ok(out)
}

#[cfg(feature = "lzma")]
fn unxz(src: &[u8], expected: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected);
    let mut input = std::io::BufReader::new(src);
    lzma_rs::xz_decompress(&mut input, &mut out)
        .map_err(|e| Error::Decompression(format!("lzma: {:?}", e)))?;
    check_len("lzma", out.len(), expected)?;
    Ok(out)
}

#[cfg(feature = "lz4-compression")]
fn unlz4(src: &[u8], expected: usize) -> Result<Vec<u8>> {
    // The xxhash64 checksum is skipped, not verified.
    let body = src.get(LZ4_CHECKSUM_SIZE..).ok_or_else(|| {
        Error::Decompression("lz4: block shorter than its checksum".to_string())
    })?;
    let out = lz4::block::decompress(body, Some(expected as i32))
        .map_err(|e| Error::Decompression(format!("lz4: {}", e)))?;
    check_len("lz4", out.len(), expected)?;
    Ok(out)
}

fn check_len(codec: &str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(Error::Decompression(format!(
            "{}: produced {} bytes, expected {}",
            codec, actual, expected
        )));
    }
    Ok(())
}

fn le24(bytes: &[u8]) -> usize {
    bytes[0] as usize | (bytes[1] as usize) << 8 | (bytes[2] as usize) << 16
}

/// One parsed block frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Codec named by the block tag.
    pub algorithm: Algorithm,
    /// Method byte.
    pub method: u8,
    /// Compressed size, including any codec checksum.
    pub compressed: usize,
    /// Uncompressed size.
    pub uncompressed: usize,
}

impl BlockHeader {
    /// Parses a frame header from the first nine bytes of `src`.
    pub fn parse(src: &[u8]) -> Result<Self> {
        if src.len() < BLOCK_HEADER_SIZE {
            return Err(Error::Decompression(format!(
                "block header needs {} bytes, {} left",
                BLOCK_HEADER_SIZE,
                src.len()
            )));
        }
        Ok(Self {
            algorithm: Algorithm::from_block_tag([src[0], src[1]]),
            method: src[2],
            compressed: le24(&src[3..6]),
            uncompressed: le24(&src[6..9]),
        })
    }

    /// Encodes a frame header; used by writers of test fixtures.
    pub fn encode(tag: [u8; 2], method: u8, compressed: usize, uncompressed: usize) -> [u8; 9] {
        let c = (compressed as u32).to_le_bytes();
        let u = (uncompressed as u32).to_le_bytes();
        [tag[0], tag[1], method, c[0], c[1], c[2], u[0], u[1], u[2]]
    }
}

/// Decompresses a run of framed blocks into exactly `expected` bytes.
///
/// `offset` is the file offset of `src`, used only for error context.
pub fn decompress_blocks(src: &[u8], expected: usize, offset: u64) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected.min(src.len().saturating_mul(MAX_BLOCK_RATIO)));
    let mut pos = 0;
    while pos < src.len() {
        let header = BlockHeader::parse(&src[pos..])?;
        let decompress = header.algorithm.decompressor().map_err(|_| Error::UnsupportedCodec {
            codec: header.algorithm.name(),
            offset: offset + pos as u64,
        })?;
        let start = pos + BLOCK_HEADER_SIZE;
        let end = start + header.compressed;
        let body = src.get(start..end).ok_or_else(|| {
            Error::Decompression(format!(
                "block at {} declares {} compressed bytes, {} left",
                offset + pos as u64,
                header.compressed,
                src.len() - start
            ))
        })?;
        if out.len() + header.uncompressed > expected {
            return Err(Error::Decompression(format!(
                "blocks expand past the declared {} bytes",
                expected
            )));
        }
        out.extend_from_slice(&decompress(body, header.uncompressed)?);
        pos = end;
    }
    check_len("payload", out.len(), expected)?;
    Ok(out)
}
