//! Synthetic container writer shared by the integration tests and benches.
#![allow(dead_code)]

use flate2::write::ZlibEncoder;
use rootio::compression::BlockHeader;
use std::collections::HashMap;
use std::io::Write;

pub const BEGIN: usize = 100;

pub fn init_logging() {
    env_logger::builder().is_test(true).try_init().ok();
}

const BYTE_COUNT_MASK: u32 = 0x4000_0000;
const CLASS_MASK: u32 = 0x8000_0000;
const NEW_CLASS_TAG: u32 = 0xFFFF_FFFF;
const DIR_RECORD_SIZE: usize = 30;

/// Big-endian writer that tracks record-relative positions for references.
pub struct Stream {
    pub buf: Vec<u8>,
    base: i64,
    classes: HashMap<String, u32>,
    /// Name and position of every leaf written, in order.
    pub leaves: Vec<(String, i64)>,
}

impl Stream {
    /// `base` is the key length: positions count from the start of the key.
    pub fn new(base: i64) -> Self {
        Self { buf: Vec::new(), base, classes: HashMap::new(), leaves: Vec::new() }
    }

    pub fn pos(&self) -> i64 {
        self.base + self.buf.len() as i64
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }
    pub fn bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }
    pub fn i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }
    pub fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }
    pub fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }
    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }
    pub fn i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }
    pub fn f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }
    pub fn f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }
    pub fn bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }
    pub fn string(&mut self, s: &str) {
        if s.len() < 255 {
            self.u8(s.len() as u8);
        } else {
            self.u8(255);
            self.u32(s.len() as u32);
        }
        self.bytes(s.as_bytes());
    }
    pub fn cstring(&mut self, s: &str) {
        self.bytes(s.as_bytes());
        self.u8(0);
    }

    fn patch_count(&mut self, at: usize) {
        let count = (self.buf.len() - at - 4) as u32 | BYTE_COUNT_MASK;
        self.buf[at..at + 4].copy_from_slice(&count.to_be_bytes());
    }

    /// Byte count and version around `body`.
    pub fn versioned(&mut self, version: u16, body: impl FnOnce(&mut Self)) {
        let at = self.buf.len();
        self.u32(0);
        self.u16(version);
        body(self);
        self.patch_count(at);
    }

    pub fn tobject(&mut self) {
        self.u16(1);
        self.u32(0);
        self.u32(0x0300_0000);
    }

    pub fn named(&mut self, name: &str, title: &str) {
        self.versioned(1, |s| {
            s.tobject();
            s.string(name);
            s.string(title);
        });
    }

    /// An embedded object of `class`, introducing the class on first use.
    /// Returns the object's position for later references.
    pub fn any(&mut self, class: &str, body: impl FnOnce(&mut Self)) -> i64 {
        let beg = self.pos();
        let at = self.buf.len();
        self.u32(0);
        match self.classes.get(class) {
            Some(&slot) => self.u32(slot | CLASS_MASK),
            None => {
                let slot = self.pos() as u32 + 2;
                self.u32(NEW_CLASS_TAG);
                self.cstring(class);
                self.classes.insert(class.to_string(), slot);
            }
        }
        body(self);
        self.patch_count(at);
        beg
    }

    /// A reference to the object written at `beg`.
    pub fn object_ref(&mut self, beg: i64) {
        self.u32(beg as u32 + 2);
    }

    pub fn null(&mut self) {
        self.u32(0);
    }

    pub fn obj_array(&mut self, n: usize, mut item: impl FnMut(&mut Self, usize)) {
        self.versioned(3, |s| {
            s.tobject();
            s.string("");
            s.i32(n as i32);
            s.i32(0);
            for i in 0..n {
                item(s, i);
            }
        });
    }

    pub fn io_features(&mut self, bits: u8) {
        self.versioned(1, |s| s.u8(bits));
    }
}

/// A leaf to write.
#[derive(Clone, Debug)]
pub struct LeafSpec {
    pub class: &'static str,
    pub name: String,
    pub title: String,
    pub len: i32,
    pub len_type: i32,
    pub is_unsigned: bool,
    /// Name of the count leaf, written earlier in the same record.
    pub count: Option<String>,
    /// `TLeafElement` id and type.
    pub element: (i32, i32),
}

impl LeafSpec {
    pub fn new(class: &'static str, name: &str) -> Self {
        Self {
            class,
            name: name.to_string(),
            title: name.to_string(),
            len: 1,
            len_type: 8,
            is_unsigned: false,
            count: None,
            element: (0, 0),
        }
    }

    pub fn len(mut self, len: i32) -> Self {
        self.len = len;
        self
    }

    pub fn unsigned(mut self) -> Self {
        self.is_unsigned = true;
        self
    }

    pub fn counted_by(mut self, leaf: &str) -> Self {
        self.count = Some(leaf.to_string());
        self
    }

    pub fn element(mut self, id: i32, ty: i32) -> Self {
        self.element = (id, ty);
        self
    }
}

pub fn write_leaf(s: &mut Stream, spec: &LeafSpec) -> i64 {
    let pos = s.any(spec.class, |s| {
        s.versioned(1, |s| {
            s.versioned(2, |s| {
                s.named(&spec.name, &spec.title);
                s.i32(spec.len);
                s.i32(spec.len_type);
                s.i32(0);
                s.bool(false);
                s.bool(spec.is_unsigned);
                let count = spec
                    .count
                    .as_ref()
                    .and_then(|name| s.leaves.iter().find(|(n, _)| n == name).map(|&(_, pos)| pos));
                match count {
                    Some(pos) => s.object_ref(pos),
                    None => s.null(),
                }
            });
            match spec.class {
                "TLeafO" | "TLeafB" => {
                    s.u8(0);
                    s.u8(1);
                }
                "TLeafS" => {
                    s.i16(0);
                    s.i16(1);
                }
                "TLeafI" | "TLeafC" | "TLeafF" => {
                    s.i32(0);
                    s.i32(0);
                }
                "TLeafElement" => {
                    s.i32(spec.element.0);
                    s.i32(spec.element.1);
                }
                _ => {
                    s.i64(0);
                    s.i64(0);
                }
            }
        })
    });
    s.leaves.push((spec.name.clone(), pos));
    pos
}

/// A basket already written to the file.
#[derive(Clone, Copy, Debug)]
pub struct WrittenBasket {
    pub seek: i64,
    pub nbytes: i32,
}

/// A basket streamed inside its branch record.
#[derive(Clone, Debug)]
pub struct EmbeddedSpec {
    pub data: Vec<u8>,
    pub offsets: Option<Vec<usize>>,
    pub entries: i32,
    pub item_size: i32,
}

/// A branch to write.
#[derive(Clone, Debug)]
pub struct BranchSpec {
    pub name: String,
    pub version: u16,
    pub leaves: Vec<LeafSpec>,
    pub entries: i64,
    pub baskets: Vec<(WrittenBasket, i64)>,
    pub embedded: Vec<EmbeddedSpec>,
    pub branches: Vec<BranchSpec>,
    /// `TBranchElement` class name.
    pub element_class: Option<String>,
    /// Entry recorded after the last written basket, when not derived.
    pub written_end: Option<i64>,
}

impl BranchSpec {
    pub fn new(name: &str, leaf: LeafSpec) -> Self {
        Self {
            name: name.to_string(),
            version: 13,
            leaves: vec![leaf],
            entries: 0,
            baskets: Vec::new(),
            embedded: Vec::new(),
            branches: Vec::new(),
            element_class: None,
            written_end: None,
        }
    }

    pub fn written_end(mut self, end: i64) -> Self {
        self.written_end = Some(end);
        self
    }

    pub fn basket(mut self, basket: WrittenBasket, first_entry: i64) -> Self {
        self.baskets.push((basket, first_entry));
        self
    }

    pub fn entries(mut self, entries: i64) -> Self {
        self.entries = entries;
        self
    }

    pub fn leaf(mut self, leaf: LeafSpec) -> Self {
        self.leaves.push(leaf);
        self
    }

    pub fn version(mut self, version: u16) -> Self {
        self.version = version;
        self
    }

    pub fn element(mut self, class: &str) -> Self {
        self.element_class = Some(class.to_string());
        self
    }

    pub fn embedded(mut self, basket: EmbeddedSpec) -> Self {
        self.embedded.push(basket);
        self
    }

    pub fn sub(mut self, branch: BranchSpec) -> Self {
        self.branches.push(branch);
        self
    }
}

/// Key and basket fields of a basket record.
fn basket_key(
    s: &mut Stream,
    branch: &str,
    keylen: i16,
    nbytes: i32,
    objlen: i32,
    seek: i32,
    data_len: usize,
    entries: i32,
    item_size: i32,
) {
    s.i32(nbytes);
    s.i16(4);
    s.i32(objlen);
    s.u32(0);
    s.i16(keylen);
    s.i16(1);
    s.i32(seek);
    s.i32(BEGIN as i32);
    s.string("TBasket");
    s.string(branch);
    s.string("tree");
    s.u16(3);
    s.i32(32000);
    s.i32(item_size);
    s.i32(entries);
    s.i32(keylen as i32 + data_len as i32);
    s.u8(0);
}

fn basket_keylen(branch: &str) -> i16 {
    (18 + 8 + (1 + 7) + (1 + branch.len()) + (1 + 4) + 19) as i16
}

/// Entry offset table as stored after the data.
fn offset_table(offsets: &[usize], keylen: i16) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(offsets.len() as i32 + 1).to_be_bytes());
    for &o in offsets {
        out.extend_from_slice(&(o as i32 + keylen as i32).to_be_bytes());
    }
    out.extend_from_slice(&0i32.to_be_bytes());
    out
}

fn write_embedded(s: &mut Stream, branch: &str, spec: &EmbeddedSpec) {
    s.any("TBasket", |s| {
        let keylen = basket_keylen(branch);
        let item_size = if spec.offsets.is_some() { 1000 } else { spec.item_size };
        let mut key = Stream::new(0);
        basket_key(&mut key, branch, keylen, 0, spec.data.len() as i32, 0, spec.data.len(), spec.entries, item_size);
        s.bytes(&key.buf);
        if let Some(offsets) = &spec.offsets {
            let table = offset_table(offsets, keylen);
            // count word and offsets; the terminator is not streamed
            s.bytes(&table[..table.len() - 4]);
        }
        s.bytes(&key.buf);
        s.bytes(&spec.data);
    });
}

pub fn write_branch(s: &mut Stream, spec: &BranchSpec) -> i64 {
    let class = if spec.element_class.is_some() { "TBranchElement" } else { "TBranch" };
    s.any(class, |s| match &spec.element_class {
        Some(class_name) => s.versioned(10, |s| {
            branch_body(s, spec);
            s.string(class_name);
            s.string("");
            s.string("");
            s.u32(0x1234);
            s.i16(10);
            s.i32(-1);
            s.i32(0);
            s.i32(-1);
            s.i32(0);
            s.null();
            s.null();
        }),
        None => branch_body(s, spec),
    })
}

fn branch_body(s: &mut Stream, spec: &BranchSpec) {
    let v = spec.version;
    let nbaskets = spec.baskets.len();
    let max_baskets = nbaskets + 2;
    s.versioned(v, |s| {
        s.named(&spec.name, &spec.name);
        s.versioned(2, |s| {
            s.i16(0);
            s.i16(1001);
        });
        s.i32(101);
        s.i32(32000);
        s.i32(if spec.embedded.is_empty() { 0 } else { 10 });
        s.i32(nbaskets as i32);
        s.i64(spec.entries);
        if v >= 13 {
            s.io_features(0);
        }
        s.i32(0);
        s.i32(max_baskets as i32);
        s.i32(0);
        s.i64(spec.entries);
        if v >= 11 {
            s.i64(0);
        }
        s.i64(0);
        s.i64(0);
        s.obj_array(spec.branches.len(), |s, i| {
            write_branch(s, &spec.branches[i]);
        });
        s.obj_array(spec.leaves.len(), |s, i| {
            write_leaf(s, &spec.leaves[i]);
        });
        s.obj_array(spec.embedded.len(), |s, i| write_embedded(s, &spec.name, &spec.embedded[i]));

        let written_end = if let Some(end) = spec.written_end {
            end
        } else if spec.embedded.is_empty() {
            spec.entries
        } else {
            spec.entries - spec.embedded.iter().map(|e| e.entries as i64).sum::<i64>()
        };
        s.u8(1);
        for i in 0..max_baskets {
            s.i32(spec.baskets.get(i).map_or(0, |(b, _)| b.nbytes));
        }
        s.u8(1);
        for i in 0..max_baskets {
            let entry = match spec.baskets.get(i) {
                Some((_, first)) => *first,
                None if i == nbaskets => written_end,
                None => 0,
            };
            s.i64(entry);
        }
        s.u8(1);
        for i in 0..max_baskets {
            s.i64(spec.baskets.get(i).map_or(0, |(b, _)| b.seek));
        }
        s.string("");
    });
}

/// A tree to write.
#[derive(Clone, Debug)]
pub struct TreeSpec {
    pub name: String,
    pub version: u16,
    pub entries: i64,
    pub branches: Vec<BranchSpec>,
    /// Write a user-info list holding an object of an unregistered class.
    pub user_info: bool,
    /// `TIOFeatures` bits, written from version 20.
    pub io_bits: u8,
    /// Append a `TObjString` to the leaf list.
    pub foreign_leaf: bool,
}

impl TreeSpec {
    pub fn new(name: &str, entries: i64) -> Self {
        Self { name: name.to_string(), version: 20, entries, branches: Vec::new(), user_info: false, io_bits: 0, foreign_leaf: false }
    }

    pub fn branch(mut self, branch: BranchSpec) -> Self {
        self.branches.push(branch);
        self
    }

    pub fn version(mut self, version: u16) -> Self {
        self.version = version;
        self
    }

    pub fn io_bits(mut self, bits: u8) -> Self {
        self.io_bits = bits;
        self
    }

    pub fn with_foreign_leaf(mut self) -> Self {
        self.foreign_leaf = true;
        self
    }

    pub fn with_user_info(mut self) -> Self {
        self.user_info = true;
        self
    }
}

pub fn write_tree(s: &mut Stream, spec: &TreeSpec) {
    let v = spec.version;
    s.versioned(v, |s| {
        s.named(&spec.name, "synthetic tree");
        s.versioned(2, |s| {
            s.i16(1);
            s.i16(1);
            s.i16(1);
        });
        s.versioned(2, |s| {
            s.i16(0);
            s.i16(1001);
        });
        s.versioned(2, |s| {
            s.i16(1);
            s.i16(1);
            s.f32(1.0);
        });
        s.i64(spec.entries);
        s.i64(0);
        s.i64(0);
        s.i64(0);
        if v >= 18 {
            s.i64(0);
        }
        s.f64(1.0);
        s.i32(0);
        s.i32(25);
        s.i32(0);
        if v >= 18 {
            s.i32(1000);
        }
        if v >= 19 {
            s.i32(1);
        }
        s.i64(1_000_000_000);
        s.i64(1_000_000_000);
        s.i64(0);
        s.i64(-300_000_000);
        if v >= 18 {
            s.i64(-30_000_000);
        }
        s.i64(1_000_000);
        if v >= 19 {
            s.u8(1);
            s.i64(spec.entries - 1);
            s.u8(1);
            s.i64(spec.entries.max(1));
        }
        if v >= 20 {
            s.io_features(spec.io_bits);
        }
        s.obj_array(spec.branches.len(), |s, i| {
            write_branch(s, &spec.branches[i]);
        });
        let leaves: Vec<i64> = s.leaves.iter().map(|&(_, pos)| pos).collect();
        let foreign = usize::from(spec.foreign_leaf);
        s.obj_array(leaves.len() + foreign, |s, i| match leaves.get(i) {
            Some(&pos) => s.object_ref(pos),
            None => {
                s.any("TObjString", |s| {
                    s.versioned(1, |s| {
                        s.tobject();
                        s.string("not a leaf");
                    })
                });
            }
        });

        s.null();
        s.i32(0);
        s.i32(0);
        s.null();
        s.null();
        if spec.user_info {
            s.any("TList", |s| {
                s.versioned(5, |s| {
                    s.tobject();
                    s.string("");
                    s.i32(2);
                    s.any("TObjString", |s| {
                        s.versioned(1, |s| {
                            s.tobject();
                            s.string("producer note");
                        })
                    });
                    s.u8(0);
                    s.any("TProducerTag", |s| {
                        s.versioned(1, |s| s.bytes(&[1, 2, 3, 4]));
                    });
                    s.u8(0);
                });
            });
        } else {
            s.null();
        }
        s.null();
    });
}

/// Frames `raw` as one zlib block.
pub fn zlib_block(raw: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(raw).unwrap();
    let compressed = encoder.finish().unwrap();
    let mut out = BlockHeader::encode(*b"ZL", 8, compressed.len(), raw.len()).to_vec();
    out.extend_from_slice(&compressed);
    out
}

fn key_header(
    class: &str,
    name: &str,
    title: &str,
    nbytes: i32,
    objlen: i32,
    cycle: i16,
    seek: i64,
    pdir: i64,
) -> Vec<u8> {
    let mut s = Stream::new(0);
    s.i32(nbytes);
    s.i16(4);
    s.i32(objlen);
    s.u32(0x6a2c_8000);
    s.i16(key_len(class, name, title) as i16);
    s.i16(cycle);
    s.i32(seek as i32);
    s.i32(pdir as i32);
    s.string(class);
    s.string(name);
    s.string(title);
    s.buf
}

fn key_len(class: &str, name: &str, title: &str) -> usize {
    18 + 8 + 3 + class.len() + name.len() + title.len()
}

struct DirState {
    seek: i64,
    record_at: usize,
    keys: Vec<Vec<u8>>,
}

/// Builds a whole container in memory.
pub struct FileBuilder {
    buf: Vec<u8>,
    dirs: Vec<DirState>,
    nbytes_name: usize,
    compression: i32,
    large: bool,
}

impl FileBuilder {
    pub fn new() -> Self {
        let mut buf = vec![0u8; BEGIN];
        let (class, name, title) = ("TFile", "test.root", "synthetic");
        let keylen = key_len(class, name, title);
        let nbytes_name = keylen + 2 + name.len() + title.len();
        let nbytes = nbytes_name + DIR_RECORD_SIZE;
        buf.extend(key_header(class, name, title, nbytes as i32, nbytes as i32, 1, BEGIN as i64, 0));
        let mut s = Stream::new(0);
        s.string(name);
        s.string(title);
        buf.extend(s.buf);
        let record_at = buf.len();
        buf.extend(dir_record(nbytes_name as i32, BEGIN as i64, 0));
        Self {
            buf,
            dirs: vec![DirState { seek: BEGIN as i64, record_at, keys: Vec::new() }],
            nbytes_name,
            compression: 0,
            large: false,
        }
    }

    /// Uses the 64-bit header layout.
    pub fn large(mut self) -> Self {
        self.large = true;
        self
    }

    /// Records the compression setting in the header.
    pub fn compression(mut self, code: i32) -> Self {
        self.compression = code;
        self
    }

    pub fn pos(&self) -> i64 {
        self.buf.len() as i64
    }

    fn current(&mut self) -> &mut DirState {
        self.dirs.last_mut().unwrap()
    }

    /// Adds a record whose payload is produced by `body`.
    pub fn record(
        &mut self,
        class: &str,
        name: &str,
        cycle: i16,
        compress: bool,
        body: impl FnOnce(&mut Stream),
    ) -> i64 {
        let title = "";
        let keylen = key_len(class, name, title);
        let mut s = Stream::new(keylen as i64);
        body(&mut s);
        let raw = s.buf;
        let stored = if compress { zlib_block(&raw) } else { raw.clone() };
        let seek = self.pos();
        let pdir = self.current().seek;
        let header =
            key_header(class, name, title, (keylen + stored.len()) as i32, raw.len() as i32, cycle, seek, pdir);
        self.buf.extend_from_slice(&header);
        self.buf.extend_from_slice(&stored);
        self.current().keys.push(header);
        seek
    }

    pub fn tree(&mut self, spec: &TreeSpec, compress: bool) -> i64 {
        self.record("TTree", &spec.name, 1, compress, |s| write_tree(s, spec))
    }

    /// Writes a basket; `offsets` are entry starts within `data`.
    pub fn basket(
        &mut self,
        branch: &str,
        data: &[u8],
        offsets: Option<&[usize]>,
        entries: i32,
        item_size: i32,
        compress: bool,
    ) -> WrittenBasket {
        let keylen = basket_keylen(branch);
        let mut payload = data.to_vec();
        if let Some(offsets) = offsets {
            payload.extend(offset_table(offsets, keylen));
        }
        let stored = if compress { zlib_block(&payload) } else { payload.clone() };
        let nbytes = keylen as i32 + stored.len() as i32;
        let seek = self.pos();
        let nevbuf_size = if offsets.is_some() { 1000 } else { item_size };
        let mut key = Stream::new(0);
        basket_key(
            &mut key,
            branch,
            keylen,
            nbytes,
            payload.len() as i32,
            seek as i32,
            data.len(),
            entries,
            nevbuf_size,
        );
        assert_eq!(key.buf.len(), keylen as usize);
        self.buf.extend(key.buf);
        self.buf.extend(stored);
        WrittenBasket { seek, nbytes }
    }

    /// Starts a subdirectory; keys go into it until `end_dir`.
    pub fn begin_dir(&mut self, name: &str) {
        let (class, title) = ("TDirectory", "");
        let keylen = key_len(class, name, title);
        let seek = self.pos();
        let parent = self.current().seek;
        let header = key_header(class, name, title, (keylen + DIR_RECORD_SIZE) as i32, DIR_RECORD_SIZE as i32, 1, seek, parent);
        self.buf.extend_from_slice(&header);
        let record_at = self.buf.len();
        self.buf.extend(dir_record(keylen as i32, seek, parent));
        self.current().keys.push(header);
        self.dirs.push(DirState { seek, record_at, keys: Vec::new() });
    }

    /// Writes the current directory's key list.
    pub fn end_dir(&mut self) {
        let dir = self.dirs.pop().unwrap();
        self.write_key_list(dir);
    }

    fn write_key_list(&mut self, dir: DirState) {
        let (class, name, title) = ("TDirectory", "keys", "");
        let keylen = key_len(class, name, title);
        let mut payload = (dir.keys.len() as i32).to_be_bytes().to_vec();
        for key in &dir.keys {
            payload.extend_from_slice(key);
        }
        let seek = self.pos();
        let nbytes = keylen + payload.len();
        self.buf.extend(key_header(class, name, title, nbytes as i32, payload.len() as i32, 1, seek, dir.seek));
        self.buf.extend(payload);
        let at = dir.record_at;
        self.buf[at + 10..at + 14].copy_from_slice(&(nbytes as i32).to_be_bytes());
        self.buf[at + 26..at + 30].copy_from_slice(&(seek as i32).to_be_bytes());
    }

    pub fn finish(mut self) -> Vec<u8> {
        while self.dirs.len() > 1 {
            self.end_dir();
        }
        let root = self.dirs.pop().unwrap();
        self.write_key_list(root);

        let end = self.buf.len() as i64;
        let mut s = Stream::new(0);
        s.bytes(b"root");
        if self.large {
            s.i32(1_062_206);
            s.i32(BEGIN as i32);
            s.i64(end);
            s.i64(0);
        } else {
            s.i32(62206);
            s.i32(BEGIN as i32);
            s.i32(end as i32);
            s.i32(0);
        }
        s.i32(0);
        s.i32(0);
        s.i32(self.nbytes_name as i32);
        s.u8(4);
        s.i32(self.compression);
        if self.large {
            s.i64(0);
        } else {
            s.i32(0);
        }
        s.i32(0);
        s.u16(1);
        s.bytes(&[7u8; 16]);
        self.buf[..s.buf.len()].copy_from_slice(&s.buf);
        self.buf
    }
}

impl Default for FileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn dir_record(nbytes_name: i32, seek_dir: i64, seek_parent: i64) -> Vec<u8> {
    let mut s = Stream::new(0);
    s.i16(5);
    s.u32(0x6a2c_8000);
    s.u32(0x6a2c_8000);
    s.i32(0);
    s.i32(nbytes_name);
    s.i32(seek_dir as i32);
    s.i32(seek_parent as i32);
    s.i32(0);
    assert_eq!(s.buf.len(), DIR_RECORD_SIZE);
    s.buf
}

pub fn f64_bytes(values: &[f64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

pub fn i32_bytes(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

/// One `std::vector<int>` entry: byte count, version, length, items.
pub fn vector_entry(values: &[i32]) -> Vec<u8> {
    let body = 2 + 4 + 4 * values.len();
    let mut out = (body as u32 | BYTE_COUNT_MASK).to_be_bytes().to_vec();
    out.extend_from_slice(&9u16.to_be_bytes());
    out.extend_from_slice(&(values.len() as u32).to_be_bytes());
    out.extend(i32_bytes(values));
    out
}

/// Concatenates entries and returns the data with each entry's start.
pub fn pack_entries(entries: &[Vec<u8>]) -> (Vec<u8>, Vec<usize>) {
    let mut data = Vec::new();
    let mut offsets = Vec::new();
    for e in entries {
        offsets.push(data.len());
        data.extend_from_slice(e);
    }
    (data, offsets)
}

/// Writes a one-branch tree of doubles split into baskets of the given sizes.
pub fn flat_f64_file(values: &[f64], basket_sizes: &[usize], compress: bool) -> Vec<u8> {
    let mut fb = FileBuilder::new();
    let mut branch = BranchSpec::new("x", LeafSpec::new("TLeafD", "x"));
    let mut first = 0;
    for &n in basket_sizes {
        let chunk = &values[first..first + n];
        let b = fb.basket("x", &f64_bytes(chunk), None, n as i32, 8, compress);
        branch = branch.basket(b, first as i64);
        first += n;
    }
    let tree = TreeSpec::new("events", values.len() as i64).branch(branch.entries(values.len() as i64));
    fb.tree(&tree, compress);
    fb.finish()
}
