//! Branches: named columns and the baskets that store them.

use super::basket::{self, BasketData, EmbeddedBasket};
use super::leaf::{Leaf, LeafKind};
use crate::container::FileContext;
use crate::error::{Error, Result};
use crate::interp::{Array, DType, Interpretation, JaggedCount};
use crate::object::{
    downcast, read_object_any, FillAttributes, IoFeatures, Named, ObjArray, ObjectRef, ReadContext,
    Streamed, VersionHeader,
};
use crate::source::ByteCursor;
use once_cell::sync::OnceCell;
use std::any::Any;
use std::ops::Range;
use std::sync::Arc;

/// Oldest `TBranch` layout understood.
pub const MIN_BRANCH_VERSION: u16 = 10;
/// Oldest `TBranchElement` layout understood.
pub const MIN_BRANCH_ELEMENT_VERSION: u16 = 9;

/// Where a basket's bytes live.
#[derive(Debug, Clone)]
pub enum BasketLocation {
    /// A record of its own at this file offset.
    Seek(i64),
    /// Inside the branch record, recovered from an unflushed producer.
    Embedded(Arc<EmbeddedBasket>),
}

/// One basket and the entries it covers.
#[derive(Debug, Clone)]
pub struct BasketSpan {
    /// Where the bytes are.
    pub location: BasketLocation,
    /// First entry.
    pub entry_start: i64,
    /// One past the last entry.
    pub entry_stop: i64,
}

impl BasketSpan {
    fn entries(&self) -> usize {
        (self.entry_stop - self.entry_start).max(0) as usize
    }
}

/// Extra fields of a `TBranchElement`: a member of a split class.
#[derive(Debug, Clone, Default)]
pub struct ElementInfo {
    /// Class of the object this branch belongs to.
    pub class_name: String,
    /// Parent class name.
    pub parent_name: String,
    /// Class held in a `TClonesArray`, if any.
    pub clones_name: String,
    /// Class checksum.
    pub checksum: u32,
    /// Class version.
    pub class_version: i32,
    /// Element index in the streamer info.
    pub id: i32,
    /// Branch type code.
    pub ty: i32,
    /// Streamer type code.
    pub streamer_type: i32,
    /// Maximum number of items per entry.
    pub maximum: i32,
    /// Branch counting this one's items.
    pub count_branch: Option<Arc<Branch>>,
    /// Secondary count branch.
    pub count_branch2: Option<Arc<Branch>>,
}

/// A column of a tree.
#[derive(Debug, Clone)]
pub struct Branch {
    name: String,
    title: String,
    /// Fill attributes.
    pub fill: FillAttributes,
    /// Compression setting code.
    pub compress: i32,
    /// Basket buffer size.
    pub basket_size: i32,
    /// Initial entry offset table length.
    pub entry_offset_len: i32,
    /// Index of the basket being written when the file was closed.
    pub write_basket: i32,
    /// Entries filled.
    pub entry_number: i64,
    /// I/O feature bits.
    pub io_features: Option<IoFeatures>,
    /// Offset of this branch's data in the parent object.
    pub offset: i32,
    /// Allocated basket slots.
    pub max_baskets: i32,
    /// Split level.
    pub split_level: i32,
    /// First entry number.
    pub first_entry: i64,
    /// Uncompressed bytes written.
    pub tot_bytes: i64,
    /// Compressed bytes written.
    pub zip_bytes: i64,
    /// Name of the file holding the baskets, when not this one.
    pub file_name: String,
    /// Element metadata, for `TBranchElement`.
    pub element: Option<ElementInfo>,
    entries: i64,
    basket_bytes: Vec<i32>,
    basket_entry: Vec<i64>,
    basket_seek: Vec<i64>,
    branches: Vec<Arc<Branch>>,
    leaves: Vec<Arc<Leaf>>,
    baskets: Vec<BasketSpan>,
    item_counts: Vec<Option<usize>>,
    broken: Option<String>,
    offset_counts: OnceCell<Arc<Branch>>,
    file: Arc<FileContext>,
}

fn collect<T: Streamed>(array: &ObjArray, what: &str, owner: &str) -> Result<Vec<Arc<T>>> {
    array
        .iter()
        .map(|obj| {
            let class = obj.class_name().to_string();
            downcast::<T>(Arc::clone(obj)).ok_or_else(|| {
                Error::corruption(format!("{} of {:?} holds a {}", what, owner, class))
            })
        })
        .collect()
}

fn read_basket_array<T: crate::source::Element>(cursor: &mut ByteCursor<'_>, n: usize) -> Result<Vec<T>> {
    if cursor.read_u8()? == 0 {
        return Ok(Vec::new());
    }
    cursor.read_array(n)
}

fn count_branch(obj: Option<ObjectRef>) -> Option<Arc<Branch>> {
    obj.and_then(downcast::<Branch>)
}

impl Branch {
    /// Reads a `TBranch` record.
    pub fn read(cursor: &mut ByteCursor<'_>, ctx: &mut ReadContext<'_>) -> Result<Self> {
        let header = VersionHeader::read_min(cursor, "TBranch", MIN_BRANCH_VERSION)?;
        let v = header.version;
        let named = Named::read(cursor)?;
        let fill = FillAttributes::read(cursor)?;

        let compress = cursor.read_i32()?;
        let basket_size = cursor.read_i32()?;
        let entry_offset_len = cursor.read_i32()?;
        let write_basket = cursor.read_i32()?;
        let entry_number = cursor.read_i64()?;
        let io_features = if v >= 13 { Some(IoFeatures::read(cursor)?) } else { None };
        let offset = cursor.read_i32()?;
        let max_baskets = cursor.read_i32()?;
        let split_level = cursor.read_i32()?;
        let entries = cursor.read_i64()?;
        let first_entry = if v >= 11 { cursor.read_i64()? } else { 0 };
        let tot_bytes = cursor.read_i64()?;
        let zip_bytes = cursor.read_i64()?;

        let branches = ObjArray::read(cursor, ctx)?;
        let leaves = ObjArray::read(cursor, ctx)?;
        // Embedded baskets are only read when the written ones fall short.
        let embedded = *cursor;
        VersionHeader::read(cursor)?.skip_to_end(cursor, "TObjArray")?;

        let n = max_baskets.max(0) as usize;
        let mut basket_bytes: Vec<i32> = read_basket_array(cursor, n)?;
        let mut basket_entry: Vec<i64> = read_basket_array(cursor, n)?;
        let mut basket_seek: Vec<i64> = read_basket_array(cursor, n)?;
        let file_name = cursor.read_string()?;
        header.check_end(cursor, "TBranch")?;

        let good = basket_seek
            .iter()
            .enumerate()
            .take_while(|&(i, &seek)| seek != 0 && i as i32 != write_basket)
            .count();
        let written_end = match basket_entry.get(good) {
            Some(&end) => end,
            None if good == 0 => 0,
            None => entries,
        };
        basket_bytes.truncate(good);
        basket_seek.truncate(good);
        basket_entry.truncate(good + 1);

        let mut baskets: Vec<BasketSpan> = (0..good)
            .map(|i| BasketSpan {
                location: BasketLocation::Seek(basket_seek[i]),
                entry_start: basket_entry.get(i).copied().unwrap_or(0),
                entry_stop: basket_entry.get(i + 1).copied().unwrap_or(entries),
            })
            .collect();

        let mut broken = None;
        if written_end != entries {
            log::debug!(
                "branch {:?}: {} of {} entries in written baskets, recovering",
                named.name,
                written_end,
                entries
            );
            match Self::recover(embedded, ctx, written_end) {
                Ok(recovered) => {
                    let end = recovered.last().map_or(written_end, |span| span.entry_stop);
                    baskets.extend(recovered);
                    if end != entries {
                        broken = Some(format!(
                            "baskets cover {} entries but the branch has {}",
                            end, entries
                        ));
                    }
                }
                Err(e) => broken = Some(format!("embedded baskets unreadable: {}", e)),
            }
            if let Some(reason) = &broken {
                log::warn!("branch {:?}: {}", named.name, reason);
            }
        }

        let mut branch = Self {
            name: named.name,
            title: named.title,
            fill,
            compress,
            basket_size,
            entry_offset_len,
            write_basket,
            entry_number,
            io_features,
            offset,
            max_baskets,
            split_level,
            first_entry,
            tot_bytes,
            zip_bytes,
            file_name,
            element: None,
            entries,
            basket_bytes,
            basket_entry,
            basket_seek,
            branches: Vec::new(),
            leaves: Vec::new(),
            baskets,
            item_counts: Vec::new(),
            broken,
            offset_counts: OnceCell::new(),
            file: Arc::clone(ctx.file()),
        };
        branch.branches = collect(&branches, "sub-branch list", &branch.name)?;
        branch.leaves = collect(&leaves, "leaf list", &branch.name)?;
        branch.item_counts = branch.peek_item_counts()?;
        Ok(branch)
    }

    /// Reads a `TBranchElement` record.
    pub fn read_element(cursor: &mut ByteCursor<'_>, ctx: &mut ReadContext<'_>) -> Result<Self> {
        let header = VersionHeader::read_min(cursor, "TBranchElement", MIN_BRANCH_ELEMENT_VERSION)?;
        let mut branch = Self::read(cursor, ctx)?;
        let class_name = cursor.read_string()?;
        let parent_name = cursor.read_string()?;
        let clones_name = cursor.read_string()?;
        let checksum = cursor.read_u32()?;
        let class_version =
            if header.version >= 10 { cursor.read_i16()? as i32 } else { cursor.read_i32()? };
        let id = cursor.read_i32()?;
        let ty = cursor.read_i32()?;
        let streamer_type = cursor.read_i32()?;
        let maximum = cursor.read_i32()?;
        let count = count_branch(read_object_any(cursor, ctx)?);
        let count2 = count_branch(read_object_any(cursor, ctx)?);
        header.check_end(cursor, "TBranchElement")?;

        branch.element = Some(ElementInfo {
            class_name,
            parent_name,
            clones_name,
            checksum,
            class_version,
            id,
            ty,
            streamer_type,
            maximum,
            count_branch: count,
            count_branch2: count2,
        });
        Ok(branch)
    }

    /// Reads the branch's own basket list and keeps the non-empty baskets.
    fn recover(
        mut cursor: ByteCursor<'_>,
        ctx: &mut ReadContext<'_>,
        written_end: i64,
    ) -> Result<Vec<BasketSpan>> {
        let list = ObjArray::read(&mut cursor, ctx)?;
        let mut next = written_end;
        let mut spans = Vec::new();
        for obj in list.iter() {
            let class = obj.class_name().to_string();
            let basket = downcast::<EmbeddedBasket>(Arc::clone(obj))
                .ok_or_else(|| Error::corruption(format!("basket list holds a {}", class)))?;
            let entries = basket.entries() as i64;
            spans.push(BasketSpan {
                location: BasketLocation::Embedded(basket),
                entry_start: next,
                entry_stop: next + entries,
            });
            next += entries;
        }
        log::debug!("recovered {} embedded baskets", spans.len());
        Ok(spans)
    }

    fn peek_item_counts(&self) -> Result<Vec<Option<usize>>> {
        let width = match self.dtype() {
            Some(dtype) => dtype.size(),
            None => return Ok(vec![None; self.baskets.len()]),
        };
        let cursor = ByteCursor::new(self.file.data(), 0);
        self.baskets
            .iter()
            .map(|span| match &span.location {
                BasketLocation::Seek(seek) => {
                    let start = usize::try_from(*seek)
                        .map_err(|_| Error::corruption(format!("negative basket offset {}", seek)))?;
                    let objlen = cursor.i32_at(start + 6)?;
                    Ok(Some(objlen.max(0) as usize / width))
                }
                BasketLocation::Embedded(basket) => Ok(Some(basket.data_len() / width)),
            })
            .collect()
    }

    /// Branch name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Branch title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Class name on disk.
    pub fn record_class(&self) -> &'static str {
        if self.element.is_some() {
            "TBranchElement"
        } else {
            "TBranch"
        }
    }

    /// Number of entries.
    pub fn entries(&self) -> i64 {
        self.entries
    }

    /// Sub-branches.
    pub fn branches(&self) -> &[Arc<Branch>] {
        &self.branches
    }

    /// Leaves.
    pub fn leaves(&self) -> &[Arc<Leaf>] {
        &self.leaves
    }

    /// The sole leaf's count leaf, for variable-length arrays.
    pub fn count_leaf(&self) -> Option<&Arc<Leaf>> {
        match self.leaves.as_slice() {
            [leaf] => leaf.count.as_ref(),
            _ => None,
        }
    }

    /// Branch whose values rebuild entry offsets missing from this branch's baskets.
    pub fn offset_count_branch(&self) -> Option<&Arc<Branch>> {
        self.offset_counts.get()
    }

    /// Rebuilds missing entry offsets from `count`; the first link wins.
    pub(crate) fn link_offset_counts(&self, count: Arc<Branch>) {
        if self.offset_counts.set(count).is_err() {
            log::debug!("branch {:?} already has a count branch", self.name);
        }
    }

    /// Stored size of each written basket.
    pub fn basket_bytes(&self) -> &[i32] {
        &self.basket_bytes
    }

    /// First entry of each written basket, plus the end of the last.
    pub fn basket_entry(&self) -> &[i64] {
        &self.basket_entry
    }

    /// File offset of each written basket.
    pub fn basket_seek(&self) -> &[i64] {
        &self.basket_seek
    }

    /// Number of baskets, written and recovered.
    pub fn num_baskets(&self) -> usize {
        self.baskets.len()
    }

    /// Every basket in entry order.
    pub fn baskets(&self) -> &[BasketSpan] {
        &self.baskets
    }

    /// Entries covered by basket `i`.
    pub fn basket_entry_range(&self, i: usize) -> Result<Range<i64>> {
        let span = self.span(i)?;
        Ok(span.entry_start..span.entry_stop)
    }

    /// Items in basket `i` computed from its stored header and the dtype width.
    pub fn basket_item_count(&self, i: usize) -> Option<usize> {
        self.item_counts.get(i).copied().flatten()
    }

    /// Element type of the sole leaf.
    pub fn dtype(&self) -> Option<DType> {
        match self.leaves.as_slice() {
            [leaf] => leaf.dtype(),
            _ => None,
        }
    }

    /// The interpretation derived from the branch's leaf and element class.
    pub fn interpretation(&self) -> Result<Interpretation> {
        let leaf = match self.leaves.as_slice() {
            [leaf] => leaf,
            [] => return Err(self.no_interpretation("branch has no leaves")),
            many => {
                return Err(self.no_interpretation(format!("branch has {} leaves", many.len())))
            }
        };

        let class = self
            .element
            .as_ref()
            .map(|e| normalize_class(&e.class_name))
            .filter(|c| !c.is_empty());
        if let Some(class) = class.as_deref() {
            if let Some(interp) = interpret_class(class) {
                return Ok(interp);
            }
        }

        if leaf.kind == LeafKind::Char {
            return Ok(Interpretation::string());
        }
        let dtype = leaf
            .dtype()
            .ok_or_else(|| self.no_interpretation(format!("no element type for {}", leaf.class_name())))?;
        let flat = Interpretation::dtype(dtype);
        if leaf.count.is_some() {
            Ok(Interpretation::jagged(flat, JaggedCount::Offsets { skip_bytes: 0 }))
        } else if leaf.len > 1 {
            Ok(Interpretation::jagged(flat, JaggedCount::Constant(leaf.len as usize)))
        } else {
            Ok(flat)
        }
    }

    fn no_interpretation(&self, reason: impl Into<String>) -> Error {
        Error::NoInterpretation { branch: self.name.clone(), reason: reason.into() }
    }

    fn span(&self, i: usize) -> Result<&BasketSpan> {
        self.baskets.get(i).ok_or_else(|| {
            Error::invalid_argument(format!(
                "basket {} of {:?}; the branch has {}",
                i,
                self.name,
                self.baskets.len()
            ))
        })
    }

    fn in_basket(&self, i: usize, e: Error) -> Error {
        match e {
            Error::BasketBoundary { detail, .. } => Error::basket_boundary(&self.name, i, detail),
            other => other,
        }
    }

    /// Entry data and offsets of basket `i`.
    pub fn basket_data(&self, i: usize) -> Result<BasketData> {
        match &self.span(i)?.location {
            BasketLocation::Seek(seek) => {
                let (header, payload) = basket::load(&self.file, *seek)?;
                BasketData::split(payload, &header)
            }
            BasketLocation::Embedded(basket) => basket.data(),
        }
    }

    /// Decodes basket `i` with the derived interpretation.
    pub fn basket(&self, i: usize) -> Result<Array> {
        self.basket_with(i, &self.interpretation()?)
    }

    /// Decodes basket `i`.
    pub fn basket_with(&self, i: usize, interp: &Interpretation) -> Result<Array> {
        let entries = self.span(i)?.entries();
        let mut data = self.basket_data(i).map_err(|e| self.in_basket(i, e))?;
        if data.offsets.is_none() && interp.needs_offsets() {
            if let Some(count) = self.offset_counts.get() {
                data.offsets = Some(self.generated_offsets(i, count, interp)?);
            }
        }
        interp
            .decode_basket(&data.data, data.offsets.as_deref(), entries)
            .map_err(|e| self.in_basket(i, e))
    }

    /// Entry offsets of basket `i` as running sums of the count branch's values.
    fn generated_offsets(&self, i: usize, count: &Branch, interp: &Interpretation) -> Result<Vec<usize>> {
        let span = self.span(i)?;
        let counts = count.array_range(span.entry_start, span.entry_stop)?;
        let counts = counts.to_f64_vec().ok_or_else(|| {
            Error::corruption(format!("count branch {:?} of {:?} is not numeric", count.name, self.name))
        })?;
        if counts.len() != span.entries() {
            return Err(Error::basket_boundary(
                &self.name,
                i,
                format!("count branch {:?} gives {} of {} entries", count.name, counts.len(), span.entries()),
            ));
        }
        let item = interp.inner_dtype().map_or(1, |d| d.size());
        let mut offsets = Vec::with_capacity(counts.len() + 1);
        let mut pos = 0usize;
        offsets.push(pos);
        for n in counts {
            if n < 0.0 {
                return Err(Error::basket_boundary(&self.name, i, format!("negative item count {}", n)));
            }
            pos = pos.saturating_add((n as usize).saturating_mul(item));
            offsets.push(pos);
        }
        Ok(offsets)
    }

    /// Decodes every entry with the derived interpretation.
    pub fn array(&self) -> Result<Array> {
        self.array_with(&self.interpretation()?)
    }

    /// Decodes every entry.
    pub fn array_with(&self, interp: &Interpretation) -> Result<Array> {
        let out = self.array_range_with(interp, 0, self.entries)?;
        if self.file.options().verify_entry_count && out.len() as i64 != self.entries {
            return Err(Error::corruption(format!(
                "branch {:?} decoded {} entries but declares {}",
                self.name,
                out.len(),
                self.entries
            )));
        }
        log::info!("decoded branch {:?}: {} entries from {} baskets", self.name, out.len(), self.baskets.len());
        Ok(out)
    }

    /// Decodes entries `start..stop` with the derived interpretation.
    pub fn array_range(&self, start: i64, stop: i64) -> Result<Array> {
        self.array_range_with(&self.interpretation()?, start, stop)
    }

    /// Decodes entries `start..stop`, reading only the baskets that cover them.
    ///
    /// `stop` is clamped to the entry count.
    pub fn array_range_with(&self, interp: &Interpretation, start: i64, stop: i64) -> Result<Array> {
        if let Some(reason) = &self.broken {
            return Err(Error::corruption(format!("branch {:?}: {}", self.name, reason)));
        }
        let stop = stop.min(self.entries);
        if start < 0 || start > stop {
            return Err(Error::invalid_argument(format!(
                "entry range {}..{} of {:?} with {} entries",
                start, stop, self.name, self.entries
            )));
        }

        let first = self.baskets.iter().position(|s| s.entry_stop > start);
        let selected: Vec<usize> = match first {
            Some(first) => (first..self.baskets.len())
                .take_while(|&i| self.baskets[i].entry_start < stop)
                .collect(),
            None => Vec::new(),
        };
        if selected.is_empty() {
            return Ok(interp.empty());
        }

        let base = self.baskets[selected[0]].entry_start;
        let chunks = self.decode_baskets(&selected, interp)?;
        let whole = Array::concat(interp.empty(), chunks)?;
        Ok(whole.slice((start - base) as usize, (stop - base) as usize))
    }

    /// Decodes the given baskets in order, on worker threads when configured.
    fn decode_baskets(&self, indices: &[usize], interp: &Interpretation) -> Result<Vec<Array>> {
        let threads = self.file.options().decode_threads.min(indices.len());
        if threads <= 1 {
            return indices.iter().map(|&i| self.basket_with(i, interp)).collect();
        }

        log::debug!("decoding {} baskets of {:?} on {} threads", indices.len(), self.name, threads);
        let per_worker = crossbeam::thread::scope(|scope| {
            let handles: Vec<_> = (0..threads)
                .map(|worker| {
                    scope.spawn(move |_| {
                        (worker..indices.len())
                            .step_by(threads)
                            .map(|slot| (slot, self.basket_with(indices[slot], interp)))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join()).collect::<Vec<_>>()
        })
        .map_err(|_| Error::internal("basket decode scope panicked"))?;

        let mut slots: Vec<Option<Result<Array>>> = (0..indices.len()).map(|_| None).collect();
        for worker in per_worker {
            let decoded = worker.map_err(|_| Error::internal("basket decode worker panicked"))?;
            for (slot, result) in decoded {
                slots[slot] = Some(result);
            }
        }
        slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err(Error::internal("basket was not decoded"))))
            .collect()
    }
}

/// Drops `std::` and any whitespace not separating two words.
fn normalize_class(name: &str) -> String {
    let name = name.replace("std::", "");
    let chars: Vec<char> = name.trim().chars().collect();
    chars
        .iter()
        .enumerate()
        .filter(|&(i, c)| {
            !c.is_whitespace()
                || (i > 0
                    && chars[i - 1].is_alphanumeric()
                    && chars.get(i + 1).is_some_and(|n| n.is_alphanumeric()))
        })
        .map(|(_, c)| *c)
        .collect()
}

fn is_string_class(name: &str) -> bool {
    matches!(name, "string" | "TString")
}

/// Interpretation of a whole-object element class, for the containers understood.
fn interpret_class(class: &str) -> Option<Interpretation> {
    if is_string_class(class) {
        return Some(Interpretation::string());
    }
    let inner = class.strip_prefix("vector<")?.strip_suffix('>')?;
    if is_string_class(inner) {
        return Some(Interpretation::vector(Interpretation::string()));
    }
    if let Some(nested) = inner.strip_prefix("vector<").and_then(|s| s.strip_suffix('>')) {
        let dtype = DType::from_type_name(nested)?;
        let rows = Interpretation::jagged(Interpretation::dtype(dtype), JaggedCount::Prefixed);
        return Some(Interpretation::vector(rows));
    }
    DType::from_type_name(inner).map(|dtype| Interpretation::vector(Interpretation::dtype(dtype)))
}

impl Streamed for Branch {
    fn class_name(&self) -> &str {
        self.record_class()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
