use super::branch::Branch;
use super::leaf::Leaf;
use crate::error::{Error, Result};
use crate::interp::Array;
use crate::object::{
    discard_object_any, downcast, skip_tarray, FillAttributes, IoFeatures, LineAttributes,
    MarkerAttributes, Named, ObjArray, ReadContext, Streamed, VersionHeader,
};
use crate::source::ByteCursor;
use std::sync::Arc;

/// Oldest `TTree` layout understood.
pub const MIN_TREE_VERSION: u16 = 16;

/// A table of entries stored column by column in branches.
///
/// Fields by version:
///
/// | since | fields |
/// |-------|--------|
/// | 16    | named, line/fill/marker attributes, entries, byte totals, weight, ... |
/// | 18    | flushed bytes, default entry offset length, auto flush |
/// | 19    | cluster range count, cluster range ends and sizes |
/// | 20    | I/O features |
#[derive(Debug, Clone)]
pub struct Tree {
    name: String,
    title: String,
    /// Line attributes.
    pub line: LineAttributes,
    /// Fill attributes.
    pub fill: FillAttributes,
    /// Marker attributes.
    pub marker: MarkerAttributes,
    entries: i64,
    /// Uncompressed bytes written.
    pub tot_bytes: i64,
    /// Compressed bytes written.
    pub zip_bytes: i64,
    /// Bytes of the last saved header.
    pub saved_bytes: i64,
    /// Bytes at the last flush.
    pub flushed_bytes: i64,
    /// Tree weight.
    pub weight: f64,
    /// Timer interval.
    pub timer_interval: i32,
    /// Entries per scan page.
    pub scan_field: i32,
    /// Update frequency.
    pub update: i32,
    /// Initial entry offset table length for new branches.
    pub default_entry_offset_len: i32,
    /// Maximum entries.
    pub max_entries: i64,
    /// Maximum entries per loop.
    pub max_entry_loop: i64,
    /// Maximum virtual size.
    pub max_virtual_size: i64,
    /// Auto-save threshold.
    pub auto_save: i64,
    /// Auto-flush threshold.
    pub auto_flush: i64,
    /// Estimated entries.
    pub estimate: i64,
    /// Last entry of each cluster range.
    pub cluster_range_end: Vec<i64>,
    /// Cluster size of each range.
    pub cluster_size: Vec<i64>,
    /// I/O feature bits.
    pub io_features: Option<IoFeatures>,
    branches: Vec<Arc<Branch>>,
    leaves: Vec<Arc<Leaf>>,
}

fn read_flagged_i64s(cursor: &mut ByteCursor<'_>, n: usize) -> Result<Vec<i64>> {
    if cursor.read_u8()? == 0 {
        return Ok(Vec::new());
    }
    cursor.read_array(n)
}

/// Links every counted branch to the branch owning its count leaf.
fn link_count_branches(branches: &[Arc<Branch>]) {
    fn walk(branches: &[Arc<Branch>], out: &mut Vec<Arc<Branch>>) {
        for b in branches {
            out.push(Arc::clone(b));
            walk(b.branches(), out);
        }
    }
    let mut all = Vec::new();
    walk(branches, &mut all);
    for branch in &all {
        let Some(leaf) = branch.count_leaf() else { continue };
        let owner = all
            .iter()
            .find(|b| !Arc::ptr_eq(*b, branch) && b.leaves().iter().any(|l| Arc::ptr_eq(l, leaf)));
        match owner {
            Some(owner) => branch.link_offset_counts(Arc::clone(owner)),
            None => log::warn!("no branch owns the count leaf {:?} of {:?}", leaf.name, branch.name()),
        }
    }
}

impl Tree {
    /// Reads a `TTree` record.
    pub fn read(cursor: &mut ByteCursor<'_>, ctx: &mut ReadContext<'_>) -> Result<Self> {
        let header = VersionHeader::read_min(cursor, "TTree", MIN_TREE_VERSION)?;
        let v = header.version;
        let named = Named::read(cursor)?;
        let line = LineAttributes::read(cursor)?;
        let fill = FillAttributes::read(cursor)?;
        let marker = MarkerAttributes::read(cursor)?;

        let entries = cursor.read_i64()?;
        let tot_bytes = cursor.read_i64()?;
        let zip_bytes = cursor.read_i64()?;
        let saved_bytes = cursor.read_i64()?;
        let flushed_bytes = if v >= 18 { cursor.read_i64()? } else { 0 };
        let weight = cursor.read_f64()?;
        let timer_interval = cursor.read_i32()?;
        let scan_field = cursor.read_i32()?;
        let update = cursor.read_i32()?;
        let default_entry_offset_len = if v >= 18 { cursor.read_i32()? } else { 0 };
        let n_cluster_range = if v >= 19 { cursor.read_i32()?.max(0) as usize } else { 0 };
        let max_entries = cursor.read_i64()?;
        let max_entry_loop = cursor.read_i64()?;
        let max_virtual_size = cursor.read_i64()?;
        let auto_save = cursor.read_i64()?;
        let auto_flush = if v >= 18 { cursor.read_i64()? } else { 0 };
        let estimate = cursor.read_i64()?;
        let (cluster_range_end, cluster_size) = if v >= 19 {
            (read_flagged_i64s(cursor, n_cluster_range)?, read_flagged_i64s(cursor, n_cluster_range)?)
        } else {
            (Vec::new(), Vec::new())
        };
        let io_features = if v >= 20 { Some(IoFeatures::read(cursor)?) } else { None };

        let branch_list = ObjArray::read(cursor, ctx)?;
        let leaf_list = ObjArray::read(cursor, ctx)?;

        // aliases, index values, index, tree index, friends, user info, branch ref
        discard_object_any(cursor, ctx)?;
        skip_tarray(cursor, 8)?;
        skip_tarray(cursor, 4)?;
        for _ in 0..4 {
            discard_object_any(cursor, ctx)?;
        }
        header.check_end(cursor, "TTree")?;

        let branches = branch_list
            .iter()
            .map(|obj| {
                let class = obj.class_name().to_string();
                downcast::<Branch>(Arc::clone(obj))
                    .ok_or_else(|| Error::corruption(format!("branch list holds a {}", class)))
            })
            .collect::<Result<Vec<_>>>()?;
        let leaves = leaf_list
            .iter()
            .map(|obj| {
                let class = obj.class_name().to_string();
                downcast::<Leaf>(Arc::clone(obj))
                    .ok_or_else(|| Error::corruption(format!("leaf list holds a {}", class)))
            })
            .collect::<Result<Vec<_>>>()?;
        if io_features.is_some_and(|f| f.generates_offset_map()) {
            link_count_branches(&branches);
        }

        log::debug!("tree {:?}: {} entries, {} branches", named.name, entries, branches.len());
        Ok(Self {
            name: named.name,
            title: named.title,
            line,
            fill,
            marker,
            entries,
            tot_bytes,
            zip_bytes,
            saved_bytes,
            flushed_bytes,
            weight,
            timer_interval,
            scan_field,
            update,
            default_entry_offset_len,
            max_entries,
            max_entry_loop,
            max_virtual_size,
            auto_save,
            auto_flush,
            estimate,
            cluster_range_end,
            cluster_size,
            io_features,
            branches,
            leaves,
        })
    }

    /// Tree name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tree title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Number of entries.
    pub fn entries(&self) -> i64 {
        self.entries
    }

    /// Top-level branches.
    pub fn branches(&self) -> &[Arc<Branch>] {
        &self.branches
    }

    /// Every leaf of the tree.
    pub fn leaves(&self) -> &[Arc<Leaf>] {
        &self.leaves
    }

    /// Finds a branch by name at any depth, depth-first.
    pub fn branch(&self, name: &str) -> Result<&Arc<Branch>> {
        fn find<'a>(branches: &'a [Arc<Branch>], name: &str) -> Option<&'a Arc<Branch>> {
            branches.iter().find_map(|b| {
                if b.name() == name {
                    Some(b)
                } else {
                    find(b.branches(), name)
                }
            })
        }
        find(&self.branches, name).ok_or_else(|| Error::BranchNotFound(name.to_string()))
    }

    /// Names of every branch, depth-first.
    pub fn branch_names(&self) -> Vec<String> {
        fn walk(branches: &[Arc<Branch>], out: &mut Vec<String>) {
            for b in branches {
                out.push(b.name().to_string());
                walk(b.branches(), out);
            }
        }
        let mut out = Vec::new();
        walk(&self.branches, &mut out);
        out
    }

    /// Decodes a whole branch by name.
    pub fn array(&self, name: &str) -> Result<Array> {
        self.branch(name)?.array()
    }
}

crate::impl_streamed!(Tree, "TTree");
