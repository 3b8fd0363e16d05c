//! Variable-length rows over a shared contents array.

use super::array::Array;
use crate::error::{Error, Result};
use std::sync::Arc;

/// Rows described by `starts` and `sizes` into one contents array.
///
/// Every row satisfies `starts[i] + sizes[i] <= contents.len()`. Rows may
/// overlap or leave gaps; slices share the contents without copying.
#[derive(Debug, Clone, PartialEq)]
pub struct JaggedArray {
    contents: Arc<Array>,
    starts: Vec<usize>,
    sizes: Vec<usize>,
}

impl JaggedArray {
    /// Builds a jagged array, validating every row against the contents.
    pub fn new(contents: Arc<Array>, starts: Vec<usize>, sizes: Vec<usize>) -> Result<Self> {
        if starts.len() != sizes.len() {
            return Err(Error::invalid_argument(format!(
                "{} starts but {} sizes",
                starts.len(),
                sizes.len()
            )));
        }
        let len = contents.len();
        for (row, (&start, &size)) in starts.iter().zip(&sizes).enumerate() {
            if start.checked_add(size).map_or(true, |end| end > len) {
                return Err(Error::invalid_argument(format!(
                    "row {} spans {}..{} past contents of length {}",
                    row,
                    start,
                    start.saturating_add(size),
                    len
                )));
            }
        }
        Ok(Self { contents, starts, sizes })
    }

    /// Packs consecutive rows of the given sizes; the sizes must cover the contents.
    pub fn from_sizes(contents: Array, sizes: Vec<usize>) -> Result<Self> {
        let total: usize = sizes.iter().sum();
        if total != contents.len() {
            return Err(Error::invalid_argument(format!(
                "row sizes add up to {} but contents hold {}",
                total,
                contents.len()
            )));
        }
        let mut starts = Vec::with_capacity(sizes.len());
        let mut next = 0;
        for &size in &sizes {
            starts.push(next);
            next += size;
        }
        Ok(Self { contents: Arc::new(contents), starts, sizes })
    }

    /// Rows delimited by `offsets[i]..offsets[i + 1]`.
    pub fn from_offsets(contents: Array, offsets: &[usize]) -> Result<Self> {
        let mut starts = Vec::with_capacity(offsets.len().saturating_sub(1));
        let mut sizes = Vec::with_capacity(starts.capacity());
        for pair in offsets.windows(2) {
            if pair[1] < pair[0] {
                return Err(Error::invalid_argument(format!(
                    "offsets decrease from {} to {}",
                    pair[0], pair[1]
                )));
            }
            starts.push(pair[0]);
            sizes.push(pair[1] - pair[0]);
        }
        Self::new(Arc::new(contents), starts, sizes)
    }

    /// No rows over the given (empty) contents.
    pub fn empty(contents: Array) -> Self {
        Self { contents: Arc::new(contents), starts: Vec::new(), sizes: Vec::new() }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    /// True when there are no rows.
    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// The shared contents.
    pub fn contents(&self) -> &Array {
        &self.contents
    }

    /// Row start positions.
    pub fn starts(&self) -> &[usize] {
        &self.starts
    }

    /// Row lengths.
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// A copy of row `i`.
    pub fn row(&self, i: usize) -> Option<Array> {
        let start = *self.starts.get(i)?;
        Some(self.contents.slice(start, start + self.sizes[i]))
    }

    /// Iterates over copies of the rows.
    pub fn rows(&self) -> impl Iterator<Item = Array> + '_ {
        (0..self.len()).filter_map(move |i| self.row(i))
    }

    /// Rows `start..stop`, sharing the contents.
    pub fn slice(&self, start: usize, stop: usize) -> Self {
        let stop = stop.min(self.len());
        let start = start.min(stop);
        Self {
            contents: Arc::clone(&self.contents),
            starts: self.starts[start..stop].to_vec(),
            sizes: self.sizes[start..stop].to_vec(),
        }
    }

    /// Appends the rows of `other`, rebasing its starts past the current contents.
    pub fn append(&mut self, other: JaggedArray) -> Result<()> {
        let base = self.contents.len();
        let other_contents = Arc::try_unwrap(other.contents).unwrap_or_else(|shared| (*shared).clone());
        Arc::make_mut(&mut self.contents).append(other_contents)?;
        self.starts.extend(other.starts.into_iter().map(|s| s + base));
        self.sizes.extend(other.sizes);
        Ok(())
    }
}
