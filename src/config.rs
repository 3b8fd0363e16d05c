//! Configuration options for opening containers.

/// Configuration options for opening a container.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Memory-map files instead of reading them into memory.
    /// Default: true
    pub use_mmap: bool,

    /// Decompressed basket cache size (in bytes).
    /// Set to 0 to disable caching.
    /// Default: 16MB
    pub basket_cache_size: usize,

    /// Number of worker threads used to decode the baskets of one branch.
    /// 1 decodes sequentially on the calling thread.
    /// Default: 1
    pub decode_threads: usize,

    /// Require the decoded entry count of a whole branch to equal the
    /// entry count the branch declares.
    /// Default: true
    pub verify_entry_count: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            use_mmap: true,
            basket_cache_size: 16 * 1024 * 1024, // 16MB
            decode_threads: 1,
            verify_entry_count: true,
        }
    }
}

impl ReadOptions {
    /// Creates a new ReadOptions with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether files are memory-mapped.
    pub fn use_mmap(mut self, value: bool) -> Self {
        self.use_mmap = value;
        self
    }

    /// Sets the basket cache size.
    pub fn basket_cache_size(mut self, size: usize) -> Self {
        self.basket_cache_size = size;
        self
    }

    /// Sets the number of basket decode threads.
    pub fn decode_threads(mut self, threads: usize) -> Self {
        self.decode_threads = threads;
        self
    }

    /// Enables or disables the whole-branch entry count check.
    pub fn verify_entry_count(mut self, value: bool) -> Self {
        self.verify_entry_count = value;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.decode_threads == 0 {
            return Err(crate::Error::invalid_argument("decode_threads must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = ReadOptions::default();
        assert!(opts.use_mmap);
        assert_eq!(opts.basket_cache_size, 16 * 1024 * 1024);
        assert_eq!(opts.decode_threads, 1);
        assert!(opts.verify_entry_count);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let opts = ReadOptions::new().use_mmap(false).basket_cache_size(0).decode_threads(4);
        assert!(!opts.use_mmap);
        assert_eq!(opts.basket_cache_size, 0);
        assert_eq!(opts.decode_threads, 4);
    }

    #[test]
    fn test_validate_rejects_zero_threads() {
        let opts = ReadOptions::new().decode_threads(0);
        assert!(opts.validate().is_err());
    }
}
