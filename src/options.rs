use crate::{DEFAULT_LARGE_REUSE_SCAN, DEFAULT_POOL_SIZE, MAX_ALLOC_FROM_POOL};

#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub(crate) size: usize,

    pub(crate) max_alloc_from_pool: usize,

    pub(crate) large_reuse_scan: usize,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            size: DEFAULT_POOL_SIZE,
            max_alloc_from_pool: MAX_ALLOC_FROM_POOL,
            large_reuse_scan: DEFAULT_LARGE_REUSE_SCAN,
        }
    }
}

impl PoolOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total size of every block, pool header included.
    pub fn size(&mut self, size: usize) -> &mut Self {
        self.size = size;
        self
    }

    /// Upper bound of the small-allocation threshold. The effective threshold
    /// is the smaller of this and the usable space of one block.
    pub fn max_alloc_from_pool(&mut self, max: usize) -> &mut Self {
        self.max_alloc_from_pool = max;
        self
    }

    /// How many registry entries a large allocation inspects looking for a
    /// released slot before it prepends a new one.
    pub fn large_reuse_scan(&mut self, bound: usize) -> &mut Self {
        self.large_reuse_scan = bound;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = PoolOptions::new();
        assert_eq!(opts.size, 16 * 1024);
        assert_eq!(opts.max_alloc_from_pool, 4095);
        assert_eq!(opts.large_reuse_scan, 4);
    }

    #[test]
    fn setters_chain() {
        let mut opts = PoolOptions::new();
        opts.size(1024).max_alloc_from_pool(128).large_reuse_scan(2);
        assert_eq!(opts.size, 1024);
        assert_eq!(opts.max_alloc_from_pool, 128);
        assert_eq!(opts.large_reuse_scan, 2);
    }
}
