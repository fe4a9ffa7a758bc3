//! Decoder options.

use super::Endian;

/// How data files are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Byte order of the `.mc` files. Maya writes big-endian.
    pub endian: Endian,
    /// Memory-map data files instead of reading them into memory.
    pub use_mmap: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            endian: Endian::Big,
            use_mmap: true,
        }
    }
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    pub fn with_mmap(mut self, use_mmap: bool) -> Self {
        self.use_mmap = use_mmap;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = LoadOptions::default();
        assert_eq!(opts.endian, Endian::Big);
        assert!(opts.use_mmap);

        let opts = LoadOptions::new().with_endian(Endian::Little).with_mmap(false);
        assert_eq!(opts.endian, Endian::Little);
        assert!(!opts.use_mmap);
    }
}
