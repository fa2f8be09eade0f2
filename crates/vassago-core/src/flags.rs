//! Compression configuration.

use serde::{Deserialize, Serialize};

use crate::format::IntFormat;

/// Configuration for the abbreviation model and rewriter.
///
/// The same flags must be used for compression and decompression of a
/// given artifact; the wire formats below are pinned into the generated
/// filter algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionFlags {
    /// Minimum occurrences for a trie node to survive pruning.
    pub count_cutoff: u64,

    /// Minimum weight for a trie node to survive pruning.
    pub weight_cutoff: u64,

    /// Maximum path length tracked by the trie; also the rewriter's
    /// ring-buffer capacity.
    pub length_limit: usize,

    /// Integer format used for abbreviation indices on the wire.
    pub abbrev_format: IntFormat,

    /// Integer format used for literal fallback values.
    pub default_format: IntFormat,

    /// Integer format for a multi-default run length.
    pub loop_size_format: IntFormat,

    /// Emit the CISM-extended algorithm instead of a flat file loop.
    pub use_cism_model: bool,

    /// Back-patch block sizes with minimal LEB128; otherwise a padded
    /// fixed-width size is left in place.
    pub minimize_block_size: bool,

    /// Huffman-code abbreviation indices instead of emitting them
    /// through `abbrev_format`.
    pub use_huffman_encoding: bool,
}

impl Default for CompressionFlags {
    fn default() -> Self {
        CompressionFlags {
            count_cutoff: 8,
            weight_cutoff: 64,
            length_limit: 5,
            abbrev_format: IntFormat::Varuint32,
            default_format: IntFormat::Varint64,
            loop_size_format: IntFormat::Varuint32,
            use_cism_model: false,
            minimize_block_size: true,
            use_huffman_encoding: false,
        }
    }
}

impl CompressionFlags {
    /// Create flags with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the occurrence cutoff.
    pub fn with_count_cutoff(mut self, cutoff: u64) -> Self {
        self.count_cutoff = cutoff;
        self
    }

    /// Set the weight cutoff.
    pub fn with_weight_cutoff(mut self, cutoff: u64) -> Self {
        self.weight_cutoff = cutoff;
        self
    }

    /// Set the tracked path length limit.
    pub fn with_length_limit(mut self, limit: usize) -> Self {
        self.length_limit = limit;
        self
    }

    /// Set the abbreviation index format.
    pub fn with_abbrev_format(mut self, format: IntFormat) -> Self {
        self.abbrev_format = format;
        self
    }

    /// Set the literal fallback format.
    pub fn with_default_format(mut self, format: IntFormat) -> Self {
        self.default_format = format;
        self
    }

    /// Set the multi-default run length format.
    pub fn with_loop_size_format(mut self, format: IntFormat) -> Self {
        self.loop_size_format = format;
        self
    }

    /// Enable or disable the CISM model.
    pub fn with_cism_model(mut self, enabled: bool) -> Self {
        self.use_cism_model = enabled;
        self
    }

    /// Enable or disable block size minimization.
    pub fn with_minimize_block_size(mut self, enabled: bool) -> Self {
        self.minimize_block_size = enabled;
        self
    }

    /// Enable or disable Huffman coding of abbreviation indices.
    pub fn with_huffman_encoding(mut self, enabled: bool) -> Self {
        self.use_huffman_encoding = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_flags() {
        let flags = CompressionFlags::default();
        assert_eq!(flags.abbrev_format, IntFormat::Varuint32);
        assert_eq!(flags.default_format, IntFormat::Varint64);
        assert!(flags.length_limit >= 2, "limit must allow real sequences");
        assert!(!flags.use_cism_model);
    }

    #[test]
    fn test_builder_chain() {
        let flags = CompressionFlags::new()
            .with_count_cutoff(2)
            .with_length_limit(3)
            .with_huffman_encoding(true);
        assert_eq!(flags.count_cutoff, 2);
        assert_eq!(flags.length_limit, 3);
        assert!(flags.use_huffman_encoding);
    }

    #[test]
    fn test_flags_compare() {
        let flags = CompressionFlags::new().with_weight_cutoff(7);
        assert_ne!(flags, CompressionFlags::default());
        assert_eq!(flags.clone(), flags);
    }
}
