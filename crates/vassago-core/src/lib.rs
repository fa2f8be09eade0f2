//! # Vassago Core
//!
//! Core error type, integer wire formats, configuration, and shared
//! constants for the Vassago compression library.
//!
//! Vassago is named after the 3rd spirit of the Ars Goetia, who discovers
//! all things hidden or lost - just as this compressor discovers the
//! hidden repeated structure of integer streams and encodes it away.
//!
//! The compressor re-encodes WASM-style binaries against a learned
//! *abbreviation table*: frequent integer sequences and block events are
//! replaced by short indices, and a generated *filter algorithm* (an
//! s-expression program evaluated by `vassago-interp`) decodes the
//! compressed form back to the original stream.

pub mod error;
pub mod flags;
pub mod format;

pub use error::{Error, Result};
pub use flags::CompressionFlags;
pub use format::{IntFormat, ValueFormat};

// =============================================================================
// Binary magics and versions
// =============================================================================

/// WASM binary magic number (`\0asm`, little-endian).
pub const WASM_BINARY_MAGIC: u32 = 0x6d73_6100;

/// WASM binary version accepted on input.
pub const WASM_BINARY_VERSION: u32 = 0x1;

/// WASM binary version tag carried in generated algorithm headers.
pub const WASM_BINARY_VERSION_D: u32 = 0xd;

/// Magic number of a flattened algorithm artifact (`casm`).
pub const CASM_BINARY_MAGIC: u32 = 0x6d73_6163;

/// Version of the flattened algorithm format.
pub const CASM_BINARY_VERSION: u32 = 0x0;

/// Magic number of the CISM intermediate form (`cism`).
pub const CISM_BINARY_MAGIC: u32 = 0x6d73_6963;

/// Version of the CISM intermediate form.
pub const CISM_BINARY_VERSION: u32 = 0x0;

// =============================================================================
// CISM categorize tags
// =============================================================================

/// CISM tag for a single literal default value.
pub const CISM_DEFAULT_SINGLE: u32 = 16767;

/// CISM tag for a run of literal default values.
pub const CISM_DEFAULT_MULTIPLE: u32 = 16764;

/// CISM tag for a block enter event.
pub const CISM_BLOCK_ENTER: u32 = 16768;

/// CISM tag for a block exit event.
pub const CISM_BLOCK_EXIT: u32 = 16769;

/// CISM tag for an alignment event.
pub const CISM_ALIGN: u32 = 16770;

// =============================================================================
// Interpreter tuning
// =============================================================================

/// Bytes of lookahead the backfilled driver requires before resuming.
///
/// Guarantees several integer reads complete within one resumption.
pub const RESUME_HEADROOM: usize = 100;

/// Initial capacity reserved for the interpreter's frame and value stacks.
pub const DEFAULT_STACK_CAPACITY: usize = 256;

/// Reserve hint for section-name buffers.
pub const MAX_SECTION_NAME_SIZE: usize = 32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_numbers() {
        // `\0asm` and `casm` differ only in the first byte.
        assert_eq!(WASM_BINARY_MAGIC & 0xffff_ff00, CASM_BINARY_MAGIC & 0xffff_ff00);
        assert_eq!(CASM_BINARY_MAGIC & 0xff, b'c' as u32);
        assert_eq!(CISM_BINARY_MAGIC & 0xff, b'c' as u32);
    }

    #[test]
    fn test_cism_tags_distinct() {
        let tags = [
            CISM_DEFAULT_SINGLE,
            CISM_DEFAULT_MULTIPLE,
            CISM_BLOCK_ENTER,
            CISM_BLOCK_EXIT,
            CISM_ALIGN,
        ];
        for (i, a) in tags.iter().enumerate() {
            for b in &tags[i + 1..] {
                assert_ne!(a, b, "categorize tags must be distinct");
            }
        }
    }
}
