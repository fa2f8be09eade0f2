//! # Vassago Intcomp
//!
//! The compression engine: integer-sequence model, abbreviation
//! assignment, greedy rewriting, and algorithm synthesis.
//!
//! Compression flows the parsed integer stream through three writers:
//! a [`CounterWriter`] builds the count-trie, the trie is pruned and its
//! survivors receive dense abbreviation indices, and an
//! [`AbbrevAssignWriter`] replays the stream as those indices (optionally
//! Huffman-coded). An [`AbbreviationCodegen`] then emits the filter
//! algorithm that decodes the scheme - the same operator tree
//! `vassago-interp` evaluates - so the compressed form carries its own
//! decoder as data.
//!
//! [`IntCompressor`] and [`IntDecompressor`] tie the phases together.

pub mod algorithms;
pub mod casm;
pub mod codegen;
pub mod compress;
pub mod counter;
pub mod huffman;
pub mod rewriter;
pub mod trie;

pub use codegen::AbbreviationCodegen;
pub use compress::{Compressed, IntCompressor, IntDecompressor};
pub use counter::CounterWriter;
pub use huffman::{build_encoding, HuffmanCodes, HuffmanNode};
pub use rewriter::AbbrevAssignWriter;
pub use trie::{CountId, CountKind, CountTrie};
