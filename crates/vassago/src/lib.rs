//! # Vassago
//!
//! Compression of WASM-style binaries against a learned *abbreviation
//! table*, named after the 3rd spirit of the Ars Goetia, who discovers
//! all things hidden or lost.
//!
//! A front end parses the input into an integer stream; a count-trie
//! model discovers frequently occurring integer sequences and structural
//! events; an assignment phase turns the top entries into short
//! abbreviation indices (optionally Huffman-coded); a greedy rewriter
//! re-emits the stream using those indices; and a code generator
//! produces a *filter algorithm* - an operator tree any conforming
//! interpreter can evaluate - that decodes the compressed form back to
//! the original bytes.
//!
//! ## Quick Start
//!
//! ```rust
//! use vassago::{compress, decompress, CompressionFlags};
//!
//! let mut file = Vec::new();
//! file.extend_from_slice(&vassago::WASM_BINARY_MAGIC.to_le_bytes());
//! file.extend_from_slice(&vassago::WASM_BINARY_VERSION.to_le_bytes());
//! file.push(4);
//! file.extend_from_slice(b"code");
//! file.push(6);
//! file.extend_from_slice(&[1, 2, 3, 1, 2, 3]);
//!
//! let flags = CompressionFlags::default();
//! let compressed = compress(&file, &flags).unwrap();
//! let restored = decompress(&compressed.algorithm, &compressed.data, &flags).unwrap();
//! assert_eq!(restored, file);
//! ```
//!
//! ## Crates
//!
//! - `vassago-core` - error type, wire formats, configuration
//! - `vassago-stream` - byte/int streams, cursors, block back-patching
//! - `vassago-filt` - the filter AST, symbol table, flatten/inflate
//! - `vassago-interp` - the interpreter (recursive + backfilled)
//! - `vassago-intcomp` - count-trie, rewriter, Huffman, codegen

pub use vassago_core::{
    CompressionFlags, Error, IntFormat, Result, ValueFormat, CASM_BINARY_MAGIC,
    CASM_BINARY_VERSION, CISM_BINARY_MAGIC, CISM_BINARY_VERSION, WASM_BINARY_MAGIC,
    WASM_BINARY_VERSION,
};
pub use vassago_filt::{
    FlattenAst, InflateAst, NodeId, NodeKind, PredefinedSymbol, SymbolTable,
};
pub use vassago_intcomp::{
    AbbrevAssignWriter, AbbreviationCodegen, Compressed, CountTrie, CounterWriter, IntCompressor,
    IntDecompressor,
};
pub use vassago_interp::{ByteStreamWriter, IntStreamWriter, Interpreter, Writer};
pub use vassago_stream::{ByteReader, ByteStream, ByteWriter, IntCursor, IntEvent, IntStream};

/// Compress `input` with the given flags.
pub fn compress(input: &[u8], flags: &CompressionFlags) -> Result<Compressed> {
    IntCompressor::new(flags.clone()).compress(input)
}

/// Decompress `data` using its CASM `algorithm` artifact.
pub fn decompress(algorithm: &[u8], data: &[u8], flags: &CompressionFlags) -> Result<Vec<u8>> {
    IntDecompressor::new(flags.clone()).decompress(algorithm, data)
}
