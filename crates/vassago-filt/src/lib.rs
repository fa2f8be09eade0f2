//! # Vassago Filt
//!
//! The filter-algorithm AST: typed tagged-variant nodes in an arena, a
//! symbol table with predefined symbols, and the postorder serialization
//! that turns an installed algorithm into an integer stream (and back).
//!
//! A filter algorithm is data: the compressor synthesises one describing
//! its abbreviation scheme, serializes it with [`FlattenAst`], and any
//! conforming interpreter can reload it with [`InflateAst`] and evaluate
//! it to reproduce the original stream.

pub mod flatten;
pub mod node;
pub mod symtab;

pub use flatten::{FlattenAst, InflateAst};
pub use node::{
    integer_kind, op_class, opcodes, plain_kind, IntLit, Node, NodeId, NodeKind, OpClass,
    StreamKind, StreamType, SymbolId,
};
pub use symtab::{PredefinedSymbol, SymbolTable};
