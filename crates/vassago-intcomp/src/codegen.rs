//! Abbreviation algorithm synthesis.
//!
//! Turns the assignment set into a filter algorithm any conforming
//! interpreter can evaluate to decode the compressed form. The flat
//! model emits a single `file` function - an unbounded (or, under
//! Huffman coding, count-prefixed) loop dispatching on the abbreviation
//! read. The CISM model instead extends the `cism` base algorithm:
//! renames of its `categorize`/`opcode` definitions, an `opcode`
//! override returning the abbreviation read, and a `categorize` override
//! mapping the five distinguished indices to their CISM tags.

use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::debug;

use vassago_core::{
    CompressionFlags, Error, IntFormat, Result, ValueFormat, CASM_BINARY_MAGIC,
    CASM_BINARY_VERSION, CISM_ALIGN, CISM_BINARY_MAGIC, CISM_BINARY_VERSION, CISM_BLOCK_ENTER,
    CISM_BLOCK_EXIT, CISM_DEFAULT_MULTIPLE, CISM_DEFAULT_SINGLE, WASM_BINARY_MAGIC,
    WASM_BINARY_VERSION_D,
};
use vassago_filt::{IntLit, NodeId, NodeKind, PredefinedSymbol, SymbolTable};

use crate::algorithms;
use crate::huffman::HuffmanNode;
use crate::trie::{CountId, CountKind, CountTrie};

const CATEGORIZE_NAME: &str = "categorize";
const OPCODE_NAME: &str = "opcode";
const OLD_SUFFIX: &str = ".old";

/// Synthesises the decoder/encoder algorithm for an assignment set.
pub struct AbbreviationCodegen<'a> {
    flags: &'a CompressionFlags,
    trie: &'a CountTrie,
    assignments: &'a [CountId],
    encoding_root: Option<&'a HuffmanNode>,
    to_read: bool,
    table: SymbolTable,
}

impl<'a> AbbreviationCodegen<'a> {
    /// Create a generator for one direction (`to_read` builds the
    /// decompressor's algorithm).
    pub fn new(
        flags: &'a CompressionFlags,
        trie: &'a CountTrie,
        assignments: &'a [CountId],
        encoding_root: Option<&'a HuffmanNode>,
        to_read: bool,
    ) -> Self {
        AbbreviationCodegen {
            flags,
            trie,
            assignments,
            encoding_root,
            to_read,
            table: SymbolTable::new(),
        }
    }

    /// Build, install, and return the algorithm's symbol table.
    pub fn generate(mut self) -> Result<SymbolTable> {
        let mut kids: Vec<NodeId> = Vec::new();
        kids.push(self.generate_header(
            NodeKind::SourceHeader,
            CASM_BINARY_MAGIC,
            CASM_BINARY_VERSION,
        ));
        if self.flags.use_cism_model {
            self.table.set_enclosing_scope(Rc::new(algorithms::cism0x0()?));
            if self.to_read {
                kids.push(self.generate_header(
                    NodeKind::ReadHeader,
                    CISM_BINARY_MAGIC,
                    CISM_BINARY_VERSION,
                ));
                kids.push(self.generate_header(
                    NodeKind::WriteHeader,
                    WASM_BINARY_MAGIC,
                    WASM_BINARY_VERSION_D,
                ));
            } else {
                kids.push(self.generate_header(
                    NodeKind::ReadHeader,
                    WASM_BINARY_MAGIC,
                    WASM_BINARY_VERSION_D,
                ));
                kids.push(self.generate_header(
                    NodeKind::WriteHeader,
                    CISM_BINARY_MAGIC,
                    CISM_BINARY_VERSION,
                ));
            }
        } else {
            kids.push(self.generate_header(
                NodeKind::ReadHeader,
                WASM_BINARY_MAGIC,
                WASM_BINARY_VERSION_D,
            ));
        }
        self.generate_functions(&mut kids)?;

        let algorithm = self.table.create(NodeKind::Algorithm, kids);
        self.table.set_algorithm(algorithm);
        self.table.install()?;
        debug!(
            assignments = self.assignments.len(),
            cism = self.flags.use_cism_model,
            to_read = self.to_read,
            "generated abbreviation algorithm"
        );
        Ok(self.table)
    }

    fn generate_header(&mut self, container: NodeKind, magic: u32, version: u32) -> NodeId {
        let magic = self.table.u32_const(magic, ValueFormat::Hexadecimal);
        let version = self.table.u32_const(version, ValueFormat::Hexadecimal);
        self.table.create(container, [magic, version])
    }

    fn generate_functions(&mut self, kids: &mut Vec<NodeId>) -> Result<()> {
        if !self.flags.use_cism_model {
            kids.push(self.generate_start_function()?);
            return Ok(());
        }
        kids.push(self.generate_enclosing_alg("cism"));
        kids.push(self.generate_rename(CATEGORIZE_NAME));
        kids.push(self.generate_rename(OPCODE_NAME));
        kids.push(self.generate_opcode_function()?);
        kids.push(self.generate_categorize_function()?);
        Ok(())
    }

    fn generate_enclosing_alg(&mut self, name: &str) -> NodeId {
        let sym = self.table.get_or_create_symbol(name);
        let sym_node = self.table.symbol_node(sym);
        self.table.create(NodeKind::EnclosingAlgorithms, [sym_node])
    }

    fn generate_rename(&mut self, name: &str) -> NodeId {
        let from = self.table.get_or_create_symbol(name);
        let to = self.table.get_or_create_symbol(&format!("{name}{OLD_SUFFIX}"));
        let from_node = self.table.symbol_node(from);
        let to_node = self.table.symbol_node(to);
        self.table.create(NodeKind::Rename, [from_node, to_node])
    }

    fn generate_opcode_function(&mut self) -> Result<NodeId> {
        let sym = self.table.get_or_create_symbol(OPCODE_NAME);
        let sym_node = self.table.symbol_node(sym);
        let params = self
            .table
            .leaf(NodeKind::ParamValues(IntLit::default_value(0)));
        let body = self.generate_abbreviation_read()?;
        Ok(self.table.create(NodeKind::Define, [sym_node, params, body]))
    }

    fn generate_categorize_function(&mut self) -> Result<NodeId> {
        let sym = self.table.get_or_create_symbol(CATEGORIZE_NAME);
        let sym_node = self.table.symbol_node(sym);
        let params = self
            .table
            .leaf(NodeKind::ParamValues(IntLit::new(1, ValueFormat::Decimal)));
        let selector = self.table.leaf(NodeKind::Param {
            index: IntLit::new(0, ValueFormat::Decimal),
            defining: None,
        });

        let mut categories: BTreeMap<u64, u32> = BTreeMap::new();
        for &nd in self.assignments {
            let index = self.require_index(nd)?;
            let tag = match self.trie.kind(nd) {
                CountKind::DefaultSingle => CISM_DEFAULT_SINGLE,
                CountKind::DefaultMultiple => CISM_DEFAULT_MULTIPLE,
                CountKind::BlockEnter => CISM_BLOCK_ENTER,
                CountKind::BlockExit => CISM_BLOCK_EXIT,
                CountKind::Align => CISM_ALIGN,
                _ => continue,
            };
            categories.insert(u64::from(index), tag);
        }

        let mut map_kids = vec![selector];
        for (index, tag) in categories {
            let key = self.table.u64_const(index, ValueFormat::Decimal);
            let value = self.table.u32_const(tag, ValueFormat::Decimal);
            map_kids.push(self.table.create(NodeKind::Case, [key, value]));
        }
        let map = self.table.create(NodeKind::Map, map_kids);
        Ok(self.table.create(NodeKind::Define, [sym_node, params, map]))
    }

    fn generate_start_function(&mut self) -> Result<NodeId> {
        let file = self.table.predefined(PredefinedSymbol::File);
        let sym_node = self.table.symbol_node(file);
        let params = self
            .table
            .leaf(NodeKind::ParamValues(IntLit::default_value(0)));
        let switch = self.generate_switch_statement()?;
        // Huffman-coded bodies are count-prefixed: trailing pad bits of
        // the final byte must not be mistaken for further symbols.
        let body = if self.encoding_root.is_some() {
            let count_fmt = self.format_node(IntFormat::Varuint32);
            let count = self.table.create(NodeKind::Read, [count_fmt]);
            self.table.create(NodeKind::Loop, [count, switch])
        } else {
            self.table.create(NodeKind::LoopUnbounded, [switch])
        };
        Ok(self.table.create(NodeKind::Define, [sym_node, params, body]))
    }

    fn generate_abbreviation_read(&mut self) -> Result<NodeId> {
        let format = match self.encoding_root {
            Some(root) => {
                let tree = self.generate_huffman_encoding(root);
                self.table.create(NodeKind::BinaryEval, [tree])
            }
            None => self.format_node(self.flags.abbrev_format),
        };
        Ok(if self.to_read {
            self.table.create(NodeKind::Read, [format])
        } else {
            format
        })
    }

    fn generate_huffman_encoding(&mut self, root: &HuffmanNode) -> NodeId {
        match root {
            HuffmanNode::Selector { kid1, kid2, .. } => {
                let kid1 = self.generate_huffman_encoding(kid1);
                let kid2 = self.generate_huffman_encoding(kid2);
                self.table.create(NodeKind::BinarySelect, [kid1, kid2])
            }
            HuffmanNode::Symbol { index, .. } => self.table.leaf(NodeKind::BinaryAccept(
                IntLit::new(u64::from(*index), ValueFormat::Decimal),
            )),
        }
    }

    fn generate_switch_statement(&mut self) -> Result<NodeId> {
        let selector = self.generate_abbreviation_read()?;
        let error = self.table.leaf(NodeKind::Error);
        let mut kids = vec![selector, error];
        for &nd in self.assignments {
            let index = self.require_index(nd)?;
            kids.push(self.generate_case(index, nd)?);
        }
        Ok(self.table.create(NodeKind::Switch, kids))
    }

    fn generate_case(&mut self, index: u32, nd: CountId) -> Result<NodeId> {
        let key = self.table.u64_const(u64::from(index), ValueFormat::Decimal);
        let action = self.generate_action(nd)?;
        Ok(self.table.create(NodeKind::Case, [key, action]))
    }

    fn generate_action(&mut self, nd: CountId) -> Result<NodeId> {
        Ok(match self.trie.kind(nd) {
            CountKind::Int => self.generate_int_lit_action(nd),
            CountKind::BlockEnter => self.generate_block_action(true),
            CountKind::BlockExit => self.generate_block_action(false),
            CountKind::DefaultSingle => self.generate_default_single_action(),
            CountKind::DefaultMultiple => self.generate_default_multiple_action(),
            CountKind::Align => self.generate_align_action(),
            CountKind::Root => self.table.leaf(NodeKind::Error),
        })
    }

    fn generate_use_action(&mut self, sym: PredefinedSymbol) -> NodeId {
        let sym = self.table.predefined(sym);
        let sym_node = self.table.symbol_node(sym);
        let use_node = self.table.create(NodeKind::LiteralActionUse, [sym_node]);
        self.table.create(NodeKind::Callback, [use_node])
    }

    fn generate_block_action(&mut self, enter: bool) -> NodeId {
        let sym = match (enter, self.to_read) {
            (true, true) => PredefinedSymbol::BlockEnter,
            (true, false) => PredefinedSymbol::BlockEnterWriteonly,
            (false, true) => PredefinedSymbol::BlockExit,
            (false, false) => PredefinedSymbol::BlockExitWriteonly,
        };
        self.generate_use_action(sym)
    }

    fn generate_align_action(&mut self) -> NodeId {
        self.generate_use_action(PredefinedSymbol::Align)
    }

    fn generate_default_single_action(&mut self) -> NodeId {
        self.format_node(self.flags.default_format)
    }

    fn generate_default_multiple_action(&mut self) -> NodeId {
        let mut size = self.format_node(self.flags.loop_size_format);
        if self.to_read {
            size = self.table.create(NodeKind::Read, [size]);
        }
        let body = self.generate_default_single_action();
        self.table.create(NodeKind::Loop, [size, body])
    }

    fn generate_int_lit_action(&mut self, nd: CountId) -> NodeId {
        if !self.to_read {
            // The compressor consumes these from the model side.
            return self.table.leaf(NodeKind::Void);
        }
        let format = self.table.leaf(NodeKind::Varuint64NoArgs);
        let mut kids = vec![format];
        for value in self.trie.path(nd) {
            kids.push(self.table.u64_const(value, ValueFormat::Decimal));
        }
        self.table.create(NodeKind::Write, kids)
    }

    fn format_node(&mut self, format: IntFormat) -> NodeId {
        let kind = match format {
            IntFormat::Uint8 => NodeKind::Uint8NoArgs,
            IntFormat::Uint32 => NodeKind::Uint32NoArgs,
            IntFormat::Uint64 => NodeKind::Uint64NoArgs,
            IntFormat::Varint32 => NodeKind::Varint32NoArgs,
            IntFormat::Varint64 => NodeKind::Varint64NoArgs,
            IntFormat::Varuint32 => NodeKind::Varuint32NoArgs,
            IntFormat::Varuint64 => NodeKind::Varuint64NoArgs,
        };
        self.table.leaf(kind)
    }

    fn require_index(&self, nd: CountId) -> Result<u32> {
        self.trie
            .abbrev_index(nd)
            .ok_or_else(|| Error::abbrev_missing("assignment without an index"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vassago_filt::{FlattenAst, InflateAst};
    use vassago_stream::IntStream;

    fn small_model() -> (CountTrie, Vec<CountId>) {
        let mut trie = CountTrie::new();
        let a = trie.lookup(trie.root(), 40);
        let ab = trie.lookup(a, 41);
        for _ in 0..20 {
            trie.increment(a);
            trie.increment(ab);
        }
        let assignments = trie.assign_abbreviations();
        (trie, assignments)
    }

    #[test]
    fn test_flat_algorithm_shape() {
        let flags = CompressionFlags::default();
        let (trie, assignments) = small_model();
        let table = AbbreviationCodegen::new(&flags, &trie, &assignments, None, true)
            .generate()
            .unwrap();

        let file_define = table
            .definition_by_name("file")
            .expect("flat model defines the file function");
        let body = table.kid(file_define, 2).unwrap();
        assert!(matches!(table.kind(body), NodeKind::LoopUnbounded));

        let switch = table.kid(body, 0).unwrap();
        assert!(matches!(table.kind(switch), NodeKind::Switch));
        // Selector, error default, one case per assignment.
        assert_eq!(table.kids(switch).len(), 2 + assignments.len());
    }

    #[test]
    fn test_generated_algorithm_fixed_point() {
        let flags = CompressionFlags::default();
        let (trie, assignments) = small_model();
        let table = AbbreviationCodegen::new(&flags, &trie, &assignments, None, true)
            .generate()
            .unwrap();

        let mut stream = IntStream::new();
        FlattenAst::new(&table, &mut stream).flatten().unwrap();
        let rebuilt = InflateAst::inflate(&stream).unwrap();
        assert!(table.algorithm_eq(&rebuilt));
    }

    #[test]
    fn test_cism_algorithm_has_overrides() {
        let flags = CompressionFlags::default().with_cism_model(true);
        let (trie, assignments) = small_model();
        let table = AbbreviationCodegen::new(&flags, &trie, &assignments, None, true)
            .generate()
            .unwrap();

        assert!(table.definition_by_name(OPCODE_NAME).is_some());
        assert!(table.definition_by_name(CATEGORIZE_NAME).is_some());
        assert!(table.enclosing_scope().is_some());

        // The categorize map carries the five distinguished tags.
        let cat = table.definition_by_name(CATEGORIZE_NAME).unwrap();
        let map = table.kid(cat, 2).unwrap();
        assert!(matches!(table.kind(map), NodeKind::Map));
        assert_eq!(table.kids(map).len(), 1 + 5);
    }

    #[test]
    fn test_cism_algorithm_fixed_point() {
        let flags = CompressionFlags::default().with_cism_model(true);
        let (trie, assignments) = small_model();
        let table = AbbreviationCodegen::new(&flags, &trie, &assignments, None, true)
            .generate()
            .unwrap();

        let mut stream = IntStream::new();
        FlattenAst::new(&table, &mut stream).flatten().unwrap();
        let rebuilt = InflateAst::inflate(&stream).unwrap();
        assert!(table.algorithm_eq(&rebuilt));
    }

    #[test]
    fn test_write_direction_int_actions_are_void() {
        let flags = CompressionFlags::default();
        let (trie, assignments) = small_model();
        let table = AbbreviationCodegen::new(&flags, &trie, &assignments, None, false)
            .generate()
            .unwrap();

        // Every integer-path case action in the write direction is Void.
        let file_define = table.definition_by_name("file").unwrap();
        let body = table.kid(file_define, 2).unwrap();
        let switch = table.kid(body, 0).unwrap();
        let mut saw_void = false;
        for &case in &table.kids(switch)[2..] {
            let action = table.kid(case, 1).unwrap();
            if matches!(table.kind(action), NodeKind::Void) {
                saw_void = true;
            }
        }
        assert!(saw_void, "integer actions compress from the model side");
    }

    #[test]
    fn test_huffman_read_uses_binary_eval() {
        let flags = CompressionFlags::default().with_huffman_encoding(true);
        let (trie, assignments) = small_model();
        let weights: Vec<(u32, u64)> = assignments
            .iter()
            .map(|&id| (trie.abbrev_index(id).unwrap(), trie.count(id).max(1)))
            .collect();
        let tree = crate::huffman::build_encoding(&weights).unwrap();
        let table = AbbreviationCodegen::new(&flags, &trie, &assignments, Some(&tree), true)
            .generate()
            .unwrap();

        // Count-prefixed loop whose switch selector reads the tree.
        let file_define = table.definition_by_name("file").unwrap();
        let body = table.kid(file_define, 2).unwrap();
        assert!(matches!(table.kind(body), NodeKind::Loop));
        let switch = table.kid(body, 1).unwrap();
        let selector = table.kid(switch, 0).unwrap();
        assert!(matches!(table.kind(selector), NodeKind::Read));
        let beval = table.kid(selector, 0).unwrap();
        assert!(matches!(table.kind(beval), NodeKind::BinaryEval));
    }
}
