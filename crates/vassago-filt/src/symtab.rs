//! Symbol table and node arena.
//!
//! A [`SymbolTable`] owns every node of one filter algorithm, the interned
//! symbols they reference, and the handle to the installed root
//! [`Algorithm`](NodeKind::Algorithm). Installation wires `Define` bodies
//! onto their symbols, resolves `Param` defining symbols, and verifies the
//! structural arity rules; it happens exactly once per table.

use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use vassago_core::{Error, Result, ValueFormat};

use crate::node::{IntLit, Node, NodeId, NodeKind, SymbolId};

/// The fixed enumeration of predefined symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredefinedSymbol {
    /// Entry point of a file algorithm.
    File,
    /// Enter a framed block on both cursors.
    BlockEnter,
    /// Exit a framed block on both cursors.
    BlockExit,
    /// Enter a framed block on the write cursor only.
    BlockEnterWriteonly,
    /// Exit a framed block on the write cursor only.
    BlockExitWriteonly,
    /// Align both cursors to a byte boundary.
    Align,
}

impl PredefinedSymbol {
    /// All predefined symbols, in interning order.
    pub const ALL: [PredefinedSymbol; 6] = [
        PredefinedSymbol::File,
        PredefinedSymbol::BlockEnter,
        PredefinedSymbol::BlockExit,
        PredefinedSymbol::BlockEnterWriteonly,
        PredefinedSymbol::BlockExitWriteonly,
        PredefinedSymbol::Align,
    ];

    /// Canonical name of the symbol.
    pub fn name(self) -> &'static str {
        match self {
            PredefinedSymbol::File => "file",
            PredefinedSymbol::BlockEnter => "block.enter",
            PredefinedSymbol::BlockExit => "block.exit",
            PredefinedSymbol::BlockEnterWriteonly => "block.enter.writeonly",
            PredefinedSymbol::BlockExitWriteonly => "block.exit.writeonly",
            PredefinedSymbol::Align => "align",
        }
    }

    /// Look up a predefined symbol by name.
    pub fn from_name(name: &str) -> Option<PredefinedSymbol> {
        PredefinedSymbol::ALL.into_iter().find(|p| p.name() == name)
    }
}

#[derive(Debug, Default, Clone)]
struct SymbolData {
    definition: Option<NodeId>,
}

/// Owner of one algorithm's nodes and symbols.
#[derive(Debug, Default)]
pub struct SymbolTable {
    nodes: Vec<Node>,
    symbols: IndexMap<String, SymbolData>,
    algorithm: Option<NodeId>,
    enclosing: Option<Rc<SymbolTable>>,
    installed: bool,
}

impl SymbolTable {
    /// Create a table with the predefined symbols interned.
    pub fn new() -> Self {
        let mut table = SymbolTable::default();
        for sym in PredefinedSymbol::ALL {
            table.get_or_create_symbol(sym.name());
        }
        table
    }

    // -------------------------------------------------------------------------
    // Node arena
    // -------------------------------------------------------------------------

    /// Create a node with the given children.
    pub fn create(&mut self, kind: NodeKind, kids: impl IntoIterator<Item = NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            kids: kids.into_iter().collect::<SmallVec<[NodeId; 4]>>(),
        });
        id
    }

    /// Create a leaf node.
    pub fn leaf(&mut self, kind: NodeKind) -> NodeId {
        self.create(kind, [])
    }

    /// Borrow a node.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    /// Borrow a node's kind.
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    /// Borrow a node's children.
    pub fn kids(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).kids
    }

    /// Child `index` of `id`, checked.
    pub fn kid(&self, id: NodeId, index: usize) -> Result<NodeId> {
        self.kids(id).get(index).copied().ok_or_else(|| {
            Error::schema(format!(
                "node opcode {} has no kid {}",
                self.kind(id).opcode(),
                index
            ))
        })
    }

    /// Number of nodes in the arena.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // -------------------------------------------------------------------------
    // Literal factories
    // -------------------------------------------------------------------------

    /// Create a `U8Const` literal.
    pub fn u8_const(&mut self, value: u8, format: ValueFormat) -> NodeId {
        self.leaf(NodeKind::U8Const(IntLit::new(u64::from(value), format)))
    }

    /// Create a `U32Const` literal.
    pub fn u32_const(&mut self, value: u32, format: ValueFormat) -> NodeId {
        self.leaf(NodeKind::U32Const(IntLit::new(u64::from(value), format)))
    }

    /// Create a `U64Const` literal.
    pub fn u64_const(&mut self, value: u64, format: ValueFormat) -> NodeId {
        self.leaf(NodeKind::U64Const(IntLit::new(value, format)))
    }

    /// Create an `I64Const` literal.
    pub fn i64_const(&mut self, value: i64, format: ValueFormat) -> NodeId {
        self.leaf(NodeKind::I64Const(IntLit::new(value as u64, format)))
    }

    // -------------------------------------------------------------------------
    // Symbols
    // -------------------------------------------------------------------------

    /// Intern `name`, returning its symbol handle.
    pub fn get_or_create_symbol(&mut self, name: &str) -> SymbolId {
        if let Some(index) = self.symbols.get_index_of(name) {
            return SymbolId(index as u32);
        }
        let (index, _) = self
            .symbols
            .insert_full(name.to_owned(), SymbolData::default());
        SymbolId(index as u32)
    }

    /// Look up an already-interned symbol.
    pub fn symbol(&self, name: &str) -> Option<SymbolId> {
        self.symbols.get_index_of(name).map(|i| SymbolId(i as u32))
    }

    /// Handle of a predefined symbol.
    pub fn predefined(&self, sym: PredefinedSymbol) -> SymbolId {
        // Interned by `new` in `ALL` order.
        SymbolId(
            PredefinedSymbol::ALL
                .iter()
                .position(|p| *p == sym)
                .expect("predefined symbol in ALL") as u32,
        )
    }

    /// Name of a symbol.
    pub fn symbol_name(&self, sym: SymbolId) -> &str {
        self.symbols
            .get_index(sym.0 as usize)
            .map(|(name, _)| name.as_str())
            .unwrap_or("")
    }

    /// Predefined meaning of a symbol, if it has one.
    pub fn predefined_of(&self, sym: SymbolId) -> Option<PredefinedSymbol> {
        PredefinedSymbol::from_name(self.symbol_name(sym))
    }

    /// The `Define` body installed for a symbol, local scope only.
    pub fn definition(&self, sym: SymbolId) -> Option<NodeId> {
        self.symbols
            .get_index(sym.0 as usize)
            .and_then(|(_, data)| data.definition)
    }

    /// The `Define` body installed for `name`, local scope only.
    pub fn definition_by_name(&self, name: &str) -> Option<NodeId> {
        self.symbol(name).and_then(|sym| self.definition(sym))
    }

    /// Create a `Symbol` reference node.
    pub fn symbol_node(&mut self, sym: SymbolId) -> NodeId {
        self.leaf(NodeKind::Symbol(sym))
    }

    /// Set the enclosing scope (CISM model).
    pub fn set_enclosing_scope(&mut self, enclosing: Rc<SymbolTable>) {
        self.enclosing = Some(enclosing);
    }

    /// The enclosing scope, if any.
    pub fn enclosing_scope(&self) -> Option<&Rc<SymbolTable>> {
        self.enclosing.as_ref()
    }

    // -------------------------------------------------------------------------
    // Installation
    // -------------------------------------------------------------------------

    /// Set the root algorithm node.
    pub fn set_algorithm(&mut self, algorithm: NodeId) {
        self.algorithm = Some(algorithm);
    }

    /// The installed root algorithm.
    pub fn algorithm(&self) -> Option<NodeId> {
        self.algorithm
    }

    /// Whether `install` has run.
    pub fn is_installed(&self) -> bool {
        self.installed
    }

    /// Install the algorithm: wire definitions, resolve parameter
    /// defining symbols, verify arities. Runs exactly once.
    pub fn install(&mut self) -> Result<()> {
        if self.installed {
            return Err(Error::schema("symbol table already installed"));
        }
        let algorithm = self
            .algorithm
            .ok_or_else(|| Error::schema("install without an algorithm"))?;

        self.verify_arities()?;

        let kids: Vec<NodeId> = self.kids(algorithm).to_vec();
        for kid in kids {
            if let NodeKind::Define = self.kind(kid) {
                let sym_node = self.kid(kid, 0)?;
                let sym = match *self.kind(sym_node) {
                    NodeKind::Symbol(sym) => sym,
                    _ => return Err(Error::schema("define kid 0 must be a symbol")),
                };
                let body = self.kid(kid, 2)?;
                if let Some((_, data)) = self.symbols.get_index_mut(sym.0 as usize) {
                    data.definition = Some(kid);
                }
                self.resolve_params(body, sym);
            }
        }
        self.installed = true;
        Ok(())
    }

    fn resolve_params(&mut self, root: NodeId, sym: SymbolId) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let NodeKind::Param { defining, .. } = &mut self.nodes[id.0 as usize].kind {
                if defining.is_none() {
                    *defining = Some(sym);
                }
            }
            stack.extend(self.kids(id).iter().copied());
        }
    }

    fn verify_arities(&self) -> Result<()> {
        for node in &self.nodes {
            let got = node.kids.len();
            let want: Option<usize> = match node.kind {
                NodeKind::Define => Some(3),
                NodeKind::Case | NodeKind::Rename | NodeKind::Loop => Some(2),
                NodeKind::IfThenElse => Some(3),
                NodeKind::IfThen | NodeKind::And | NodeKind::Or | NodeKind::BinarySelect => Some(2),
                NodeKind::Read
                | NodeKind::Peek
                | NodeKind::Not
                | NodeKind::Callback
                | NodeKind::LiteralActionUse
                | NodeKind::BinaryEval
                | NodeKind::Block
                | NodeKind::EnclosingAlgorithms => Some(1),
                NodeKind::Eval | NodeKind::Map | NodeKind::Opcode => {
                    if got < 1 {
                        return Err(Error::schema(format!(
                            "opcode {} requires at least one kid",
                            node.kind.opcode()
                        )));
                    }
                    None
                }
                NodeKind::Switch => {
                    if got < 2 {
                        return Err(Error::schema("switch requires selector and default"));
                    }
                    None
                }
                NodeKind::Write => {
                    if got < 1 {
                        return Err(Error::schema("write requires a destination"));
                    }
                    None
                }
                _ => None,
            };
            if let Some(want) = want {
                if got != want {
                    return Err(Error::schema(format!(
                        "opcode {} expects {} kids, found {}",
                        node.kind.opcode(),
                        want,
                        got
                    )));
                }
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Structural equality
    // -------------------------------------------------------------------------

    /// Structural equality of two subtrees, possibly across tables.
    ///
    /// Symbols compare by name; integer nodes by opcode, value, format,
    /// and default state; everything else by opcode and kid order.
    pub fn subtree_eq(&self, id: NodeId, other: &SymbolTable, other_id: NodeId) -> bool {
        let a = self.node(id);
        let b = other.node(other_id);
        if a.kind.opcode() != b.kind.opcode() || a.kids.len() != b.kids.len() {
            return false;
        }
        let payload_eq = match (&a.kind, &b.kind) {
            (NodeKind::Symbol(x), NodeKind::Symbol(y)) => {
                self.symbol_name(*x) == other.symbol_name(*y)
            }
            (NodeKind::Stream { .. }, NodeKind::Stream { .. }) => {
                a.kind.stream_encoding() == b.kind.stream_encoding()
            }
            _ => match (a.kind.int_lit(), b.kind.int_lit()) {
                (Some(x), Some(y)) => x == y,
                (None, None) => true,
                _ => false,
            },
        };
        if !payload_eq {
            return false;
        }
        a.kids
            .iter()
            .zip(b.kids.iter())
            .all(|(&ka, &kb)| self.subtree_eq(ka, other, kb))
    }

    /// Structural equality of two installed algorithms.
    pub fn algorithm_eq(&self, other: &SymbolTable) -> bool {
        match (self.algorithm, other.algorithm) {
            (Some(a), Some(b)) => self.subtree_eq(a, other, b),
            (None, None) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predefined_symbols_interned() {
        let table = SymbolTable::new();
        for sym in PredefinedSymbol::ALL {
            let id = table.symbol(sym.name()).expect("predefined interned");
            assert_eq!(table.predefined(sym), id);
            assert_eq!(table.predefined_of(id), Some(sym));
        }
    }

    #[test]
    fn test_install_wires_definitions() {
        let mut table = SymbolTable::new();
        let file = table.predefined(PredefinedSymbol::File);
        let sym_node = table.symbol_node(file);
        let params = table.leaf(NodeKind::ParamValues(IntLit::new(0, ValueFormat::Decimal)));
        let body = table.leaf(NodeKind::Void);
        let define = table.create(NodeKind::Define, [sym_node, params, body]);
        let algorithm = table.create(NodeKind::Algorithm, [define]);
        table.set_algorithm(algorithm);
        table.install().unwrap();

        assert_eq!(table.definition(file), Some(define));
        assert!(table.install().is_err(), "install must run exactly once");
    }

    #[test]
    fn test_install_rejects_bad_define_arity() {
        let mut table = SymbolTable::new();
        let file = table.predefined(PredefinedSymbol::File);
        let sym_node = table.symbol_node(file);
        let body = table.leaf(NodeKind::Void);
        let define = table.create(NodeKind::Define, [sym_node, body]);
        let algorithm = table.create(NodeKind::Algorithm, [define]);
        table.set_algorithm(algorithm);
        let err = table.install().unwrap_err();
        assert_eq!(err.category(), "schema_violation");
    }

    #[test]
    fn test_param_resolution() {
        let mut table = SymbolTable::new();
        let sym = table.get_or_create_symbol("categorize");
        let sym_node = table.symbol_node(sym);
        let params = table.leaf(NodeKind::ParamValues(IntLit::new(1, ValueFormat::Decimal)));
        let param = table.leaf(NodeKind::Param {
            index: IntLit::new(0, ValueFormat::Decimal),
            defining: None,
        });
        let define = table.create(NodeKind::Define, [sym_node, params, param]);
        let algorithm = table.create(NodeKind::Algorithm, [define]);
        table.set_algorithm(algorithm);
        table.install().unwrap();

        match table.kind(param) {
            NodeKind::Param { defining, .. } => assert_eq!(*defining, Some(sym)),
            other => panic!("expected param, found {other:?}"),
        }
    }

    #[test]
    fn test_subtree_eq_by_name_across_tables() {
        let mut a = SymbolTable::new();
        let mut b = SymbolTable::new();
        // Intern an extra symbol in `b` first so raw ids differ.
        b.get_or_create_symbol("padding");

        let sa = a.get_or_create_symbol("opcode");
        let sb = b.get_or_create_symbol("opcode");
        let na = a.symbol_node(sa);
        let nb = b.symbol_node(sb);
        assert!(a.subtree_eq(na, &b, nb));

        let ca = a.u64_const(3, ValueFormat::Decimal);
        let cb = b.u64_const(4, ValueFormat::Decimal);
        assert!(!a.subtree_eq(ca, &b, cb));
    }
}
