//! Postorder AST serialization.
//!
//! A filter algorithm is emitted as an integer stream with the opcode
//! *last* for operators (children first) and *first* for integer-valued
//! nodes (payload follows). Header containers flatten into the stream's
//! labelled header region rather than the event sequence. [`InflateAst`]
//! rebuilds the tree with a value stack; a flatten/inflate round trip is
//! structurally identity.

use vassago_core::{Error, IntFormat, Result, ValueFormat};
use vassago_stream::{IntCursor, IntEvent, IntStream};

use crate::node::{
    integer_kind, op_class, opcodes, plain_kind, IntLit, NodeId, NodeKind, OpClass,
};
use crate::symtab::SymbolTable;

/// Serializes an installed algorithm into an [`IntStream`].
pub struct FlattenAst<'a> {
    symtab: &'a SymbolTable,
    out: &'a mut IntStream,
    /// Symbol names indexed within the currently flattening section.
    section_syms: Option<Vec<String>>,
}

impl<'a> FlattenAst<'a> {
    /// Create a flattener writing into `out`.
    pub fn new(symtab: &'a SymbolTable, out: &'a mut IntStream) -> Self {
        FlattenAst {
            symtab,
            out,
            section_syms: None,
        }
    }

    /// Flatten the installed algorithm and freeze the output.
    pub fn flatten(mut self) -> Result<()> {
        let root = self
            .symtab
            .algorithm()
            .ok_or_else(|| Error::schema("flatten without an installed algorithm"))?;
        self.flatten_node(root)?;
        self.out.freeze();
        Ok(())
    }

    fn write(&mut self, value: u64) -> Result<()> {
        self.out.push_value(value)
    }

    fn flatten_node(&mut self, id: NodeId) -> Result<()> {
        let op = self.symtab.kind(id).opcode();
        match op_class(op).expect("arena nodes carry known opcodes") {
            OpClass::Integer => {
                let lit = *self
                    .symtab
                    .kind(id)
                    .int_lit()
                    .ok_or_else(|| Error::schema("integer opcode without payload"))?;
                self.write(u64::from(op))?;
                if lit.is_default {
                    self.write(0)?;
                } else {
                    self.write(u64::from(lit.format.tag()) + 1)?;
                    self.write(lit.value)?;
                }
            }
            OpClass::Fixed(_) => {
                for kid in self.symtab.kids(id).to_vec() {
                    self.flatten_node(kid)?;
                }
                self.write(u64::from(op))?;
            }
            OpClass::Variable => {
                let kids = self.symtab.kids(id).to_vec();
                for kid in &kids {
                    self.flatten_node(*kid)?;
                }
                self.write(u64::from(op))?;
                self.write(kids.len() as u64)?;
            }
            OpClass::Symbol => {
                let sym = match *self.symtab.kind(id) {
                    NodeKind::Symbol(sym) => sym,
                    _ => unreachable!("opcode class symbol"),
                };
                self.write(u64::from(op))?;
                let name = self.symtab.symbol_name(sym).to_owned();
                match &self.section_syms {
                    Some(syms) => {
                        let index = syms
                            .iter()
                            .position(|n| n == &name)
                            .ok_or_else(|| Error::schema("symbol missing from section table"))?;
                        self.write(index as u64)?;
                    }
                    None => {
                        self.write(name.len() as u64)?;
                        for byte in name.bytes() {
                            self.write(u64::from(byte))?;
                        }
                    }
                }
            }
            OpClass::Stream => {
                self.write(u64::from(op))?;
                let encoding = self
                    .symtab
                    .kind(id)
                    .stream_encoding()
                    .ok_or_else(|| Error::schema("stream opcode without encoding"))?;
                self.write(encoding)?;
            }
            OpClass::Header => {
                for kid in self.symtab.kids(id).to_vec() {
                    let kind = self.symtab.kind(kid);
                    let format = kind
                        .header_format()
                        .ok_or_else(|| Error::schema("header kid must pin an integer format"))?;
                    let lit = kind
                        .int_lit()
                        .ok_or_else(|| Error::schema("header kid must be a literal"))?;
                    self.out.push_header(lit.value, format)?;
                }
            }
            OpClass::Section => self.flatten_section(id)?,
            OpClass::Algorithm => {
                // The root's kids appear unlabelled, headers first.
                for kid in self.symtab.kids(id).to_vec() {
                    self.flatten_node(kid)?;
                }
            }
        }
        Ok(())
    }

    fn flatten_section(&mut self, id: NodeId) -> Result<()> {
        self.out.push_event(IntEvent::BlockEnter)?;
        let mut syms = Vec::new();
        self.collect_symbols(id, &mut syms);
        self.write(syms.len() as u64)?;
        for name in &syms {
            self.write(name.len() as u64)?;
            for byte in name.bytes() {
                self.write(u64::from(byte))?;
            }
        }
        let previous = self.section_syms.replace(syms);
        for kid in self.symtab.kids(id).to_vec() {
            self.flatten_node(kid)?;
        }
        self.section_syms = previous;
        self.write(u64::from(opcodes::SECTION))?;
        self.out.push_event(IntEvent::BlockExit)?;
        Ok(())
    }

    fn collect_symbols(&self, id: NodeId, out: &mut Vec<String>) {
        if let NodeKind::Symbol(sym) = self.symtab.kind(id) {
            let name = self.symtab.symbol_name(*sym).to_owned();
            if !out.contains(&name) {
                out.push(name);
            }
        }
        for &kid in self.symtab.kids(id) {
            self.collect_symbols(kid, out);
        }
    }
}

/// Rebuilds an algorithm from its flattened form.
pub struct InflateAst<'a> {
    cursor: IntCursor<'a>,
    table: SymbolTable,
    stack: Vec<NodeId>,
}

impl<'a> InflateAst<'a> {
    /// Create an inflater reading `stream`.
    pub fn new(stream: &'a IntStream) -> Self {
        InflateAst {
            cursor: IntCursor::new(stream),
            table: SymbolTable::new(),
            stack: Vec::new(),
        }
    }

    /// Rebuild and install the algorithm.
    pub fn inflate(stream: &IntStream) -> Result<SymbolTable> {
        InflateAst::new(stream).run()
    }

    fn run(mut self) -> Result<SymbolTable> {
        let headers = self.inflate_headers(stream_headers(&self.cursor))?;
        while !self.cursor.at_end() {
            self.inflate_one()?;
        }
        let mut kids = headers;
        kids.extend(self.stack.drain(..));
        let algorithm = self.table.create(NodeKind::Algorithm, kids);
        self.table.set_algorithm(algorithm);
        self.table.install()?;
        Ok(self.table)
    }

    fn inflate_headers(&mut self, header: Vec<(u64, IntFormat)>) -> Result<Vec<NodeId>> {
        if header.len() % 2 != 0 || header.len() > 6 {
            return Err(Error::schema(format!(
                "header region holds {} values, expected pairs for up to three headers",
                header.len()
            )));
        }
        let containers = [
            NodeKind::SourceHeader,
            NodeKind::ReadHeader,
            NodeKind::WriteHeader,
        ];
        let mut out = Vec::new();
        for (pair, container) in header.chunks(2).zip(containers) {
            let mut kids = Vec::new();
            for &(value, format) in pair {
                kids.push(self.header_const(value, format)?);
            }
            out.push(self.table.create(container, kids));
        }
        Ok(out)
    }

    fn header_const(&mut self, value: u64, format: IntFormat) -> Result<NodeId> {
        let kind = match format {
            IntFormat::Uint8 => NodeKind::U8Const(IntLit::new(value, ValueFormat::Hexadecimal)),
            IntFormat::Uint32 => NodeKind::U32Const(IntLit::new(value, ValueFormat::Hexadecimal)),
            IntFormat::Uint64 => NodeKind::U64Const(IntLit::new(value, ValueFormat::Hexadecimal)),
            IntFormat::Varint32 => NodeKind::I32Const(IntLit::new(value, ValueFormat::Hexadecimal)),
            IntFormat::Varint64 => NodeKind::I64Const(IntLit::new(value, ValueFormat::Hexadecimal)),
            other => {
                return Err(Error::schema(format!(
                    "header value format {} has no literal node",
                    other.name()
                )))
            }
        };
        Ok(self.table.leaf(kind))
    }

    fn read_value(&mut self) -> Result<u64> {
        self.cursor.read()
    }

    fn inflate_one(&mut self) -> Result<()> {
        let raw = self.read_value()?;
        let op = u8::try_from(raw)
            .ok()
            .filter(|&op| op_class(op).is_some())
            .ok_or_else(|| Error::schema(format!("unknown opcode {raw} while inflating")))?;
        match op_class(op).expect("checked above") {
            OpClass::Integer => {
                let tag = self.read_value()?;
                let lit = if tag == 0 {
                    IntLit {
                        value: NodeKind::default_lit_value(op),
                        format: ValueFormat::Decimal,
                        is_default: true,
                    }
                } else {
                    let format = ValueFormat::from_tag((tag - 1) as u8).ok_or_else(|| {
                        Error::schema(format!("bad literal format tag {tag}"))
                    })?;
                    IntLit::new(self.read_value()?, format)
                };
                let kind = integer_kind(op, lit).expect("integer class");
                let id = self.table.leaf(kind);
                self.stack.push(id);
            }
            OpClass::Fixed(arity) => {
                let kids = self.pop_kids(arity, op)?;
                let kind = plain_kind(op).expect("fixed class");
                let id = self.table.create(kind, kids);
                self.stack.push(id);
            }
            OpClass::Variable => {
                let count = self.read_value()? as usize;
                let kids = self.pop_kids(count, op)?;
                let kind = plain_kind(op).expect("variable class");
                let id = self.table.create(kind, kids);
                self.stack.push(id);
            }
            OpClass::Symbol => {
                let len = self.read_value()? as usize;
                let mut name = Vec::with_capacity(len);
                for _ in 0..len {
                    name.push(self.read_value()? as u8);
                }
                let name = String::from_utf8(name)
                    .map_err(|_| Error::schema("symbol name is not UTF-8"))?;
                let sym = self.table.get_or_create_symbol(&name);
                let id = self.table.symbol_node(sym);
                self.stack.push(id);
            }
            OpClass::Stream => {
                let encoding = self.read_value()?;
                let kind = NodeKind::stream_from_encoding(encoding).ok_or_else(|| {
                    Error::schema(format!("bad stream encoding {encoding}"))
                })?;
                let id = self.table.leaf(kind);
                self.stack.push(id);
            }
            OpClass::Header | OpClass::Section | OpClass::Algorithm => {
                return Err(Error::schema(format!(
                    "opcode {op} cannot appear in the event sequence"
                )));
            }
        }
        Ok(())
    }

    fn pop_kids(&mut self, count: usize, op: u8) -> Result<Vec<NodeId>> {
        if self.stack.len() < count {
            return Err(Error::schema(format!(
                "opcode {op} wants {count} kids, stack holds {}",
                self.stack.len()
            )));
        }
        let at = self.stack.len() - count;
        Ok(self.stack.split_off(at))
    }
}

fn stream_headers(cursor: &IntCursor<'_>) -> Vec<(u64, IntFormat)> {
    cursor.stream_header().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symtab::PredefinedSymbol;

    fn build_small_algorithm() -> SymbolTable {
        let mut table = SymbolTable::new();
        let magic = table.u32_const(0x6d73_6163, ValueFormat::Hexadecimal);
        let version = table.u32_const(0, ValueFormat::Hexadecimal);
        let source = table.create(NodeKind::SourceHeader, [magic, version]);

        let rmagic = table.u32_const(0x6d73_6100, ValueFormat::Hexadecimal);
        let rversion = table.u32_const(0xd, ValueFormat::Hexadecimal);
        let read = table.create(NodeKind::ReadHeader, [rmagic, rversion]);

        let file = table.predefined(PredefinedSymbol::File);
        let sym_node = table.symbol_node(file);
        let params = table.leaf(NodeKind::ParamValues(IntLit::default_value(0)));
        let fmt = table.leaf(NodeKind::Varuint32NoArgs);
        let sel = table.create(NodeKind::Read, [fmt]);
        let error = table.leaf(NodeKind::Error);
        let key = table.u64_const(0, ValueFormat::Decimal);
        let action = table.leaf(NodeKind::Varint64NoArgs);
        let case = table.create(NodeKind::Case, [key, action]);
        let switch = table.create(NodeKind::Switch, [sel, error, case]);
        let body = table.create(NodeKind::LoopUnbounded, [switch]);
        let define = table.create(NodeKind::Define, [sym_node, params, body]);

        let algorithm = table.create(NodeKind::Algorithm, [source, read, define]);
        table.set_algorithm(algorithm);
        table.install().unwrap();
        table
    }

    #[test]
    fn test_flatten_inflate_fixed_point() {
        let table = build_small_algorithm();
        let mut stream = IntStream::new();
        FlattenAst::new(&table, &mut stream).flatten().unwrap();

        let rebuilt = InflateAst::inflate(&stream).unwrap();
        assert!(
            table.algorithm_eq(&rebuilt),
            "re-parsed algorithm must equal the original"
        );

        // And a second round produces an identical stream.
        let mut stream2 = IntStream::new();
        FlattenAst::new(&rebuilt, &mut stream2)
            .flatten()
            .unwrap();
        assert_eq!(stream.events(), stream2.events());
        assert_eq!(stream.header(), stream2.header());
    }

    #[test]
    fn test_default_literal_elided() {
        let mut table = SymbolTable::new();
        let params = table.leaf(NodeKind::ParamValues(IntLit::default_value(0)));
        let file = table.predefined(PredefinedSymbol::File);
        let sym = table.symbol_node(file);
        let body = table.leaf(NodeKind::Void);
        let define = table.create(NodeKind::Define, [sym, params, body]);
        let algorithm = table.create(NodeKind::Algorithm, [define]);
        table.set_algorithm(algorithm);
        table.install().unwrap();

        let mut stream = IntStream::new();
        FlattenAst::new(&table, &mut stream).flatten().unwrap();

        // ParamValues in default state flattens as (opcode, 0).
        let values: Vec<u64> = stream.values().collect();
        let pos = values
            .iter()
            .position(|&v| v == u64::from(opcodes::PARAM_VALUES))
            .expect("param values opcode present");
        assert_eq!(values[pos + 1], 0, "default literal must elide its value");
    }

    #[test]
    fn test_inflate_rejects_unknown_opcode() {
        let mut stream = IntStream::new();
        stream.push_value(200).unwrap();
        stream.freeze();
        let err = InflateAst::inflate(&stream).unwrap_err();
        assert_eq!(err.category(), "schema_violation");
    }

    #[test]
    fn test_inflate_rejects_starved_stack() {
        let mut stream = IntStream::new();
        // A lone `Read` operator with no kid on the stack.
        stream.push_value(u64::from(opcodes::READ)).unwrap();
        stream.freeze();
        let err = InflateAst::inflate(&stream).unwrap_err();
        assert_eq!(err.category(), "schema_violation");
    }

    #[test]
    fn test_section_flatten_shape() {
        let mut table = SymbolTable::new();
        let sym = table.get_or_create_symbol("code");
        let sym_node = table.symbol_node(sym);
        let section = table.create(NodeKind::Section, [sym_node]);
        let algorithm = table.create(NodeKind::Algorithm, [section]);
        table.set_algorithm(algorithm);
        table.install().unwrap();

        let mut stream = IntStream::new();
        FlattenAst::new(&table, &mut stream).flatten().unwrap();

        let events = stream.events();
        assert_eq!(events.first(), Some(&IntEvent::BlockEnter));
        assert_eq!(events.last(), Some(&IntEvent::BlockExit));
        // Symbol vector: one name, "code".
        let values: Vec<u64> = stream.values().collect();
        assert_eq!(values[0], 1, "one section symbol");
        assert_eq!(values[1], 4, "name length");
        assert_eq!(&values[2..6], &[99, 111, 100, 101], "name bytes");
    }
}
