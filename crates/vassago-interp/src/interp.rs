//! The filter-algorithm interpreter.
//!
//! Evaluates a tree of operator nodes against a byte read cursor and a
//! [`Writer`], mirroring every consumed value to the output. Leaf reads
//! and writes run through an explicit frame stack so evaluation can
//! suspend when the producer has not buffered enough input yet
//! ([`Interpreter::run_methods`] resumes it); the recursive `eval` path
//! drives the same frames and yields identical observable effects.

use tracing::debug;

use vassago_core::{
    Error, IntFormat, Result, DEFAULT_STACK_CAPACITY, MAX_SECTION_NAME_SIZE, RESUME_HEADROOM,
    WASM_BINARY_MAGIC, WASM_BINARY_VERSION,
};
use vassago_filt::{NodeId, NodeKind, PredefinedSymbol, StreamKind, SymbolTable};
use vassago_stream::ByteReader;

use crate::writer::Writer;

/// What a suspended frame is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InterpMethod {
    Read,
    Write,
}

/// Progress of a frame through its operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InterpState {
    Enter,
    Exit,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    method: InterpMethod,
    state: InterpState,
    nd: NodeId,
}

/// Evaluates filter algorithms over a byte reader and a writer.
pub struct Interpreter<'a> {
    symtab: &'a SymbolTable,
    reader: ByteReader,
    writer: Box<dyn Writer + 'a>,
    /// Most recently read value; saved and restored around `Peek`.
    last_read: u64,
    eval_stack: Vec<NodeId>,
    frames: Vec<Frame>,
    param_stack: Vec<u64>,
    return_stack: Vec<u64>,
    failed: bool,
    cur_section_name: String,
}

impl<'a> Interpreter<'a> {
    /// Create an interpreter over `reader`, producing into `writer`.
    pub fn new(symtab: &'a SymbolTable, reader: ByteReader, writer: Box<dyn Writer + 'a>) -> Self {
        Interpreter {
            symtab,
            reader,
            writer,
            last_read: 0,
            eval_stack: Vec::with_capacity(DEFAULT_STACK_CAPACITY),
            frames: Vec::with_capacity(DEFAULT_STACK_CAPACITY),
            param_stack: Vec::with_capacity(DEFAULT_STACK_CAPACITY),
            return_stack: Vec::with_capacity(DEFAULT_STACK_CAPACITY),
            failed: false,
            cur_section_name: String::with_capacity(MAX_SECTION_NAME_SIZE),
        }
    }

    /// The most recently read value.
    pub fn last_read(&self) -> u64 {
        self.last_read
    }

    /// Borrow the read cursor.
    pub fn reader(&self) -> &ByteReader {
        &self.reader
    }

    /// Reclaim the read cursor (the caller continues driving the file).
    pub fn into_reader(self) -> ByteReader {
        self.reader
    }

    /// Borrow the writer.
    pub fn writer_mut(&mut self) -> &mut (dyn Writer + 'a) {
        &mut *self.writer
    }

    // -------------------------------------------------------------------------
    // Backfilled frame driver
    // -------------------------------------------------------------------------

    /// Whether enough input is buffered to make progress.
    ///
    /// A frozen stream always has headroom (reads fail loudly at true
    /// EOF); an unfrozen stream must hold `RESUME_HEADROOM` bytes past
    /// the cursor.
    pub fn has_enough_headroom(&self) -> bool {
        self.reader.is_frozen() || self.reader.pos() + RESUME_HEADROOM <= self.reader.stream_len()
    }

    /// Whether suspended frames are waiting on more input.
    pub fn needs_more_input(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Begin a resumable read of `nd`.
    pub fn start_read(&mut self, nd: NodeId) {
        self.frames.push(Frame {
            method: InterpMethod::Read,
            state: InterpState::Enter,
            nd,
        });
    }

    /// Run suspended frames while headroom allows.
    pub fn run_methods(&mut self) -> Result<()> {
        self.run_until(0)
    }

    /// Take the result of a completed read.
    pub fn finish_read(&mut self) -> Result<u64> {
        if self.needs_more_input() {
            return Err(Error::stream("read still suspended"));
        }
        self.return_stack
            .pop()
            .ok_or_else(|| Error::stream("no completed read to finish"))
    }

    fn run_until(&mut self, depth: usize) -> Result<()> {
        if self.failed {
            return Err(Error::Cancelled { live_frames: 0 });
        }
        while self.frames.len() > depth && self.has_enough_headroom() {
            if let Err(err) = self.step() {
                self.fail();
                return Err(err);
            }
        }
        Ok(())
    }

    /// Unwind every live frame and poison the interpreter.
    pub fn fail(&mut self) {
        self.frames.clear();
        self.param_stack.clear();
        self.return_stack.clear();
        self.failed = true;
    }

    fn step(&mut self) -> Result<()> {
        let frame = *self.frames.last().expect("step with a live frame");
        match frame.method {
            InterpMethod::Read => {
                let value = self.exec_read(frame.nd)?;
                self.frames.pop();
                self.return_stack.push(value);
            }
            InterpMethod::Write => self.step_write(frame)?,
        }
        Ok(())
    }

    fn step_write(&mut self, frame: Frame) -> Result<()> {
        let kind = self.symtab.kind(frame.nd).clone();
        // A parameter write resolves the argument and forwards the value
        // through it: Enter pushes the resolved frame (the value stays on
        // the param stack for it), Exit retires this frame.
        if let NodeKind::Param { .. } = kind {
            match frame.state {
                InterpState::Enter => {
                    let resolved = self.get_param(frame.nd)?;
                    let top = self.frames.len() - 1;
                    self.frames[top].state = InterpState::Exit;
                    self.frames.push(Frame {
                        method: InterpMethod::Write,
                        state: InterpState::Enter,
                        nd: resolved,
                    });
                }
                InterpState::Exit => {
                    self.frames.pop();
                }
            }
            return Ok(());
        }
        let value = *self
            .param_stack
            .last()
            .ok_or_else(|| Error::stream("write frame without a value"))?;
        match kind {
            NodeKind::Opcode => {
                let (case, sel_shift, case_mask) = self.get_write_case(frame.nd, value)?;
                let selector = self.symtab.kid(frame.nd, 0)?;
                self.write_nested(value >> sel_shift, selector)?;
                if let Some(case) = case {
                    let action = self.symtab.kid(case, 1)?;
                    self.write_nested(value & case_mask, action)?;
                }
                self.finish_write_frame(value);
            }
            _ => {
                self.exec_write_leaf(&kind, value)?;
                self.finish_write_frame(value);
            }
        }
        Ok(())
    }

    fn finish_write_frame(&mut self, value: u64) {
        self.param_stack.pop();
        self.return_stack.push(value);
        self.frames.pop();
    }

    fn exec_write_leaf(&mut self, kind: &NodeKind, value: u64) -> Result<()> {
        if let Some(bits) = kind.one_arg_bits() {
            return self.writer.write_bits(value, bits);
        }
        if let Some(format) = kind.io_format() {
            return self.writer.write_value(value, format);
        }
        match kind {
            // Pass-through targets: the value was produced elsewhere.
            NodeKind::I32Const(_)
            | NodeKind::I64Const(_)
            | NodeKind::U8Const(_)
            | NodeKind::U32Const(_)
            | NodeKind::U64Const(_)
            | NodeKind::Map
            | NodeKind::Peek
            | NodeKind::Void
            | NodeKind::LastRead
            | NodeKind::BinaryEval => Ok(()),
            NodeKind::Eval => Err(Error::schema("write through eval is not supported")),
            other => Err(Error::schema(format!(
                "write not implemented for opcode {}",
                other.opcode()
            ))),
        }
    }

    /// Blocking read of `nd` (fails rather than suspending).
    pub fn read(&mut self, nd: NodeId) -> Result<u64> {
        let depth = self.frames.len();
        self.start_read(nd);
        self.run_until(depth)?;
        if self.frames.len() > depth {
            self.fail();
            return Err(Error::stream("interpreter starved mid-read"));
        }
        self.return_stack
            .pop()
            .ok_or_else(|| Error::stream("read produced no value"))
    }

    /// Blocking write of `value` through `nd`.
    pub fn write(&mut self, value: u64, nd: NodeId) -> Result<u64> {
        let depth = self.frames.len();
        self.param_stack.push(value);
        self.frames.push(Frame {
            method: InterpMethod::Write,
            state: InterpState::Enter,
            nd,
        });
        self.run_until(depth)?;
        if self.frames.len() > depth {
            self.fail();
            return Err(Error::stream("interpreter starved mid-write"));
        }
        let returned = self
            .return_stack
            .pop()
            .ok_or_else(|| Error::stream("write produced no value"))?;
        debug_assert_eq!(returned, value);
        Ok(returned)
    }

    fn write_nested(&mut self, value: u64, nd: NodeId) -> Result<u64> {
        self.write(value, nd)
    }

    // -------------------------------------------------------------------------
    // Read execution
    // -------------------------------------------------------------------------

    fn exec_read(&mut self, nd: NodeId) -> Result<u64> {
        let kind = self.symtab.kind(nd).clone();
        if let Some(bits) = kind.one_arg_bits() {
            let raw = self.reader.read_bits(bits)?;
            let value = match kind.io_format() {
                Some(IntFormat::Varint32) | Some(IntFormat::Varint64) => sign_extend(raw, bits),
                _ => raw,
            };
            self.last_read = value;
            return Ok(value);
        }
        match kind {
            NodeKind::I32Const(lit)
            | NodeKind::I64Const(lit)
            | NodeKind::U8Const(lit)
            | NodeKind::U32Const(lit)
            | NodeKind::U64Const(lit)
            | NodeKind::BinaryAccept(lit)
            | NodeKind::ParamValues(lit) => Ok(lit.value),
            NodeKind::Uint8NoArgs => self.read_leaf(|r| r.read_u8().map(u64::from)),
            NodeKind::Uint32NoArgs => self.read_leaf(ByteReader::read_u32),
            NodeKind::Uint64NoArgs => self.read_leaf(ByteReader::read_u64),
            NodeKind::Varint32NoArgs => self.read_leaf(ByteReader::read_varint32),
            NodeKind::Varint64NoArgs => self.read_leaf(ByteReader::read_varint64),
            NodeKind::Varuint32NoArgs => self.read_leaf(ByteReader::read_varuint32),
            NodeKind::Varuint64NoArgs => self.read_leaf(ByteReader::read_varuint64),
            NodeKind::LastRead => Ok(self.last_read),
            NodeKind::Void => Ok(0),
            NodeKind::Peek => {
                let saved_last = self.last_read;
                self.reader.push_peek_pos();
                let kid = self.symtab.kid(nd, 0)?;
                let result = self.read(kid);
                self.reader.pop_peek_pos()?;
                self.last_read = saved_last;
                result
            }
            NodeKind::Read => {
                let kid = self.symtab.kid(nd, 0)?;
                self.read(kid)
            }
            NodeKind::BinaryEval => self.read_binary_eval(nd),
            NodeKind::Map => self.read_map(nd),
            NodeKind::Opcode => self.read_opcode_node(nd, 0, false),
            NodeKind::Param { .. } => {
                let resolved = self.get_param(nd)?;
                self.read(resolved)
            }
            NodeKind::Eval => {
                let body = self.callee_body(nd)?;
                self.eval_stack.push(nd);
                let result = self.read(body);
                self.eval_stack.pop();
                result
            }
            other => Err(Error::schema(format!(
                "read not implemented for opcode {}",
                other.opcode()
            ))),
        }
    }

    fn read_leaf(&mut self, op: impl FnOnce(&mut ByteReader) -> Result<u64>) -> Result<u64> {
        let value = op(&mut self.reader)?;
        self.last_read = value;
        Ok(value)
    }

    fn read_binary_eval(&mut self, nd: NodeId) -> Result<u64> {
        let mut node = self.symtab.kid(nd, 0)?;
        loop {
            match self.symtab.kind(node) {
                NodeKind::BinarySelect => {
                    let bit = self.reader.read_bits(1)?;
                    node = self.symtab.kid(node, bit as usize)?;
                }
                NodeKind::BinaryAccept(lit) => {
                    let value = lit.value;
                    self.last_read = value;
                    return Ok(value);
                }
                other => {
                    return Err(Error::schema(format!(
                        "opcode {} inside a binary tree",
                        other.opcode()
                    )))
                }
            }
        }
    }

    fn read_map(&mut self, nd: NodeId) -> Result<u64> {
        let selector = self.symtab.kid(nd, 0)?;
        let key = self.eval(selector)?;
        match self.find_case_from(nd, 1, key)? {
            Some(case) => {
                let value = self.symtab.kid(case, 1)?;
                self.read(value)
            }
            // Unmapped keys pass through unchanged.
            None => Ok(key),
        }
    }

    // -------------------------------------------------------------------------
    // Opcode assembly
    // -------------------------------------------------------------------------

    /// Static selector bitsize of `nd` per the opcode rule: `UintK` reads
    /// carry their width, `Eval` delegates to its definition, and
    /// everything else contributes no continuation bits.
    fn opcode_bitsize(&self, nd: NodeId) -> Result<u32> {
        Ok(match self.symtab.kind(nd) {
            NodeKind::Uint8NoArgs => 8,
            NodeKind::Uint32NoArgs => 32,
            NodeKind::Uint64NoArgs => 64,
            kind @ (NodeKind::Uint8OneArg(_)
            | NodeKind::Uint32OneArg(_)
            | NodeKind::Uint64OneArg(_)) => kind.one_arg_bits().expect("one-arg payload"),
            NodeKind::Eval => {
                let body = self.callee_body(nd)?;
                self.opcode_bitsize(body)?
            }
            _ => 0,
        })
    }

    fn read_opcode_selector(&mut self, nd: NodeId) -> Result<(u64, u32)> {
        let bits = self.opcode_bitsize(nd)?;
        let value = match self.symtab.kind(nd) {
            NodeKind::Eval => {
                let body = self.callee_body(nd)?;
                return self.read_opcode_selector(body);
            }
            _ => self.read(nd)?,
        };
        Ok((value, bits))
    }

    fn read_opcode_node(&mut self, nd: NodeId, prefix: u64, has_prefix: bool) -> Result<u64> {
        let selector = self.symtab.kid(nd, 0)?;
        let (mut value, bits) = self.read_opcode_selector(selector)?;
        if has_prefix {
            if !(1..=63).contains(&bits) {
                return Err(Error::opcode_bitsize(bits));
            }
            value |= prefix << bits;
        }
        self.last_read = value;
        if let Some(case) = self.find_case_from(nd, 1, value)? {
            let action = self.symtab.kid(case, 1)?;
            value = match self.symtab.kind(action) {
                NodeKind::Opcode => self.read_opcode_node(action, value, true)?,
                _ => {
                    let (cont, cont_bits) = self.read_opcode_selector(action)?;
                    if !(1..=63).contains(&cont_bits) {
                        return Err(Error::opcode_bitsize(cont_bits));
                    }
                    let assembled = (value << cont_bits) | cont;
                    self.last_read = assembled;
                    assembled
                }
            };
        }
        Ok(value)
    }

    /// The matching write case plus `(sel_shift, case_mask)`.
    fn get_write_case(&self, nd: NodeId, value: u64) -> Result<(Option<NodeId>, u32, u64)> {
        for &case in &self.symtab.kids(nd)[1..] {
            let key = self.case_key(case)?;
            let action = self.symtab.kid(case, 1)?;
            let bits = self.opcode_bitsize(action)?;
            if !(1..=63).contains(&bits) {
                continue;
            }
            let mask = (1u64 << bits) - 1;
            if value >> bits == key {
                return Ok((Some(case), bits, mask));
            }
        }
        Ok((None, 0, 0))
    }

    // -------------------------------------------------------------------------
    // Cases and parameters
    // -------------------------------------------------------------------------

    fn case_key(&self, case: NodeId) -> Result<u64> {
        let key_node = self.symtab.kid(case, 0)?;
        self.symtab
            .kind(key_node)
            .int_lit()
            .map(|lit| lit.value)
            .ok_or_else(|| Error::schema("case key must be an integer literal"))
    }

    fn find_case_from(&self, nd: NodeId, first: usize, key: u64) -> Result<Option<NodeId>> {
        for &kid in &self.symtab.kids(nd)[first..] {
            if matches!(self.symtab.kind(kid), NodeKind::Case) && self.case_key(kid)? == key {
                return Ok(Some(kid));
            }
        }
        Ok(None)
    }

    /// Resolve a `Param` against the innermost matching call frame.
    fn get_param(&self, nd: NodeId) -> Result<NodeId> {
        let (index, defining) = match self.symtab.kind(nd) {
            NodeKind::Param { index, defining } => (index.value, *defining),
            _ => return Err(Error::schema("parameter accessor expected")),
        };
        let defining =
            defining.ok_or_else(|| Error::schema("parameter with no defining symbol"))?;
        // Kid 0 of the caller is the callee symbol, so argument i is kid i+1.
        let arg_index = index as usize + 1;
        for &caller in self.eval_stack.iter().rev() {
            let callee = match *self.symtab.kind(self.symtab.kid(caller, 0)?) {
                NodeKind::Symbol(sym) => sym,
                _ => continue,
            };
            if callee != defining {
                continue;
            }
            if arg_index < self.symtab.kids(caller).len() {
                return Ok(self.symtab.kids(caller)[arg_index]);
            }
        }
        Err(Error::schema(
            "no call frame matches the parameter reference",
        ))
    }

    /// The body of the definition an `Eval` node calls.
    fn callee_body(&self, eval_nd: NodeId) -> Result<NodeId> {
        let sym_node = self.symtab.kid(eval_nd, 0)?;
        let sym = match *self.symtab.kind(sym_node) {
            NodeKind::Symbol(sym) => sym,
            _ => return Err(Error::schema("eval kid 0 must be a symbol")),
        };
        let define = self.symtab.definition(sym).ok_or_else(|| {
            Error::schema(format!(
                "no definition for symbol '{}'",
                self.symtab.symbol_name(sym)
            ))
        })?;
        self.symtab.kid(define, 2)
    }

    // -------------------------------------------------------------------------
    // Recursive evaluation
    // -------------------------------------------------------------------------

    /// Evaluate `nd`, returning its value.
    pub fn eval(&mut self, nd: NodeId) -> Result<u64> {
        let kind = self.symtab.kind(nd).clone();
        match kind {
            NodeKind::I32Const(_)
            | NodeKind::I64Const(_)
            | NodeKind::U8Const(_)
            | NodeKind::U32Const(_)
            | NodeKind::U64Const(_) => self.read(nd),
            NodeKind::Param { .. } => {
                let resolved = self.get_param(nd)?;
                self.eval(resolved)
            }
            NodeKind::Define => {
                let body = self.symtab.kid(nd, 2)?;
                self.eval(body)
            }
            NodeKind::Map | NodeKind::Opcode => {
                let value = self.read(nd)?;
                self.write(value, nd)
            }
            NodeKind::LastRead => self.read(nd),
            NodeKind::Switch => {
                let selector = self.symtab.kid(nd, 0)?;
                let key = self.eval(selector)?;
                match self.find_case_from(nd, 2, key)? {
                    Some(case) => self.eval(case),
                    None => {
                        let default = self.symtab.kid(nd, 1)?;
                        self.eval(default)
                    }
                }
            }
            NodeKind::Case => {
                let action = self.symtab.kid(nd, 1)?;
                self.eval(action)
            }
            NodeKind::Block => {
                let body = self.symtab.kid(nd, 0)?;
                self.decompress_block(Some(body))?;
                Ok(0)
            }
            NodeKind::And => {
                let lhs = self.eval(self.symtab.kid(nd, 0)?)?;
                if lhs != 0 && self.eval(self.symtab.kid(nd, 1)?)? != 0 {
                    Ok(1)
                } else {
                    Ok(0)
                }
            }
            NodeKind::Or => {
                let lhs = self.eval(self.symtab.kid(nd, 0)?)?;
                if lhs != 0 || self.eval(self.symtab.kid(nd, 1)?)? != 0 {
                    Ok(1)
                } else {
                    Ok(0)
                }
            }
            NodeKind::Not => {
                let value = self.eval(self.symtab.kid(nd, 0)?)?;
                Ok(u64::from(value == 0))
            }
            NodeKind::Stream { kind, typ } => {
                let matches = match kind {
                    StreamKind::Input => typ == vassago_filt::StreamType::Byte,
                    StreamKind::Output => typ == self.writer.stream_type(),
                };
                Ok(u64::from(matches))
            }
            NodeKind::Error => Err(Error::malformed("error operator reached during evaluation")),
            NodeKind::Eval => {
                let define = {
                    let sym_node = self.symtab.kid(nd, 0)?;
                    let sym = match *self.symtab.kind(sym_node) {
                        NodeKind::Symbol(sym) => sym,
                        _ => return Err(Error::schema("eval kid 0 must be a symbol")),
                    };
                    self.symtab.definition(sym).ok_or_else(|| {
                        Error::schema(format!(
                            "no definition for symbol '{}'",
                            self.symtab.symbol_name(sym)
                        ))
                    })?
                };
                let declared = {
                    let params = self.symtab.kid(define, 1)?;
                    self.symtab
                        .kind(params)
                        .int_lit()
                        .map(|lit| lit.value)
                        .ok_or_else(|| Error::schema("define kid 1 must declare a param count"))?
                };
                let supplied = (self.symtab.kids(nd).len() - 1) as u64;
                if declared != supplied {
                    return Err(Error::schema(format!(
                        "call supplies {supplied} arguments, definition expects {declared}"
                    )));
                }
                self.eval_stack.push(nd);
                let result = self.eval(define);
                self.eval_stack.pop();
                result
            }
            NodeKind::IfThen => {
                if self.eval(self.symtab.kid(nd, 0)?)? != 0 {
                    self.eval(self.symtab.kid(nd, 1)?)?;
                }
                Ok(0)
            }
            NodeKind::IfThenElse => {
                if self.eval(self.symtab.kid(nd, 0)?)? != 0 {
                    self.eval(self.symtab.kid(nd, 1)?)?;
                } else {
                    self.eval(self.symtab.kid(nd, 2)?)?;
                }
                Ok(0)
            }
            NodeKind::Loop => {
                let count = self.eval(self.symtab.kid(nd, 0)?)?;
                let body: Vec<NodeId> = self.symtab.kids(nd)[1..].to_vec();
                for _ in 0..count {
                    for &kid in &body {
                        self.eval(kid)?;
                    }
                }
                Ok(0)
            }
            NodeKind::LoopUnbounded => {
                let body: Vec<NodeId> = self.symtab.kids(nd).to_vec();
                while !self.reader.at_read_bit_eob() {
                    for &kid in &body {
                        self.eval(kid)?;
                    }
                }
                Ok(0)
            }
            NodeKind::Write => {
                let dst = self.symtab.kid(nd, 0)?;
                let sources: Vec<NodeId> = self.symtab.kids(nd)[1..].to_vec();
                let mut last = 0;
                for src in sources {
                    let value = self.read(src)?;
                    last = self.write(value, dst)?;
                }
                Ok(last)
            }
            NodeKind::Peek => self.read(nd),
            NodeKind::Read => {
                let kid = self.symtab.kid(nd, 0)?;
                self.read(kid)
            }
            NodeKind::Sequence => {
                let kids: Vec<NodeId> = self.symtab.kids(nd).to_vec();
                let mut last = 0;
                for kid in kids {
                    last = self.eval(kid)?;
                }
                Ok(last)
            }
            NodeKind::BinaryEval => self.read(nd),
            NodeKind::Callback => {
                let use_nd = self.symtab.kid(nd, 0)?;
                let sym_node = match self.symtab.kind(use_nd) {
                    NodeKind::LiteralActionUse => self.symtab.kid(use_nd, 0)?,
                    NodeKind::Symbol(_) => use_nd,
                    _ => return Err(Error::schema("callback expects a literal action use")),
                };
                let sym = match *self.symtab.kind(sym_node) {
                    NodeKind::Symbol(sym) => sym,
                    _ => return Err(Error::schema("action use expects a symbol")),
                };
                let action = self.symtab.predefined_of(sym).ok_or_else(|| {
                    Error::schema(format!(
                        "callback on non-predefined symbol '{}'",
                        self.symtab.symbol_name(sym)
                    ))
                })?;
                self.writer.write_action(action)?;
                Ok(0)
            }
            NodeKind::Void => Ok(0),
            kind if kind.io_format().is_some() => {
                let value = self.read(nd)?;
                self.write(value, nd)
            }
            other => Err(Error::schema(format!(
                "evaluation not allowed for opcode {}",
                other.opcode()
            ))),
        }
    }

    // -------------------------------------------------------------------------
    // File and block drivers
    // -------------------------------------------------------------------------

    /// Decompress a framed block: read the declared size, enter it on the
    /// read side, frame the write side, and run `code` (or raw-copy when
    /// no definition exists).
    pub fn decompress_block(&mut self, code: Option<NodeId>) -> Result<()> {
        let size = self.reader.read_block_size()?;
        self.reader.push_eob(size)?;
        self.writer
            .write_action(PredefinedSymbol::BlockEnterWriteonly)?;
        let result = self.eval_or_copy(code);
        match result {
            Ok(()) => {
                self.writer
                    .write_action(PredefinedSymbol::BlockExitWriteonly)?;
                self.reader.pop_eob()
            }
            Err(err) => {
                self.reader.pop_eob_unchecked();
                Err(err)
            }
        }
    }

    fn eval_or_copy(&mut self, code: Option<NodeId>) -> Result<()> {
        match code {
            Some(nd) => {
                self.eval(nd)?;
                Ok(())
            }
            None => {
                // No definition: the body is opaque, copy it through.
                while !self.reader.at_byte_eob() {
                    let byte = self.reader.read_u8()?;
                    self.writer.write_value(u64::from(byte), IntFormat::Uint8)?;
                }
                Ok(())
            }
        }
    }

    /// Decompress a whole file: magic, version, then a section loop.
    pub fn decompress_file(&mut self) -> Result<()> {
        self.last_read = 0;
        let magic = self.reader.read_u32()?;
        if magic as u32 != WASM_BINARY_MAGIC {
            return Err(Error::malformed(format!("bad magic number {magic:#x}")));
        }
        self.writer.write_value(magic, IntFormat::Uint32)?;
        let version = self.reader.read_u32()?;
        if version as u32 != WASM_BINARY_VERSION {
            return Err(Error::malformed(format!("unknown version {version:#x}")));
        }
        self.writer.write_value(version, IntFormat::Uint32)?;

        while !self.reader.at_byte_eob() {
            self.decompress_section()?;
        }
        self.reader.align_to_byte();
        self.writer.align()?;
        self.writer.write_freeze_eof()
    }

    fn decompress_section(&mut self) -> Result<()> {
        self.last_read = 0;
        self.read_section_name()?;
        debug!(section = %self.cur_section_name, "decompressing section");
        let define = self.symtab.definition_by_name(&self.cur_section_name);
        self.decompress_block(define)?;
        self.reader.align_to_byte();
        self.writer.align()
    }

    fn read_section_name(&mut self) -> Result<()> {
        self.cur_section_name.clear();
        let name_size = self.reader.read_varuint32()?;
        self.writer.write_value(name_size, IntFormat::Varuint32)?;
        for _ in 0..name_size {
            let byte = self.reader.read_u8()?;
            self.writer.write_value(u64::from(byte), IntFormat::Uint8)?;
            self.cur_section_name.push(char::from(byte));
        }
        Ok(())
    }
}

fn sign_extend(raw: u64, bits: u32) -> u64 {
    if bits == 0 || bits >= 64 {
        return raw;
    }
    let sign = 1u64 << (bits - 1);
    if raw & sign != 0 {
        raw | !((1u64 << bits) - 1)
    } else {
        raw
    }
}
