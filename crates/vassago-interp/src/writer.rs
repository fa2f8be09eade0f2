//! The writer seam.
//!
//! Everything downstream of the interpreter - byte re-encoding, integer
//! capture, path counting, abbreviation rewriting - implements [`Writer`].
//! The interpreter forwards every produced value, block framing action,
//! and alignment through this trait, so the same algorithm drives any
//! pipeline stage.

use vassago_core::{Error, IntFormat, Result};
use vassago_filt::{PredefinedSymbol, StreamType};
use vassago_stream::{ByteWriter, IntEvent, SharedByteStream, SharedIntStream};

/// Consumer of interpreter output.
pub trait Writer {
    /// Element type this writer produces.
    fn stream_type(&self) -> StreamType;

    /// Write one integer in the given wire format.
    fn write_value(&mut self, value: u64, format: IntFormat) -> Result<()>;

    /// Write the low `bits` bits of `value`.
    fn write_bits(&mut self, value: u64, bits: u32) -> Result<()>;

    /// Perform a named predefined action (block framing, alignment).
    fn write_action(&mut self, action: PredefinedSymbol) -> Result<()>;

    /// Write a labelled header value.
    fn write_header_value(&mut self, value: u64, format: IntFormat) -> Result<()>;

    /// Align the output to a byte boundary (no-op off the byte level).
    fn align(&mut self) -> Result<()>;

    /// Finish the output stream.
    fn write_freeze_eof(&mut self) -> Result<()>;
}

impl<W: Writer + ?Sized> Writer for &mut W {
    fn stream_type(&self) -> StreamType {
        (**self).stream_type()
    }

    fn write_value(&mut self, value: u64, format: IntFormat) -> Result<()> {
        (**self).write_value(value, format)
    }

    fn write_bits(&mut self, value: u64, bits: u32) -> Result<()> {
        (**self).write_bits(value, bits)
    }

    fn write_action(&mut self, action: PredefinedSymbol) -> Result<()> {
        (**self).write_action(action)
    }

    fn write_header_value(&mut self, value: u64, format: IntFormat) -> Result<()> {
        (**self).write_header_value(value, format)
    }

    fn align(&mut self) -> Result<()> {
        (**self).align()
    }

    fn write_freeze_eof(&mut self) -> Result<()> {
        (**self).write_freeze_eof()
    }
}

/// Writer producing wire-encoded bytes with framed blocks.
///
/// Block-enter actions reserve a padded size slot; the matching exit
/// back-patches the slot with the body length, minimized to a short
/// LEB128 when configured.
pub struct ByteStreamWriter {
    out: ByteWriter,
    minimize_block_size: bool,
    block_stack: Vec<usize>,
}

impl ByteStreamWriter {
    /// Create a writer appending to `stream`.
    pub fn new(stream: SharedByteStream) -> Self {
        ByteStreamWriter {
            out: ByteWriter::new(stream),
            minimize_block_size: false,
            block_stack: Vec::new(),
        }
    }

    /// Configure block size minimization.
    pub fn set_minimize_block_size(&mut self, minimize: bool) {
        self.minimize_block_size = minimize;
    }

    /// Byte position of the next append.
    pub fn pos(&self) -> usize {
        self.out.pos()
    }

    /// Depth of open framed blocks.
    pub fn open_blocks(&self) -> usize {
        self.block_stack.len()
    }

    fn enter_block(&mut self) -> Result<()> {
        let slot = self.out.write_fixed_block_size(0)?;
        self.block_stack.push(slot);
        Ok(())
    }

    fn exit_block(&mut self) -> Result<()> {
        let slot = self
            .block_stack
            .pop()
            .ok_or_else(|| Error::stream("block exit without matching enter"))?;
        self.out.align_to_byte()?;
        let body_len = self.out.pos() - (slot + vassago_stream::leb128::PADDED_SIZE_LEN);
        self.out
            .patch_block_size(slot, body_len, self.minimize_block_size)
    }
}

impl Writer for ByteStreamWriter {
    fn stream_type(&self) -> StreamType {
        StreamType::Byte
    }

    fn write_value(&mut self, value: u64, format: IntFormat) -> Result<()> {
        match format {
            IntFormat::Uint8 => self.out.write_u8(value as u8),
            IntFormat::Uint32 => self.out.write_u32(value),
            IntFormat::Uint64 => self.out.write_u64(value),
            IntFormat::Varint32 | IntFormat::Varint64 => self.out.write_varint(value as i64),
            IntFormat::Varuint32 | IntFormat::Varuint64 => self.out.write_varuint(value),
        }
    }

    fn write_bits(&mut self, value: u64, bits: u32) -> Result<()> {
        self.out.write_bits(value, bits)
    }

    fn write_action(&mut self, action: PredefinedSymbol) -> Result<()> {
        match action {
            PredefinedSymbol::BlockEnter | PredefinedSymbol::BlockEnterWriteonly => {
                self.enter_block()
            }
            PredefinedSymbol::BlockExit | PredefinedSymbol::BlockExitWriteonly => {
                self.exit_block()
            }
            PredefinedSymbol::Align => self.out.align_to_byte(),
            PredefinedSymbol::File => Err(Error::schema("file symbol is not a writer action")),
        }
    }

    fn write_header_value(&mut self, value: u64, format: IntFormat) -> Result<()> {
        self.write_value(value, format)
    }

    fn align(&mut self) -> Result<()> {
        self.out.align_to_byte()
    }

    fn write_freeze_eof(&mut self) -> Result<()> {
        if !self.block_stack.is_empty() {
            return Err(Error::stream("freeze with open framed blocks"));
        }
        self.out.freeze_eof()
    }
}

/// Writer capturing interpreter output as an integer stream.
///
/// Format-agnostic: every value append ignores the wire format, which is
/// reapplied when the stream is re-encoded to bytes.
pub struct IntStreamWriter {
    out: SharedIntStream,
}

impl IntStreamWriter {
    /// Create a writer appending to `stream`.
    pub fn new(stream: SharedIntStream) -> Self {
        IntStreamWriter { out: stream }
    }
}

impl Writer for IntStreamWriter {
    fn stream_type(&self) -> StreamType {
        StreamType::Int
    }

    fn write_value(&mut self, value: u64, _format: IntFormat) -> Result<()> {
        self.out.borrow_mut().push_value(value)
    }

    fn write_bits(&mut self, value: u64, _bits: u32) -> Result<()> {
        self.out.borrow_mut().push_value(value)
    }

    fn write_action(&mut self, action: PredefinedSymbol) -> Result<()> {
        let event = match action {
            PredefinedSymbol::BlockEnter | PredefinedSymbol::BlockEnterWriteonly => {
                IntEvent::BlockEnter
            }
            PredefinedSymbol::BlockExit | PredefinedSymbol::BlockExitWriteonly => {
                IntEvent::BlockExit
            }
            PredefinedSymbol::Align => IntEvent::Align,
            PredefinedSymbol::File => {
                return Err(Error::schema("file symbol is not a writer action"))
            }
        };
        self.out.borrow_mut().push_event(event)
    }

    fn write_header_value(&mut self, value: u64, format: IntFormat) -> Result<()> {
        self.out.borrow_mut().push_header(value, format)
    }

    fn align(&mut self) -> Result<()> {
        Ok(())
    }

    fn write_freeze_eof(&mut self) -> Result<()> {
        self.out.borrow_mut().freeze();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use vassago_stream::{ByteStream, IntStream};

    #[test]
    fn test_byte_writer_formats() {
        let stream = ByteStream::new().into_shared();
        let mut writer = ByteStreamWriter::new(stream.clone());
        writer.write_value(0x41, IntFormat::Uint8).unwrap();
        writer.write_value(300, IntFormat::Varuint32).unwrap();
        writer.write_value(-2i64 as u64, IntFormat::Varint64).unwrap();
        writer.write_freeze_eof().unwrap();
        assert_eq!(stream.borrow().as_slice(), &[0x41, 0xac, 0x02, 0x7e]);
    }

    #[test]
    fn test_byte_writer_block_framing_minimized() {
        let stream = ByteStream::new().into_shared();
        let mut writer = ByteStreamWriter::new(stream.clone());
        writer.set_minimize_block_size(true);
        writer.write_action(PredefinedSymbol::BlockEnter).unwrap();
        writer.write_value(0xaa, IntFormat::Uint8).unwrap();
        writer.write_value(0xbb, IntFormat::Uint8).unwrap();
        writer.write_action(PredefinedSymbol::BlockExit).unwrap();
        writer.write_freeze_eof().unwrap();
        assert_eq!(stream.borrow().as_slice(), &[0x02, 0xaa, 0xbb]);
    }

    #[test]
    fn test_byte_writer_nested_blocks() {
        let stream = ByteStream::new().into_shared();
        let mut writer = ByteStreamWriter::new(stream.clone());
        writer.set_minimize_block_size(true);
        writer.write_action(PredefinedSymbol::BlockEnter).unwrap();
        writer.write_value(1, IntFormat::Uint8).unwrap();
        writer.write_action(PredefinedSymbol::BlockEnter).unwrap();
        writer.write_value(2, IntFormat::Uint8).unwrap();
        writer.write_action(PredefinedSymbol::BlockExit).unwrap();
        writer.write_action(PredefinedSymbol::BlockExit).unwrap();
        writer.write_freeze_eof().unwrap();
        // Outer block body: byte 1, inner size 1, byte 2 -> length 3.
        assert_eq!(stream.borrow().as_slice(), &[0x03, 0x01, 0x01, 0x02]);
    }

    #[test]
    fn test_byte_writer_unbalanced_exit() {
        let stream = ByteStream::new().into_shared();
        let mut writer = ByteStreamWriter::new(stream);
        assert!(writer.write_action(PredefinedSymbol::BlockExit).is_err());
    }

    #[test]
    fn test_int_writer_captures_events() {
        let stream = Rc::new(RefCell::new(IntStream::new()));
        let mut writer = IntStreamWriter::new(stream.clone());
        writer.write_action(PredefinedSymbol::BlockEnter).unwrap();
        writer.write_value(7, IntFormat::Varuint64).unwrap();
        writer.write_action(PredefinedSymbol::Align).unwrap();
        writer.write_action(PredefinedSymbol::BlockExit).unwrap();
        writer.write_freeze_eof().unwrap();

        let stream = stream.borrow();
        assert_eq!(
            stream.events(),
            &[
                IntEvent::BlockEnter,
                IntEvent::Value(7),
                IntEvent::Align,
                IntEvent::BlockExit,
            ]
        );
        assert!(stream.is_frozen());
    }
}
