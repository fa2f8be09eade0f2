//! Integer stream replay.
//!
//! The pull side of the push/pull pair: drains a captured [`IntStream`]
//! into any [`Writer`], re-raising block and alignment events as writer
//! actions. The counting and rewrite phases of compression both consume
//! the parsed stream this way.

use vassago_core::{IntFormat, Result};
use vassago_filt::PredefinedSymbol;
use vassago_stream::{IntCursor, IntEvent, IntStream};

use crate::writer::Writer;

/// Drain `stream` into `writer`, emitting values in `value_format`.
pub fn replay_with(
    stream: &IntStream,
    writer: &mut dyn Writer,
    value_format: IntFormat,
) -> Result<()> {
    for &(value, format) in stream.header() {
        writer.write_header_value(value, format)?;
    }
    let mut cursor = IntCursor::new(stream);
    while !cursor.at_end() {
        match cursor.next_event()? {
            IntEvent::Value(value) => writer.write_value(value, value_format)?,
            IntEvent::BlockEnter => writer.write_action(PredefinedSymbol::BlockEnter)?,
            IntEvent::BlockExit => writer.write_action(PredefinedSymbol::BlockExit)?,
            IntEvent::Align => writer.write_action(PredefinedSymbol::Align)?,
        }
    }
    Ok(())
}

/// Drain `stream` into `writer` with the default varuint encoding.
pub fn replay(stream: &IntStream, writer: &mut dyn Writer) -> Result<()> {
    replay_with(stream, writer, IntFormat::Varuint64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::ByteStreamWriter;
    use vassago_stream::ByteStream;

    #[test]
    fn test_replay_reencodes_values() {
        let mut ints = IntStream::new();
        ints.push_value(5).unwrap();
        ints.push_value(300).unwrap();
        ints.freeze();

        let out = ByteStream::new().into_shared();
        let mut writer = ByteStreamWriter::new(out.clone());
        replay(&ints, &mut writer).unwrap();
        writer.write_freeze_eof().unwrap();

        assert_eq!(out.borrow().as_slice(), &[0x05, 0xac, 0x02]);
    }

    #[test]
    fn test_replay_reframes_blocks() {
        let mut ints = IntStream::new();
        ints.push_event(IntEvent::BlockEnter).unwrap();
        ints.push_value(0xaa).unwrap();
        ints.push_event(IntEvent::BlockExit).unwrap();
        ints.freeze();

        let out = ByteStream::new().into_shared();
        let mut writer = ByteStreamWriter::new(out.clone());
        writer.set_minimize_block_size(true);
        replay_with(&ints, &mut writer, IntFormat::Uint8).unwrap();
        writer.write_freeze_eof().unwrap();

        assert_eq!(out.borrow().as_slice(), &[0x01, 0xaa]);
    }
}
