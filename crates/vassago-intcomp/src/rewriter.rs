//! The greedy longest-match rewriter.
//!
//! Replays the parsed integer stream as abbreviation indices: buffered
//! values are matched against the count-trie, the deepest assigned node
//! wins, and unmatched values coalesce into single- or multi-value
//! default runs. Structural events drain the buffer and forward their
//! singleton's index, so no abbreviation ever spans a block boundary.

use std::collections::VecDeque;

use vassago_core::{CompressionFlags, Error, IntFormat, Result};
use vassago_filt::{PredefinedSymbol, StreamType};
use vassago_interp::Writer;

use crate::huffman::HuffmanCodes;
use crate::trie::{CountId, CountTrie};

/// Writer that rewrites values as abbreviation indices.
pub struct AbbrevAssignWriter<'a, W: Writer> {
    trie: &'a CountTrie,
    inner: W,
    buffer: VecDeque<u64>,
    default_values: Vec<u64>,
    abbrev_format: IntFormat,
    default_format: IntFormat,
    loop_size_format: IntFormat,
    length_limit: usize,
    huffman: Option<HuffmanCodes>,
    groups: u64,
}

impl<'a, W: Writer> AbbrevAssignWriter<'a, W> {
    /// Create a rewriter over `trie` forwarding into `inner`.
    pub fn new(
        trie: &'a CountTrie,
        inner: W,
        flags: &CompressionFlags,
        huffman: Option<HuffmanCodes>,
    ) -> Self {
        AbbrevAssignWriter {
            trie,
            inner,
            buffer: VecDeque::with_capacity(flags.length_limit.max(1)),
            default_values: Vec::new(),
            abbrev_format: flags.abbrev_format,
            default_format: flags.default_format,
            loop_size_format: flags.loop_size_format,
            length_limit: flags.length_limit.max(1),
            huffman,
            groups: 0,
        }
    }

    /// Number of abbreviation/default groups emitted so far.
    pub fn groups(&self) -> u64 {
        self.groups
    }

    /// Values currently buffered (always below the length limit between
    /// operations).
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drain the buffer and flush pending defaults without freezing.
    pub fn finish(&mut self) -> Result<()> {
        self.write_until_buffer_empty()?;
        self.flush_default_values()
    }

    /// Give back the inner writer.
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn forward_abbrev_value(&mut self, index: u32) -> Result<()> {
        self.flush_default_values()?;
        self.emit_abbrev(index)
    }

    fn emit_abbrev(&mut self, index: u32) -> Result<()> {
        self.groups += 1;
        match &self.huffman {
            Some(codes) => {
                let (code, bits) = codes.code(index).ok_or_else(|| {
                    Error::abbrev_missing("huffman code for assigned index")
                })?;
                self.inner.write_bits(code, bits)
            }
            None => self.inner.write_value(u64::from(index), self.abbrev_format),
        }
    }

    fn forward_other_value(&mut self, value: u64) {
        self.default_values.push(value);
    }

    fn buffer_value(&mut self, value: u64) -> Result<()> {
        debug_assert!(self.buffer.len() < self.length_limit);
        self.buffer.push_back(value);
        if self.buffer.len() == self.length_limit {
            self.write_from_buffer()?;
        }
        Ok(())
    }

    fn write_from_buffer(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        // Deepest assigned node matching a buffered prefix wins.
        let mut nd: Option<CountId> = None;
        let mut max: Option<CountId> = None;
        for &value in &self.buffer {
            let next = match nd {
                None => self.trie.find(self.trie.root(), value),
                Some(cur) => self.trie.find(cur, value),
            };
            match next {
                None => break,
                Some(found) => {
                    if self.trie.abbrev_index(found).is_some() {
                        max = Some(found);
                    }
                    nd = Some(found);
                }
            }
        }
        match max {
            None => {
                // Default to writing at least one value.
                let value = self.buffer[0];
                self.forward_other_value(value);
                self.pop_values(1);
                Ok(())
            }
            Some(found) => {
                let index = self
                    .trie
                    .abbrev_index(found)
                    .ok_or_else(|| Error::abbrev_missing("matched trie node"))?;
                self.forward_abbrev_value(index)?;
                self.pop_values(self.trie.path_len(found) as usize);
                Ok(())
            }
        }
    }

    fn write_until_buffer_empty(&mut self) -> Result<()> {
        while !self.buffer.is_empty() {
            self.write_from_buffer()?;
        }
        Ok(())
    }

    fn pop_values(&mut self, count: usize) {
        for _ in 0..count {
            if self.buffer.pop_front().is_none() {
                return;
            }
        }
    }

    fn flush_default_values(&mut self) -> Result<()> {
        if self.default_values.is_empty() {
            return Ok(());
        }
        if self.default_values.len() == 1 {
            let index = self
                .trie
                .abbrev_index(self.trie.default_single())
                .ok_or_else(|| Error::abbrev_missing("default single"))?;
            let value = self.default_values[0];
            self.emit_abbrev(index)?;
            self.inner.write_value(value, self.default_format)?;
            self.default_values.clear();
            return Ok(());
        }
        let index = self
            .trie
            .abbrev_index(self.trie.default_multiple())
            .ok_or_else(|| Error::abbrev_missing("default multiple"))?;
        self.emit_abbrev(index)?;
        self.inner
            .write_value(self.default_values.len() as u64, self.loop_size_format)?;
        let values = std::mem::take(&mut self.default_values);
        for value in values {
            self.inner.write_value(value, self.default_format)?;
        }
        Ok(())
    }

    fn forward_event(&mut self, singleton: CountId, what: &'static str) -> Result<()> {
        self.write_until_buffer_empty()?;
        self.flush_default_values()?;
        let index = self
            .trie
            .abbrev_index(singleton)
            .ok_or_else(|| Error::abbrev_missing(what))?;
        self.forward_abbrev_value(index)
    }
}

impl<W: Writer> Writer for AbbrevAssignWriter<'_, W> {
    fn stream_type(&self) -> StreamType {
        StreamType::Int
    }

    fn write_value(&mut self, value: u64, _format: IntFormat) -> Result<()> {
        self.buffer_value(value)
    }

    fn write_bits(&mut self, value: u64, _bits: u32) -> Result<()> {
        self.buffer_value(value)
    }

    fn write_action(&mut self, action: PredefinedSymbol) -> Result<()> {
        match action {
            PredefinedSymbol::BlockEnter | PredefinedSymbol::BlockEnterWriteonly => {
                let id = self.trie.block_enter();
                self.forward_event(id, "block enter")
            }
            PredefinedSymbol::BlockExit | PredefinedSymbol::BlockExitWriteonly => {
                let id = self.trie.block_exit();
                self.forward_event(id, "block exit")
            }
            PredefinedSymbol::Align => {
                let id = self.trie.align();
                self.forward_event(id, "align")
            }
            PredefinedSymbol::File => Err(Error::schema("file symbol is not a writer action")),
        }
    }

    fn write_header_value(&mut self, value: u64, format: IntFormat) -> Result<()> {
        self.inner.write_header_value(value, format)
    }

    fn align(&mut self) -> Result<()> {
        self.inner.align()
    }

    fn write_freeze_eof(&mut self) -> Result<()> {
        self.finish()?;
        self.inner.write_freeze_eof()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vassago_interp::ByteStreamWriter;
    use vassago_stream::{ByteReader, ByteStream};

    fn flags_for(limit: usize) -> CompressionFlags {
        CompressionFlags::new()
            .with_length_limit(limit)
            .with_abbrev_format(IntFormat::Varuint32)
            .with_default_format(IntFormat::Varint64)
            .with_loop_size_format(IntFormat::Varuint32)
    }

    /// Decode the rewriter's byte output back into (index, payload) form
    /// for assertions.
    fn decode_groups(
        bytes: &[u8],
        single_idx: u64,
        multiple_idx: u64,
    ) -> Vec<(u64, Vec<i64>)> {
        let mut reader = ByteReader::new(ByteStream::frozen_from(bytes.to_vec()).into_shared());
        let mut groups = Vec::new();
        while !reader.at_byte_eob() {
            let index = reader.read_varuint32().unwrap();
            let mut payload = Vec::new();
            if index == single_idx {
                payload.push(reader.read_varint64().unwrap() as i64);
            } else if index == multiple_idx {
                let count = reader.read_varuint32().unwrap();
                for _ in 0..count {
                    payload.push(reader.read_varint64().unwrap() as i64);
                }
            }
            groups.push((index, payload));
        }
        groups
    }

    #[test]
    fn test_abbreviation_then_default_single() {
        // Stream [7,7,7,7] with limit 3, abbrev index 5 on path [7,7,7],
        // default single at 1: emits index 5, then (1, value 7).
        let mut trie = CountTrie::new();
        let n7 = trie.lookup(trie.root(), 7);
        let n77 = trie.lookup(n7, 7);
        let n777 = trie.lookup(n77, 7);
        trie.set_abbrev_index(n777, 5);
        trie.set_abbrev_index(trie.default_single(), 1);
        trie.set_abbrev_index(trie.default_multiple(), 2);

        let out = ByteStream::new().into_shared();
        let mut rewriter = AbbrevAssignWriter::new(
            &trie,
            ByteStreamWriter::new(out.clone()),
            &flags_for(3),
            None,
        );
        for _ in 0..4 {
            rewriter.write_value(7, IntFormat::Varuint64).unwrap();
        }
        rewriter.write_freeze_eof().unwrap();

        let groups = decode_groups(out.borrow().as_slice(), 1, 2);
        assert_eq!(groups, vec![(5, vec![]), (1, vec![7])]);
    }

    #[test]
    fn test_defaults_coalesce_into_multiple() {
        // [1,2,3] with no abbreviations yields DefaultMultiple, 3, 1, 2, 3.
        let mut trie = CountTrie::new();
        trie.set_abbrev_index(trie.default_single(), 0);
        trie.set_abbrev_index(trie.default_multiple(), 1);

        let out = ByteStream::new().into_shared();
        let mut rewriter = AbbrevAssignWriter::new(
            &trie,
            ByteStreamWriter::new(out.clone()),
            &flags_for(3),
            None,
        );
        for v in [1, 2, 3] {
            rewriter.write_value(v, IntFormat::Varuint64).unwrap();
        }
        rewriter.write_freeze_eof().unwrap();

        let groups = decode_groups(out.borrow().as_slice(), 0, 1);
        assert_eq!(groups, vec![(1, vec![1, 2, 3])]);
    }

    #[test]
    fn test_block_event_drains_buffer_first() {
        let mut trie = CountTrie::new();
        trie.set_abbrev_index(trie.default_single(), 0);
        trie.set_abbrev_index(trie.default_multiple(), 1);
        trie.set_abbrev_index(trie.block_enter(), 2);

        let out = ByteStream::new().into_shared();
        let mut rewriter = AbbrevAssignWriter::new(
            &trie,
            ByteStreamWriter::new(out.clone()),
            &flags_for(4),
            None,
        );
        rewriter.write_value(9, IntFormat::Varuint64).unwrap();
        rewriter
            .write_action(PredefinedSymbol::BlockEnter)
            .unwrap();
        rewriter.write_freeze_eof().unwrap();

        let groups = decode_groups(out.borrow().as_slice(), 0, 1);
        assert_eq!(
            groups,
            vec![(0, vec![9]), (2, vec![])],
            "value flushes as a default before the block-enter index"
        );
    }

    #[test]
    fn test_missing_singleton_assignment_is_an_error() {
        let trie = CountTrie::new();
        let out = ByteStream::new().into_shared();
        let mut rewriter = AbbrevAssignWriter::new(
            &trie,
            ByteStreamWriter::new(out),
            &flags_for(3),
            None,
        );
        rewriter.write_value(1, IntFormat::Varuint64).unwrap();
        let err = rewriter.write_freeze_eof().unwrap_err();
        assert_eq!(err.category(), "abbreviation_missing");
    }

    #[test]
    fn test_buffer_stays_below_limit() {
        let mut trie = CountTrie::new();
        trie.set_abbrev_index(trie.default_single(), 0);
        trie.set_abbrev_index(trie.default_multiple(), 1);

        let out = ByteStream::new().into_shared();
        let mut rewriter = AbbrevAssignWriter::new(
            &trie,
            ByteStreamWriter::new(out),
            &flags_for(3),
            None,
        );
        for v in 0..50u64 {
            rewriter.write_value(v, IntFormat::Varuint64).unwrap();
            assert!(rewriter.buffered() < 3, "ring buffer bound violated");
        }
    }

    #[test]
    fn test_longest_match_beats_shorter_assignment() {
        // Both [8] and [8,8] assigned: the deeper path must win.
        let mut trie = CountTrie::new();
        let n8 = trie.lookup(trie.root(), 8);
        let n88 = trie.lookup(n8, 8);
        trie.set_abbrev_index(n8, 3);
        trie.set_abbrev_index(n88, 4);
        trie.set_abbrev_index(trie.default_single(), 0);
        trie.set_abbrev_index(trie.default_multiple(), 1);

        let out = ByteStream::new().into_shared();
        let mut rewriter = AbbrevAssignWriter::new(
            &trie,
            ByteStreamWriter::new(out.clone()),
            &flags_for(2),
            None,
        );
        rewriter.write_value(8, IntFormat::Varuint64).unwrap();
        rewriter.write_value(8, IntFormat::Varuint64).unwrap();
        rewriter.write_freeze_eof().unwrap();

        let groups = decode_groups(out.borrow().as_slice(), 0, 1);
        assert_eq!(groups, vec![(4, vec![])]);
    }
}
