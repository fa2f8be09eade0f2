//! Path counting.
//!
//! A [`CounterWriter`] sits at the end of the parse pipeline and feeds
//! every forwarded integer and structural event into the count-trie. A
//! sliding set of active trie positions tracks every suffix of the
//! recent value window up to the configured length limit; block and
//! alignment events cut the window, since no abbreviation may span them.

use vassago_core::{IntFormat, Result};
use vassago_filt::{PredefinedSymbol, StreamType};
use vassago_interp::Writer;

use crate::trie::{CountId, CountTrie};

/// Writer that counts integer paths into a [`CountTrie`].
pub struct CounterWriter<'a> {
    trie: &'a mut CountTrie,
    length_limit: usize,
    active: Vec<CountId>,
    next_active: Vec<CountId>,
}

impl<'a> CounterWriter<'a> {
    /// Create a counter feeding `trie`, tracking paths up to
    /// `length_limit` values.
    pub fn new(trie: &'a mut CountTrie, length_limit: usize) -> Self {
        CounterWriter {
            trie,
            length_limit: length_limit.max(1),
            active: Vec::with_capacity(length_limit.max(1)),
            next_active: Vec::with_capacity(length_limit.max(1)),
        }
    }

    /// Forget the current window (no path may span this point).
    pub fn reset_window(&mut self) {
        self.active.clear();
    }

    fn add_value(&mut self, value: u64) {
        self.next_active.clear();
        for i in 0..self.active.len() {
            let pos = self.active[i];
            if (self.trie.path_len(pos) as usize) < self.length_limit {
                let child = self.trie.lookup(pos, value);
                self.trie.increment(child);
                self.next_active.push(child);
            }
        }
        let start = self.trie.root();
        let child = self.trie.lookup(start, value);
        self.trie.increment(child);
        self.next_active.push(child);
        std::mem::swap(&mut self.active, &mut self.next_active);
    }

    fn add_event(&mut self, singleton: CountId) {
        self.reset_window();
        self.trie.increment(singleton);
    }
}

impl Writer for CounterWriter<'_> {
    fn stream_type(&self) -> StreamType {
        StreamType::Int
    }

    fn write_value(&mut self, value: u64, _format: IntFormat) -> Result<()> {
        self.add_value(value);
        Ok(())
    }

    fn write_bits(&mut self, value: u64, _bits: u32) -> Result<()> {
        self.add_value(value);
        Ok(())
    }

    fn write_action(&mut self, action: PredefinedSymbol) -> Result<()> {
        match action {
            PredefinedSymbol::BlockEnter | PredefinedSymbol::BlockEnterWriteonly => {
                let id = self.trie.block_enter();
                self.add_event(id);
            }
            PredefinedSymbol::BlockExit | PredefinedSymbol::BlockExitWriteonly => {
                let id = self.trie.block_exit();
                self.add_event(id);
            }
            PredefinedSymbol::Align => {
                let id = self.trie.align();
                self.add_event(id);
            }
            PredefinedSymbol::File => {}
        }
        Ok(())
    }

    fn write_header_value(&mut self, _value: u64, _format: IntFormat) -> Result<()> {
        Ok(())
    }

    fn align(&mut self) -> Result<()> {
        Ok(())
    }

    fn write_freeze_eof(&mut self) -> Result<()> {
        self.reset_window();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trie::CountKind;

    fn feed(trie: &mut CountTrie, limit: usize, values: &[u64]) {
        let mut counter = CounterWriter::new(trie, limit);
        for &v in values {
            counter.write_value(v, IntFormat::Varuint64).unwrap();
        }
        counter.write_freeze_eof().unwrap();
    }

    #[test]
    fn test_counts_every_substring_up_to_limit() {
        let mut trie = CountTrie::new();
        feed(&mut trie, 3, &[7, 7, 7, 7]);

        let n7 = trie.find(trie.root(), 7).unwrap();
        assert_eq!(trie.count(n7), 4, "four single-value occurrences");
        let n77 = trie.find(n7, 7).unwrap();
        assert_eq!(trie.count(n77), 3);
        let n777 = trie.find(n77, 7).unwrap();
        assert_eq!(trie.count(n777), 2);
        assert!(
            trie.find(n777, 7).is_none(),
            "length limit caps the tracked paths"
        );
    }

    #[test]
    fn test_block_events_cut_the_window() {
        let mut trie = CountTrie::new();
        let mut counter = CounterWriter::new(&mut trie, 4);
        counter.write_value(1, IntFormat::Varuint64).unwrap();
        counter
            .write_action(PredefinedSymbol::BlockEnter)
            .unwrap();
        counter.write_value(2, IntFormat::Varuint64).unwrap();
        counter.write_freeze_eof().unwrap();

        let n1 = trie.find(trie.root(), 1).unwrap();
        assert!(
            trie.find(n1, 2).is_none(),
            "no path spans a block boundary"
        );
        assert_eq!(trie.count(trie.block_enter()), 1);
        assert_eq!(trie.kind(trie.block_enter()), CountKind::BlockEnter);
    }

    #[test]
    fn test_align_counts_singleton() {
        let mut trie = CountTrie::new();
        let mut counter = CounterWriter::new(&mut trie, 2);
        counter.write_action(PredefinedSymbol::Align).unwrap();
        counter.write_action(PredefinedSymbol::Align).unwrap();
        drop(counter);
        assert_eq!(trie.count(trie.align()), 2);
    }
}
