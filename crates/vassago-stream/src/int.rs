//! Integer streams.
//!
//! The middle stage of the pipeline: a parsed file body becomes a stream
//! of integer values interleaved with block-enter/exit and alignment
//! events, plus a header region of labelled values. Integer streams are
//! format-agnostic; the wire format of each value is reapplied when the
//! stream is re-encoded to bytes.

use std::cell::RefCell;
use std::rc::Rc;

use vassago_core::{Error, IntFormat, Result};

/// One element of an integer stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntEvent {
    /// A plain integer value.
    Value(u64),
    /// Enter a framed block.
    BlockEnter,
    /// Exit the innermost framed block.
    BlockExit,
    /// Align the byte-level encoding to a byte boundary.
    Align,
}

/// Append-only stream of integer events with a labelled header region.
#[derive(Debug, Default)]
pub struct IntStream {
    header: Vec<(u64, IntFormat)>,
    events: Vec<IntEvent>,
    frozen: bool,
}

/// Shared handle to an integer stream.
pub type SharedIntStream = Rc<RefCell<IntStream>>;

impl IntStream {
    /// Create an empty, unfrozen stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a labelled header value.
    pub fn push_header(&mut self, value: u64, format: IntFormat) -> Result<()> {
        if self.frozen {
            return Err(Error::stream("header write after freeze"));
        }
        self.header.push((value, format));
        Ok(())
    }

    /// Append a value event.
    pub fn push_value(&mut self, value: u64) -> Result<()> {
        self.push_event(IntEvent::Value(value))
    }

    /// Append any event.
    pub fn push_event(&mut self, event: IntEvent) -> Result<()> {
        if self.frozen {
            return Err(Error::stream("write after freeze"));
        }
        self.events.push(event);
        Ok(())
    }

    /// Mark the stream complete. Monotone.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Whether the producer has finished.
    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Number of events.
    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the stream holds no events.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The labelled header region.
    #[inline]
    pub fn header(&self) -> &[(u64, IntFormat)] {
        &self.header
    }

    /// The event sequence.
    #[inline]
    pub fn events(&self) -> &[IntEvent] {
        &self.events
    }

    /// Just the integer values, in order (events skipped).
    pub fn values(&self) -> impl Iterator<Item = u64> + '_ {
        self.events.iter().filter_map(|event| match event {
            IntEvent::Value(v) => Some(*v),
            _ => None,
        })
    }

    /// Wrap the stream in a shared handle.
    pub fn into_shared(self) -> SharedIntStream {
        Rc::new(RefCell::new(self))
    }
}

/// Read cursor over an [`IntStream`].
#[derive(Debug)]
pub struct IntCursor<'a> {
    stream: &'a IntStream,
    index: usize,
    header_index: usize,
    peek_stack: Vec<usize>,
    block_depth: usize,
}

impl<'a> IntCursor<'a> {
    /// Create a cursor at the start of `stream`.
    pub fn new(stream: &'a IntStream) -> Self {
        IntCursor {
            stream,
            index: 0,
            header_index: 0,
            peek_stack: Vec::new(),
            block_depth: 0,
        }
    }

    /// Event index of the cursor.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether every event has been consumed.
    pub fn at_end(&self) -> bool {
        self.index >= self.stream.events.len()
    }

    /// Whether the cursor sits at the end of a frozen stream.
    pub fn at_eof(&self) -> bool {
        self.at_end() && self.stream.is_frozen()
    }

    /// Look at the next event without consuming it.
    pub fn peek_event(&self) -> Option<IntEvent> {
        self.stream.events.get(self.index).copied()
    }

    /// Consume and return the next event.
    pub fn next_event(&mut self) -> Result<IntEvent> {
        let event = self
            .peek_event()
            .ok_or_else(|| Error::malformed_at("read past end of int stream", self.index))?;
        self.index += 1;
        match event {
            IntEvent::BlockEnter => self.block_depth += 1,
            IntEvent::BlockExit => {
                if self.block_depth == 0 {
                    return Err(Error::malformed_at("block exit without enter", self.index - 1));
                }
                self.block_depth -= 1;
            }
            _ => {}
        }
        Ok(event)
    }

    /// Consume the next event, requiring a plain value.
    pub fn read(&mut self) -> Result<u64> {
        match self.next_event()? {
            IntEvent::Value(v) => Ok(v),
            other => Err(Error::malformed(format!(
                "expected value, found {other:?}"
            ))),
        }
    }

    /// Consume a block-enter event.
    pub fn open_block(&mut self) -> Result<()> {
        match self.next_event()? {
            IntEvent::BlockEnter => Ok(()),
            other => Err(Error::malformed(format!(
                "expected block enter, found {other:?}"
            ))),
        }
    }

    /// Consume a block-exit event.
    pub fn close_block(&mut self) -> Result<()> {
        match self.next_event()? {
            IntEvent::BlockExit => Ok(()),
            other => Err(Error::malformed(format!(
                "expected block exit, found {other:?}"
            ))),
        }
    }

    /// Read the next header value, verifying its recorded format.
    pub fn read_header_value(&mut self, format: IntFormat) -> Result<u64> {
        let (value, recorded) = self
            .stream
            .header
            .get(self.header_index)
            .copied()
            .ok_or_else(|| Error::malformed("header exhausted"))?;
        if recorded != format {
            return Err(Error::malformed(format!(
                "header format mismatch: recorded {}, requested {}",
                recorded.name(),
                format.name()
            )));
        }
        self.header_index += 1;
        Ok(value)
    }

    /// The labelled header region of the underlying stream.
    pub fn stream_header(&self) -> &[(u64, IntFormat)] {
        self.stream.header()
    }

    /// Snapshot the cursor position.
    pub fn push_peek_pos(&mut self) {
        self.peek_stack.push(self.index);
    }

    /// Restore the most recent snapshot.
    pub fn pop_peek_pos(&mut self) -> Result<()> {
        self.index = self
            .peek_stack
            .pop()
            .ok_or_else(|| Error::stream("pop_peek_pos with empty stack"))?;
        Ok(())
    }
}
