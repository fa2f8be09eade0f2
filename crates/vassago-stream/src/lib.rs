//! # Vassago Stream
//!
//! Bit/byte/integer streams and their cursors.
//!
//! The stream layer owns the storage the rest of the pipeline moves data
//! through: append-only [`ByteStream`]s shared between a producer and a
//! consumer, and [`IntStream`]s holding the parsed integer form of a
//! file body. Read cursors carry an end-of-block stack (so framed blocks
//! nest and are verified on exit) and a peek-position stack (so the
//! interpreter can probe ahead and restore). Write cursors can reserve a
//! block-size slot and back-patch it once the block's true length is
//! known, optionally shrinking the reservation to a minimal LEB128 and
//! shifting the block body left.

pub mod byte;
pub mod int;
pub mod leb128;

pub use byte::{ByteReader, ByteStream, ByteWriter, SharedByteStream};
pub use int::{IntCursor, IntEvent, IntStream, SharedIntStream};
