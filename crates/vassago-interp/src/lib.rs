//! # Vassago Interp
//!
//! The filter-algorithm virtual machine.
//!
//! An [`Interpreter`] evaluates a tree of typed operator nodes against a
//! byte read cursor and a [`Writer`], forwarding every consumed value to
//! the output. Two evaluation paths share one semantics: the recursive
//! [`Interpreter::eval`] reference path, and a backfilled frame driver
//! ([`Interpreter::start_read`] / [`Interpreter::run_methods`]) that
//! suspends when the producer has not buffered enough input and resumes
//! when it advances or freezes.
//!
//! The file driver ([`Interpreter::decompress_file`]) implements the
//! outer structure every artifact shares: magic, version, then a loop of
//! named sections whose bodies are framed blocks.

pub mod interp;
pub mod replay;
pub mod writer;

pub use interp::Interpreter;
pub use replay::{replay, replay_with};
pub use writer::{ByteStreamWriter, IntStreamWriter, Writer};
