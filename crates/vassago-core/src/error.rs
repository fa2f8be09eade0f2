//! Error types for compression and interpretation.

use thiserror::Error;

/// Result type alias for Vassago operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error kinds raised by the stream layer, the interpreter, and the
/// compression engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Input bytes do not form a valid file or block.
    #[error("malformed input: {message}")]
    MalformedInput { message: String },

    /// A filter algorithm violates a structural rule.
    #[error("schema violation: {message}")]
    SchemaViolation { message: String },

    /// A distinguished count node was used without an abbreviation index.
    #[error("no abbreviation assigned for {what}")]
    AbbreviationMissing { what: &'static str },

    /// An underlying stream rejected an operation.
    #[error("stream failure: {message}")]
    StreamFailure { message: String },

    /// An opcode selector produced an unusable bit size.
    #[error("opcode selector bitsize {bits} outside [1, 63]")]
    OpcodeBitsize { bits: u32 },

    /// The interpreter was failed while backfilled frames were live.
    #[error("interpretation cancelled with {live_frames} live frames")]
    Cancelled { live_frames: usize },
}

impl Error {
    /// Create a malformed input error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Error::MalformedInput {
            message: message.into(),
        }
    }

    /// Create a malformed input error with offset context.
    pub fn malformed_at(message: impl Into<String>, offset: usize) -> Self {
        Error::MalformedInput {
            message: format!("{} at offset {}", message.into(), offset),
        }
    }

    /// Create a schema violation error.
    pub fn schema(message: impl Into<String>) -> Self {
        Error::SchemaViolation {
            message: message.into(),
        }
    }

    /// Create a stream failure error.
    pub fn stream(message: impl Into<String>) -> Self {
        Error::StreamFailure {
            message: message.into(),
        }
    }

    /// Create an abbreviation-missing error.
    pub fn abbrev_missing(what: &'static str) -> Self {
        Error::AbbreviationMissing { what }
    }

    /// Create an opcode bitsize error.
    pub fn opcode_bitsize(bits: u32) -> Self {
        Error::OpcodeBitsize { bits }
    }

    /// Get error category for diagnostics.
    pub fn category(&self) -> &'static str {
        match self {
            Error::MalformedInput { .. } => "malformed_input",
            Error::SchemaViolation { .. } => "schema_violation",
            Error::AbbreviationMissing { .. } => "abbreviation_missing",
            Error::StreamFailure { .. } => "stream_failure",
            Error::OpcodeBitsize { .. } => "opcode_bitsize",
            Error::Cancelled { .. } => "cancelled",
        }
    }
}
