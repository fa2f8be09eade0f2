//! Integer wire formats.
//!
//! Every integer that crosses a stream boundary is encoded in one of a
//! closed set of seven formats. The abbreviation system additionally pins
//! three distinguished formats at configuration time (see
//! [`CompressionFlags`](crate::CompressionFlags)).

use serde::{Deserialize, Serialize};

/// Wire encoding for a single integer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum IntFormat {
    /// One byte.
    Uint8,
    /// Four bytes, little-endian.
    Uint32,
    /// Eight bytes, little-endian.
    Uint64,
    /// Signed LEB128, at most 32 significant bits.
    Varint32,
    /// Signed LEB128, at most 64 significant bits.
    Varint64,
    /// Unsigned LEB128, at most 32 significant bits.
    Varuint32,
    /// Unsigned LEB128, at most 64 significant bits.
    Varuint64,
}

impl IntFormat {
    /// Get format name as string.
    pub fn name(self) -> &'static str {
        match self {
            IntFormat::Uint8 => "uint8",
            IntFormat::Uint32 => "uint32",
            IntFormat::Uint64 => "uint64",
            IntFormat::Varint32 => "varint32",
            IntFormat::Varint64 => "varint64",
            IntFormat::Varuint32 => "varuint32",
            IntFormat::Varuint64 => "varuint64",
        }
    }

    /// Decode a format from its wire tag.
    pub fn from_tag(tag: u8) -> Option<IntFormat> {
        Some(match tag {
            0 => IntFormat::Uint8,
            1 => IntFormat::Uint32,
            2 => IntFormat::Uint64,
            3 => IntFormat::Varint32,
            4 => IntFormat::Varint64,
            5 => IntFormat::Varuint32,
            6 => IntFormat::Varuint64,
            _ => return None,
        })
    }

    /// Wire tag of this format.
    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Whether the encoding has a fixed byte width.
    pub fn is_fixed_width(self) -> bool {
        matches!(self, IntFormat::Uint8 | IntFormat::Uint32 | IntFormat::Uint64)
    }
}

/// Display format for integer literals in a filter algorithm.
///
/// Purely presentational; it survives flattening so a re-parsed algorithm
/// prints the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ValueFormat {
    /// Unsigned decimal.
    #[default]
    Decimal,
    /// Signed decimal.
    SignedDecimal,
    /// Hexadecimal.
    Hexadecimal,
}

impl ValueFormat {
    /// Decode a display format from its wire tag.
    pub fn from_tag(tag: u8) -> Option<ValueFormat> {
        Some(match tag {
            0 => ValueFormat::Decimal,
            1 => ValueFormat::SignedDecimal,
            2 => ValueFormat::Hexadecimal,
            _ => return None,
        })
    }

    /// Wire tag of this display format.
    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }
}
