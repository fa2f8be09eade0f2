//! Byte encoding of the algorithm artifact.
//!
//! A flattened algorithm travels as a CASM stream: the source header's
//! magic and version lead as fixed u32s, the remaining header pairs
//! follow tagged with their formats, and every flattened value is a
//! varuint. Generated algorithms contain no sections, so the event
//! sequence is pure values.

use vassago_core::{Error, IntFormat, Result, CASM_BINARY_MAGIC, CASM_BINARY_VERSION};
use vassago_stream::{ByteReader, ByteStream, ByteWriter, IntEvent, IntStream};

/// Encode a flattened algorithm stream to bytes.
pub fn encode_casm(stream: &IntStream) -> Result<Vec<u8>> {
    let header = stream.header();
    if header.len() < 2
        || header[0] != (u64::from(CASM_BINARY_MAGIC), IntFormat::Uint32)
        || header[1] != (u64::from(CASM_BINARY_VERSION), IntFormat::Uint32)
    {
        return Err(Error::schema("algorithm stream lacks a casm source header"));
    }

    let out = ByteStream::new().into_shared();
    let mut writer = ByteWriter::new(out.clone());
    writer.write_u32(u64::from(CASM_BINARY_MAGIC))?;
    writer.write_u32(u64::from(CASM_BINARY_VERSION))?;

    let rest = &header[2..];
    writer.write_u8(rest.len() as u8)?;
    for &(value, format) in rest {
        writer.write_u8(format.tag())?;
        match format {
            IntFormat::Uint8 => writer.write_u8(value as u8)?,
            IntFormat::Uint32 => writer.write_u32(value)?,
            IntFormat::Uint64 => writer.write_u64(value)?,
            IntFormat::Varint32 | IntFormat::Varint64 => writer.write_varint(value as i64)?,
            IntFormat::Varuint32 | IntFormat::Varuint64 => writer.write_varuint(value)?,
        }
    }

    for event in stream.events() {
        match event {
            IntEvent::Value(value) => writer.write_varuint(*value)?,
            other => {
                return Err(Error::schema(format!(
                    "algorithm stream carries structural event {other:?}"
                )))
            }
        }
    }
    writer.freeze_eof()?;
    let bytes = out.borrow().as_slice().to_vec();
    Ok(bytes)
}

/// Decode a CASM byte artifact back into a flattened algorithm stream.
pub fn decode_casm(bytes: &[u8]) -> Result<IntStream> {
    let input = ByteStream::frozen_from(bytes.to_vec()).into_shared();
    let mut reader = ByteReader::new(input);

    let magic = reader.read_u32()?;
    if magic as u32 != CASM_BINARY_MAGIC {
        return Err(Error::malformed(format!("bad casm magic {magic:#x}")));
    }
    let version = reader.read_u32()?;
    if version as u32 != CASM_BINARY_VERSION {
        return Err(Error::malformed(format!("unknown casm version {version:#x}")));
    }

    let mut stream = IntStream::new();
    stream.push_header(magic, IntFormat::Uint32)?;
    stream.push_header(version, IntFormat::Uint32)?;

    let extra = reader.read_u8()?;
    for _ in 0..extra {
        let tag = reader.read_u8()?;
        let format = IntFormat::from_tag(tag)
            .ok_or_else(|| Error::malformed(format!("bad header format tag {tag}")))?;
        let value = match format {
            IntFormat::Uint8 => u64::from(reader.read_u8()?),
            IntFormat::Uint32 => reader.read_u32()?,
            IntFormat::Uint64 => reader.read_u64()?,
            IntFormat::Varint32 => reader.read_varint32()?,
            IntFormat::Varint64 => reader.read_varint64()?,
            IntFormat::Varuint32 => reader.read_varuint32()?,
            IntFormat::Varuint64 => reader.read_varuint64()?,
        };
        stream.push_header(value, format)?;
    }

    while !reader.at_byte_eob() {
        stream.push_value(reader.read_varuint64()?)?;
    }
    stream.freeze();
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_stream() -> IntStream {
        let mut stream = IntStream::new();
        stream
            .push_header(u64::from(CASM_BINARY_MAGIC), IntFormat::Uint32)
            .unwrap();
        stream
            .push_header(u64::from(CASM_BINARY_VERSION), IntFormat::Uint32)
            .unwrap();
        stream.push_header(0x6d73_6100, IntFormat::Uint32).unwrap();
        stream.push_header(0xd, IntFormat::Uint32).unwrap();
        for v in [45u64, 0, 300, 57] {
            stream.push_value(v).unwrap();
        }
        stream.freeze();
        stream
    }

    #[test]
    fn test_casm_roundtrip() {
        let stream = sample_stream();
        let bytes = encode_casm(&stream).unwrap();
        let decoded = decode_casm(&bytes).unwrap();
        assert_eq!(decoded.header(), stream.header());
        assert_eq!(decoded.events(), stream.events());
    }

    #[test]
    fn test_casm_starts_with_magic() {
        let bytes = encode_casm(&sample_stream()).unwrap();
        assert_eq!(&bytes[0..4], &CASM_BINARY_MAGIC.to_le_bytes());
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let err = decode_casm(&[0, 0, 0, 0, 0, 0, 0, 0]).unwrap_err();
        assert_eq!(err.category(), "malformed_input");
    }

    #[test]
    fn test_encode_requires_source_header() {
        let mut stream = IntStream::new();
        stream.push_value(1).unwrap();
        stream.freeze();
        let err = encode_casm(&stream).unwrap_err();
        assert_eq!(err.category(), "schema_violation");
    }
}
