//! Protobuf wire format primitives
//!
//! Only what the envelope schema needs: varints, tags, length-delimited
//! fields, and skipping of unknown fields.

use bytes::{Buf, BufMut};

use crate::common::ConversionError;

/// Wire types defined by the protobuf encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    /// int32, int64, uint32, uint64, sint*, bool, enum
    Varint,
    /// fixed64, sfixed64, double
    Fixed64,
    /// string, bytes, embedded messages, packed repeated fields
    LengthDelimited,
    /// fixed32, sfixed32, float
    Fixed32,
}

impl WireType {
    fn from_bits(bits: u8, field: u32) -> Result<Self, ConversionError> {
        match bits {
            0 => Ok(Self::Varint),
            1 => Ok(Self::Fixed64),
            2 => Ok(Self::LengthDelimited),
            5 => Ok(Self::Fixed32),
            wire_type => Err(ConversionError::InvalidWireType { field, wire_type }),
        }
    }

    /// Numeric value stored in the low three bits of a tag
    pub fn bits(self) -> u8 {
        match self {
            Self::Varint => 0,
            Self::Fixed64 => 1,
            Self::LengthDelimited => 2,
            Self::Fixed32 => 5,
        }
    }
}

const MAX_FIELD_NUMBER: u64 = (1 << 29) - 1;

/// Append a base-128 varint
pub fn put_varint(buf: &mut impl BufMut, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.put_u8(byte);
            return;
        }
        buf.put_u8(byte | 0x80);
    }
}

/// Read a base-128 varint, advancing the buffer
pub fn get_varint(buf: &mut impl Buf) -> Result<u64, ConversionError> {
    let mut value = 0u64;
    for i in 0..10 {
        if !buf.has_remaining() {
            return Err(ConversionError::Truncated);
        }
        let byte = buf.get_u8();
        // The tenth byte may only contribute the top bit.
        if i == 9 && byte > 1 {
            return Err(ConversionError::VarintOverflow);
        }
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(ConversionError::VarintOverflow)
}

/// Append a field tag
pub fn put_tag(buf: &mut impl BufMut, field: u32, wire_type: WireType) {
    put_varint(buf, (u64::from(field) << 3) | u64::from(wire_type.bits()));
}

/// Read a field tag
pub fn get_tag(buf: &mut impl Buf) -> Result<(u32, WireType), ConversionError> {
    let key = get_varint(buf)?;
    let field = key >> 3;
    if field == 0 || field > MAX_FIELD_NUMBER {
        return Err(ConversionError::InvalidFieldNumber(field));
    }
    let field = field as u32;
    let wire_type = WireType::from_bits((key & 0x07) as u8, field)?;
    Ok((field, wire_type))
}

/// Append a complete varint field
pub fn put_varint_field(buf: &mut impl BufMut, field: u32, value: u64) {
    put_tag(buf, field, WireType::Varint);
    put_varint(buf, value);
}

/// Append a complete length-delimited field
pub fn put_bytes_field(buf: &mut impl BufMut, field: u32, value: &[u8]) {
    put_tag(buf, field, WireType::LengthDelimited);
    put_varint(buf, value.len() as u64);
    buf.put_slice(value);
}

/// Read the body of a length-delimited field
pub fn get_bytes<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8], ConversionError> {
    let len = get_varint(buf)?;
    let len = usize::try_from(len).map_err(|_| ConversionError::Truncated)?;
    if buf.len() < len {
        return Err(ConversionError::Truncated);
    }
    let (value, rest) = buf.split_at(len);
    *buf = rest;
    Ok(value)
}

/// Skip the body of a field the schema does not know
pub fn skip_field(buf: &mut &[u8], wire_type: WireType) -> Result<(), ConversionError> {
    let width = match wire_type {
        WireType::Varint => {
            get_varint(buf)?;
            return Ok(());
        }
        WireType::LengthDelimited => {
            get_bytes(buf)?;
            return Ok(());
        }
        WireType::Fixed64 => 8,
        WireType::Fixed32 => 4,
    };
    if buf.len() < width {
        return Err(ConversionError::Truncated);
    }
    buf.advance(width);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        put_varint(&mut buf, value);
        buf
    }

    #[test]
    fn test_varint_known_encodings() {
        assert_eq!(encode(0), vec![0x00]);
        assert_eq!(encode(1), vec![0x01]);
        assert_eq!(encode(150), vec![0x96, 0x01]);
        assert_eq!(encode(300), vec![0xac, 0x02]);
        assert_eq!(encode(u64::MAX).len(), 10);

        let mut input: &[u8] = &[0x96, 0x01, 0xff];
        assert_eq!(get_varint(&mut input).unwrap(), 150);
        assert_eq!(input, &[0xff]);

        let max = encode(u64::MAX);
        assert_eq!(get_varint(&mut max.as_slice()).unwrap(), u64::MAX);
    }

    #[test]
    fn test_varint_errors() {
        let mut truncated: &[u8] = &[0x80, 0x80];
        assert_eq!(get_varint(&mut truncated), Err(ConversionError::Truncated));

        let mut overflow: &[u8] = &[0xff; 11];
        assert_eq!(get_varint(&mut overflow), Err(ConversionError::VarintOverflow));
    }

    #[test]
    fn test_tags() {
        let mut buf = Vec::new();
        put_tag(&mut buf, 2, WireType::LengthDelimited);
        assert_eq!(buf, vec![0x12]);
        assert_eq!(get_tag(&mut buf.as_slice()).unwrap(), (2, WireType::LengthDelimited));

        let mut zero_field: &[u8] = &[0x02];
        assert_eq!(get_tag(&mut zero_field), Err(ConversionError::InvalidFieldNumber(0)));

        // wire type 3 (start group) is not supported
        let mut group: &[u8] = &[0x0b];
        assert_eq!(
            get_tag(&mut group),
            Err(ConversionError::InvalidWireType { field: 1, wire_type: 3 })
        );
    }

    #[test]
    fn test_skip_field() {
        let mut buf = Vec::new();
        put_bytes_field(&mut buf, 7, b"ignored");
        buf.extend_from_slice(&[0xaa; 4]);

        let mut input = buf.as_slice();
        let (field, wire_type) = get_tag(&mut input).unwrap();
        assert_eq!(field, 7);
        skip_field(&mut input, wire_type).unwrap();
        assert_eq!(input, &[0xaa; 4]);

        skip_field(&mut input, WireType::Fixed32).unwrap();
        assert!(input.is_empty());

        let mut short: &[u8] = &[0x01, 0x02];
        assert_eq!(skip_field(&mut short, WireType::Fixed64), Err(ConversionError::Truncated));
    }

    #[test]
    fn test_get_bytes_truncated() {
        let mut input: &[u8] = &[0x05, b'a', b'b'];
        assert_eq!(get_bytes(&mut input), Err(ConversionError::Truncated));
    }
}
