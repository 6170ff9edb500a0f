//! Tagged-field codec for the wire messages.
//!
//! Protocol-buffer compatible: each field is a varint key
//! `(tag << 3) | wire_type` followed by a varint or a length-delimited byte
//! string. Unknown fields are skipped; truncated input is rejected.

use crate::error::{Error, Result};

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_BYTES: u8 = 2;
const WIRE_FIXED32: u8 = 5;

/// Largest encoding of a u32 varint.
pub(crate) const MAX_VARINT32_LEN: usize = 5;

#[derive(Default)]
pub(crate) struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn put_varint(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.buf.push((value as u8) | 0x80);
            value >>= 7;
        }
        self.buf.push(value as u8);
    }

    fn put_key(&mut self, tag: u32, wire_type: u8) {
        self.put_varint((u64::from(tag) << 3) | u64::from(wire_type));
    }

    pub(crate) fn put_u32(&mut self, tag: u32, value: u32) {
        self.put_key(tag, WIRE_VARINT);
        self.put_varint(u64::from(value));
    }

    pub(crate) fn put_bytes(&mut self, tag: u32, value: &[u8]) {
        self.put_key(tag, WIRE_BYTES);
        self.put_varint(value.len() as u64);
        self.buf.extend_from_slice(value);
    }

    /// Packed repeated u32.
    pub(crate) fn put_packed_u32(&mut self, tag: u32, values: &[u32]) {
        let mut inner = Writer::new();
        for value in values {
            inner.put_varint(u64::from(*value));
        }
        self.put_bytes(tag, &inner.buf);
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Field<'a> {
    Varint(u64),
    Bytes(&'a [u8]),
    Fixed,
}

impl<'a> Field<'a> {
    pub(crate) fn as_u32(self) -> Result<u32> {
        match self {
            Field::Varint(v) => u32::try_from(v).map_err(|_| Error::WireFormatInvalid),
            _ => Err(Error::WireFormatInvalid),
        }
    }

    pub(crate) fn as_bytes(self) -> Result<&'a [u8]> {
        match self {
            Field::Bytes(bytes) => Ok(bytes),
            _ => Err(Error::WireFormatInvalid),
        }
    }

    /// Packed repeated u32 with exactly `N` entries.
    pub(crate) fn as_packed_u32<const N: usize>(self) -> Result<[u32; N]> {
        let mut reader = Reader::new(self.as_bytes()?);
        let mut values = [0u32; N];
        for value in &mut values {
            let raw = reader.varint()?;
            *value = u32::try_from(raw).map_err(|_| Error::WireFormatInvalid)?;
        }
        if !reader.is_empty() {
            return Err(Error::WireFormatInvalid);
        }
        Ok(values)
    }
}

pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn varint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = *self.buf.get(self.pos).ok_or(Error::WireFormatInvalid)?;
            self.pos += 1;
            value |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(Error::WireFormatInvalid)
    }

    fn slice(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(Error::WireFormatInvalid)?;
        let bytes = self.buf.get(self.pos..end).ok_or(Error::WireFormatInvalid)?;
        self.pos = end;
        Ok(bytes)
    }

    /// Next `(tag, field)`, or `None` at end of input.
    pub(crate) fn next_field(&mut self) -> Result<Option<(u32, Field<'a>)>> {
        if self.is_empty() {
            return Ok(None);
        }

        let key = self.varint()?;
        let tag = u32::try_from(key >> 3).map_err(|_| Error::WireFormatInvalid)?;
        if tag == 0 {
            return Err(Error::WireFormatInvalid);
        }

        let field = match (key & 0x07) as u8 {
            WIRE_VARINT => Field::Varint(self.varint()?),
            WIRE_BYTES => {
                let len = usize::try_from(self.varint()?).map_err(|_| Error::WireFormatInvalid)?;
                Field::Bytes(self.slice(len)?)
            }
            WIRE_FIXED64 => {
                self.slice(8)?;
                Field::Fixed
            }
            WIRE_FIXED32 => {
                self.slice(4)?;
                Field::Fixed
            }
            _ => return Err(Error::WireFormatInvalid),
        };
        Ok(Some((tag, field)))
    }
}

/// Copies a 32-byte field.
pub(crate) fn array32(bytes: &[u8]) -> Result<[u8; 32]> {
    bytes.try_into().map_err(|_| Error::WireFormatInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_encoding() {
        let mut writer = Writer::new();
        writer.put_u32(1, 300);
        assert_eq!(writer.into_bytes(), vec![0x08, 0xAC, 0x02]);
    }

    #[test]
    fn test_fields_read_back() {
        let mut writer = Writer::new();
        writer.put_u32(1, u32::MAX);
        writer.put_bytes(2, b"abc");
        writer.put_packed_u32(3, &[1, 2, 3, 4]);
        let bytes = writer.into_bytes();

        let mut reader = Reader::new(&bytes);
        let (tag, field) = reader.next_field().unwrap().unwrap();
        assert_eq!((tag, field.as_u32().unwrap()), (1, u32::MAX));
        let (tag, field) = reader.next_field().unwrap().unwrap();
        assert_eq!((tag, field.as_bytes().unwrap()), (2, &b"abc"[..]));
        let (tag, field) = reader.next_field().unwrap().unwrap();
        assert_eq!(tag, 3);
        assert_eq!(field.as_packed_u32::<4>().unwrap(), [1, 2, 3, 4]);
        assert!(reader.next_field().unwrap().is_none());
    }

    #[test]
    fn test_truncated_bytes_rejected() {
        let mut writer = Writer::new();
        writer.put_bytes(1, &[0u8; 10]);
        let bytes = writer.into_bytes();

        let mut reader = Reader::new(&bytes[..bytes.len() - 1]);
        assert_eq!(reader.next_field(), Err(Error::WireFormatInvalid));
    }

    #[test]
    fn test_unterminated_varint_rejected() {
        let mut reader = Reader::new(&[0x08, 0xFF]);
        assert_eq!(reader.next_field(), Err(Error::WireFormatInvalid));
    }

    #[test]
    fn test_group_wire_type_rejected() {
        let mut reader = Reader::new(&[0x0B]);
        assert_eq!(reader.next_field(), Err(Error::WireFormatInvalid));
    }
}
