//! A read-cursor over a byte slice: typed reads, wire-type-dispatched skip,
//! and advance.

use crate::error::ErrorKind;
use crate::value::Value;
use crate::varint;
use crate::wire::{Type, WireType};

/// Borrows a byte slice and tracks a read position into it.
///
/// All reads fail atomically: on any error `self.offset` is left exactly
/// where the failing read began, so callers can retry a different
/// interpretation of the same bytes (e.g. the decoder façade falling back
/// to `skip` after a descriptor miss).
#[derive(Debug)]
pub struct Stream<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Stream<'a> {
    pub fn new(data: &'a [u8]) -> Stream<'a> {
        Stream { data, offset: 0 }
    }

    pub fn at(data: &'a [u8], offset: usize) -> Stream<'a> {
        Stream { data, offset }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.offset >= self.data.len()
    }

    /// Advances the read position by `n` bytes. Fails with
    /// [`ErrorKind::Offset`] on underflow, i.e. if fewer than `n` bytes
    /// remain.
    pub fn advance(&mut self, n: usize) -> Result<(), ErrorKind> {
        if n > self.remaining() {
            return Err(ErrorKind::Offset);
        }
        self.offset += n;
        Ok(())
    }

    fn tail(&self) -> &'a [u8] {
        &self.data[self.offset..]
    }

    /// Reads a raw varint, advancing past it.
    pub fn read_varint(&mut self) -> Result<u64, ErrorKind> {
        let (value, read) = varint::unpack_u64(self.tail()).ok_or(ErrorKind::Varint)?;
        self.offset += read;
        Ok(value)
    }

    /// Reads a tag varint and splits it into `(tag, wire_type)`.
    pub fn read_key(&mut self) -> Result<(u32, WireType), ErrorKind> {
        let start = self.offset;
        let key = self.read_varint().map_err(|e| {
            self.offset = start;
            e
        })?;
        let wire_type = WireType::from_bits(key & 0x07).map_err(|e| {
            self.offset = start;
            e
        })?;
        let tag = (key >> 3) as u32;
        if tag == 0 {
            self.offset = start;
            return Err(ErrorKind::Varint);
        }
        Ok((tag, wire_type))
    }

    fn read_fixed32_bytes(&mut self) -> Result<[u8; 4], ErrorKind> {
        if self.remaining() < 4 {
            return Err(ErrorKind::Offset);
        }
        let mut out = [0u8; 4];
        out.copy_from_slice(&self.tail()[..4]);
        self.offset += 4;
        Ok(out)
    }

    fn read_fixed64_bytes(&mut self) -> Result<[u8; 8], ErrorKind> {
        if self.remaining() < 8 {
            return Err(ErrorKind::Offset);
        }
        let mut out = [0u8; 8];
        out.copy_from_slice(&self.tail()[..8]);
        self.offset += 8;
        Ok(out)
    }

    /// Reads a length-delimited payload's length prefix and returns a
    /// zero-copy slice into the underlying buffer, without materializing a
    /// further copy.
    pub fn read_length_delimited(&mut self) -> Result<&'a [u8], ErrorKind> {
        let start = self.offset;
        let len = self.read_varint().map_err(|e| {
            self.offset = start;
            e
        })? as usize;
        if len > self.remaining() {
            self.offset = start;
            return Err(ErrorKind::Offset);
        }
        let slice = &self.tail()[..len];
        self.offset += len;
        Ok(slice)
    }

    /// Dispatches a typed read by proto type.
    pub fn read(&mut self, ty: Type) -> Result<Value<'a>, ErrorKind> {
        let start = self.offset;
        let value = (|| match ty {
            Type::Int32 => Ok(Value::Int32(self.read_varint()? as i32)),
            Type::Int64 => Ok(Value::Int64(self.read_varint()? as i64)),
            Type::Uint32 => {
                // Unlike `Int32`/`Sint32`/`Enum`, a `Uint32` is never
                // sign-extended on the wire: a ninth byte with any of bits
                // 32..64 set means the tenth byte would be needed to hold
                // the remainder, i.e. a genuine overflow.
                let raw = self.read_varint()?;
                if raw > u64::from(u32::MAX) {
                    return Err(ErrorKind::Overflow);
                }
                Ok(Value::Uint32(raw as u32))
            }
            Type::Uint64 => Ok(Value::Uint64(self.read_varint()?)),
            Type::Sint32 => Ok(Value::Sint32(varint::zigzag_decode_32(
                self.read_varint()? as u32,
            ))),
            Type::Sint64 => Ok(Value::Sint64(varint::zigzag_decode_64(self.read_varint()?))),
            Type::Bool => Ok(Value::Bool(self.read_varint()? != 0)),
            Type::Enum => Ok(Value::Enum(self.read_varint()? as i32)),
            Type::Fixed32 => Ok(Value::Fixed32(u32::from_le_bytes(
                self.read_fixed32_bytes()?,
            ))),
            Type::Sfixed32 => Ok(Value::Sfixed32(i32::from_le_bytes(
                self.read_fixed32_bytes()?,
            ))),
            Type::Float => Ok(Value::Float(f32::from_le_bytes(self.read_fixed32_bytes()?))),
            Type::Fixed64 => Ok(Value::Fixed64(u64::from_le_bytes(
                self.read_fixed64_bytes()?,
            ))),
            Type::Sfixed64 => Ok(Value::Sfixed64(i64::from_le_bytes(
                self.read_fixed64_bytes()?,
            ))),
            Type::Double => Ok(Value::Double(f64::from_le_bytes(
                self.read_fixed64_bytes()?,
            ))),
            Type::String | Type::Bytes => Ok(Value::Bytes(self.read_length_delimited()?)),
            Type::Message => Err(ErrorKind::WireType),
        })();
        if value.is_err() {
            self.offset = start;
        }
        value
    }

    /// Skips one value of `wire_type`, used when a decoder encounters an
    /// unknown tag.
    pub fn skip(&mut self, wire_type: WireType) -> Result<(), ErrorKind> {
        let start = self.offset;
        let result = match wire_type {
            WireType::Varint => self.read_varint().map(|_| ()),
            WireType::Fixed32 => self.advance(4),
            WireType::Fixed64 => self.advance(8),
            WireType::Length => self.read_length_delimited().map(|_| ()),
        };
        if result.is_err() {
            self.offset = start;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_key_then_value() {
        // tag 1, varint wire type, value 127: 0x08 0x7F
        let mut stream = Stream::new(&[0x08, 0x7F]);
        let (tag, wire_type) = stream.read_key().unwrap();
        assert_eq!(tag, 1);
        assert_eq!(wire_type, WireType::Varint);
        assert_eq!(stream.read(Type::Uint32).unwrap(), Value::Uint32(127));
    }

    #[test]
    fn failed_read_leaves_offset_unmoved() {
        let mut stream = Stream::new(&[0x80]); // truncated varint
        let before = stream.offset();
        assert!(stream.read(Type::Uint32).is_err());
        assert_eq!(stream.offset(), before);
    }

    #[test]
    fn skip_dispatches_by_wire_type() {
        let mut stream = Stream::new(&[0x01, 0x02, 0x03, 0x04]);
        stream.skip(WireType::Fixed32).unwrap();
        assert!(stream.is_empty());
    }

    #[test]
    fn uint32_read_rejects_value_wider_than_32_bits() {
        // 0xFFFFFFFFFFFFFFFF encoded as a 10-byte varint: low 32 bits all
        // set is fine for a sign-extended Int32, but a bare Uint32 read must
        // reject it as an overflow rather than silently truncate.
        let mut buf = [0u8; varint::MAX_VARINT_BYTES];
        let n = varint::pack_u64(u64::MAX, &mut buf);
        let mut stream = Stream::new(&buf[..n]);
        assert_eq!(stream.read(Type::Uint32), Err(ErrorKind::Overflow));

        // The same bytes read as Int32 truncate to -1, which is valid.
        let mut stream = Stream::new(&buf[..n]);
        assert_eq!(stream.read(Type::Int32).unwrap(), Value::Int32(-1));
    }

    #[test]
    fn length_delimited_is_zero_copy() {
        let data = [0x03, b'a', b'b', b'c'];
        let mut stream = Stream::new(&data);
        let slice = stream.read_length_delimited().unwrap();
        assert_eq!(slice.as_ptr(), data.as_ptr().wrapping_add(1));
        assert_eq!(slice, b"abc");
    }
}
