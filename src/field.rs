//! A single field occurrence: typed read/write dispatch over a [`Part`].

use crate::descriptor::{Descriptor, FieldDescriptor};
use crate::error::ErrorKind;
use crate::journal::{Journal, PartOffset};
use crate::part::{self, Part};
use crate::stream::Stream;
use crate::value::Value;
use crate::varint;
use crate::wire::Type;

/// A field occurrence: a [`Part`] paired with the descriptor that says how
/// to interpret its bytes.
pub struct Field<'j> {
    part: Part<'j>,
    descriptor: &'static FieldDescriptor,
}

impl<'j> Field<'j> {
    /// Creates (or finds the existing occurrence of) `tag` within
    /// `message`, per [`part::create_by_tag`]'s oneof-aware insertion
    /// algorithm.
    pub fn create(
        journal: &'j Journal,
        message: PartOffset,
        descriptor: &'static Descriptor,
        tag: u32,
    ) -> Result<Field<'j>, ErrorKind> {
        let field = descriptor.field_by_tag(tag).ok_or(ErrorKind::Descriptor)?;
        let part = part::create_by_tag(journal, &message, descriptor, tag)?;
        Ok(Field {
            part,
            descriptor: field,
        })
    }

    pub fn from_part(part: Part<'j>, descriptor: &'static FieldDescriptor) -> Field<'j> {
        Field { part, descriptor }
    }

    pub fn descriptor(&self) -> &'static FieldDescriptor {
        self.descriptor
    }

    pub fn part(&self) -> Part<'j> {
        self.part
    }

    /// Decodes the current payload and hands it to `f`. Length-delimited
    /// values borrow directly from the journal's buffer for the duration
    /// of the call — they cannot be returned past it, since the borrow
    /// belongs to a `RefCell` guard that this method drops on return.
    pub fn get<R>(&mut self, f: impl FnOnce(Value) -> R) -> Result<R, ErrorKind> {
        self.part.align()?;
        self.part.with_bytes(|payload| {
            let mut stream = Stream::new(payload);
            stream.read(self.descriptor.ty).map(f)
        })
    }

    /// Encodes `value` and splices it in as this field's payload, cascading
    /// any resulting length-prefix changes outward.
    pub fn put(&mut self, value: Value) -> Result<(), ErrorKind> {
        if !type_matches(value.proto_type(), self.descriptor.ty) {
            return Err(ErrorKind::WireType);
        }
        if let (Value::Enum(n), Some(enum_descriptor)) = (value, self.descriptor.nested_enum) {
            debug_assert!(
                enum_descriptor.contains(n),
                "enum value {n} out of range for {}",
                enum_descriptor.name
            );
        }
        let mut payload = Vec::with_capacity(8);
        encode_value(value, &mut payload);
        self.part.write(&payload)
    }

    /// Splices raw bytes in as this field's payload without the
    /// [`Field::put`] single-value type check, used by the packed-repeated
    /// append path to rewrite a whole envelope at once.
    pub(crate) fn write_raw(&mut self, data: &[u8]) -> Result<(), ErrorKind> {
        self.part.write(data)
    }

    /// Removes this occurrence entirely (tag, length prefix if any, and
    /// payload). The field handle is invalid afterward.
    pub fn clear(&mut self) -> Result<(), ErrorKind> {
        self.part.clear()
    }
}

/// `STRING` and `BYTES` share a wire representation; everything else must
/// match exactly.
fn type_matches(written: Type, declared: Type) -> bool {
    if written == declared {
        return true;
    }
    matches!(written, Type::Bytes) && matches!(declared, Type::String | Type::Bytes)
}

pub(crate) fn push_varint(out: &mut Vec<u8>, value: u64) {
    let mut buf = [0u8; varint::MAX_VARINT_BYTES];
    let n = varint::pack_u64(value, &mut buf);
    out.extend_from_slice(&buf[..n]);
}

/// Encodes a scalar or length-delimited value's payload bytes (not
/// including the tag, which the enclosing [`Part`] already owns).
pub(crate) fn encode_value(value: Value, out: &mut Vec<u8>) {
    match value {
        // Sign-extended to 64 bits before packing, so a negative int32/enum
        // round-trips through the same ten-byte form a reader expects.
        Value::Int32(v) => push_varint(out, v as i64 as u64),
        Value::Int64(v) => push_varint(out, v as u64),
        Value::Uint32(v) => push_varint(out, u64::from(v)),
        Value::Uint64(v) => push_varint(out, v),
        Value::Sint32(v) => push_varint(out, u64::from(varint::zigzag_encode_32(v))),
        Value::Sint64(v) => push_varint(out, varint::zigzag_encode_64(v)),
        Value::Bool(v) => push_varint(out, v as u64),
        Value::Enum(v) => push_varint(out, v as i64 as u64),
        Value::Fixed32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Sfixed32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Float(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Fixed64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Sfixed64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Double(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Bytes(b) => out.extend_from_slice(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::DefaultAllocator;
    use crate::buffer::Buffer;
    use crate::descriptor::{Descriptor, Label};
    use crate::journal::PartOffset;
    use std::rc::Rc;

    static FIELDS: &[FieldDescriptor] = &[
        FieldDescriptor {
            tag: 1,
            name: "count",
            ty: Type::Uint32,
            label: Label::Optional,
            nested: None,
            nested_enum: None,
            default: None,
            packed: false,
            oneof: None,
        },
        FieldDescriptor {
            tag: 2,
            name: "name",
            ty: Type::String,
            label: Label::Optional,
            nested: None,
            nested_enum: None,
            default: None,
            packed: false,
            oneof: None,
        },
    ];
    static DESC: Descriptor = Descriptor::new("M", FIELDS);

    fn empty_journal() -> Journal {
        Journal::new(Buffer::create_empty(Rc::new(DefaultAllocator)))
    }

    #[test]
    fn put_then_get_scalar_round_trips() {
        let journal = empty_journal();
        let root = PartOffset::root(journal.size());
        let mut field = Field::create(&journal, root, &DESC, 1).unwrap();
        field.put(Value::Uint32(300)).unwrap();
        let got = field.get(Value::to_owned_scalar).unwrap();
        assert_eq!(got, Value::Uint32(300));
    }

    #[test]
    fn put_then_get_string_round_trips_and_cascades() {
        let journal = empty_journal();
        let root = PartOffset::root(journal.size());
        let mut field = Field::create(&journal, root, &DESC, 2).unwrap();
        field.put(Value::Bytes(b"hello")).unwrap();
        let got = field.get(|v| v.as_bytes().unwrap().to_vec()).unwrap();
        assert_eq!(got, b"hello");

        // overwrite with a longer string; length prefix must track it
        field.put(Value::Bytes(b"hello, world")).unwrap();
        let got = field.get(|v| v.as_bytes().unwrap().to_vec()).unwrap();
        assert_eq!(got, b"hello, world");
    }

    #[test]
    fn put_rejects_mismatched_type() {
        let journal = empty_journal();
        let root = PartOffset::root(journal.size());
        let mut field = Field::create(&journal, root, &DESC, 1).unwrap();
        assert_eq!(field.put(Value::Bytes(b"x")), Err(ErrorKind::WireType));
    }
}
