//! A stateless, journal-independent encoder and decoder.
//!
//! Everything else in this crate mutates a buffer in place through a
//! [`crate::journal::Journal`]. `codec` is the thin exception: a one-shot
//! push decoder over a borrowed `&[u8]`, and an append-only encoder that
//! builds a fresh `Vec<u8>`, for callers that only need to walk or produce
//! a message once and have no use for the journal's versioning.

use crate::descriptor::Descriptor;
use crate::error::ErrorKind;
use crate::field::{encode_value, push_varint};
use crate::stream::Stream;
use crate::value::Value;
use crate::wire::{Type, WireType};

/// One event produced while decoding a message's bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event<'a> {
    /// A single scalar or length-delimited value for a known field.
    Field { tag: u32, value: Value<'a> },
    /// One element out of a packed-repeated field's envelope.
    PackedElement { tag: u32, value: Value<'a> },
    /// A `MESSAGE`-typed field's raw payload, not yet recursed into.
    /// Zero-copy: `bytes` borrows directly from the slice passed to
    /// [`decode`], so nested messages can be walked without re-copying.
    Message { tag: u32, bytes: &'a [u8] },
    /// A tag absent from `descriptor`. The decoder has already skipped
    /// past its value by the time this is delivered.
    Unknown { tag: u32, wire_type: WireType },
}

/// Walks `data` as an instance of `descriptor`, delivering one [`Event`]
/// per field occurrence to `f`: a push decoder, not a tree builder.
/// Unknown fields are skipped, not an error.
pub fn decode<'a>(
    descriptor: &'static Descriptor,
    data: &'a [u8],
    mut f: impl FnMut(Event<'a>) -> Result<(), ErrorKind>,
) -> Result<(), ErrorKind> {
    let mut stream = Stream::new(data);
    while !stream.is_empty() {
        let (tag, wire_type) = stream.read_key()?;
        let field = descriptor.field_by_tag(tag);
        match field {
            Some(field) if field.ty == Type::Message => {
                let bytes = stream.read_length_delimited()?;
                f(Event::Message { tag, bytes })?;
            }
            Some(field) if field.packed && field.ty.is_packable() && wire_type == WireType::Length => {
                let payload = stream.read_length_delimited()?;
                let mut inner = Stream::new(payload);
                while !inner.is_empty() {
                    let value = inner.read(field.ty)?;
                    f(Event::PackedElement { tag, value })?;
                }
            }
            Some(field) => {
                let value = stream.read(field.ty)?;
                f(Event::Field { tag, value })?;
            }
            None => {
                f(Event::Unknown { tag, wire_type })?;
                stream.skip(wire_type)?;
            }
        }
    }
    Ok(())
}

/// An append-only byte builder for encoding a message from scratch. Unlike
/// [`crate::part::Part::write`], there is no splicing, no cascade, and no
/// way to edit a value once written — every call appends.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Encoder {
        Encoder { buf: Vec::new() }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn append_key(&mut self, tag: u32, wire_type: WireType) {
        let key = (u64::from(tag) << 3) | wire_type.bits();
        push_varint(&mut self.buf, key);
    }

    /// Appends one scalar or length-delimited field.
    pub fn append(&mut self, tag: u32, value: Value) {
        self.append_key(tag, value.proto_type().wire_type());
        match value {
            Value::Bytes(bytes) => {
                push_varint(&mut self.buf, bytes.len() as u64);
                self.buf.extend_from_slice(bytes);
            }
            scalar => encode_value(scalar, &mut self.buf),
        }
    }

    /// Appends a nested message, built by `build` into its own encoder and
    /// then length-prefixed into this one.
    pub fn append_message(&mut self, tag: u32, build: impl FnOnce(&mut Encoder)) {
        self.append_key(tag, WireType::Length);
        let mut inner = Encoder::new();
        build(&mut inner);
        let bytes = inner.into_bytes();
        push_varint(&mut self.buf, bytes.len() as u64);
        self.buf.extend_from_slice(&bytes);
    }

    /// Appends a packed-repeated field's whole envelope in one call.
    pub fn append_packed<'v>(&mut self, tag: u32, values: impl IntoIterator<Item = Value<'v>>) {
        self.append_key(tag, WireType::Length);
        let mut payload = Vec::new();
        for value in values {
            encode_value(value, &mut payload);
        }
        push_varint(&mut self.buf, payload.len() as u64);
        self.buf.extend_from_slice(&payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{FieldDescriptor, Label};

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
            name: "items",
            ty: Type::Uint32,
            label: Label::Repeated,
            nested: None,
            nested_enum: None,
            default: None,
            packed: true,
            oneof: None,
        },
    ];
    static DESC: Descriptor = Descriptor::new("M", FIELDS);

    #[test]
    fn encode_then_decode_round_trips_a_scalar_and_a_packed_field() {
        let mut encoder = Encoder::new();
        encoder.append(1, Value::Uint32(42));
        encoder.append_packed(2, [Value::Uint32(1), Value::Uint32(2), Value::Uint32(3)]);
        let bytes = encoder.into_bytes();

        let mut scalar = None;
        let mut packed = Vec::new();
        decode(&DESC, &bytes, |event| {
            match event {
                Event::Field { tag: 1, value } => scalar = Some(value),
                Event::PackedElement { tag: 2, value } => packed.push(value),
                _ => {}
            }
            Ok(())
        })
        .unwrap();

        assert_eq!(scalar, Some(Value::Uint32(42)));
        assert_eq!(
            packed,
            vec![Value::Uint32(1), Value::Uint32(2), Value::Uint32(3)]
        );
    }

    #[test]
    fn unknown_fields_are_skipped_not_errored() {
        let mut encoder = Encoder::new();
        encoder.append(99, Value::Uint32(7));
        encoder.append(1, Value::Uint32(5));
        let bytes = encoder.into_bytes();

        let mut seen_unknown = false;
        let mut scalar = None;
        decode(&DESC, &bytes, |event| {
            match event {
                Event::Unknown { tag: 99, .. } => seen_unknown = true,
                Event::Field { tag: 1, value } => scalar = Some(value),
                _ => {}
            }
            Ok(())
        })
        .unwrap();

        assert!(seen_unknown);
        assert_eq!(scalar, Some(Value::Uint32(5)));
    }
}
