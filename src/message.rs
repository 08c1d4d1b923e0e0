//! The top-level read/write handle over one message occurrence.

use crate::cursor::Cursor;
use crate::descriptor::{Descriptor, OneofDescriptor};
use crate::error::ErrorKind;
use crate::field::Field;
use crate::journal::{Journal, PartOffset};
use crate::oneof::Oneof;
use crate::part::Part;
use crate::value::Value;

/// A message occurrence: a [`Part`] over its encoded bytes (the whole
/// buffer for a top-level message, or a length-delimited field's payload
/// for a nested one) paired with the descriptor that names its fields.
pub struct Message<'j> {
    journal: &'j Journal,
    part: Part<'j>,
    descriptor: &'static Descriptor,
}

impl<'j> Message<'j> {
    /// A top-level message over an entire journal.
    pub fn create(journal: &'j Journal, descriptor: &'static Descriptor) -> Message<'j> {
        Message {
            journal,
            part: Part::from_journal(journal),
            descriptor,
        }
    }

    /// Wraps an existing part as a message body, without requiring it to
    /// span the whole buffer.
    pub fn create_within(journal: &'j Journal, part: Part<'j>, descriptor: &'static Descriptor) -> Message<'j> {
        Message {
            journal,
            part,
            descriptor,
        }
    }

    /// Reinterprets an already-decoded `BYTES`/`STRING` field's payload as
    /// a nested message, in place: no copy, no re-parse beyond what the
    /// field access already did.
    pub fn create_from_field(field: &Field<'j>, descriptor: &'static Descriptor) -> Message<'j> {
        Message {
            journal: field.part().journal(),
            part: field.part(),
            descriptor,
        }
    }

    pub fn descriptor(&self) -> &'static Descriptor {
        self.descriptor
    }

    pub fn part(&self) -> Part<'j> {
        self.part
    }

    fn offset(&mut self) -> Result<PartOffset, ErrorKind> {
        self.part.align()?;
        Ok(self.part.offset())
    }

    fn cursor(&mut self) -> Result<Cursor<'j>, ErrorKind> {
        let offset = self.offset()?;
        let part = Part::from_offset(self.journal, self.journal.version(), offset);
        Ok(Cursor::create(self.journal, part, self.descriptor))
    }

    /// Whether `tag` occurs at least once.
    pub fn has(&mut self, tag: u32) -> Result<bool, ErrorKind> {
        let mut cursor = self.cursor()?;
        cursor.seek(tag)
    }

    /// Decodes the first (or only, for non-repeated fields) occurrence of
    /// `tag` and hands it to `f`. Falls back to the field's declared
    /// default, without touching the journal, if the field is absent.
    pub fn get<R>(&mut self, tag: u32, f: impl FnOnce(Value) -> R) -> Result<R, ErrorKind> {
        let field_descriptor = self.descriptor.field_by_tag(tag).ok_or(ErrorKind::Descriptor)?;
        let mut cursor = self.cursor()?;
        if cursor.seek(tag)? {
            let part = cursor.current_part().ok_or(ErrorKind::Absent)?;
            let mut field = Field::from_part(part, field_descriptor);
            field.get(f)
        } else if let Some(default) = field_descriptor.default {
            Ok(f(default_to_value(default)))
        } else {
            Err(ErrorKind::Absent)
        }
    }

    /// Finds-or-creates `tag` and writes `value` into it, cascading any
    /// length-prefix change through this message's own ancestors.
    pub fn put(&mut self, tag: u32, value: Value) -> Result<(), ErrorKind> {
        let offset = self.offset()?;
        let mut field = Field::create(self.journal, offset, self.descriptor, tag)?;
        field.put(value)?;
        self.part.align()?;
        Ok(())
    }

    /// Removes every occurrence of `tag` (all elements, for a repeated
    /// field).
    pub fn clear(&mut self, tag: u32) -> Result<(), ErrorKind> {
        loop {
            let mut cursor = self.cursor()?;
            if !cursor.seek(tag)? {
                break;
            }
            cursor.erase()?;
        }
        self.part.align()?;
        Ok(())
    }

    /// Erases whichever member of `oneof` is currently set.
    pub fn erase_oneof(&mut self, oneof: &'static OneofDescriptor) -> Result<(), ErrorKind> {
        let offset = self.offset()?;
        let mut handle = Oneof::create(self.journal, offset, oneof);
        handle.clear()?;
        self.part.align()?;
        Ok(())
    }

    /// Finds-or-creates a nested submessage field.
    pub fn create_nested(&mut self, tag: u32) -> Result<Message<'j>, ErrorKind> {
        let field_descriptor = self.descriptor.field_by_tag(tag).ok_or(ErrorKind::Descriptor)?;
        let nested_descriptor = field_descriptor.nested.ok_or(ErrorKind::Descriptor)?;
        let offset = self.offset()?;
        let field = Field::create(self.journal, offset, self.descriptor, tag)?;
        self.part.align()?;
        Ok(Message {
            journal: self.journal,
            part: field.part(),
            descriptor: nested_descriptor,
        })
    }

    /// The non-destructive counterpart to [`Message::create_nested`]:
    /// returns the existing nested submessage without creating one if
    /// absent.
    pub fn nested(&mut self, tag: u32) -> Result<Option<Message<'j>>, ErrorKind> {
        let field_descriptor = self.descriptor.field_by_tag(tag).ok_or(ErrorKind::Descriptor)?;
        let nested_descriptor = field_descriptor.nested.ok_or(ErrorKind::Descriptor)?;
        let mut cursor = self.cursor()?;
        if cursor.seek(tag)? {
            let part = cursor.current_part().ok_or(ErrorKind::Absent)?;
            Ok(Some(Message {
                journal: self.journal,
                part,
                descriptor: nested_descriptor,
            }))
        } else {
            Ok(None)
        }
    }

    /// Iteratively descends through every tag but the last via
    /// [`Message::create_nested`], asserting along the way that every
    /// non-leaf hop is a non-repeated message field. `tags` must be
    /// non-empty.
    pub fn create_nested_path(&mut self, tags: &[u32]) -> Result<Message<'j>, ErrorKind> {
        let (&last, head) = tags.split_last().ok_or(ErrorKind::Descriptor)?;
        let mut current = Message {
            journal: self.journal,
            part: self.part,
            descriptor: self.descriptor,
        };
        for &tag in head {
            let field = current
                .descriptor
                .field_by_tag(tag)
                .ok_or(ErrorKind::Descriptor)?;
            debug_assert!(
                !field.is_repeated(),
                "create_nested_path cannot descend through repeated field {tag}"
            );
            current = current.create_nested(tag)?;
        }
        current.create_nested(last)
    }

    /// The non-destructive equivalent of [`Message::create_nested_path`]:
    /// resolves every tag but the last via a read-only cursor chain,
    /// returning `None` as soon as a hop is absent.
    fn resolve_branch(&mut self, tags: &[u32]) -> Result<Option<(Message<'j>, u32)>, ErrorKind> {
        let (&last, head) = tags.split_last().ok_or(ErrorKind::Descriptor)?;
        let mut current = Message {
            journal: self.journal,
            part: self.part,
            descriptor: self.descriptor,
        };
        for &tag in head {
            match current.nested(tag)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some((current, last)))
    }

    /// Whether every hop in `tags` is present, down to the leaf field.
    pub fn nested_has(&mut self, tags: &[u32]) -> Result<bool, ErrorKind> {
        match self.resolve_branch(tags)? {
            Some((mut branch, leaf)) => branch.has(leaf),
            None => Ok(false),
        }
    }

    /// Reads the leaf field at the end of `tags`. Non-destructive, falls
    /// back to the leaf field's declared default the same way
    /// [`Message::get`] does if any hop (including the leaf) is absent.
    pub fn nested_get<R>(&mut self, tags: &[u32], f: impl FnOnce(Value) -> R) -> Result<R, ErrorKind> {
        match self.resolve_branch(tags)? {
            Some((mut branch, leaf)) => branch.get(leaf, f),
            None => {
                let (&last, head) = tags.split_last().ok_or(ErrorKind::Descriptor)?;
                let mut descriptor = self.descriptor;
                for &tag in head {
                    descriptor = descriptor
                        .field_by_tag(tag)
                        .and_then(|field| field.nested)
                        .ok_or(ErrorKind::Descriptor)?;
                }
                let field_descriptor = descriptor.field_by_tag(last).ok_or(ErrorKind::Descriptor)?;
                match field_descriptor.default {
                    Some(default) => Ok(f(default_to_value(default))),
                    None => Err(ErrorKind::Absent),
                }
            }
        }
    }

    /// Writes the leaf field at the end of `tags`, creating every
    /// intermediate submessage along the way, unlike the read-only
    /// `nested_*` siblings.
    pub fn nested_put(&mut self, tags: &[u32], value: Value) -> Result<(), ErrorKind> {
        let (&last, head) = tags.split_last().ok_or(ErrorKind::Descriptor)?;
        if head.is_empty() {
            return self.put(last, value);
        }
        let mut branch = self.create_nested_path(head)?;
        branch.put(last, value)
    }

    /// Erases the leaf field at the end of `tags`: a no-op if any hop is
    /// already absent.
    pub fn nested_erase(&mut self, tags: &[u32]) -> Result<(), ErrorKind> {
        match self.resolve_branch(tags)? {
            Some((mut branch, leaf)) => branch.clear(leaf),
            None => Ok(()),
        }
    }

    /// Appends one element to a packed repeated field's envelope,
    /// creating the envelope on first use. Unpacked repeated fields use
    /// [`Message::put`] once per element instead, each call producing its
    /// own tag occurrence.
    pub fn append_packed(&mut self, tag: u32, value: Value) -> Result<(), ErrorKind> {
        let field_descriptor = self.descriptor.field_by_tag(tag).ok_or(ErrorKind::Descriptor)?;
        if !field_descriptor.packed {
            return Err(ErrorKind::Descriptor);
        }
        let offset = self.offset()?;
        let mut field = Field::create(self.journal, offset, self.descriptor, tag)?;
        let mut payload = field.part().with_bytes(|bytes| bytes.to_vec());
        crate::field::encode_value(value, &mut payload);
        field.write_raw(&payload)?;
        self.part.align()?;
        Ok(())
    }

    /// Iterates every occurrence of `tag` (the repeated-field read path),
    /// including elements packed into a single `LENGTH`-wired envelope.
    pub fn for_each<E>(
        &mut self,
        tag: u32,
        mut f: impl FnMut(Value) -> Result<(), E>,
    ) -> Result<(), ErrorKind>
    where
        E: Into<ErrorKind>,
    {
        let field_descriptor = self.descriptor.field_by_tag(tag).ok_or(ErrorKind::Descriptor)?;
        let mut cursor = self.cursor()?;
        while cursor.next()? {
            if cursor.current_tag() != Some(tag) {
                continue;
            }
            let part = cursor.current_part().ok_or(ErrorKind::Absent)?;
            if field_descriptor.packed && field_descriptor.ty.is_packable() {
                part.with_bytes(|payload| -> Result<(), ErrorKind> {
                    let mut stream = crate::stream::Stream::new(payload);
                    while !stream.is_empty() {
                        let value = stream.read(field_descriptor.ty)?;
                        f(value).map_err(Into::into)?;
                    }
                    Ok(())
                })?;
            } else {
                let mut field = Field::from_part(part, field_descriptor);
                field.get(|value| f(value).map_err(Into::into))??;
            }
        }
        Ok(())
    }
}

fn default_to_value(default: &'static crate::descriptor::DefaultValue) -> Value<'static> {
    use crate::descriptor::DefaultValue;
    match *default {
        DefaultValue::Int32(v) => Value::Int32(v),
        DefaultValue::Int64(v) => Value::Int64(v),
        DefaultValue::Uint32(v) => Value::Uint32(v),
        DefaultValue::Uint64(v) => Value::Uint64(v),
        DefaultValue::Bool(v) => Value::Bool(v),
        DefaultValue::Enum(v) => Value::Enum(v),
        DefaultValue::Float(v) => Value::Float(v),
        DefaultValue::Double(v) => Value::Double(v),
        DefaultValue::Bytes(b) => Value::Bytes(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::DefaultAllocator;
    use crate::buffer::Buffer;
    use crate::descriptor::{DefaultValue, FieldDescriptor, Label};
    use crate::wire::Type;
    use std::rc::Rc;

    static NESTED_FIELDS: &[FieldDescriptor] = &[FieldDescriptor {
        tag: 1,
        name: "value",
        ty: Type::Uint32,
        label: Label::Optional,
        nested: None,
        nested_enum: None,
        default: None,
        packed: false,
        oneof: None,
    }];
    static NESTED: Descriptor = Descriptor::new("Nested", NESTED_FIELDS);

    static DEFAULT_SEVEN: DefaultValue = DefaultValue::Uint32(7);
    static FIELDS: &[FieldDescriptor] = &[
        FieldDescriptor {
            tag: 1,
            name: "count",
            ty: Type::Uint32,
            label: Label::Optional,
            nested: None,
            nested_enum: None,
            default: Some(&DEFAULT_SEVEN),
            packed: false,
            oneof: None,
        },
        FieldDescriptor {
            tag: 2,
            name: "child",
            ty: Type::Message,
            label: Label::Optional,
            nested: Some(&NESTED),
            nested_enum: None,
            default: None,
            packed: false,
            oneof: None,
        },
        FieldDescriptor {
            tag: 3,
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
    static DESC: Descriptor = Descriptor::new("Top", FIELDS);

    fn empty_journal() -> Journal {
        Journal::new(Buffer::create_empty(Rc::new(DefaultAllocator)))
    }

    #[test]
    fn absent_field_returns_declared_default() {
        let journal = empty_journal();
        let mut msg = Message::create(&journal, &DESC);
        assert!(!msg.has(1).unwrap());
        let value = msg.get(1, Value::to_owned_scalar).unwrap();
        assert_eq!(value, Value::Uint32(7));
    }

    #[test]
    fn put_then_get_round_trips() {
        let journal = empty_journal();
        let mut msg = Message::create(&journal, &DESC);
        msg.put(1, Value::Uint32(42)).unwrap();
        assert!(msg.has(1).unwrap());
        assert_eq!(msg.get(1, Value::to_owned_scalar).unwrap(), Value::Uint32(42));
    }

    #[test]
    fn create_nested_then_write_cascades_length_prefix() {
        let journal = empty_journal();
        let mut msg = Message::create(&journal, &DESC);
        {
            let mut child = msg.create_nested(2).unwrap();
            child.put(1, Value::Uint32(999)).unwrap();
        }
        let mut child = msg.nested(2).unwrap().unwrap();
        assert_eq!(child.get(1, Value::to_owned_scalar).unwrap(), Value::Uint32(999));
    }

    #[test]
    fn packed_repeated_reads_every_element() {
        let journal = empty_journal();
        let mut msg = Message::create(&journal, &DESC);
        msg.append_packed(3, Value::Uint32(1)).unwrap();
        msg.append_packed(3, Value::Uint32(2)).unwrap();
        msg.append_packed(3, Value::Uint32(3)).unwrap();
        journal.with_buffer(|b| assert_eq!(b, &[0x1A, 0x03, 0x01, 0x02, 0x03]));

        let mut seen = Vec::new();
        msg.for_each::<ErrorKind>(3, |v| {
            if let Value::Uint32(n) = v {
                seen.push(n);
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn nested_put_creates_the_whole_branch_and_nested_get_reads_it_back() {
        let journal = empty_journal();
        let mut msg = Message::create(&journal, &DESC);
        msg.nested_put(&[2, 1], Value::Uint32(17)).unwrap();
        assert!(msg.nested_has(&[2, 1]).unwrap());
        assert_eq!(
            msg.nested_get(&[2, 1], Value::to_owned_scalar).unwrap(),
            Value::Uint32(17)
        );

        msg.nested_erase(&[2, 1]).unwrap();
        assert!(!msg.nested_has(&[2, 1]).unwrap());
    }

    #[test]
    fn nested_get_on_absent_branch_is_absent_without_creating_it() {
        let journal = empty_journal();
        let mut msg = Message::create(&journal, &DESC);
        assert!(!msg.nested_has(&[2, 1]).unwrap());
        // NESTED's own tag 1 declares no default, so the absent branch
        // surfaces as `Absent`, not a silently created submessage.
        assert_eq!(
            msg.nested_get(&[2, 1], Value::to_owned_scalar),
            Err(ErrorKind::Absent)
        );
        assert!(!msg.has(2).unwrap());
    }
}
