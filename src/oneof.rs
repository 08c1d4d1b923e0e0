//! Mutual exclusivity among a set of fields.

use crate::cursor::RawCursor;
use crate::descriptor::OneofDescriptor;
use crate::error::ErrorKind;
use crate::journal::{Journal, PartOffset};
use crate::part::Part;

/// A handle to one oneof group within a particular message occurrence.
///
/// Exclusivity itself is enforced at the point a member field is created
/// ([`crate::part::create_by_tag`] erases any sibling occurrence before
/// inserting a new one); `Oneof` exposes the read side — which case (if
/// any) currently holds the slot — and an explicit way to clear it.
pub struct Oneof<'j> {
    journal: &'j Journal,
    message: PartOffset,
    descriptor: &'static OneofDescriptor,
}

impl<'j> Oneof<'j> {
    pub fn create(journal: &'j Journal, message: PartOffset, descriptor: &'static OneofDescriptor) -> Oneof<'j> {
        Oneof {
            journal,
            message,
            descriptor,
        }
    }

    /// The tag of the member field currently occupying this oneof, if any.
    ///
    /// This crate's own write path enforces exclusivity at creation time,
    /// so at most one member is ever present through normal use — but
    /// against raw wire data with two or more members coexisting, merged-
    /// message semantics apply: the last one scanned wins.
    pub fn case(&self) -> Result<Option<u32>, ErrorKind> {
        let mut cursor = RawCursor::new(self.journal, self.message, 0);
        let mut last = None;
        while let Some(child) = cursor.next()? {
            if self.descriptor.contains(child.tag) {
                last = Some(child.tag);
            }
        }
        Ok(last)
    }

    /// Erases whichever member is currently set. A no-op if none is.
    pub fn clear(&mut self) -> Result<(), ErrorKind> {
        let target = self.case()?;
        let Some(target) = target else {
            return Ok(());
        };
        let mut cursor = RawCursor::new(self.journal, self.message, 0);
        while let Some(child) = cursor.next()? {
            if child.tag == target {
                let mut part = Part::from_offset(self.journal, child.version, child.offset);
                return part.clear();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::DefaultAllocator;
    use crate::buffer::Buffer;
    use crate::descriptor::{Descriptor, FieldDescriptor, Label};
    use crate::field::Field;
    use crate::value::Value;
    use crate::wire::Type;
    use std::rc::Rc;

    static ONEOF: OneofDescriptor = OneofDescriptor {
        name: "choice",
        message: &DESC,
        member_tags: &[1, 2],
    };
    static FIELDS: &[FieldDescriptor] = &[
        FieldDescriptor {
            tag: 1,
            name: "a",
            ty: Type::Uint32,
            label: Label::Oneof,
            nested: None,
            nested_enum: None,
            default: None,
            packed: false,
            oneof: Some(&ONEOF),
        },
        FieldDescriptor {
            tag: 2,
            name: "b",
            ty: Type::Uint32,
            label: Label::Oneof,
            nested: None,
            nested_enum: None,
            default: None,
            packed: false,
            oneof: Some(&ONEOF),
        },
    ];
    static DESC: Descriptor = Descriptor::new("Choice", FIELDS);

    #[test]
    fn setting_one_member_clears_the_other() {
        let journal = Journal::new(Buffer::create_empty(Rc::new(DefaultAllocator)));
        let root = PartOffset::root(journal.size());
        let mut a = Field::create(&journal, root, &DESC, 1).unwrap();
        a.put(Value::Uint32(7)).unwrap();

        let root = PartOffset {
            start: 0,
            end: journal.size(),
            diff: Default::default(),
        };
        let mut b = Field::create(&journal, root, &DESC, 2).unwrap();
        b.put(Value::Uint32(9)).unwrap();

        let root = PartOffset {
            start: 0,
            end: journal.size(),
            diff: Default::default(),
        };
        let oneof = Oneof::create(&journal, root, &ONEOF);
        assert_eq!(oneof.case().unwrap(), Some(2));
    }

    #[test]
    fn case_picks_last_member_against_adversarial_wire_data_with_both_present() {
        // Bypasses `Field::create`'s exclusivity enforcement by writing raw
        // bytes directly: tag 1 = 7, then tag 2 = 9, both present at once.
        let journal = Journal::new(Buffer::create(
            &[0x08, 0x07, 0x10, 0x09],
            Rc::new(DefaultAllocator),
        ));
        let root = PartOffset::root(journal.size());
        let oneof = Oneof::create(&journal, root, &ONEOF);
        assert_eq!(oneof.case().unwrap(), Some(2));
    }
}
