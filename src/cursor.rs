//! Sequential iteration over a message's direct children.

use crate::descriptor::Descriptor;
use crate::error::ErrorKind;
use crate::journal::{Diff, Journal, PartOffset};
use crate::part::Part;
use crate::stream::Stream;
use crate::wire::WireType;

/// One child occurrence found while scanning a message's bytes: its tag,
/// wire type, and the `PartOffset` anchored to it.
pub(crate) struct RawChild {
    pub tag: u32,
    pub wire_type: WireType,
    pub offset: PartOffset,
    pub version: u64,
}

/// The raw byte-level scan that both [`Cursor`] and
/// [`crate::part::create_by_tag`] build on: walks a message's direct
/// children in wire order, one call to `next` at a time.
pub(crate) struct RawCursor<'j> {
    journal: &'j Journal,
    message: PartOffset,
    pos: usize,
}

impl<'j> RawCursor<'j> {
    pub fn new(journal: &'j Journal, message: PartOffset, start_pos: usize) -> RawCursor<'j> {
        let pos = if start_pos == 0 { message.start } else { start_pos };
        RawCursor {
            journal,
            message,
            pos,
        }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn next(&mut self) -> Result<Option<RawChild>, ErrorKind> {
        if self.pos >= self.message.end {
            return Ok(None);
        }
        let tag_start = self.pos;
        let key = self.journal.with_buffer(|buf| {
            let mut stream = Stream::at(buf, self.pos);
            stream.read_key().map(|(tag, wt)| (tag, wt, stream.offset()))
        });
        let (tag, wire_type, after_key) = match key {
            Ok(v) => v,
            Err(_) => return Ok(None),
        };

        let (child_start, child_end, len_start) = match wire_type {
            WireType::Varint => {
                let end = self
                    .journal
                    .with_buffer(|buf| {
                        let mut stream = Stream::at(buf, after_key);
                        stream.read_varint().map(|_| stream.offset())
                    })
                    .map_err(|_| ErrorKind::Varint)?;
                (after_key, end, 0)
            }
            WireType::Fixed32 => (after_key, after_key + 4, 0),
            WireType::Fixed64 => (after_key, after_key + 8, 0),
            WireType::Length => {
                let len_start = after_key;
                let (len, payload_start) = self
                    .journal
                    .with_buffer(|buf| {
                        let mut stream = Stream::at(buf, after_key);
                        stream.read_varint().map(|v| (v, stream.offset()))
                    })
                    .map_err(|_| ErrorKind::Varint)?;
                (payload_start, payload_start + len as usize, len_start)
            }
        };

        let offset = PartOffset {
            start: child_start,
            end: child_end,
            diff: Diff {
                origin: self.message.start as isize - child_start as isize,
                tag: tag_start as isize - child_start as isize,
                length: if len_start > 0 {
                    len_start as isize - child_start as isize
                } else {
                    0
                },
            },
        };
        self.pos = child_end;
        Ok(Some(RawChild {
            tag,
            wire_type,
            offset,
            version: self.journal.version(),
        }))
    }
}

/// A descriptor-aware cursor over a message's direct children.
///
/// Positioned monotonically: [`Cursor::seek`] only ever scans forward from
/// the current position, matching the protobluff access pattern of reading
/// fields in roughly ascending-tag order. Call [`Cursor::rewind`] to start
/// over.
pub struct Cursor<'j> {
    journal: &'j Journal,
    message: Part<'j>,
    descriptor: &'static Descriptor,
    pos: usize,
    current: Option<RawChild>,
}

impl<'j> Cursor<'j> {
    pub fn create(journal: &'j Journal, message: Part<'j>, descriptor: &'static Descriptor) -> Cursor<'j> {
        let pos = message.start();
        Cursor {
            journal,
            message,
            descriptor,
            pos,
            current: None,
        }
    }

    pub fn rewind(&mut self) {
        self.pos = self.message.start();
        self.current = None;
    }

    /// Brings the cursor's notion of the message's bounds up to date. If
    /// the message itself moved, the scan position is restarted from the
    /// message's (new) start; a concurrent mutation invalidates in-flight
    /// iteration state the same way it would invalidate a live `Part`.
    pub fn align(&mut self) -> Result<(), ErrorKind> {
        let before = self.message.offset();
        self.message.align()?;
        if self.message.offset() != before {
            self.rewind();
        }
        Ok(())
    }

    /// Advances to the next direct child, regardless of tag.
    pub fn next(&mut self) -> Result<bool, ErrorKind> {
        self.align()?;
        let message_offset = self.message.offset();
        let mut raw = RawCursor::new(self.journal, message_offset, self.pos);
        match raw.next()? {
            Some(child) => {
                self.pos = raw.pos();
                self.current = Some(child);
                Ok(true)
            }
            None => {
                self.current = None;
                Ok(false)
            }
        }
    }

    /// Scans forward from the current position to the end of the message
    /// and leaves the cursor on the *last* occurrence of `tag`, per
    /// merged-message semantics (every read sees the last-written
    /// occurrence, matching [`crate::part::create_by_tag`]'s write side).
    pub fn seek(&mut self, tag: u32) -> Result<bool, ErrorKind> {
        let mut last = None;
        loop {
            if !self.next()? {
                break;
            }
            if self.current.as_ref().unwrap().tag == tag {
                last = self.current.take();
            }
        }
        match last {
            Some(child) => {
                self.current = Some(child);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// The tag the cursor currently sits on, if any.
    pub fn current_tag(&self) -> Option<u32> {
        self.current.as_ref().map(|c| c.tag)
    }

    pub fn current_wire_type(&self) -> Option<WireType> {
        self.current.as_ref().map(|c| c.wire_type)
    }

    /// A `Part` over the current occurrence's payload.
    pub fn current_part(&self) -> Option<Part<'j>> {
        self.current
            .as_ref()
            .map(|c| Part::from_offset(self.journal, c.version, c.offset))
    }

    /// Whether the field descriptor recognizes the tag currently under the
    /// cursor (an unknown field is skipped by higher layers, not an error
    /// here).
    pub fn matches_known_field(&self) -> bool {
        self.current_tag()
            .and_then(|tag| self.descriptor.field_by_tag(tag))
            .is_some()
    }

    /// Removes the current occurrence (tag, length prefix if any, and
    /// payload) from the buffer and advances past it.
    pub fn erase(&mut self) -> Result<(), ErrorKind> {
        let mut part = self.current_part().ok_or(ErrorKind::Absent)?;
        part.clear()?;
        self.current = None;
        self.pos = part.end();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::DefaultAllocator;
    use crate::buffer::Buffer;
    use crate::descriptor::{FieldDescriptor, Label};
    use crate::journal::Journal as J;
    use crate::wire::Type;
    use std::rc::Rc;

    static FIELDS: &[FieldDescriptor] = &[
        FieldDescriptor {
            tag: 1,
            name: "a",
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
            name: "b",
            ty: Type::Uint32,
            label: Label::Optional,
            nested: None,
            nested_enum: None,
            default: None,
            packed: false,
            oneof: None,
        },
    ];
    static DESC: Descriptor = Descriptor::new("M", FIELDS);

    #[test]
    fn iterates_fields_in_wire_order() {
        // tag 1 varint 5, tag 2 varint 9: 0x08 0x05 0x10 0x09
        let journal = J::new(Buffer::create(
            &[0x08, 0x05, 0x10, 0x09],
            Rc::new(DefaultAllocator),
        ));
        let root = Part::from_journal(&journal);
        let mut cursor = Cursor::create(&journal, root, &DESC);
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.current_tag(), Some(1));
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.current_tag(), Some(2));
        assert!(!cursor.next().unwrap());
    }

    #[test]
    fn seek_lands_on_the_last_occurrence_of_a_duplicated_tag() {
        // tag 1 = 5, tag 1 = 9, tag 2 = 1: last tag-1 occurrence wins.
        let journal = J::new(Buffer::create(
            &[0x08, 0x05, 0x08, 0x09, 0x10, 0x01],
            Rc::new(DefaultAllocator),
        ));
        let root = Part::from_journal(&journal);
        let mut cursor = Cursor::create(&journal, root, &DESC);
        assert!(cursor.seek(1).unwrap());
        cursor.current_part().unwrap().with_bytes(|b| assert_eq!(b, &[0x09]));
    }

    #[test]
    fn seek_finds_tag_and_erase_removes_it() {
        let journal = J::new(Buffer::create(
            &[0x08, 0x05, 0x10, 0x09],
            Rc::new(DefaultAllocator),
        ));
        let root = Part::from_journal(&journal);
        let mut cursor = Cursor::create(&journal, root, &DESC);
        assert!(cursor.seek(2).unwrap());
        cursor.erase().unwrap();
        journal.with_buffer(|b| assert_eq!(b, &[0x08, 0x05]));
    }
}
