//! The part: a versioned handle over a journal region, and the recursive
//! length-prefix adjustment algorithm that keeps every enclosing message's
//! length varint consistent after a mutation.

use crate::descriptor::{Descriptor, FieldDescriptor};
use crate::error::ErrorKind;
use crate::journal::{Diff, Journal, PartOffset};
use crate::stream::Stream;
use crate::varint;
use crate::wire::WireType;

/// Top bit of [`Part`]'s stored version, reserved as the invalidated flag.
const INVALID_BIT: u64 = 1 << 63;

/// A versioned handle over a contiguous byte range in a [`Journal`].
///
/// Holds a plain shared reference to its journal rather than an owning
/// one; callers guarantee the journal outlives every handle over it.
/// Mutation happens through the journal's interior mutability (see
/// [`crate::journal`]'s module docs).
#[derive(Debug, Clone, Copy)]
pub struct Part<'j> {
    journal: &'j Journal,
    version: u64,
    offset: PartOffset,
}

impl<'j> Part<'j> {
    /// The root part over the entire journal.
    pub fn from_journal(journal: &'j Journal) -> Part<'j> {
        Part {
            journal,
            version: journal.version(),
            offset: PartOffset::root(journal.size()),
        }
    }

    /// A part built directly from a captured offset and version, as when a
    /// [`crate::cursor::Cursor`] hands one of its positions to a
    /// [`crate::field::Field`].
    pub fn from_offset(journal: &'j Journal, version: u64, offset: PartOffset) -> Part<'j> {
        Part {
            journal,
            version,
            offset,
        }
    }

    pub fn journal(&self) -> &'j Journal {
        self.journal
    }

    fn raw_version(&self) -> u64 {
        self.version & !INVALID_BIT
    }

    pub fn is_valid(&self) -> bool {
        self.version & INVALID_BIT == 0
    }

    fn mark_invalid(&mut self) {
        self.version |= INVALID_BIT;
    }

    /// Realigns this part's offsets to the journal's current version if
    /// they are stale: a part is aligned iff its version equals the
    /// journal's.
    pub fn align(&mut self) -> Result<(), ErrorKind> {
        if !self.is_valid() {
            return Err(ErrorKind::Invalid);
        }
        let current = self.journal.version();
        if self.raw_version() == current {
            return Ok(());
        }
        if self.journal.align(&mut self.offset, self.raw_version()) {
            self.version = current;
            Ok(())
        } else {
            self.mark_invalid();
            Err(ErrorKind::Invalid)
        }
    }

    pub fn start(&self) -> usize {
        self.offset.start
    }

    pub fn end(&self) -> usize {
        self.offset.end
    }

    pub fn size(&self) -> usize {
        self.offset.len()
    }

    pub fn offset(&self) -> PartOffset {
        self.offset
    }

    pub fn has_length_prefix(&self) -> bool {
        self.offset.diff.length != 0
    }

    /// The absolute position of the containing message's start.
    fn origin(&self) -> usize {
        (self.offset.start as isize + self.offset.diff.origin) as usize
    }

    /// Reads this part's payload bytes through `f`, without copying.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let (start, end) = (self.offset.start, self.offset.end);
        self.journal.with_buffer(|buf| f(&buf[start..end]))
    }

    /// Splices `data` in for the current payload, then cascades the
    /// length-prefix adjustment through every enclosing ancestor.
    pub fn write(&mut self, data: &[u8]) -> Result<(), ErrorKind> {
        self.align()?;
        let delta = data.len() as isize - self.size() as isize;
        let origin = self.origin();
        self.journal
            .write(origin, self.offset.start, self.offset.end, data)?;
        self.version = self.journal.version();
        if delta == 0 {
            return Ok(());
        }
        self.offset.end = (self.offset.end as isize + delta) as usize;

        let mut cascade_delta = delta;
        if self.has_length_prefix() {
            adjust_prefix(self.journal, &mut self.offset, &mut cascade_delta)?;
            self.version = self.journal.version();
        }
        if !adjust(self.journal, &self.offset, cascade_delta)? {
            self.mark_invalid();
            return Err(ErrorKind::Invalid);
        }
        self.version = self.journal.version();
        Ok(())
    }

    /// Erases the tag (and length prefix, if any) along with the payload,
    /// then cascades. The part is invalid afterward.
    pub fn clear(&mut self) -> Result<(), ErrorKind> {
        self.align()?;
        let tag_start = (self.offset.start as isize + self.offset.diff.tag) as usize;
        let origin = self.origin();
        let old_end = self.offset.end;
        self.journal.clear(origin, tag_start, old_end)?;
        self.version = self.journal.version();
        let delta = -((old_end - tag_start) as isize);
        self.offset.start = tag_start;
        self.offset.end = tag_start;

        // Whether or not the ancestor-chain walk below finds a consistent
        // enclosing length prefix to fix up, this part is gone either way.
        let _ = adjust(self.journal, &self.offset, delta)?;
        self.mark_invalid();
        Ok(())
    }
}

/// Re-encodes `offset.size()` as a varint and splices it over the old
/// length prefix, updating `offset` and
/// accumulating any secondary delta (the new prefix may itself be a
/// different number of bytes) into `delta`.
fn adjust_prefix(
    journal: &Journal,
    offset: &mut PartOffset,
    delta: &mut isize,
) -> Result<(), ErrorKind> {
    let old_prefix_start = (offset.start as isize + offset.diff.length) as usize;
    let old_prefix_len = offset.start - old_prefix_start;

    let mut buf = [0u8; varint::MAX_VARINT_BYTES];
    let new_size = offset.len() as u64;
    let written = varint::pack_u64(new_size, &mut buf);

    let origin = (offset.start as isize + offset.diff.origin) as usize;
    journal.write(origin, old_prefix_start, offset.start, &buf[..written])?;

    let change = written as isize - old_prefix_len as isize;
    if change != 0 {
        offset.start = (offset.start as isize + change) as usize;
        offset.end = (offset.end as isize + change) as usize;
        if offset.diff.origin != 0 {
            offset.diff.origin -= change;
        }
        if offset.diff.tag != 0 {
            offset.diff.tag -= change;
        }
        offset.diff.length -= change;
    }
    *delta += change;
    Ok(())
}

/// Walks the journal's buffer from the root and cascades the
/// length-prefix fix-up through every enclosing ancestor of `target`.
/// Returns `Ok(false)` if the walk determined `target` no longer has a
/// consistent ancestor chain (the part should be invalidated).
fn adjust(journal: &Journal, target: &PartOffset, delta: isize) -> Result<bool, ErrorKind> {
    let root_end = journal.size();
    let mut delta = delta;
    adjust_region(journal, 0, root_end, target, &mut delta)
}

/// Runs the cascade for one region: walks `[region_start, region_end)`
/// looking for the length-delimited ancestor(s) of `target`.
fn adjust_region(
    journal: &Journal,
    region_start: usize,
    region_end: usize,
    target: &PartOffset,
    delta: &mut isize,
) -> Result<bool, ErrorKind> {
    let mut pos = region_start;
    while pos < region_end.min(target.end) {
        let tag_start = pos;
        let key = journal.with_buffer(|buf| {
            let mut stream = Stream::at(buf, pos);
            stream.read_key().map(|kv| (kv, stream.offset()))
        });
        let ((_, wire_type), after_key) = match key {
            Ok(v) => v,
            Err(_) => return Ok(true),
        };
        pos = after_key;

        match wire_type {
            WireType::Varint => {
                let after = journal.with_buffer(|buf| {
                    let mut stream = Stream::at(buf, pos);
                    stream.read_varint().map(|_| stream.offset())
                });
                pos = match after {
                    Ok(p) => p,
                    Err(_) => return Ok(true),
                };
            }
            WireType::Fixed32 => pos += 4,
            WireType::Fixed64 => pos += 8,
            WireType::Length => {
                let len_start = pos;
                let len_read = journal.with_buffer(|buf| {
                    let mut stream = Stream::at(buf, pos);
                    stream.read_varint().map(|v| (v, stream.offset()))
                });
                let (len, rstart) = match len_read {
                    Ok(v) => v,
                    Err(_) => return Ok(true),
                };
                let len = len as usize;
                let rend = rstart + len;
                let target_old_end = (target.end as isize - *delta) as usize;

                if rstart == target.start {
                    // This occurrence's payload starts exactly where target's
                    // does: it IS target, not an ancestor enclosing it (a
                    // genuine ancestor's payload always starts at target's tag
                    // byte, strictly before target.start). Its own prefix was
                    // already handled by the caller before `adjust` ran; skip
                    // over it like any other sibling.
                    pos = rend.max(target.end);
                    continue;
                }

                if rstart <= target.start && rend >= target_old_end {
                    // Is this candidate the packed envelope that directly
                    // contains target (as opposed to a submessage target
                    // merely resides inside)? A part created inside a packed
                    // envelope is anchored with `diff.origin` pointing at its
                    // envelope's own tag byte rather than at a containing
                    // message's start (see `create_element_inside_packed_envelope`),
                    // so that equality is exactly this marker.
                    let target_origin = (target.start as isize + target.diff.origin) as usize;
                    let is_packed_envelope = target_origin == tag_start;

                    // Case 1: this length-delimited field encloses target.
                    // A packed envelope's payload is raw concatenated
                    // scalars, not tag+value pairs, so recursing into it as
                    // if it were a submessage would misparse it — and
                    // there is nothing to recurse into anyway, since a
                    // packed element has no nested ancestors of its own.
                    if !is_packed_envelope && (rstart < target.start || rend > target.end) {
                        let keep_going = adjust_region(journal, rstart, rend, target, delta)?;
                        if !keep_going {
                            return Ok(false);
                        }
                    }

                    let new_end = (rend as isize + *delta) as usize;
                    if is_packed_envelope && *delta < 0 && new_end == rstart {
                        // The envelope's last remaining element was just
                        // removed: an empty packed envelope is
                        // indistinguishable from an absent field, so erase
                        // the whole occurrence instead of leaving a
                        // zero-length one behind.
                        let mut whole = Part::from_offset(
                            journal,
                            journal.version(),
                            PartOffset {
                                start: rstart,
                                end: new_end,
                                diff: Diff {
                                    origin: 0,
                                    tag: tag_start as isize - rstart as isize,
                                    length: len_start as isize - rstart as isize,
                                },
                            },
                        );
                        whole.clear()?;
                        return Ok(true);
                    }

                    let mut enclosing = PartOffset {
                        start: rstart,
                        end: new_end,
                        diff: Diff {
                            origin: 0,
                            tag: tag_start as isize - rstart as isize,
                            length: len_start as isize - rstart as isize,
                        },
                    };
                    adjust_prefix(journal, &mut enclosing, delta)?;
                    return Ok(true);
                } else if rstart > target.start {
                    // Case 2: past target's origin chain; abort.
                    return Ok(false);
                } else {
                    // Case 3: disjoint sibling; skip it.
                    pos = rend;
                }
            }
        }
    }
    Ok(true)
}

/// The create-by-tag insertion algorithm.
///
/// Scans `message`'s direct children for the best insertion point (the
/// last child whose tag is `<= tag`), handles oneof exclusivity, and
/// either returns the existing occurrence (merged-message semantics: last
/// occurrence wins), creates a fresh element inside an existing
/// packed-repeated envelope, or creates a fresh, empty, tagged part just
/// after the insertion point.
pub fn create_by_tag<'j>(
    journal: &'j Journal,
    message: &PartOffset,
    descriptor: &'static Descriptor,
    tag: u32,
) -> Result<Part<'j>, ErrorKind> {
    let field = descriptor.field_by_tag(tag).ok_or(ErrorKind::Descriptor)?;
    let is_packed_repeated = field.packed && field.is_repeated();

    let mut insertion_point = message.start;
    let mut found: Option<PartOffset> = None;
    let mut envelope: Option<PartOffset> = None;
    let mut cursor = crate::cursor::RawCursor::new(journal, *message, 0);
    while let Some(child) = cursor.next()? {
        if child.tag <= tag {
            insertion_point = child.offset.end;
        }
        if child.tag != tag {
            continue;
        }
        if is_packed_repeated {
            // A packed-repeated field has exactly one tag occurrence on
            // the wire: its envelope. Appending to it means creating a
            // fresh element *inside* the envelope, never re-matching the
            // whole thing as if it were a single scalar occurrence.
            envelope = Some(child.offset);
        } else if !field.is_repeated() {
            // Unpacked-repeated fields never match here: each `put` call
            // produces its own tag occurrence.
            found = Some(child.offset);
        }
    }

    if let Some(oneof) = field.oneof {
        let mut cursor = crate::cursor::RawCursor::new(journal, *message, 0);
        while let Some(child) = cursor.next()? {
            if child.tag != tag && oneof.contains(child.tag) {
                let mut part = Part::from_offset(journal, child.version, child.offset);
                part.clear()?;
            }
        }
    }

    if let Some(offset) = found {
        return Ok(Part::from_offset(journal, journal.version(), offset));
    }
    if let Some(envelope_offset) = envelope {
        return Ok(create_element_inside_packed_envelope(journal, &envelope_offset));
    }

    create_empty_tagged_part(journal, message, field, insertion_point)
}

/// Creates an empty, tagless slot at the end of an existing packed-repeated
/// field's envelope: appending to a packed field whose envelope already
/// exists writes the new element inside it rather than re-emitting a
/// sibling tag+length occurrence.
fn create_element_inside_packed_envelope<'j>(journal: &'j Journal, envelope: &PartOffset) -> Part<'j> {
    let tag_start = (envelope.start as isize + envelope.diff.tag) as usize;
    let start = envelope.end;
    let offset = PartOffset {
        start,
        end: start,
        diff: Diff {
            // Anchored to the envelope's own tag byte rather than to a
            // containing message's start: `adjust_region` checks for this
            // exact relationship to recognize "this enclosing
            // length-delimited region is a packed envelope" and skip
            // recursing into its untagged scalar payload.
            origin: tag_start as isize - start as isize,
            tag: 0,
            length: 0,
        },
    };
    Part::from_offset(journal, journal.version(), offset)
}

/// Writes a fresh tag-varint (and, for `LENGTH`-wired fields, a zero length
/// varint) just after `insertion_point`, and returns a `Part` over the
/// freshly created, empty payload.
fn create_empty_tagged_part<'j>(
    journal: &'j Journal,
    message: &PartOffset,
    field: &'static FieldDescriptor,
    insertion_point: usize,
) -> Result<Part<'j>, ErrorKind> {
    // A packed repeated field is always LENGTH-wired on the wire, even
    // though each element's own type is not.
    let wire_type = if field.packed && field.is_repeated() {
        WireType::Length
    } else {
        field.ty.wire_type()
    };
    let key = ((field.tag as u64) << 3) | wire_type.bits();

    let mut key_buf = [0u8; varint::MAX_VARINT_BYTES];
    let key_len = varint::pack_u64(key, &mut key_buf);

    // Every non-LENGTH wire type has a minimal, always-valid "zero" form
    // (a one-byte varint, or 4/8 zero bytes), so the tag is never left
    // pointing at an unparseable, zero-byte scalar between `create` and
    // the first `write`. A LENGTH-wired field's empty payload
    // (length 0) is itself already valid wire format.
    let placeholder_len = match wire_type {
        WireType::Varint => 1,
        WireType::Fixed32 => 4,
        WireType::Fixed64 => 8,
        WireType::Length => 0,
    };

    let mut prefix = [0u8; 2 * varint::MAX_VARINT_BYTES + 8];
    prefix[..key_len].copy_from_slice(&key_buf[..key_len]);
    let mut total_len = key_len;
    let mut length_varint_len = 0usize;
    if matches!(wire_type, WireType::Length) {
        length_varint_len = 1;
        prefix[key_len] = 0;
        total_len += 1;
    }
    total_len += placeholder_len;

    let origin = message.start;
    journal.write(origin, insertion_point, insertion_point, &prefix[..total_len])?;

    let tag_start = insertion_point;
    let payload_start = tag_start + total_len - placeholder_len;
    let payload_end = tag_start + total_len;
    let offset = PartOffset {
        start: payload_start,
        end: payload_end,
        diff: Diff {
            origin: origin as isize - payload_start as isize,
            tag: tag_start as isize - payload_start as isize,
            length: if length_varint_len > 0 {
                (payload_start - length_varint_len) as isize - payload_start as isize
            } else {
                0
            },
        },
    };
    Ok(Part::from_offset(journal, journal.version(), offset))
}
