//! The journal: a versioned edit log over a buffer, and the alignment
//! algorithm that translates stale offsets forward.
//!
//! A single `Journal` is the one mutable shared resource in this crate's
//! concurrency model: every [`crate::part::Part`], [`crate::cursor::Cursor`],
//! [`crate::message::Message`], [`crate::field::Field`] and
//! [`crate::oneof::Oneof`] holds a plain shared reference to it, never a
//! `&mut`. Mutation happens through `RefCell` interior mutability instead:
//! many handles share one mutable buffer, and no pointer escapes across a
//! mutation. Because the model is single-threaded and cooperative, a
//! `RefCell` is the right tool; nothing here needs cross-thread
//! synchronization.

use std::cell::RefCell;

use crate::buffer::Buffer;
use crate::error::ErrorKind;

/// One recorded edit: at `offset`, `delta` bytes were inserted (positive)
/// or removed (negative); `origin` is the logical region (a submessage's
/// start, or a packed field's own tag offset) the edit is considered to
/// belong to, which the alignment algorithm's packed-field detection
/// relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalEntry {
    pub origin: usize,
    pub offset: usize,
    pub delta: isize,
}

/// The three anchors of a [`crate::part::Part`]: signed distances from
/// `start` to the containing message's start, to the part's own tag byte,
/// and to the part's length-prefix byte. A zero value means "this anchor
/// does not apply to this part" (root part / no tag / no length prefix) —
/// never a coincidental zero distance — so the alignment algorithm below
/// must never "activate" an anchor that is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Diff {
    pub origin: isize,
    pub tag: isize,
    pub length: isize,
}

/// The payload range plus anchors captured by a [`crate::part::Part`] at
/// some journal version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartOffset {
    pub start: usize,
    pub end: usize,
    pub diff: Diff,
}

impl PartOffset {
    /// The root part over an entire buffer.
    pub fn root(buffer_size: usize) -> PartOffset {
        PartOffset {
            start: 0,
            end: buffer_size,
            diff: Diff::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
}

/// Replays one journal entry over a `PartOffset`, per the five alignment
/// rules below. Returns `false` if the replay erased the part (rule 4: the
/// part has been partially erased and becomes invalid).
fn apply_entry(offset: &mut PartOffset, entry: &JournalEntry) -> bool {
    let JournalEntry {
        offset: off, delta, ..
    } = *entry;
    let start0 = offset.start as isize;
    let end0 = offset.end as isize;
    let off = off as isize;

    // Anchors are computed against the pre-entry start, before any of rules
    // 1-4 below move it.
    let anchors_old = [
        start0 + offset.diff.origin,
        start0 + offset.diff.tag,
        start0 + offset.diff.length,
    ];

    if off < start0 {
        // Rule 1: edit entirely before the part; both ends shift.
        offset.start = (start0 + delta) as usize;
        offset.end = (end0 + delta) as usize;
    } else if off > end0 {
        // Rule 2: edit entirely after the part; no change.
    } else if delta > 0 {
        // Rule 3: the part grew.
        offset.end = (end0 + delta) as usize;
    } else if delta < 0 {
        // Rule 4: the part shrank, or was (partially) erased.
        let available = end0 - off;
        if -delta > available {
            return false;
        }
        offset.end = (end0 + delta) as usize;
    }
    // delta == 0 while start0 <= off <= end0: nothing moves.

    // Rule 5: anchors track `start`. An anchor strictly before the edit
    // point is unaffected by it; one at or after the edit point shifts by
    // `delta` along with it.
    let start_new = offset.start as isize;
    let recompute = |diff_old: isize, anchor_old: isize| -> isize {
        if diff_old == 0 {
            return 0;
        }
        let anchor_new = if anchor_old < off {
            anchor_old
        } else {
            anchor_old + delta
        };
        anchor_new - start_new
    };
    offset.diff = Diff {
        origin: recompute(offset.diff.origin, anchors_old[0]),
        tag: recompute(offset.diff.tag, anchors_old[1]),
        length: recompute(offset.diff.length, anchors_old[2]),
    };

    true
}

struct JournalState {
    buffer: Buffer,
    version: u64,
    log: Vec<JournalEntry>,
}

/// A buffer plus a monotonic version and an append-only log of edits.
pub struct Journal {
    state: RefCell<JournalState>,
}

impl Journal {
    pub fn new(buffer: Buffer) -> Journal {
        Journal {
            state: RefCell::new(JournalState {
                buffer,
                version: 0,
                log: Vec::new(),
            }),
        }
    }

    pub fn version(&self) -> u64 {
        self.state.borrow().version
    }

    pub fn size(&self) -> usize {
        self.state.borrow().buffer.size()
    }

    pub fn is_valid(&self) -> bool {
        self.state.borrow().buffer.is_valid()
    }

    /// Runs `f` over a snapshot-consistent view of the buffer's bytes.
    /// Kept closure-based (rather than returning a `Ref<[u8]>`) so callers
    /// never hold a live borrow across a later mutating call, which would
    /// panic the `RefCell`.
    pub fn with_buffer<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let state = self.state.borrow();
        f(state.buffer.as_slice())
    }

    /// The journal-write log-entry API: records the entry, then performs
    /// the buffer splice; on buffer failure, reverts and propagates.
    pub fn write(&self, origin: usize, start: usize, end: usize, data: &[u8]) -> Result<(), ErrorKind> {
        log::trace!("journal write origin={origin} start={start} end={end} len={}", data.len());
        let delta = data.len() as isize - (end - start) as isize;
        let mut state = self.state.borrow_mut();
        state.log.push(JournalEntry {
            origin,
            offset: start,
            delta,
        });
        state.version += 1;
        match state.buffer.write(start, end, data) {
            Ok(()) => Ok(()),
            Err(e) => {
                state.log.pop();
                state.version -= 1;
                log::debug!("journal write reverted: {e}");
                Err(e)
            }
        }
    }

    /// The journal-clear log-entry API: shrink-splice of `start..end` to
    /// zero bytes.
    pub fn clear(&self, origin: usize, start: usize, end: usize) -> Result<(), ErrorKind> {
        log::trace!("journal clear origin={origin} start={start} end={end}");
        let mut state = self.state.borrow_mut();
        state.log.push(JournalEntry {
            origin,
            offset: start,
            delta: -((end - start) as isize),
        });
        state.version += 1;
        match state.buffer.clear(start, end) {
            Ok(()) => Ok(()),
            Err(e) => {
                state.log.pop();
                state.version -= 1;
                log::debug!("journal clear reverted: {e}");
                Err(e)
            }
        }
    }

    /// Aligns `offset`, captured at `from_version`, to the journal's
    /// current version, by replaying the intervening entries. Returns
    /// `false` if the replay invalidated the part.
    pub fn align(&self, offset: &mut PartOffset, from_version: u64) -> bool {
        let state = self.state.borrow();
        if from_version >= state.version {
            return true;
        }
        for entry in &state.log[from_version as usize..state.version as usize] {
            if !apply_entry(offset, entry) {
                log::debug!("alignment invalidated part at entry {entry:?}");
                return false;
            }
        }
        true
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Journal")
            .field("version", &state.version)
            .field("size", &state.buffer.size())
            .field("log_len", &state.log.len())
            .finish()
    }
}
