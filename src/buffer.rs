//! The mutable byte buffer with pluggable allocator, and its zero-copy and
//! invalid variants.

use std::rc::Rc;

use crate::allocator::{Allocator, DefaultAllocator, ZeroCopyAllocator};
use crate::error::ErrorKind;

/// One of: an owned, growable byte container; a zero-copy container that
/// refuses to change size; or the zero-initialized invalid sentinel.
///
/// `bytes::BytesMut` always owns its storage and only ever appends.
/// protobluff's buffer must additionally support in-place splicing and a
/// borrowed mode that rejects resizing, so it is modeled as its own type
/// rather than reused from `bytes`.
#[derive(Debug)]
pub struct Buffer {
    allocator: Rc<dyn Allocator>,
    /// `None` only for the zero-initialized invalid sentinel: a valid
    /// owned buffer either has size 0 with no storage, or size > 0 with an
    /// allocation to match.
    data: Option<Vec<u8>>,
}

impl Buffer {
    /// Creates an owned buffer by copying `data` in, using `allocator` for
    /// subsequent grows/shrinks.
    pub fn create(data: &[u8], allocator: Rc<dyn Allocator>) -> Buffer {
        Buffer {
            allocator,
            data: Some(data.to_vec()),
        }
    }

    /// Creates an empty owned buffer.
    pub fn create_empty(allocator: Rc<dyn Allocator>) -> Buffer {
        Buffer {
            allocator,
            data: Some(Vec::new()),
        }
    }

    /// Creates a zero-copy buffer. The bytes are copied in once at
    /// construction (Rust has no way to alias caller-owned memory without
    /// `unsafe`), but from that point on the buffer behaves like any other
    /// zero-copy buffer: `grow` always fails, and `write`/`clear` only
    /// succeed when they do not change the buffer's size.
    pub fn create_zero_copy(data: &[u8]) -> Buffer {
        Buffer {
            allocator: Rc::new(ZeroCopyAllocator),
            data: Some(data.to_vec()),
        }
    }

    /// The zero-initialized invalid sentinel buffer.
    pub fn invalid() -> Buffer {
        Buffer {
            allocator: Rc::new(DefaultAllocator),
            data: None,
        }
    }

    /// Whether this buffer is the invalid sentinel.
    pub fn is_valid(&self) -> bool {
        self.data.is_some()
    }

    /// Whether this buffer refuses resizing.
    pub fn is_zero_copy(&self) -> bool {
        self.allocator.is_zero_copy()
    }

    /// The current logical size in bytes.
    pub fn size(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::len)
    }

    /// A read-only view of the buffer's contents.
    pub fn as_slice(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }

    /// Reserves and returns a mutable view of `n` newly appended trailing
    /// bytes, or `None` on failure (always `None` for a zero-copy buffer or
    /// the invalid sentinel).
    pub fn grow(&mut self, n: usize) -> Option<&mut [u8]> {
        let data = self.data.as_mut()?;
        let old_len = data.len();
        let new_len = old_len + n;
        if !self.allocator.reserve(data, new_len) {
            return None;
        }
        data.resize(new_len, 0);
        Some(&mut data[old_len..new_len])
    }

    /// Splices `data` into `start..end`, reallocating if the size changes.
    /// Invariants: either this fully succeeds and the size changes
    /// by exactly `data.len() - (end - start)`, or the buffer is left
    /// unchanged.
    pub fn write(&mut self, start: usize, end: usize, data: &[u8]) -> Result<(), ErrorKind> {
        let buf = self.data.as_mut().ok_or(ErrorKind::Invalid)?;
        if start > end || end > buf.len() {
            return Err(ErrorKind::Offset);
        }
        let old_range_len = end - start;
        if data.len() != old_range_len && self.allocator.is_zero_copy() {
            return Err(ErrorKind::Alloc);
        }
        if data.len() == old_range_len {
            buf[start..end].copy_from_slice(data);
            return Ok(());
        }
        let new_len = buf.len() + data.len() - old_range_len;
        if !self.allocator.reserve(buf, new_len) {
            return Err(ErrorKind::Alloc);
        }
        let mut spliced = Vec::with_capacity(new_len);
        spliced.extend_from_slice(&buf[..start]);
        spliced.extend_from_slice(data);
        spliced.extend_from_slice(&buf[end..]);
        *buf = spliced;
        Ok(())
    }

    /// Shrinks `start..end` to zero bytes. For a zero-copy buffer
    /// this only succeeds when the range is already empty.
    pub fn clear(&mut self, start: usize, end: usize) -> Result<(), ErrorKind> {
        self.write(start, end, &[])
    }

    /// Destroys the buffer: owned storage is dropped, zero-copy storage is
    /// a no-op drop either way under this crate's ownership model.
    pub fn destroy(&mut self) {
        self.data = None;
    }
}
