//! The closed error enum shared by every fallible operation in the crate.

use core::fmt;

/// The cause of a failed operation.
///
/// protobluff mutates a single shared buffer through many small handles, and
/// every layer — varint codec, buffer splice, journal, part, cursor —
/// reports failure through this one flat enum rather than a nested
/// decode/encode error split, since there is only one mutation surface here,
/// not separate decode-time and encode-time passes. `None` is never
/// constructed as an `Err`; it exists because the value this crate models
/// has a dedicated accessor for "no error occurred," a case otherwise
/// expressed as `Ok(())`/`None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No error occurred.
    None,
    /// The allocator returned a failure for a requested grow/resize.
    Alloc,
    /// The handle has been invalidated (use-after-erase, or a stale version
    /// that could not be realigned because its region was erased).
    Invalid,
    /// The tag has no corresponding field descriptor.
    Descriptor,
    /// The wire type read from the stream does not match what the descriptor
    /// expects for this tag.
    WireType,
    /// A varint could not be decoded (truncated or out of range).
    Varint,
    /// A stream or buffer operation was asked to address past the end of the
    /// underlying data.
    Offset,
    /// A read found no occurrence of the tag and no default was declared.
    Absent,
    /// A cursor exhausted its parent message.
    EndOfMessage,
    /// A varint decode would overflow the target width.
    Overflow,
    /// A read ran out of bytes before a varint/value was fully consumed.
    Underrun,
}

impl ErrorKind {
    /// The canonical string representation for this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::None => "no error",
            ErrorKind::Alloc => "allocation failure",
            ErrorKind::Invalid => "invalid handle",
            ErrorKind::Descriptor => "no such field descriptor",
            ErrorKind::WireType => "unexpected wire type",
            ErrorKind::Varint => "malformed varint",
            ErrorKind::Offset => "offset out of range",
            ErrorKind::Absent => "field absent",
            ErrorKind::EndOfMessage => "end of message",
            ErrorKind::Overflow => "varint overflow",
            ErrorKind::Underrun => "buffer underrun",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ErrorKind {}

/// The result type returned by every fallible protobluff operation.
pub type Result<T> = core::result::Result<T, ErrorKind>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_canonical_strings() {
        assert_eq!(ErrorKind::Absent.to_string(), "field absent");
        assert_eq!(ErrorKind::Varint.to_string(), "malformed varint");
    }

    #[test]
    fn none_is_not_an_error_by_convention() {
        // `None` still round-trips through Display/Eq like any other kind;
        // callers just never see it as the `Err` of a `Result`.
        assert_eq!(ErrorKind::None, ErrorKind::None);
    }
}
