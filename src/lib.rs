//! protobluff: an in-place Protocol Buffers read/write library.
//!
//! Rather than decoding a wire message into an owned struct tree and
//! re-encoding by appending to a fresh buffer, protobluff edits an existing
//! byte buffer directly: reads borrow from it without copying, and writes
//! splice new bytes in, cascading any resulting length-prefix change out
//! through every enclosing message automatically.
//!
//! # Layers
//!
//! - [`varint`] / [`wire`] / [`value`]: the wire-format primitives.
//! - [`allocator`] / [`buffer`]: pluggable-growth byte storage.
//! - [`journal`]: a versioned edit log over a buffer, and the alignment
//!   algorithm that keeps stale handles consistent.
//! - [`part`]: a handle over one journal region, the create-by-tag
//!   insertion algorithm, and the length-prefix cascade.
//! - [`cursor`]: sequential iteration over a message's direct children.
//! - [`descriptor`]: static field/oneof/enum tables.
//! - [`field`] / [`message`] / [`oneof`]: the typed read/write surface
//!   built on top of `part` and `cursor`.
//! - [`codec`]: a stateless, journal-independent encode/decode path for
//!   callers who don't need in-place editing.
//! - [`validator`]: recursive required-field presence checking.
//!
//! # Example
//!
//! ```
//! use protobluff::descriptor::{Descriptor, FieldDescriptor, Label};
//! use protobluff::journal::Journal;
//! use protobluff::buffer::Buffer;
//! use protobluff::allocator::DefaultAllocator;
//! use protobluff::message::Message;
//! use protobluff::value::Value;
//! use protobluff::wire::Type;
//! use std::rc::Rc;
//!
//! static FIELDS: &[FieldDescriptor] = &[FieldDescriptor {
//!     tag: 1,
//!     name: "id",
//!     ty: Type::Uint32,
//!     label: Label::Optional,
//!     nested: None,
//!     nested_enum: None,
//!     default: None,
//!     packed: false,
//!     oneof: None,
//! }];
//! static DESCRIPTOR: Descriptor = Descriptor::new("Example", FIELDS);
//!
//! let journal = Journal::new(Buffer::create_empty(Rc::new(DefaultAllocator)));
//! let mut message = Message::create(&journal, &DESCRIPTOR);
//! message.put(1, Value::Uint32(7)).unwrap();
//! assert_eq!(message.get(1, Value::to_owned_scalar).unwrap(), Value::Uint32(7));
//! ```

// 100 is the default recursion limit in the C++ Protocol Buffers
// implementation. Guards the validator's recursive descent into nested
// messages against a maliciously self-nesting wire stream. Disabled by the
// `no-recursion-limit` feature.
#[cfg(not(feature = "no-recursion-limit"))]
pub(crate) const RECURSION_LIMIT: u32 = 100;

pub mod allocator;
pub mod buffer;
pub mod codec;
pub mod cursor;
pub mod descriptor;
pub mod error;
pub mod field;
pub mod journal;
pub mod message;
pub mod oneof;
pub mod part;
pub mod stream;
pub mod validator;
pub mod value;
pub mod varint;
pub mod wire;

pub use error::{ErrorKind, Result};
