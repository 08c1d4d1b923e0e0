//! Recursive required-field presence checking, descriptor-driven
//! (proto2-style `required` fields).

use crate::descriptor::{Descriptor, Label};
use crate::error::ErrorKind;
use crate::journal::Journal;
use crate::message::Message;
use crate::wire::Type;

/// How many more levels of nested-message recursion `validate_message` may
/// still descend — the validator is the one place in this crate that
/// recurses to a depth an attacker-controlled, self-referential descriptor
/// chain could drive arbitrarily deep.
#[derive(Clone, Copy)]
#[cfg_attr(feature = "no-recursion-limit", derive(Default))]
struct RecursionGuard {
    #[cfg(not(feature = "no-recursion-limit"))]
    remaining: u32,
}

#[cfg(not(feature = "no-recursion-limit"))]
impl Default for RecursionGuard {
    fn default() -> RecursionGuard {
        RecursionGuard {
            remaining: crate::RECURSION_LIMIT,
        }
    }
}

impl RecursionGuard {
    #[cfg(not(feature = "no-recursion-limit"))]
    fn enter(&self) -> Result<RecursionGuard, ErrorKind> {
        if self.remaining == 0 {
            return Err(ErrorKind::Overflow);
        }
        Ok(RecursionGuard {
            remaining: self.remaining - 1,
        })
    }

    #[cfg(feature = "no-recursion-limit")]
    fn enter(&self) -> Result<RecursionGuard, ErrorKind> {
        Ok(RecursionGuard {})
    }
}

/// Verifies every `required` field (transitively, through nested messages)
/// is present. Descends only into submessages that are themselves present
/// — an absent optional submessage field has no required fields of its
/// own to check.
pub fn validate(journal: &Journal, descriptor: &'static Descriptor) -> Result<(), ErrorKind> {
    let mut message = Message::create(journal, descriptor);
    validate_message(&mut message, RecursionGuard::default())
}

fn validate_message(message: &mut Message, guard: RecursionGuard) -> Result<(), ErrorKind> {
    for field in message.descriptor().fields {
        let present = message.has(field.tag)?;
        if matches!(field.label, Label::Required) && !present {
            return Err(ErrorKind::Absent);
        }
        if field.ty == Type::Message && present {
            if let Some(mut nested) = message.nested(field.tag)? {
                validate_message(&mut nested, guard.enter()?)?;
            }
        }
    }
    Ok(())
}
