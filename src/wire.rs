//! Wire types and the seventeen Protocol Buffers scalar/message types.

use crate::error::ErrorKind;

/// The four wire types carried in the low two bits of every tag varint.
///
/// A closed `#[repr(u8)]` enum with a `from_bits` conversion, rather than a
/// function-pointer jump table: the dispatch stays a plain pattern match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    Length = 2,
    Fixed32 = 5,
}

impl WireType {
    /// Recovers a `WireType` from the low three bits of a tag varint.
    /// Values `3` (`StartGroup`) and `4` (`EndGroup`) are rejected: groups
    /// are not a wire kind this crate supports.
    #[inline]
    pub fn from_bits(bits: u64) -> Result<WireType, ErrorKind> {
        match bits {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::Length),
            5 => Ok(WireType::Fixed32),
            _ => Err(ErrorKind::WireType),
        }
    }

    #[inline]
    pub const fn bits(self) -> u64 {
        self as u64
    }
}

/// The seventeen standard Protobuf field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    Enum,
    Float,
    Double,
    String,
    Bytes,
    Message,
}

impl Type {
    /// The deterministic wire type for this proto type.
    #[inline]
    pub const fn wire_type(self) -> WireType {
        match self {
            Type::Int32
            | Type::Int64
            | Type::Uint32
            | Type::Uint64
            | Type::Sint32
            | Type::Sint64
            | Type::Bool
            | Type::Enum => WireType::Varint,
            Type::Fixed64 | Type::Sfixed64 | Type::Double => WireType::Fixed64,
            Type::Fixed32 | Type::Sfixed32 | Type::Float => WireType::Fixed32,
            Type::String | Type::Bytes | Type::Message => WireType::Length,
        }
    }

    /// The fixed decoded-value footprint in bytes for non-length-delimited
    /// types. Returns `None` for varint-wired and length-delimited types,
    /// whose footprint is variable.
    #[inline]
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            Type::Fixed32 | Type::Sfixed32 | Type::Float => Some(4),
            Type::Fixed64 | Type::Sfixed64 | Type::Double => Some(8),
            Type::Bool => Some(1),
            _ => None,
        }
    }

    /// Whether `packed` is a meaningful flag on a repeated field of this
    /// type: only scalar types whose wire type is not `Length`.
    #[inline]
    pub const fn is_packable(self) -> bool {
        !matches!(self.wire_type(), WireType::Length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_type_rejects_groups() {
        assert!(WireType::from_bits(3).is_err());
        assert!(WireType::from_bits(4).is_err());
        assert!(WireType::from_bits(6).is_err());
    }

    #[test]
    fn wire_type_round_trips_valid_bits() {
        for bits in [0u64, 1, 2, 5] {
            assert_eq!(WireType::from_bits(bits).unwrap().bits(), bits);
        }
    }

    #[test]
    fn message_and_string_are_not_packable() {
        assert!(!Type::Message.is_packable());
        assert!(!Type::String.is_packable());
        assert!(!Type::Bytes.is_packable());
        assert!(Type::Uint32.is_packable());
        assert!(Type::Fixed64.is_packable());
    }

    #[test]
    fn fixed_footprints_are_correct() {
        assert_eq!(Type::Bool.fixed_size(), Some(1));
        assert_eq!(Type::Float.fixed_size(), Some(4));
        assert_eq!(Type::Double.fixed_size(), Some(8));
        assert_eq!(Type::Int32.fixed_size(), None);
        assert_eq!(Type::Bytes.fixed_size(), None);
    }
}
