//! Static descriptor tables: field-by-tag and field-by-name lookup, enum
//! descriptors, oneof descriptors, and extension chaining.
//!
//! There is no codegen crate here, so descriptors are hand-built
//! `const`/`static` tables, built once before any journal that uses them is
//! created.

use std::sync::RwLock;

/// A field's cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Required,
    Optional,
    Repeated,
    Oneof,
}

/// Describes one field of a message.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub tag: u32,
    pub name: &'static str,
    pub ty: crate::wire::Type,
    pub label: Label,
    /// For `MESSAGE` fields (and enum fields that need an `EnumDescriptor`
    /// for default/validation purposes), the nested descriptor.
    pub nested: Option<&'static Descriptor>,
    pub nested_enum: Option<&'static EnumDescriptor>,
    pub default: Option<&'static DefaultValue>,
    /// Only meaningful on repeated scalar fields whose wire type is not
    /// `LENGTH`.
    pub packed: bool,
    pub oneof: Option<&'static OneofDescriptor>,
}

impl FieldDescriptor {
    pub const fn is_repeated(&self) -> bool {
        matches!(self.label, Label::Repeated)
    }

    pub const fn is_oneof_member(&self) -> bool {
        self.oneof.is_some()
    }
}

/// A declared default value for a field absent from the wire.
#[derive(Debug, Clone, Copy)]
pub enum DefaultValue {
    Int32(i32),
    Int64(i64),
    Uint32(u32),
    Uint64(u64),
    Bool(bool),
    Enum(i32),
    Float(f32),
    Double(f64),
    Bytes(&'static [u8]),
}

/// An ordered sequence of field descriptors plus a chain to an extension
/// descriptor.
///
/// Field lookup by tag exploits the generator invariant that `fields` is
/// sorted in ascending tag order: index at `min(tag, len) - 1` then walk
/// leftward until the tag matches or a smaller tag is passed.
#[derive(Debug)]
pub struct Descriptor {
    pub name: &'static str,
    pub fields: &'static [FieldDescriptor],
    /// Linked chain to an extension descriptor, mutated only through
    /// [`Descriptor::extend`]/[`Descriptor::reset`].
    extension: RwLock<Option<&'static Descriptor>>,
}

impl Descriptor {
    pub const fn new(name: &'static str, fields: &'static [FieldDescriptor]) -> Descriptor {
        Descriptor {
            name,
            fields,
            extension: RwLock::new(None),
        }
    }

    /// Field-by-tag lookup: array-indexed fast path, falling back to a
    /// leftward walk, then the extension chain.
    pub fn field_by_tag(&self, tag: u32) -> Option<&'static FieldDescriptor> {
        if !self.fields.is_empty() {
            let start = (tag as usize).min(self.fields.len()).saturating_sub(1);
            let mut i = start;
            loop {
                let field = &self.fields[i];
                if field.tag == tag {
                    return Some(field);
                }
                if field.tag < tag || i == 0 {
                    break;
                }
                i -= 1;
            }
        }
        self.extension_chain_field(tag)
    }

    fn extension_chain_field(&self, tag: u32) -> Option<&'static FieldDescriptor> {
        let next = *self.extension.read().unwrap();
        next.and_then(|ext| ext.field_by_tag(tag))
    }

    /// Field-by-name lookup: linear over this descriptor and its
    /// extension chain.
    pub fn field_by_name(&self, name: &str) -> Option<&'static FieldDescriptor> {
        if let Some(field) = self.fields.iter().find(|f| f.name == name) {
            return Some(field);
        }
        let next = *self.extension.read().unwrap();
        next.and_then(|ext| ext.field_by_name(name))
    }

    /// Appends `extension` to this descriptor's extension chain.
    pub fn extend(&self, extension: &'static Descriptor) {
        let mut slot = self.extension.write().unwrap();
        match *slot {
            None => *slot = Some(extension),
            Some(current) => current.extend(extension),
        }
    }

    /// Truncates the extension chain, used by callers to avoid leaks
    /// across reloads.
    pub fn reset(&self) {
        *self.extension.write().unwrap() = None;
    }
}

/// Describes a set of mutually exclusive fields.
#[derive(Debug)]
pub struct OneofDescriptor {
    pub name: &'static str,
    pub message: &'static Descriptor,
    pub member_tags: &'static [u32],
}

impl OneofDescriptor {
    pub fn contains(&self, tag: u32) -> bool {
        self.member_tags.contains(&tag)
    }
}

/// Describes an enum's `(number, name)` pairs.
#[derive(Debug)]
pub struct EnumDescriptor {
    pub name: &'static str,
    /// Ascending-by-number, mirroring the field-by-tag monotonicity
    /// strategy.
    pub values: &'static [(i32, &'static str)],
}

impl EnumDescriptor {
    /// Whether `number` is a value this enum knows about. Debug builds use
    /// this to assert enum field writes are in-range.
    pub fn contains(&self, number: i32) -> bool {
        self.values.iter().any(|&(n, _)| n == number)
    }

    pub fn name_for(&self, number: i32) -> Option<&'static str> {
        self.values
            .iter()
            .find(|&&(n, _)| n == number)
            .map(|&(_, name)| name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Type;

    static LEAF_FIELDS: &[FieldDescriptor] = &[
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
            tag: 5,
            name: "b",
            ty: Type::Uint32,
            label: Label::Optional,
            nested: None,
            nested_enum: None,
            default: None,
            packed: false,
            oneof: None,
        },
        FieldDescriptor {
            tag: 11,
            name: "c",
            ty: Type::Message,
            label: Label::Optional,
            nested: None,
            nested_enum: None,
            default: None,
            packed: false,
            oneof: None,
        },
    ];

    static LEAF: Descriptor = Descriptor::new("Leaf", LEAF_FIELDS);

    #[test]
    fn field_by_tag_hits_and_misses() {
        assert_eq!(LEAF.field_by_tag(1).unwrap().name, "a");
        assert_eq!(LEAF.field_by_tag(5).unwrap().name, "b");
        assert_eq!(LEAF.field_by_tag(11).unwrap().name, "c");
        assert!(LEAF.field_by_tag(2).is_none());
        assert!(LEAF.field_by_tag(100).is_none());
    }

    #[test]
    fn field_by_name_works() {
        assert_eq!(LEAF.field_by_name("b").unwrap().tag, 5);
        assert!(LEAF.field_by_name("nope").is_none());
    }

    static EXT_FIELDS: &[FieldDescriptor] = &[FieldDescriptor {
        tag: 100,
        name: "ext",
        ty: Type::Uint32,
        label: Label::Optional,
        nested: None,
        nested_enum: None,
        default: None,
        packed: false,
        oneof: None,
    }];
    static EXT: Descriptor = Descriptor::new("LeafExt", EXT_FIELDS);

    #[test]
    fn extension_chain_is_consulted_after_own_fields() {
        LEAF.extend(&EXT);
        assert_eq!(LEAF.field_by_tag(100).unwrap().name, "ext");
        LEAF.reset();
        assert!(LEAF.field_by_tag(100).is_none());
    }
}
