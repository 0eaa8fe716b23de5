//! Typed output properties
//!
//! A property is a named, typed, validated attribute attachable to an
//! output: an enum with named choices, a range with two bounds, or a
//! blob carrying an opaque payload (EDID). Immutable properties can be
//! read but never set through the validated path.

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::error::Error;
use crate::registry::ObjectId;

/// Maximum byte length of property and enum entry names
pub const PROPERTY_NAME_LEN: usize = 32;

bitflags! {
    /// Type and mutability flags of a property
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PropertyFlags: u32 {
        /// Value is constrained to `[values[0], values[1]]`
        const RANGE = 1 << 1;
        /// Value must match one of the registered enum entries
        const ENUM = 1 << 3;
        /// Value is the id of a property blob
        const BLOB = 1 << 4;
        /// Value cannot be changed through the validated path
        const IMMUTABLE = 1 << 5;
    }
}

/// One named choice of an enum property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyEnumEntry {
    /// The raw value
    pub value: u64,
    /// Name registered for it
    pub name: String,
}

fn clamp_name(name: &str) -> String {
    let mut name = name.to_owned();
    if name.len() > PROPERTY_NAME_LEN {
        let mut end = PROPERTY_NAME_LEN;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        name.truncate(end);
    }
    name
}

/// A property definition.
///
/// The value table has its length fixed at creation: two bounds for a
/// range, one slot per choice for an enum, unused for blobs. Enum
/// entries and blob payloads live in side lists.
#[derive(Debug)]
pub(crate) struct Property {
    pub(crate) id: ObjectId,
    pub(crate) name: String,
    pub(crate) flags: PropertyFlags,
    pub(crate) values: SmallVec<[u64; 4]>,
    pub(crate) enum_entries: Vec<PropertyEnumEntry>,
    /// Blob ids registered under this property (EDID payloads)
    pub(crate) blobs: Vec<ObjectId>,
}

impl Property {
    pub(crate) fn new(id: ObjectId, flags: PropertyFlags, name: &str, value_count: usize) -> Self {
        let mut values = SmallVec::new();
        values.resize(value_count, 0);
        Property {
            id,
            name: clamp_name(name),
            flags,
            values,
            enum_entries: Vec::new(),
            blobs: Vec::new(),
        }
    }

    /// Registers a named choice of an enum property.
    ///
    /// Re-registering an existing value updates its name in place rather
    /// than duplicating the entry; otherwise the entry is appended and
    /// the value recorded at `values[index]`.
    pub(crate) fn add_enum_entry(
        &mut self,
        index: usize,
        value: u64,
        name: &str,
    ) -> Result<(), Error> {
        if !self.flags.contains(PropertyFlags::ENUM) {
            return Err(Error::InvalidArgument("property is not an enum"));
        }

        if let Some(entry) = self.enum_entries.iter_mut().find(|e| e.value == value) {
            entry.name = clamp_name(name);
            return Ok(());
        }

        if index >= self.values.len() {
            return Err(Error::InvalidArgument("enum index out of bounds"));
        }

        self.values[index] = value;
        self.enum_entries.push(PropertyEnumEntry {
            value,
            name: clamp_name(name),
        });
        Ok(())
    }

    /// Checks a proposed value against the declared domain of the
    /// property: immutability first, then the range bounds, otherwise
    /// membership in the discrete value set.
    pub(crate) fn validate_value(&self, value: u64) -> Result<(), Error> {
        if self.flags.contains(PropertyFlags::IMMUTABLE) {
            return Err(Error::Immutable(self.id));
        }

        if self.flags.contains(PropertyFlags::RANGE) {
            if value < self.values[0] || value > self.values[1] {
                return Err(Error::OutOfRange {
                    property: self.id,
                    value,
                });
            }
            return Ok(());
        }

        if !self.values.iter().any(|&v| v == value) {
            return Err(Error::InvalidEnum {
                property: self.id,
                value,
            });
        }
        Ok(())
    }
}

/// An immutable opaque payload referenced by a property value slot
#[derive(Debug)]
pub(crate) struct PropertyBlob {
    pub(crate) id: ObjectId,
    pub(crate) data: Vec<u8>,
}
