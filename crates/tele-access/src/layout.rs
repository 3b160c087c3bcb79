//! Object header layout, as configured in the target

use tele_types::{Kind, ObjectKind};

/// A word in an object header
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum HeaderField {
    /// The reference to the object's hub
    Hub,
    /// Monitor and hash bits
    Misc,
    /// The element count of arrays and hybrids
    Length,
}

/// Where the target puts things in object headers.
///
/// All offsets are in bytes from the object origin.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Layout {
    word_size: u32,
    hub_offset: u32,
    misc_offset: u32,
    length_offset: u32,
    tuple_header_size: u32,
    array_header_size: u32,
    hybrid_header_size: u32,
    hub_class_actor_offset: u32,
    class_actor_id_offset: u32,
}

impl Layout {
    /// Creates a new layout
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        word_size: u32,
        hub_offset: u32,
        misc_offset: u32,
        length_offset: u32,
        tuple_header_size: u32,
        array_header_size: u32,
        hybrid_header_size: u32,
        hub_class_actor_offset: u32,
        class_actor_id_offset: u32,
    ) -> Self {
        Self {
            word_size,
            hub_offset,
            misc_offset,
            length_offset,
            tuple_header_size,
            array_header_size,
            hybrid_header_size,
            hub_class_actor_offset,
            class_actor_id_offset,
        }
    }

    /// Gets the size (in bytes) of a machine word
    pub fn word_size(&self) -> u32 {
        self.word_size
    }

    /// Gets the offset of the hub reference
    pub fn hub_offset(&self) -> u32 {
        self.hub_offset
    }

    /// Gets the offset of the misc word
    pub fn misc_offset(&self) -> u32 {
        self.misc_offset
    }

    /// Gets the offset of the array (or hybrid) length
    pub fn length_offset(&self) -> u32 {
        self.length_offset
    }

    /// Gets the size of a tuple header; the first field follows it
    pub fn tuple_header_size(&self) -> u32 {
        self.tuple_header_size
    }

    /// Gets the size of an array header; the first element follows it
    pub fn array_header_size(&self) -> u32 {
        self.array_header_size
    }

    /// Gets the size of a hybrid header; the first field follows it
    pub fn hybrid_header_size(&self) -> u32 {
        self.hybrid_header_size
    }

    /// Gets the offset, within a hub, of the reference to the class descriptor it describes
    pub fn hub_class_actor_offset(&self) -> u32 {
        self.hub_class_actor_offset
    }

    /// Gets the offset, within a class descriptor, of its `int` class id
    pub fn class_actor_id_offset(&self) -> u32 {
        self.class_actor_id_offset
    }

    /// The header words present in objects of a given shape
    pub fn header_fields(&self, kind: ObjectKind) -> &'static [HeaderField] {
        match kind {
            ObjectKind::Tuple => &[HeaderField::Hub, HeaderField::Misc],
            ObjectKind::Array | ObjectKind::Hybrid => {
                &[HeaderField::Hub, HeaderField::Misc, HeaderField::Length]
            }
        }
    }

    /// The offset of a header word
    pub fn header_field_offset(&self, field: HeaderField) -> u32 {
        match field {
            HeaderField::Hub => self.hub_offset,
            HeaderField::Misc => self.misc_offset,
            HeaderField::Length => self.length_offset,
        }
    }

    /// The offset of element `index` in an array of `kind`
    pub fn array_element_offset(&self, kind: Kind, index: u64) -> u64 {
        self.array_header_size as u64 + index * kind.width() as u64
    }

    /// The size of an array of `length` elements of `kind`, rounded up to whole words
    pub fn array_size(&self, kind: Kind, length: u64) -> u64 {
        self.align(self.array_element_offset(kind, length))
    }

    /// Rounds `size` up to a whole number of words
    pub fn align(&self, size: u64) -> u64 {
        let word = self.word_size as u64;
        size.div_ceil(word) * word
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            word_size: 8,
            hub_offset: 0,
            misc_offset: 8,
            length_offset: 16,
            tuple_header_size: 16,
            array_header_size: 24,
            hybrid_header_size: 24,
            hub_class_actor_offset: 24,
            class_actor_id_offset: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_arithmetic() {
        let layout = Layout::default();
        assert_eq!(layout.array_element_offset(Kind::Int, 2), 32);
        assert_eq!(layout.array_size(Kind::Int, 3), 40);
        assert_eq!(layout.array_size(Kind::Byte, 0), 24);
        assert_eq!(
            layout.header_fields(ObjectKind::Array).last(),
            Some(&HeaderField::Length)
        );
    }
}
