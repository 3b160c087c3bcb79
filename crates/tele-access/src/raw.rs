//! Raw, untyped reads of object headers and class metadata.
//!
//! The classes of target objects are themselves described by objects in the same heap, so
//! an object can only be classified by reading those descriptors before any mirror of them
//! exists. Everything here reads through [DataAccess] directly and never through a mirror.

use crate::codec::DataAccess;
use crate::layout::Layout;
use crate::memory::DataAccessError;
use tele_types::Address;

/// Reads headers and class metadata without involving mirrors
#[derive(Debug, Clone, Copy)]
pub struct RawReader<'a> {
    access: &'a DataAccess,
    layout: &'a Layout,
}

impl<'a> RawReader<'a> {
    /// Creates a new raw reader
    pub fn new(access: &'a DataAccess, layout: &'a Layout) -> Self {
        Self { access, layout }
    }

    /// Gets the header layout
    pub fn layout(&self) -> &'a Layout {
        self.layout
    }

    /// Whether `address` is plausibly an object origin
    pub fn is_valid_origin(&self, address: Address) -> bool {
        self.access.is_valid_origin(address)
    }

    /// Reads the origin of the hub of the object at `origin`
    pub fn read_hub(&self, origin: Address) -> Result<Address, DataAccessError> {
        let hub = self
            .access
            .read_word(origin.plus(self.layout.hub_offset() as u64))?;
        self.checked_origin(hub)
    }

    /// Reads the origin of the class descriptor a hub describes
    pub fn read_hub_class_actor(&self, hub: Address) -> Result<Address, DataAccessError> {
        let class_actor = self
            .access
            .read_word(hub.plus(self.layout.hub_class_actor_offset() as u64))?;
        self.checked_origin(class_actor)
    }

    /// Reads the class id stored in a class descriptor
    pub fn read_class_id(&self, class_actor: Address) -> Result<i32, DataAccessError> {
        self.access
            .read_int(class_actor.plus(self.layout.class_actor_id_offset() as u64))
    }

    /// Reads the length word of an array or hybrid
    pub fn read_length(&self, origin: Address) -> Result<u32, DataAccessError> {
        let length = self
            .access
            .read_int(origin.plus(self.layout.length_offset() as u64))?;
        u32::try_from(length).map_err(|_| DataAccessError::Inconsistent {
            address: origin,
            detail: "negative length",
        })
    }

    /// Reads the misc header word of the object at `origin`
    pub fn read_misc(&self, origin: Address) -> Result<Address, DataAccessError> {
        self.access
            .read_word(origin.plus(self.layout.misc_offset() as u64))
    }

    fn checked_origin(&self, address: Address) -> Result<Address, DataAccessError> {
        if address.is_zero() || !self.is_valid_origin(address) {
            Err(DataAccessError::InvalidOrigin(address))
        } else {
            Ok(address)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::tests::FlatMemory;
    use std::sync::Arc;
    use test_log::test;

    #[test]
    fn test_hub_chain_is_validated() {
        // object at 0x100 whose hub is at 0x120; the hub's class actor word is garbage
        let mut bytes = vec![0u8; 0x40];
        bytes[0..8].copy_from_slice(&0x120u64.to_le_bytes());
        bytes[0x20 + 24..0x20 + 32].copy_from_slice(&0x9999u64.to_le_bytes());
        let mut memory = FlatMemory::new(0x100, bytes);
        memory.origins.insert(Address::new(0x100));
        memory.origins.insert(Address::new(0x120));
        let access = DataAccess::new(Arc::new(memory));
        let layout = Layout::default();
        let reader = RawReader::new(&access, &layout);

        let hub = reader.read_hub(Address::new(0x100)).unwrap();
        assert_eq!(hub, Address::new(0x120));
        assert_eq!(
            reader.read_hub_class_actor(hub),
            Err(DataAccessError::InvalidOrigin(Address::new(0x9999)))
        );
    }

    #[test]
    fn test_negative_length_is_inconsistent() {
        let mut bytes = vec![0u8; 24];
        bytes[16..20].copy_from_slice(&(-1i32).to_le_bytes());
        let access = DataAccess::new(Arc::new(FlatMemory::new(0x100, bytes)));
        let layout = Layout::default();
        let reader = RawReader::new(&access, &layout);
        assert!(matches!(
            reader.read_length(Address::new(0x100)),
            Err(DataAccessError::Inconsistent { .. })
        ));
    }
}
