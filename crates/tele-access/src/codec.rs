//! Typed reads over raw target memory, decoding with [bytes]' [Buf].

use crate::memory::{DataAccessError, TargetMemory};
use bytes::{Buf, Bytes, BytesMut};
use paste::paste;
use std::mem::size_of;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tele_types::{Address, Epoch, Kind, Value};

/// Typed, little-endian reads from a [TargetMemory].
///
/// Every call reaches the target exactly once; [read_count](DataAccess::read_count) exposes how
/// many times that has happened so callers can verify their caches actually cache.
#[derive(Debug, Clone)]
pub struct DataAccess {
    memory: Arc<dyn TargetMemory>,
    reads: Arc<AtomicUsize>,
}

macro_rules! read_primitives {
    ($($name:ident: $ty:ty => $get:ident),* $(,)?) => {
        paste! {
            $(
                #[doc = concat!("Reads a `", stringify!($name), "` at `address`")]
                pub fn [<read_ $name>](&self, address: Address) -> Result<$ty, DataAccessError> {
                    let mut bytes = self.read_bytes(address, size_of::<$ty>())?;
                    Ok(bytes.$get())
                }
            )*
        }
    };
}

impl DataAccess {
    /// Creates a new data access over some memory
    pub fn new(memory: Arc<dyn TargetMemory>) -> Self {
        Self {
            memory,
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Gets the underlying memory
    pub fn memory(&self) -> &Arc<dyn TargetMemory> {
        &self.memory
    }

    /// Whether `address` is plausibly an object origin
    pub fn is_valid_origin(&self, address: Address) -> bool {
        self.memory.is_valid_origin(address)
    }

    /// The target's current epoch
    pub fn epoch(&self) -> Epoch {
        self.memory.epoch()
    }

    /// The number of reads issued through this access so far
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// Reads `length` bytes starting at `address`
    pub fn read_bytes(&self, address: Address, length: usize) -> Result<Bytes, DataAccessError> {
        let mut buffer = BytesMut::zeroed(length);
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.memory.read_bytes(address, &mut buffer)?;
        Ok(buffer.freeze())
    }

    read_primitives! {
        byte: i8 => get_i8,
        char: u16 => get_u16_le,
        short: i16 => get_i16_le,
        int: i32 => get_i32_le,
        float: f32 => get_f32_le,
        long: i64 => get_i64_le,
        double: f64 => get_f64_le,
    }

    /// Reads a `boolean` at `address`
    pub fn read_boolean(&self, address: Address) -> Result<bool, DataAccessError> {
        let mut bytes = self.read_bytes(address, 1)?;
        Ok(bytes.get_u8() != 0)
    }

    /// Reads a machine word at `address`
    pub fn read_word(&self, address: Address) -> Result<Address, DataAccessError> {
        let mut bytes = self.read_bytes(address, size_of::<u64>())?;
        Ok(Address::new(bytes.get_u64_le()))
    }

    /// Reads a reference at `address`, yielding the origin it points at
    pub fn read_reference(&self, address: Address) -> Result<Address, DataAccessError> {
        self.read_word(address)
    }

    /// Reads a value of any kind at `address`
    pub fn read_value(&self, kind: Kind, address: Address) -> Result<Value, DataAccessError> {
        if kind == Kind::Void {
            return Ok(Value::Void);
        }
        let mut bytes = self.read_bytes(address, kind.width() as usize)?;
        Ok(decode(kind, &mut bytes))
    }

    /// Reads `count` consecutive values of one kind in a single transfer
    pub fn read_values(
        &self,
        kind: Kind,
        address: Address,
        count: usize,
    ) -> Result<Vec<Value>, DataAccessError> {
        if kind == Kind::Void {
            return Ok(vec![Value::Void; count]);
        }
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut bytes = self.read_bytes(address, kind.width() as usize * count)?;
        Ok((0..count).map(|_| decode(kind, &mut bytes)).collect())
    }

    /// Reads element `index` of an array of `kind` whose first element is at `first_element`
    pub fn read_array_element(
        &self,
        kind: Kind,
        first_element: Address,
        index: u64,
    ) -> Result<Value, DataAccessError> {
        self.read_value(kind, first_element.plus(index * kind.width() as u64))
    }
}

fn decode(kind: Kind, bytes: &mut impl Buf) -> Value {
    match kind {
        Kind::Boolean => Value::Boolean(bytes.get_u8() != 0),
        Kind::Byte => Value::Byte(bytes.get_i8()),
        Kind::Char => Value::Char(bytes.get_u16_le()),
        Kind::Short => Value::Short(bytes.get_i16_le()),
        Kind::Int => Value::Int(bytes.get_i32_le()),
        Kind::Float => Value::Float(bytes.get_f32_le()),
        Kind::Long => Value::Long(bytes.get_i64_le()),
        Kind::Double => Value::Double(bytes.get_f64_le()),
        Kind::Word => Value::Word(Address::new(bytes.get_u64_le())),
        Kind::Reference => Value::Reference(Address::new(bytes.get_u64_le())),
        Kind::Void => Value::Void,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::RwLock;
    use std::collections::HashSet;
    use test_log::test;

    /// A flat block of memory starting at a base address
    #[derive(Debug)]
    pub(crate) struct FlatMemory {
        pub base: Address,
        pub bytes: RwLock<Vec<u8>>,
        pub origins: HashSet<Address>,
    }

    impl FlatMemory {
        pub(crate) fn new(base: u64, bytes: Vec<u8>) -> Self {
            Self {
                base: Address::new(base),
                bytes: RwLock::new(bytes),
                origins: HashSet::new(),
            }
        }
    }

    impl TargetMemory for FlatMemory {
        fn read_bytes(&self, address: Address, buffer: &mut [u8]) -> Result<(), DataAccessError> {
            let bytes = self.bytes.read();
            let start = address
                .offset_from(self.base)
                .map(|offset| offset as usize)
                .filter(|start| start + buffer.len() <= bytes.len())
                .ok_or(DataAccessError::Unreadable {
                    address,
                    length: buffer.len(),
                })?;
            buffer.copy_from_slice(&bytes[start..start + buffer.len()]);
            Ok(())
        }

        fn is_valid_origin(&self, address: Address) -> bool {
            self.origins.contains(&address)
        }

        fn epoch(&self) -> Epoch {
            Epoch::new(1)
        }
    }

    #[test]
    fn test_little_endian_decoding() {
        let mut bytes = vec![];
        bytes.extend_from_slice(&(-2i32).to_le_bytes());
        bytes.extend_from_slice(&0x1234u16.to_le_bytes());
        bytes.extend_from_slice(&[0, 0]);
        bytes.extend_from_slice(&0xdead_beef_u64.to_le_bytes());
        let access = DataAccess::new(Arc::new(FlatMemory::new(0x100, bytes)));

        assert_eq!(access.read_int(Address::new(0x100)).unwrap(), -2);
        assert_eq!(access.read_char(Address::new(0x104)).unwrap(), 0x1234);
        assert_eq!(
            access.read_word(Address::new(0x108)).unwrap(),
            Address::new(0xdead_beef)
        );
        assert_eq!(
            access.read_value(Kind::Reference, Address::new(0x108)).unwrap(),
            Value::Reference(Address::new(0xdead_beef))
        );
        assert_eq!(access.read_count(), 4);
    }

    #[test]
    fn test_bulk_read_is_a_single_transfer() {
        let bytes: Vec<u8> = [7i32, 8, 9]
            .iter()
            .flat_map(|i| i.to_le_bytes())
            .collect();
        let access = DataAccess::new(Arc::new(FlatMemory::new(0x40, bytes)));

        let values = access.read_values(Kind::Int, Address::new(0x40), 3).unwrap();
        assert_eq!(values, vec![Value::Int(7), Value::Int(8), Value::Int(9)]);
        assert_eq!(access.read_count(), 1);
        assert_eq!(
            access
                .read_array_element(Kind::Int, Address::new(0x40), 2)
                .unwrap(),
            Value::Int(9)
        );
    }

    #[test]
    fn test_unmapped_read_fails() {
        let access = DataAccess::new(Arc::new(FlatMemory::new(0x40, vec![0; 4])));
        let error = access.read_long(Address::new(0x40)).unwrap_err();
        assert_eq!(
            error,
            DataAccessError::Unreadable {
                address: Address::new(0x40),
                length: 8
            }
        );
    }
}
