use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tele_access::{DataAccessError, TargetMemory};
use tele_types::{Address, Epoch};

/// Target memory made of independently mapped segments
#[derive(Debug)]
pub struct SimulatedMemory {
    segments: RwLock<BTreeMap<u64, Vec<u8>>>,
    origins: RwLock<HashSet<Address>>,
    epoch: AtomicU64,
    reads: AtomicUsize,
    available: AtomicBool,
}

impl SimulatedMemory {
    pub fn new() -> Self {
        Self {
            segments: RwLock::default(),
            origins: RwLock::default(),
            epoch: AtomicU64::new(1),
            reads: AtomicUsize::new(0),
            available: AtomicBool::new(true),
        }
    }

    /// Maps `size` zeroed bytes at `address`
    pub fn map(&self, address: Address, size: usize) {
        self.segments.write().insert(address.get(), vec![0; size]);
    }

    /// Unmaps the segment starting at `address`
    pub fn unmap(&self, address: Address) -> Option<Vec<u8>> {
        self.segments.write().remove(&address.get())
    }

    /// The contents of the segment starting at `address`
    pub fn segment(&self, address: Address) -> Option<Vec<u8>> {
        self.segments.read().get(&address.get()).cloned()
    }

    /// Writes into mapped memory.
    ///
    /// # Panic
    /// Panics if the bytes don't fall within one mapped segment.
    pub fn write(&self, address: Address, bytes: &[u8]) {
        let mut segments = self.segments.write();
        let (base, segment) = segments
            .range_mut(..=address.get())
            .next_back()
            .unwrap_or_else(|| panic!("{address} is not mapped"));
        let start = (address.get() - base) as usize;
        assert!(
            start + bytes.len() <= segment.len(),
            "write of {} bytes at {address} runs past its segment",
            bytes.len()
        );
        segment[start..start + bytes.len()].copy_from_slice(bytes);
    }

    pub fn add_origin(&self, origin: Address) {
        self.origins.write().insert(origin);
    }

    pub fn remove_origin(&self, origin: Address) {
        self.origins.write().remove(&origin);
    }

    /// The number of reads served so far
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Makes every read fail with [DataAccessError::Unavailable] until set back
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn advance_epoch(&self) -> Epoch {
        Epoch::new(self.epoch.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

impl Default for SimulatedMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetMemory for SimulatedMemory {
    fn read_bytes(&self, address: Address, buffer: &mut [u8]) -> Result<(), DataAccessError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(DataAccessError::Unavailable);
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        let unreadable = DataAccessError::Unreadable {
            address,
            length: buffer.len(),
        };
        let segments = self.segments.read();
        let (base, segment) = segments
            .range(..=address.get())
            .next_back()
            .ok_or(unreadable.clone())?;
        let start = (address.get() - base) as usize;
        let bytes = segment
            .get(start..start + buffer.len())
            .ok_or(unreadable)?;
        buffer.copy_from_slice(bytes);
        Ok(())
    }

    fn is_valid_origin(&self, address: Address) -> bool {
        self.origins.read().contains(&address)
    }

    fn epoch(&self) -> Epoch {
        Epoch::new(self.epoch.load(Ordering::SeqCst))
    }
}
