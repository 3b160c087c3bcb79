use std::fmt::{Debug, Display, Formatter, LowerHex};

/// An absolute location in the address space of the target process.
///
/// Addresses are plain numbers: they carry no knowledge of what lives at the location and
/// are not kept up to date when the target's collector moves objects. Use a reference for that.
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Address(u64);

impl Address {
    /// The zero address, used as the null value in target memory
    pub const ZERO: Address = Address(0);

    /// Creates a new address
    pub const fn new(address: u64) -> Self {
        Self(address)
    }

    /// Gets the raw address
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Whether this is the zero address
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// The address `offset` bytes above this one
    pub const fn plus(self, offset: u64) -> Self {
        Self(self.0.wrapping_add(offset))
    }

    /// The address `offset` bytes below this one
    pub const fn minus(self, offset: u64) -> Self {
        Self(self.0.wrapping_sub(offset))
    }

    /// The distance from `base` up to this address, if this address is not below `base`
    pub fn offset_from(self, base: Address) -> Option<u64> {
        self.0.checked_sub(base.0)
    }

    /// Rounds this address up to the next multiple of `alignment`
    pub fn align_up(self, alignment: u64) -> Self {
        debug_assert!(alignment.is_power_of_two());
        Self((self.0 + alignment - 1) & !(alignment - 1))
    }
}

impl From<u64> for Address {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Address> for u64 {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address({:#x})", self.0)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl LowerHex for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        LowerHex::fmt(&self.0, f)
    }
}

/// A generation of the target's execution.
///
/// The epoch advances once every time the debugger observes the target stopping after having
/// run. Caches keyed on an epoch are valid for exactly that generation.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Epoch(u64);

impl Epoch {
    /// Creates a new epoch
    pub const fn new(epoch: u64) -> Self {
        Self(epoch)
    }

    /// Gets the raw counter
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// The epoch after this one
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for Epoch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "epoch {}", self.0)
    }
}
