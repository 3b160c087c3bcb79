//! The memory-access collaborator

use std::fmt::Debug;
use tele_types::{Address, Epoch};
use thiserror::Error;

/// Read access to the memory of a stopped target process.
///
/// Implementations must fail a read outright when the target cannot answer, never block on it.
pub trait TargetMemory: Debug + Send + Sync {
    /// Fills `buffer` with the bytes starting at `address`
    fn read_bytes(&self, address: Address, buffer: &mut [u8]) -> Result<(), DataAccessError>;

    /// Whether `address` is plausibly the origin of an object in the target heap
    fn is_valid_origin(&self, address: Address) -> bool;

    /// The current execution generation of the target
    fn epoch(&self) -> Epoch;
}

/// A read from the target failed.
///
/// Every variant is transient: the target was busy, moving things, or had freed the memory
/// since it was last looked at. Callers retry in a later epoch.
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum DataAccessError {
    /// The memory is not mapped in the target
    #[error("could not read {length} bytes at {address}")]
    Unreadable { address: Address, length: usize },
    /// The target process did not answer
    #[error("the target process is not available for reading")]
    Unavailable,
    /// An address expected to be an object origin is not one
    #[error("{0} is not a valid object origin")]
    InvalidOrigin(Address),
    /// A class descriptor named a class the debugger does not know
    #[error("no class is known with id {0}")]
    UnknownClass(i32),
    /// Memory was readable but held nonsense
    #[error("inconsistent data at {address}: {detail}")]
    Inconsistent {
        address: Address,
        detail: &'static str,
    },
}
