use tele_access::disassembler::DisassemblyError;
use tele_access::lock::LockUnavailableError;
use tele_access::DataAccessError;
use tele_types::{Address, ObjectKind};
use thiserror::Error;

/// An error raised by a mirror
#[derive(Debug, Error)]
pub enum TeleError {
    /// Reading the target failed; try again next epoch
    #[error(transparent)]
    Access(#[from] DataAccessError),
    /// Machine code could not be decoded; try again next epoch
    #[error(transparent)]
    Disassembly(#[from] DisassemblyError),
    /// An operation was invoked on an object of the wrong shape
    #[error("{operation} is not supported on {kind:?} objects")]
    UnsupportedShape {
        operation: &'static str,
        kind: ObjectKind,
    },
    /// A field was looked up by a name the class does not have
    #[error("{class} has no field named {field}")]
    NoSuchField { class: String, field: String },
    #[error("index {index} is out of bounds for length {length}")]
    IndexOutOfBounds { index: u64, length: u64 },
    #[error("{address} is outside of the region {start}..{end}")]
    AddressOutOfRegion {
        address: Address,
        start: Address,
        end: Address,
    },
    /// The VM lock could not be acquired; the operation was abandoned
    #[error(transparent)]
    LockUnavailable(#[from] LockUnavailableError),
    /// The target contradicts the mirror's model of it
    #[error("fatal inconsistency: {0}")]
    FatalInconsistency(String),
    #[error("the VM this mirror belongs to is gone")]
    VmDetached,
}

impl TeleError {
    /// Whether retrying in a later epoch may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, TeleError::Access(_) | TeleError::Disassembly(_))
    }

    pub(crate) fn unsupported(operation: &'static str, kind: ObjectKind) -> Self {
        TeleError::UnsupportedShape { operation, kind }
    }
}
