//! # `tele-vm`
//!
//! Canonical mirrors of the objects living in a remote virtual machine's heap.
//!
//! Given nothing but an address in a stopped target, the [TeleObjectFactory] works out what
//! kind of object lives there and hands out the single [TeleObject] that stands for it. Mirrors
//! re-read what they cache at most once per [Epoch](tele_types::Epoch), can be deep copied into
//! plain local values, and, for compiled methods, expose a lazily built and patch-aware map of
//! the machine code.

pub use config::TeleConfig;
pub use deep_copy::{DeepCopier, DeepCopy};
pub use error::TeleError;
pub use factory::{RefreshReport, SurrogateConstructor, SurrogateRegistry, TeleObjectFactory};
pub use local::{LocalArray, LocalHeap, LocalObject, LocalObjectId, LocalValue};
pub use machine_code::{
    BytecodeBoundary, MachineCodeInfo, MachineCodeInfoCache, MachineCodeSource, SourceLocation,
};
pub use mirror::Mirror;
pub use object::{CacheUpdate, HybridTable, ObjectShape, TableRegion, TeleObject};
pub use refresh::{ProcessEvent, RefreshLoop, RefreshLoopClosed};
pub use stats::StatsPrinter;
pub use surrogate::{Surrogate, SurrogateRef};
pub use vm::{TeleVm, TeleVmBuilder};

pub mod bytecode;
mod config;
mod deep_copy;
mod error;
mod factory;
mod local;
mod machine_code;
mod mirror;
mod object;
pub mod objects;
mod refresh;
mod stats;
mod surrogate;
mod vm;

pub use tele_access;
pub use tele_types;
