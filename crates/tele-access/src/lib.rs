//! # `tele-access`
//!
//! The untyped access layer the mirror is built on. Everything here treats the target process
//! as a black box: "read N bytes at address A", "what class does this descriptor name",
//! "which epoch is it". Nothing in this crate knows about mirrored objects.

pub mod classes;
pub mod codec;
pub mod disassembler;
pub mod layout;
pub mod lock;
pub mod memory;
pub mod raw;
pub mod reference;

pub use codec::DataAccess;
pub use layout::Layout;
pub use lock::VmLock;
pub use memory::{DataAccessError, TargetMemory};
pub use reference::{Reference, ReferenceManager};

pub use tele_types;
