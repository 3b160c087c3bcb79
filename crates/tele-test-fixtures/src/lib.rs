//! A simulated target for tests: a heap laid out the way the target runtime lays it out, with
//! hubs, class actors and static tuples for every class, plus a toy instruction set.

pub use code::{CompiledMethod, CompiledMethodSpec};
pub use disassembler::ToyDisassembler;
pub use memory::SimulatedMemory;
pub use target::{ClassObjects, HubTables, SimulatedTarget, HEAP_START, METADATA_START};

mod code;
pub mod disassembler;
mod memory;
mod target;
