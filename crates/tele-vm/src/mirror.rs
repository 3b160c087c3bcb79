use crate::{TeleError, TeleVm};
use std::fmt::Debug;
use std::sync::{Arc, Weak};

/// A proxy used by the debugger to examine an entity in the target
pub trait Mirror: Debug {
    /// Gets the virtual machine this mirror belongs to.
    fn virtual_machine(&self) -> Weak<TeleVm>;

    /// Gets the virtual machine, failing if it has been dropped
    fn vm(&self) -> Result<Arc<TeleVm>, TeleError> {
        self.virtual_machine()
            .upgrade()
            .ok_or(TeleError::VmDetached)
    }
}
