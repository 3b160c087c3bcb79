use crate::private::Identifiable;
use std::any::type_name;
use std::fmt::{Debug, Display, Formatter};
use std::marker::PhantomData;

pub use identifiable_types::*;

/// Uniquely identifies a mirrored object for the lifetime of the debugger process.
///
/// Unlike an address, an object id never changes when the target moves the object, and is
/// never reused once the mirrored object is gone.
pub type ObjectId = Id<Object>;
/// Uniquely identifies a class known to both the debugger and the target.
pub type ClassId = Id<Class>;

/// Uniquely identifies some *thing* mirrored from the target
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct Id<T: Identifiable>(u64, PhantomData<T>);

impl<T: Identifiable> Id<T> {
    /// Creates a new [Id]. There's no guarantee that this [Id] names anything in the target.
    pub const fn new(id: u64) -> Self {
        Id(id, PhantomData)
    }

    /// Gets the id
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl<T: Identifiable> From<Id<T>> for u64 {
    fn from(value: Id<T>) -> Self {
        value.0
    }
}

impl<T: Identifiable> Debug for Id<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple(format!("Id<{}>", type_name::<T>()).as_str())
            .field(&self.0)
            .finish()
    }
}

impl<T: Identifiable> Display for Id<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

mod identifiable_types {
    use crate::private::Identifiable;

    macro_rules! identifiables {
        ($($ty:ident)*) => {
            $(
                /// An identifiable type
                #[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
                pub enum $ty {}
                impl Identifiable for $ty {}
            )*
        };
    }

    identifiables!(Object Class);
}
