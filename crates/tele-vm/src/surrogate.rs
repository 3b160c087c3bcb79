//! The per-class behavior attached to every mirrored object

use crate::local::LocalValue;
use crate::object::TeleObject;
use crate::stats::StatsPrinter;
use crate::TeleError;
use std::any::Any;
use std::fmt::Debug;
use std::ops::Deref;
use tele_types::Epoch;

/// Gives access to the concrete type of a trait object
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// What a [TeleObject] knows about its class beyond the generic shape operations.
///
/// One surrogate is chosen per mirrored object when it is created, by the nearest ancestor of
/// the object's class with a registered constructor. Surrogates cache whatever their class
/// makes interesting and refresh it in [update_object_cache](Surrogate::update_object_cache).
pub trait Surrogate: AsAny + Debug + Send + Sync {
    /// The name of the surrogate type, used for statistics
    fn type_name(&self) -> &'static str;

    /// A short description of the role the object plays in the target, if it has one
    fn role(&self) -> Option<&'static str> {
        None
    }

    /// Refreshes cached state for a new epoch.
    ///
    /// Called at most once per epoch, with the VM lock held. Returning a transient error
    /// postpones the update to the next epoch.
    fn update_object_cache(
        &self,
        object: &TeleObject,
        epoch: Epoch,
        stats: &mut StatsPrinter,
    ) -> Result<(), TeleError> {
        let _ = (object, epoch, stats);
        Ok(())
    }

    /// The local value a deep copy should use in place of copying the object field by field
    fn local_equivalent(&self, object: &TeleObject) -> Result<Option<LocalValue>, TeleError> {
        let _ = object;
        Ok(None)
    }

    /// Warns about deep copies that are unexpectedly large or expensive
    fn deep_copy_warning(&self) -> Option<&'static str> {
        None
    }

    /// A one line description of the object's contents
    fn textual_visualization(&self, object: &TeleObject) -> Option<String> {
        let _ = object;
        None
    }
}

/// A mirrored object together with its surrogate, viewed as a concrete type
#[derive(Debug)]
pub struct SurrogateRef<'a, S> {
    object: &'a TeleObject,
    surrogate: &'a S,
}

impl<'a, S> SurrogateRef<'a, S> {
    pub(crate) fn new(object: &'a TeleObject, surrogate: &'a S) -> Self {
        Self { object, surrogate }
    }

    /// The mirrored object
    pub fn object(&self) -> &'a TeleObject {
        self.object
    }

    /// The surrogate
    pub fn surrogate(&self) -> &'a S {
        self.surrogate
    }
}

impl<S> Clone for SurrogateRef<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for SurrogateRef<'_, S> {}

impl<S> Deref for SurrogateRef<'_, S> {
    type Target = TeleObject;

    fn deref(&self) -> &Self::Target {
        self.object
    }
}
