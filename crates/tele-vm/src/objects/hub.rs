use crate::local::LocalValue;
use crate::object::{HybridTable, TableRegion, TeleObject};
use crate::stats::StatsPrinter;
use crate::objects::TeleClassActor;
use crate::surrogate::{Surrogate, SurrogateRef};
use crate::TeleError;
use parking_lot::Mutex;
use std::sync::Arc;
use tele_access::classes::ClassDescriptor;
use tele_types::names::fields;
use tele_types::Epoch;

/// Which kind of hub an object is
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum HubFlavor {
    /// The hub shared by the instances of a class
    Dynamic,
    /// The hub of the tuple holding a class's static fields
    Static,
}

/// The hub of a class: its class actor and dispatch tables
#[derive(Debug)]
pub struct TeleHub {
    flavor: HubFlavor,
    class_actor: Mutex<Option<Arc<TeleObject>>>,
}

impl TeleHub {
    pub fn new(flavor: HubFlavor) -> Self {
        Self {
            flavor,
            class_actor: Mutex::new(None),
        }
    }

    pub fn flavor(&self) -> HubFlavor {
        self.flavor
    }
}

impl Surrogate for TeleHub {
    fn type_name(&self) -> &'static str {
        match self.flavor {
            HubFlavor::Dynamic => "TeleDynamicHub",
            HubFlavor::Static => "TeleStaticHub",
        }
    }

    fn role(&self) -> Option<&'static str> {
        Some(match self.flavor {
            HubFlavor::Dynamic => "dynamic hub",
            HubFlavor::Static => "static hub",
        })
    }

    fn update_object_cache(
        &self,
        object: &TeleObject,
        _epoch: Epoch,
        stats: &mut StatsPrinter,
    ) -> Result<(), TeleError> {
        if self.class_actor.lock().is_none() {
            let class_actor = object.read_reference_field(fields::HUB_CLASS_ACTOR)?;
            *self.class_actor.lock() = class_actor;
            stats.add_stat("class actor cached");
        }
        Ok(())
    }

    fn local_equivalent(&self, object: &TeleObject) -> Result<Option<LocalValue>, TeleError> {
        Ok(object
            .downcast::<TeleHub>()
            .map(|hub| hub.described_class())
            .transpose()?
            .map(LocalValue::Class))
    }

    fn textual_visualization(&self, object: &TeleObject) -> Option<String> {
        let hub = object.downcast::<TeleHub>()?;
        let class = hub.described_class().ok()?;
        Some(format!("{} of {}", self.role()?, class.name()))
    }
}

impl SurrogateRef<'_, TeleHub> {
    /// The class actor of the class this hub describes
    pub fn class_actor(&self) -> Result<Option<Arc<TeleObject>>, TeleError> {
        if let Some(class_actor) = self.surrogate().class_actor.lock().clone() {
            return Ok(Some(class_actor));
        }
        let class_actor = self.read_reference_field(fields::HUB_CLASS_ACTOR)?;
        *self.surrogate().class_actor.lock() = class_actor.clone();
        Ok(class_actor)
    }

    /// The local descriptor of the class this hub describes
    pub fn described_class(&self) -> Result<Arc<ClassDescriptor>, TeleError> {
        let class_actor = self.class_actor()?.ok_or_else(|| {
            TeleError::FatalInconsistency(format!("{} has no class actor", self.object()))
        })?;
        let Some(class_actor) = class_actor.downcast::<TeleClassActor>() else {
            return Err(TeleError::FatalInconsistency(format!(
                "the class actor of {} is a {}",
                self.object(),
                class_actor.class_name()
            )));
        };
        class_actor.class_descriptor()
    }

    /// Locates one of the hub's tables
    pub fn table_region(&self, table: HybridTable) -> Result<TableRegion, TeleError> {
        self.object().table(table)
    }
}
