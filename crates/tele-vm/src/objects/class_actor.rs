use crate::local::LocalValue;
use crate::mirror::Mirror;
use crate::object::TeleObject;
use crate::objects::string::read_string_field;
use crate::stats::StatsPrinter;
use crate::surrogate::{Surrogate, SurrogateRef};
use crate::TeleError;
use std::sync::{Arc, OnceLock};
use tele_access::classes::ClassDescriptor;
use tele_types::names::fields;
use tele_types::{ClassId, Epoch};

/// The runtime's descriptor of a class
#[derive(Debug, Default)]
pub struct TeleClassActor {
    class: OnceLock<Arc<ClassDescriptor>>,
    name: OnceLock<String>,
}

impl Surrogate for TeleClassActor {
    fn type_name(&self) -> &'static str {
        "TeleClassActor"
    }

    fn role(&self) -> Option<&'static str> {
        Some("class descriptor")
    }

    fn update_object_cache(
        &self,
        object: &TeleObject,
        _epoch: Epoch,
        stats: &mut StatsPrinter,
    ) -> Result<(), TeleError> {
        if self.class.get().is_none() {
            let class = resolve(object)?;
            stats.add_stat(format!("resolved {}", class.name()));
            let _ = self.class.set(class);
        }
        Ok(())
    }

    fn local_equivalent(&self, object: &TeleObject) -> Result<Option<LocalValue>, TeleError> {
        let class = match self.class.get() {
            Some(class) => class.clone(),
            None => resolve(object)?,
        };
        Ok(Some(LocalValue::Class(class)))
    }

    fn textual_visualization(&self, _object: &TeleObject) -> Option<String> {
        self.class.get().map(|class| class.name().to_string())
    }
}

fn resolve(object: &TeleObject) -> Result<Arc<ClassDescriptor>, TeleError> {
    let vm = object.vm()?;
    let id = object.read_int_field(fields::CLASS_ACTOR_ID)?;
    u64::try_from(id)
        .ok()
        .and_then(|id| vm.classes().class_with_id(ClassId::new(id)))
        .ok_or_else(|| {
            TeleError::FatalInconsistency(format!(
                "{object} describes class {id}, which is not known locally"
            ))
        })
}

impl SurrogateRef<'_, TeleClassActor> {
    /// The local descriptor of the class
    pub fn class_descriptor(&self) -> Result<Arc<ClassDescriptor>, TeleError> {
        if let Some(class) = self.surrogate().class.get() {
            return Ok(class.clone());
        }
        let class = resolve(self.object())?;
        Ok(self.surrogate().class.get_or_init(|| class).clone())
    }

    /// The name of the class, as recorded in the target
    pub fn name(&self) -> Result<String, TeleError> {
        if let Some(name) = self.surrogate().name.get() {
            return Ok(name.clone());
        }
        let name = read_string_field(self.object(), fields::CLASS_ACTOR_NAME)?.unwrap_or_default();
        Ok(self.surrogate().name.get_or_init(|| name).clone())
    }
}
