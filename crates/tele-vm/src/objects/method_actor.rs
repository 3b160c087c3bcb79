use crate::object::TeleObject;
use crate::objects::string::read_string_field;
use crate::objects::TeleClassActor;
use crate::stats::StatsPrinter;
use crate::surrogate::{Surrogate, SurrogateRef};
use crate::TeleError;
use std::sync::{Arc, OnceLock};
use tele_types::names::fields;
use tele_types::Epoch;

/// The runtime's descriptor of a method
#[derive(Debug, Default)]
pub struct TeleMethodActor {
    name: OnceLock<String>,
    holder_name: OnceLock<String>,
}

impl Surrogate for TeleMethodActor {
    fn type_name(&self) -> &'static str {
        "TeleMethodActor"
    }

    fn role(&self) -> Option<&'static str> {
        Some("method descriptor")
    }

    fn update_object_cache(
        &self,
        object: &TeleObject,
        _epoch: Epoch,
        _stats: &mut StatsPrinter,
    ) -> Result<(), TeleError> {
        if let Some(method) = object.downcast::<TeleMethodActor>() {
            method.name()?;
            method.holder_name()?;
        }
        Ok(())
    }

    fn textual_visualization(&self, _object: &TeleObject) -> Option<String> {
        Some(format!("{}.{}", self.holder_name.get()?, self.name.get()?))
    }
}

impl SurrogateRef<'_, TeleMethodActor> {
    pub fn name(&self) -> Result<String, TeleError> {
        if let Some(name) = self.surrogate().name.get() {
            return Ok(name.clone());
        }
        let name = read_string_field(self.object(), fields::METHOD_NAME)?.unwrap_or_default();
        Ok(self.surrogate().name.get_or_init(|| name).clone())
    }

    /// The class actor of the class declaring the method
    pub fn holder(&self) -> Result<Option<Arc<TeleObject>>, TeleError> {
        self.read_reference_field(fields::METHOD_HOLDER)
    }

    /// The name of the class declaring the method
    pub fn holder_name(&self) -> Result<String, TeleError> {
        if let Some(name) = self.surrogate().holder_name.get() {
            return Ok(name.clone());
        }
        let name = match self.holder()? {
            Some(holder) => match holder.downcast::<TeleClassActor>() {
                Some(class_actor) => class_actor.class_descriptor()?.name().to_string(),
                None => holder.class_name().to_string(),
            },
            None => String::new(),
        };
        Ok(self.surrogate().holder_name.get_or_init(|| name).clone())
    }

    /// The holder and name of the method
    pub fn qualified_name(&self) -> Result<String, TeleError> {
        Ok(format!("{}.{}", self.holder_name()?, self.name()?))
    }

    /// The bytecode and constant pool of the method
    pub fn code_attribute(&self) -> Result<Option<Arc<TeleObject>>, TeleError> {
        self.read_reference_field(fields::METHOD_CODE_ATTRIBUTE)
    }
}

/// The bytecode of a method and the constant pool it refers to
#[derive(Debug, Default)]
pub struct TeleCodeAttribute {
    bytecodes: OnceLock<Arc<[u8]>>,
}

impl Surrogate for TeleCodeAttribute {
    fn type_name(&self) -> &'static str {
        "TeleCodeAttribute"
    }
}

impl SurrogateRef<'_, TeleCodeAttribute> {
    /// The bytecode. Bytecode never changes once a method is loaded, so it is read once.
    pub fn bytecodes(&self) -> Result<Arc<[u8]>, TeleError> {
        if let Some(bytecodes) = self.surrogate().bytecodes.get() {
            return Ok(bytecodes.clone());
        }
        let bytecodes: Arc<[u8]> = match self.read_reference_field(fields::CODE_ATTRIBUTE_CODE)? {
            Some(code) => Arc::from(code.read_element_bytes()?.as_ref()),
            None => Arc::from(Vec::new()),
        };
        Ok(self
            .surrogate()
            .bytecodes
            .get_or_init(|| bytecodes)
            .clone())
    }

    pub fn constant_pool(&self) -> Result<Option<Arc<TeleObject>>, TeleError> {
        self.read_reference_field(fields::CODE_ATTRIBUTE_POOL)
    }
}
