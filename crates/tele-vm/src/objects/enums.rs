use crate::local::LocalValue;
use crate::object::TeleObject;
use crate::objects::string::read_string_field;
use crate::stats::StatsPrinter;
use crate::surrogate::{Surrogate, SurrogateRef};
use crate::TeleError;
use std::sync::OnceLock;
use tele_types::names::fields;
use tele_types::Epoch;

/// An enum constant
#[derive(Debug, Default)]
pub struct TeleEnum {
    name: OnceLock<String>,
    ordinal: OnceLock<i32>,
}

impl Surrogate for TeleEnum {
    fn type_name(&self) -> &'static str {
        "TeleEnum"
    }

    fn update_object_cache(
        &self,
        object: &TeleObject,
        _epoch: Epoch,
        _stats: &mut StatsPrinter,
    ) -> Result<(), TeleError> {
        if self.ordinal.get().is_none() {
            let ordinal = object.read_int_field(fields::ENUM_ORDINAL)?;
            let _ = self.ordinal.set(ordinal);
        }
        if self.name.get().is_none() {
            let name = read_string_field(object, fields::ENUM_NAME)?.unwrap_or_default();
            let _ = self.name.set(name);
        }
        Ok(())
    }

    fn local_equivalent(&self, object: &TeleObject) -> Result<Option<LocalValue>, TeleError> {
        let Some(constant) = object.downcast::<TeleEnum>() else {
            return Ok(None);
        };
        Ok(Some(LocalValue::Enum {
            class: object.class().clone(),
            name: constant.name()?,
        }))
    }

    fn textual_visualization(&self, object: &TeleObject) -> Option<String> {
        Some(format!("{}.{}", object.class_name(), self.name.get()?))
    }
}

impl SurrogateRef<'_, TeleEnum> {
    /// The name of the constant
    pub fn name(&self) -> Result<String, TeleError> {
        if let Some(name) = self.surrogate().name.get() {
            return Ok(name.clone());
        }
        let name = read_string_field(self.object(), fields::ENUM_NAME)?.unwrap_or_default();
        Ok(self.surrogate().name.get_or_init(|| name).clone())
    }

    /// The position of the constant in its declaration
    pub fn ordinal(&self) -> Result<i32, TeleError> {
        if let Some(ordinal) = self.surrogate().ordinal.get() {
            return Ok(*ordinal);
        }
        let ordinal = self.read_int_field(fields::ENUM_ORDINAL)?;
        Ok(*self.surrogate().ordinal.get_or_init(|| ordinal))
    }
}
