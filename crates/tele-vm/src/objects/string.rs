use crate::local::LocalValue;
use crate::object::TeleObject;
use crate::stats::StatsPrinter;
use crate::surrogate::{Surrogate, SurrogateRef};
use crate::TeleError;
use std::sync::OnceLock;
use tele_types::names::fields;
use tele_types::{Epoch, Value};

/// A string in the target. Strings are immutable, so the text is read once.
#[derive(Debug, Default)]
pub struct TeleString {
    value: OnceLock<String>,
}

impl Surrogate for TeleString {
    fn type_name(&self) -> &'static str {
        "TeleString"
    }

    fn update_object_cache(
        &self,
        object: &TeleObject,
        _epoch: Epoch,
        _stats: &mut StatsPrinter,
    ) -> Result<(), TeleError> {
        if self.value.get().is_none() {
            let value = read_chars(object)?;
            let _ = self.value.set(value);
        }
        Ok(())
    }

    fn local_equivalent(&self, object: &TeleObject) -> Result<Option<LocalValue>, TeleError> {
        let value = match self.value.get() {
            Some(value) => value.clone(),
            None => read_chars(object)?,
        };
        Ok(Some(LocalValue::String(value)))
    }

    fn textual_visualization(&self, _object: &TeleObject) -> Option<String> {
        self.value.get().map(|value| format!("{value:?}"))
    }
}

impl SurrogateRef<'_, TeleString> {
    /// The text of the string
    pub fn value(&self) -> Result<String, TeleError> {
        if let Some(value) = self.surrogate().value.get() {
            return Ok(value.clone());
        }
        let value = read_chars(self.object())?;
        Ok(self.surrogate().value.get_or_init(|| value).clone())
    }
}

fn read_chars(object: &TeleObject) -> Result<String, TeleError> {
    let Some(chars) = object.read_reference_field(fields::STRING_VALUE)? else {
        return Ok(String::new());
    };
    let units: Vec<u16> = chars
        .read_element_values()?
        .into_iter()
        .filter_map(|value| match value {
            Value::Char(unit) => Some(unit),
            _ => None,
        })
        .collect();
    Ok(String::from_utf16_lossy(&units))
}

/// Reads a field holding a string and translates it
pub(crate) fn read_string_field(
    object: &TeleObject,
    name: &str,
) -> Result<Option<String>, TeleError> {
    let Some(string) = object.read_reference_field(name)? else {
        return Ok(None);
    };
    match string.downcast::<TeleString>() {
        Some(string) => string.value().map(Some),
        None => Err(TeleError::FatalInconsistency(format!(
            "field {}.{name} refers to a {}, not a string",
            object.class_name(),
            string.class_name()
        ))),
    }
}
