use crate::local::LocalValue;
use crate::object::TeleObject;
use crate::objects::string::read_string_field;
use crate::stats::StatsPrinter;
use crate::surrogate::{Surrogate, SurrogateRef};
use crate::TeleError;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, OnceLock};
use tele_types::names::fields;
use tele_types::Epoch;

/// The constant pool of a class
#[derive(Debug, Default)]
pub struct TeleConstantPool;

impl Surrogate for TeleConstantPool {
    fn type_name(&self) -> &'static str {
        "TeleConstantPool"
    }
}

impl SurrogateRef<'_, TeleConstantPool> {
    /// The array of constants
    pub fn constants(&self) -> Result<Option<Arc<TeleObject>>, TeleError> {
        self.read_reference_field(fields::POOL_CONSTANTS)
    }

    /// The constant at `index`, if the slot is filled
    pub fn constant(&self, index: u16) -> Result<Option<Arc<TeleObject>>, TeleError> {
        let Some(constants) = self.constants()? else {
            return Ok(None);
        };
        if index as u32 >= constants.length()? {
            return Ok(None);
        }
        constants.read_element_reference(index as u64)
    }
}

/// A constant pool entry with no more specific surrogate
#[derive(Debug, Default)]
pub struct TelePoolConstant;

impl Surrogate for TelePoolConstant {
    fn type_name(&self) -> &'static str {
        "TelePoolConstant"
    }
}

/// A `Utf8` constant, translated to a local string when copied
#[derive(Debug, Default)]
pub struct TeleUtf8Constant {
    value: OnceLock<String>,
}

impl Surrogate for TeleUtf8Constant {
    fn type_name(&self) -> &'static str {
        "TeleUtf8Constant"
    }

    fn update_object_cache(
        &self,
        object: &TeleObject,
        _epoch: Epoch,
        _stats: &mut StatsPrinter,
    ) -> Result<(), TeleError> {
        cache_string(&self.value, object, fields::UTF8_STRING).map(|_| ())
    }

    fn local_equivalent(&self, object: &TeleObject) -> Result<Option<LocalValue>, TeleError> {
        cache_string(&self.value, object, fields::UTF8_STRING).map(|value| Some(LocalValue::String(value)))
    }
}

/// A string literal constant, translated to a local string when copied
#[derive(Debug, Default)]
pub struct TeleStringConstant {
    value: OnceLock<String>,
}

impl Surrogate for TeleStringConstant {
    fn type_name(&self) -> &'static str {
        "TeleStringConstant"
    }

    fn update_object_cache(
        &self,
        object: &TeleObject,
        _epoch: Epoch,
        _stats: &mut StatsPrinter,
    ) -> Result<(), TeleError> {
        cache_string(&self.value, object, fields::STRING_CONSTANT_VALUE).map(|_| ())
    }

    fn local_equivalent(&self, object: &TeleObject) -> Result<Option<LocalValue>, TeleError> {
        cache_string(&self.value, object, fields::STRING_CONSTANT_VALUE)
            .map(|value| Some(LocalValue::String(value)))
    }
}

fn cache_string(
    cell: &OnceLock<String>,
    object: &TeleObject,
    field: &str,
) -> Result<String, TeleError> {
    if let Some(value) = cell.get() {
        return Ok(value.clone());
    }
    let value = read_string_field(object, field)?.unwrap_or_default();
    Ok(cell.get_or_init(|| value).clone())
}

/// A symbolic reference to a method, as named by a constant pool
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct MethodSymbol {
    pub holder: String,
    pub name: String,
}

impl Display for MethodSymbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.holder, self.name)
    }
}

/// A method reference constant
#[derive(Debug, Default)]
pub struct TeleMethodRefConstant {
    symbol: OnceLock<MethodSymbol>,
}

impl Surrogate for TeleMethodRefConstant {
    fn type_name(&self) -> &'static str {
        "TeleMethodRefConstant"
    }

    fn textual_visualization(&self, _object: &TeleObject) -> Option<String> {
        self.symbol.get().map(MethodSymbol::to_string)
    }
}

impl SurrogateRef<'_, TeleMethodRefConstant> {
    /// The method the constant refers to
    pub fn symbol(&self) -> Result<MethodSymbol, TeleError> {
        if let Some(symbol) = self.surrogate().symbol.get() {
            return Ok(symbol.clone());
        }
        let symbol = MethodSymbol {
            holder: read_string_field(self.object(), fields::METHOD_REF_HOLDER)?
                .unwrap_or_default(),
            name: read_string_field(self.object(), fields::METHOD_REF_NAME)?.unwrap_or_default(),
        };
        Ok(self.surrogate().symbol.get_or_init(|| symbol).clone())
    }
}
