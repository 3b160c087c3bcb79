//! Plain local values produced by copying mirrored objects out of the target

use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tele_access::classes::ClassDescriptor;
use tele_types::{Address, Kind, Value, WordType};

/// Names an object in a [LocalHeap]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct LocalObjectId(usize);

impl LocalObjectId {
    /// The index of the object within its heap
    pub fn index(&self) -> usize {
        self.0
    }
}

impl Display for LocalObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "local#{}", self.0)
    }
}

/// A value copied out of the target
#[derive(Debug, Clone, PartialEq)]
pub enum LocalValue {
    Null,
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    /// A machine word, kept as a boxed address of its word type
    Word(WordType, Address),
    /// A target string, translated to a local string
    String(String),
    /// A target class descriptor, translated to the local class
    Class(Arc<ClassDescriptor>),
    /// A target enum constant, translated to its name
    Enum {
        class: Arc<ClassDescriptor>,
        name: String,
    },
    /// An object living in the accompanying [LocalHeap]
    Object(LocalObjectId),
}

impl LocalValue {
    /// Gets the heap object this value points at
    pub fn as_object(&self) -> Option<LocalObjectId> {
        match self {
            LocalValue::Object(id) => Some(*id),
            _ => None,
        }
    }

    /// Gets the text of a translated string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            LocalValue::String(string) => Some(string),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, LocalValue::Null)
    }
}

/// Boxes a value read from the target.
///
/// References can't be followed without a deep copier, so they become [LocalValue::Null].
impl From<Value> for LocalValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Boolean(v) => LocalValue::Boolean(v),
            Value::Byte(v) => LocalValue::Byte(v),
            Value::Char(v) => LocalValue::Char(v),
            Value::Short(v) => LocalValue::Short(v),
            Value::Int(v) => LocalValue::Int(v),
            Value::Float(v) => LocalValue::Float(v),
            Value::Long(v) => LocalValue::Long(v),
            Value::Double(v) => LocalValue::Double(v),
            Value::Word(address) => LocalValue::Word(WordType::Word, address),
            Value::Reference(_) | Value::Void => LocalValue::Null,
        }
    }
}

/// The elements of a copied array
#[derive(Debug, Clone, PartialEq)]
pub enum LocalArray {
    Boolean(Vec<bool>),
    Byte(Vec<u8>),
    Char(Vec<u16>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Float(Vec<f32>),
    Long(Vec<i64>),
    Double(Vec<f64>),
    Word(Vec<Address>),
    Reference(Vec<LocalValue>),
}

impl LocalArray {
    /// Collects values of a primitive or word kind into a typed array
    pub(crate) fn from_values(kind: Kind, values: Vec<Value>) -> LocalArray {
        macro_rules! collect {
            ($variant:ident, $pattern:pat => $value:expr) => {
                LocalArray::$variant(
                    values
                        .into_iter()
                        .filter_map(|value| match value {
                            $pattern => Some($value),
                            _ => None,
                        })
                        .collect(),
                )
            };
        }

        match kind {
            Kind::Boolean => collect!(Boolean, Value::Boolean(v) => v),
            Kind::Byte => collect!(Byte, Value::Byte(v) => v as u8),
            Kind::Char => collect!(Char, Value::Char(v) => v),
            Kind::Short => collect!(Short, Value::Short(v) => v),
            Kind::Int => collect!(Int, Value::Int(v) => v),
            Kind::Float => collect!(Float, Value::Float(v) => v),
            Kind::Long => collect!(Long, Value::Long(v) => v),
            Kind::Double => collect!(Double, Value::Double(v) => v),
            Kind::Word => collect!(Word, Value::Word(v) => v),
            Kind::Reference | Kind::Void => {
                LocalArray::Reference(values.into_iter().map(LocalValue::from).collect())
            }
        }
    }

    /// The number of elements
    pub fn len(&self) -> usize {
        match self {
            LocalArray::Boolean(v) => v.len(),
            LocalArray::Byte(v) => v.len(),
            LocalArray::Char(v) => v.len(),
            LocalArray::Short(v) => v.len(),
            LocalArray::Int(v) => v.len(),
            LocalArray::Float(v) => v.len(),
            LocalArray::Long(v) => v.len(),
            LocalArray::Double(v) => v.len(),
            LocalArray::Word(v) => v.len(),
            LocalArray::Reference(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An object copied out of the target
#[derive(Debug, Clone, PartialEq)]
pub enum LocalObject {
    Tuple {
        class: Arc<ClassDescriptor>,
        fields: Vec<(String, LocalValue)>,
    },
    Array {
        class: Arc<ClassDescriptor>,
        elements: LocalArray,
    },
    /// A hub: its tuple part plus the raw words of its tables
    Hybrid {
        class: Arc<ClassDescriptor>,
        fields: Vec<(String, LocalValue)>,
        words: Vec<u64>,
    },
}

impl LocalObject {
    /// The class the object was an instance of in the target
    pub fn class(&self) -> &Arc<ClassDescriptor> {
        match self {
            LocalObject::Tuple { class, .. }
            | LocalObject::Array { class, .. }
            | LocalObject::Hybrid { class, .. } => class,
        }
    }

    /// Gets a copied field by name. Fields that were not copied are absent.
    pub fn field(&self, name: &str) -> Option<&LocalValue> {
        match self {
            LocalObject::Tuple { fields, .. } | LocalObject::Hybrid { fields, .. } => fields
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, value)| value),
            LocalObject::Array { .. } => None,
        }
    }

    /// Gets the elements of a copied array
    pub fn elements(&self) -> Option<&LocalArray> {
        match self {
            LocalObject::Array { elements, .. } => Some(elements),
            _ => None,
        }
    }
}

/// Owns every object produced by one deep copy. Cycles in the target become cycles of
/// [LocalObjectId]s.
#[derive(Debug, Default, Clone)]
pub struct LocalHeap {
    objects: Vec<LocalObject>,
}

impl LocalHeap {
    /// Gets an object
    pub fn get(&self, id: LocalObjectId) -> Option<&LocalObject> {
        self.objects.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LocalObjectId, &LocalObject)> {
        self.objects
            .iter()
            .enumerate()
            .map(|(index, object)| (LocalObjectId(index), object))
    }

    pub(crate) fn reserve(&mut self, placeholder: LocalObject) -> LocalObjectId {
        self.objects.push(placeholder);
        LocalObjectId(self.objects.len() - 1)
    }

    pub(crate) fn fill(&mut self, id: LocalObjectId, object: LocalObject) {
        if let Some(slot) = self.objects.get_mut(id.0) {
            *slot = object;
        }
    }
}
