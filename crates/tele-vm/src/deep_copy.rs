//! Copies graphs of mirrored objects into local values

use crate::local::{LocalArray, LocalHeap, LocalObject, LocalValue};
use crate::mirror::Mirror;
use crate::object::{ObjectShape, TeleObject};
use crate::TeleError;
use std::collections::{BTreeMap, HashMap, HashSet};
use tele_access::classes::FieldDescriptor;
use tele_types::{Address, ObjectId, Value, WordType};
use tracing::{trace, warn};

/// The result of a deep copy: the copied root and the heap holding every object it reaches
#[derive(Debug, Clone)]
pub struct DeepCopy {
    root: LocalValue,
    heap: LocalHeap,
    copied: usize,
    per_class: BTreeMap<String, usize>,
}

impl DeepCopy {
    pub fn root(&self) -> &LocalValue {
        &self.root
    }

    pub fn heap(&self) -> &LocalHeap {
        &self.heap
    }

    /// The copied root object, unless the root was replaced by a local equivalent
    pub fn root_object(&self) -> Option<&LocalObject> {
        self.object(&self.root)
    }

    /// Follows a copied reference into the heap
    pub fn object(&self, value: &LocalValue) -> Option<&LocalObject> {
        self.heap.get(value.as_object()?)
    }

    /// The number of target objects copied
    pub fn copied_count(&self) -> usize {
        self.copied
    }

    /// The number of target objects of a class copied
    pub fn copies_of(&self, class_name: &str) -> usize {
        self.per_class.get(class_name).copied().unwrap_or(0)
    }
}

/// Walks the graph reachable from a mirrored object, copying each object exactly once.
///
/// Every object is registered as copied before its fields are, so cycles in the target close
/// into cycles in the [LocalHeap]. Fields can be left out by holder and name.
#[derive(Debug)]
pub struct DeepCopier {
    omitted: HashMap<String, HashSet<String>>,
    copies: HashMap<ObjectId, LocalValue>,
    heap: LocalHeap,
    level: usize,
    copied: usize,
    per_class: BTreeMap<String, usize>,
    trace_interval: usize,
}

impl DeepCopier {
    pub fn new() -> Self {
        Self {
            omitted: HashMap::new(),
            copies: HashMap::new(),
            heap: LocalHeap::default(),
            level: 0,
            copied: 0,
            per_class: BTreeMap::new(),
            trace_interval: 100,
        }
    }

    /// Leaves the field `field` of instances of `holder` out of the copy. The field is not
    /// read at all.
    pub fn omit(mut self, holder: impl AsRef<str>, field: impl AsRef<str>) -> Self {
        self.omitted
            .entry(holder.as_ref().to_string())
            .or_default()
            .insert(field.as_ref().to_string());
        self
    }

    pub(crate) fn with_trace_interval(mut self, interval: usize) -> Self {
        self.trace_interval = interval.max(1);
        self
    }

    /// How deep in the graph the copy currently is
    pub fn level(&self) -> usize {
        self.level
    }

    fn is_omitted(&self, field: &FieldDescriptor) -> bool {
        !field.is_deep_copied()
            || self
                .omitted
                .get(field.holder())
                .is_some_and(|fields| fields.contains(field.name()))
    }

    /// Copies an object, or returns the copy already made
    pub fn copy(&mut self, object: &TeleObject) -> Result<LocalValue, TeleError> {
        if let Some(copy) = self.copies.get(&object.oid()) {
            return Ok(copy.clone());
        }
        if let Some(warning) = object.surrogate().deep_copy_warning() {
            warn!("copying {object}: {warning}");
        }
        self.level += 1;
        let copy = self.create(object);
        self.level -= 1;
        let copy = copy?;
        self.copies.entry(object.oid()).or_insert_with(|| copy.clone());
        Ok(copy)
    }

    fn create(&mut self, object: &TeleObject) -> Result<LocalValue, TeleError> {
        self.count(object);
        if let Some(equivalent) = object.local_equivalent()? {
            return Ok(equivalent);
        }
        match *object.shape() {
            ObjectShape::Tuple | ObjectShape::StaticTuple => self.copy_tuple(object),
            ObjectShape::Array { component, .. } if component.is_reference() => {
                self.copy_reference_array(object)
            }
            ObjectShape::Array { component, .. } => {
                let elements = LocalArray::from_values(component, object.read_element_values()?);
                let id = self.heap.reserve(LocalObject::Array {
                    class: object.class().clone(),
                    elements,
                });
                Ok(self.register(object, LocalValue::Object(id)))
            }
            ObjectShape::Hybrid { .. } => self.copy_hybrid(object),
        }
    }

    fn copy_tuple(&mut self, object: &TeleObject) -> Result<LocalValue, TeleError> {
        let class = object.class().clone();
        let id = self.heap.reserve(LocalObject::Tuple {
            class: class.clone(),
            fields: Vec::new(),
        });
        let copy = self.register(object, LocalValue::Object(id));
        let fields = self.copy_fields(object)?;
        self.heap.fill(id, LocalObject::Tuple { class, fields });
        Ok(copy)
    }

    fn copy_hybrid(&mut self, object: &TeleObject) -> Result<LocalValue, TeleError> {
        let class = object.class().clone();
        let id = self.heap.reserve(LocalObject::Hybrid {
            class: class.clone(),
            fields: Vec::new(),
            words: Vec::new(),
        });
        let copy = self.register(object, LocalValue::Object(id));
        let fields = self.copy_fields(object)?;
        let words = object.read_hybrid_words()?;
        self.heap.fill(
            id,
            LocalObject::Hybrid {
                class,
                fields,
                words,
            },
        );
        Ok(copy)
    }

    fn copy_reference_array(&mut self, object: &TeleObject) -> Result<LocalValue, TeleError> {
        let class = object.class().clone();
        let id = self.heap.reserve(LocalObject::Array {
            class: class.clone(),
            elements: LocalArray::Reference(Vec::new()),
        });
        let copy = self.register(object, LocalValue::Object(id));
        let mut elements = Vec::new();
        for element in object.read_element_values()? {
            let origin = element.as_address().unwrap_or(Address::ZERO);
            elements.push(self.copy_reference(object, origin)?);
        }
        self.heap.fill(
            id,
            LocalObject::Array {
                class,
                elements: LocalArray::Reference(elements),
            },
        );
        Ok(copy)
    }

    fn copy_fields(&mut self, object: &TeleObject) -> Result<Vec<(String, LocalValue)>, TeleError> {
        let mut fields = Vec::new();
        for field in object.fields() {
            if self.is_omitted(field) {
                trace!("omitting {}.{}", field.holder(), field.name());
                continue;
            }
            let value = match object.read_field_value(field)? {
                Value::Reference(origin) => self.copy_reference(object, origin)?,
                Value::Word(word) => {
                    LocalValue::Word(field.word_type().unwrap_or(WordType::Word), word)
                }
                other => LocalValue::from(other),
            };
            fields.push((field.name().to_string(), value));
        }
        Ok(fields)
    }

    fn copy_reference(
        &mut self,
        holder: &TeleObject,
        origin: Address,
    ) -> Result<LocalValue, TeleError> {
        if origin.is_zero() {
            return Ok(LocalValue::Null);
        }
        match holder.vm()?.make_object_at(origin)? {
            Some(object) => self.copy(&object),
            None => Ok(LocalValue::Null),
        }
    }

    fn register(&mut self, object: &TeleObject, copy: LocalValue) -> LocalValue {
        self.copies.insert(object.oid(), copy.clone());
        copy
    }

    fn count(&mut self, object: &TeleObject) {
        self.copied += 1;
        *self
            .per_class
            .entry(object.class_name().to_string())
            .or_default() += 1;
        if self.copied % self.trace_interval == 0 {
            trace!(level = self.level, "{} objects copied", self.copied);
        }
    }

    pub(crate) fn finish(self, root: LocalValue) -> DeepCopy {
        DeepCopy {
            root,
            heap: self.heap,
            copied: self.copied,
            per_class: self.per_class,
        }
    }
}

impl Default for DeepCopier {
    fn default() -> Self {
        Self::new()
    }
}
