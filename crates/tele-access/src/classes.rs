//! The class and layout metadata collaborator.
//!
//! The debugger loads the same classes as the target, so every class in the target has a local
//! [ClassDescriptor] describing its fields and their offsets. A [ClassRegistry] holds them and
//! resolves a class descriptor object found in the target heap to its local counterpart.

use crate::layout::Layout;
use crate::memory::DataAccessError;
use crate::raw::RawReader;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tele_types::{Address, ClassId, Kind, WordType};
use thiserror::Error;

/// The representation used for instances of a class
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ClassCategory {
    /// Instances are tuples
    Tuple,
    /// Instances are hybrids
    Hybrid,
    /// Instances are arrays
    Array {
        /// the element kind
        component: Kind,
        /// the element class, for arrays of references
        component_class: Option<Arc<str>>,
    },
}

/// A field of a class, with its location inside instances (or inside the static tuple)
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FieldDescriptor {
    name: Arc<str>,
    holder: Arc<str>,
    kind: Kind,
    offset: u32,
    word_type: Option<WordType>,
    type_name: Option<Arc<str>>,
    deep_copied: bool,
    is_static: bool,
}

impl FieldDescriptor {
    /// The field's name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name of the class declaring this field
    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// The kind of value stored in the field
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// The offset of the field from the origin of its object
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// The size of the field in bytes
    pub fn width(&self) -> u32 {
        self.kind.width()
    }

    /// For word fields, the declared word flavor
    pub fn word_type(&self) -> Option<WordType> {
        self.word_type
    }

    /// For reference fields, the declared class, if known
    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    /// Whether deep copies include this field
    pub fn is_deep_copied(&self) -> bool {
        self.deep_copied
    }

    /// Whether this field lives in the static tuple
    pub fn is_static(&self) -> bool {
        self.is_static
    }
}

/// A local descriptor of a class in the target
#[derive(Debug)]
pub struct ClassDescriptor {
    id: ClassId,
    name: Arc<str>,
    superclass: Option<Arc<ClassDescriptor>>,
    category: ClassCategory,
    fields: Vec<FieldDescriptor>,
    static_fields: Vec<FieldDescriptor>,
    /// the tables in the array part of a hybrid, with the kind of their elements
    tables: Vec<(Arc<str>, Kind)>,
    instance_size: u32,
    static_tuple_size: u32,
}

impl ClassDescriptor {
    /// Starts describing a class
    pub fn builder(name: impl AsRef<str>) -> ClassDescriptorBuilder {
        ClassDescriptorBuilder::new(name)
    }

    /// Gets the class id
    pub fn id(&self) -> ClassId {
        self.id
    }

    /// Gets the fully qualified name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the direct superclass
    pub fn superclass(&self) -> Option<&Arc<ClassDescriptor>> {
        self.superclass.as_ref()
    }

    /// Gets the representation of instances
    pub fn category(&self) -> &ClassCategory {
        &self.category
    }

    /// The element kind, if this is an array class
    pub fn component_kind(&self) -> Option<Kind> {
        match self.category {
            ClassCategory::Array { component, .. } => Some(component),
            _ => None,
        }
    }

    /// The fields declared by this class itself
    pub fn declared_fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// The static fields declared by this class
    pub fn static_fields(&self) -> &[FieldDescriptor] {
        &self.static_fields
    }

    /// The size of a tuple instance, or of the fixed part of a hybrid instance
    pub fn instance_size(&self) -> u32 {
        self.instance_size
    }

    /// The size of this class's static tuple
    pub fn static_tuple_size(&self) -> u32 {
        self.static_tuple_size
    }

    /// This class followed by its superclasses, nearest first
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors { next: Some(self) }
    }

    /// Whether this class is `name` or extends it
    pub fn is_subclass_of(&self, name: &str) -> bool {
        self.ancestors().any(|class| class.name() == name)
    }

    /// Every instance field, including inherited ones, in layout order
    pub fn instance_fields(&self) -> Vec<&FieldDescriptor> {
        let mut chain = self.ancestors().collect::<Vec<_>>();
        chain.reverse();
        chain
            .into_iter()
            .flat_map(|class| class.fields.iter())
            .collect()
    }

    /// Finds an instance field by name, preferring the nearest declaration
    pub fn find_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.ancestors()
            .find_map(|class| class.fields.iter().find(|field| field.name() == name))
    }

    /// The element kind of the hybrid table `name`, declared by this class or an ancestor
    pub fn table_kind(&self, name: &str) -> Option<Kind> {
        self.find_nearest(|class| {
            class
                .tables
                .iter()
                .find(|(table, _)| table.as_ref() == name)
                .map(|(_, kind)| *kind)
        })
    }

    /// Finds a static field of this class by name
    pub fn find_static_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.static_fields.iter().find(|field| field.name() == name)
    }

    /// Walks the ancestor chain and returns the first thing `lookup` finds
    pub fn find_nearest<T>(&self, lookup: impl FnMut(&ClassDescriptor) -> Option<T>) -> Option<T> {
        self.ancestors().find_map(lookup)
    }
}

impl PartialEq for ClassDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ClassDescriptor {}

/// Iterator over a class and its superclasses
#[derive(Debug, Clone)]
pub struct Ancestors<'a> {
    next: Option<&'a ClassDescriptor>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a ClassDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.superclass.as_deref();
        Some(current)
    }
}

#[derive(Debug)]
struct PendingField {
    name: Arc<str>,
    kind: Kind,
    word_type: Option<WordType>,
    type_name: Option<Arc<str>>,
    deep_copied: bool,
}

/// Describes a class, computing field offsets the way the target lays them out: inherited
/// fields first, then each declared field aligned to its own width.
#[derive(Debug)]
pub struct ClassDescriptorBuilder {
    name: Arc<str>,
    superclass: Option<Arc<ClassDescriptor>>,
    category: Option<ClassCategory>,
    fields: Vec<PendingField>,
    static_fields: Vec<PendingField>,
    tables: Vec<(Arc<str>, Kind)>,
}

impl ClassDescriptorBuilder {
    fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            superclass: None,
            category: None,
            fields: vec![],
            static_fields: vec![],
            tables: vec![],
        }
    }

    /// Sets the superclass
    pub fn extends(mut self, superclass: &Arc<ClassDescriptor>) -> Self {
        self.superclass = Some(superclass.clone());
        self
    }

    /// Instances are hybrids
    pub fn hybrid(mut self) -> Self {
        self.category = Some(ClassCategory::Hybrid);
        self
    }

    /// Instances are arrays of a primitive or word kind
    pub fn array(mut self, component: Kind) -> Self {
        self.category = Some(ClassCategory::Array {
            component,
            component_class: None,
        });
        self
    }

    /// Instances are arrays of references to `component_class`
    pub fn object_array(mut self, component_class: impl AsRef<str>) -> Self {
        self.category = Some(ClassCategory::Array {
            component: Kind::Reference,
            component_class: Some(Arc::from(component_class.as_ref())),
        });
        self
    }

    /// Declares an instance field
    pub fn field(mut self, name: impl AsRef<str>, kind: Kind) -> Self {
        self.fields.push(PendingField::new(name, kind));
        self
    }

    /// Declares a reference field of a known class
    pub fn reference_field(mut self, name: impl AsRef<str>, type_name: impl AsRef<str>) -> Self {
        let mut field = PendingField::new(name, Kind::Reference);
        field.type_name = Some(Arc::from(type_name.as_ref()));
        self.fields.push(field);
        self
    }

    /// Declares a word field of a given flavor
    pub fn word_field(mut self, name: impl AsRef<str>, word_type: WordType) -> Self {
        let mut field = PendingField::new(name, Kind::Word);
        field.word_type = Some(word_type);
        self.fields.push(field);
        self
    }

    /// Declares an instance field that deep copies leave out
    pub fn omitted_field(mut self, name: impl AsRef<str>, kind: Kind) -> Self {
        let mut field = PendingField::new(name, kind);
        field.deep_copied = false;
        self.fields.push(field);
        self
    }

    /// Declares a table in the array part of a hybrid and the kind of its elements
    pub fn table(mut self, name: impl AsRef<str>, element_kind: Kind) -> Self {
        self.tables.push((Arc::from(name.as_ref()), element_kind));
        self
    }

    /// Declares a static field
    pub fn static_field(mut self, name: impl AsRef<str>, kind: Kind) -> Self {
        self.static_fields.push(PendingField::new(name, kind));
        self
    }

    /// Lays out the class
    pub fn build(self, id: ClassId, layout: &Layout) -> ClassDescriptor {
        let category = self.category.unwrap_or_else(|| match &self.superclass {
            Some(superclass) if superclass.category == ClassCategory::Hybrid => {
                ClassCategory::Hybrid
            }
            _ => ClassCategory::Tuple,
        });
        let header_size = match category {
            ClassCategory::Tuple => layout.tuple_header_size(),
            ClassCategory::Hybrid => layout.hybrid_header_size(),
            ClassCategory::Array { .. } => layout.array_header_size(),
        };
        let inherited = self
            .superclass
            .as_ref()
            .map(|superclass| superclass.instance_size)
            .unwrap_or(0);

        let (fields, end) = lay_out(
            &self.name,
            self.fields,
            inherited.max(header_size),
            false,
        );
        let (static_fields, static_end) = lay_out(
            &self.name,
            self.static_fields,
            layout.tuple_header_size(),
            true,
        );

        ClassDescriptor {
            id,
            name: self.name,
            superclass: self.superclass,
            category,
            fields,
            static_fields,
            tables: self.tables,
            instance_size: layout.align(end as u64) as u32,
            static_tuple_size: layout.align(static_end as u64) as u32,
        }
    }
}

impl PendingField {
    fn new(name: impl AsRef<str>, kind: Kind) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            kind,
            word_type: None,
            type_name: None,
            deep_copied: true,
        }
    }
}

fn lay_out(
    holder: &Arc<str>,
    pending: Vec<PendingField>,
    start: u32,
    is_static: bool,
) -> (Vec<FieldDescriptor>, u32) {
    let mut offset = start;
    let fields = pending
        .into_iter()
        .map(|field| {
            let width = field.kind.width().max(1);
            offset = offset.div_ceil(width) * width;
            let descriptor = FieldDescriptor {
                name: field.name,
                holder: holder.clone(),
                kind: field.kind,
                offset,
                word_type: field.word_type,
                type_name: field.type_name,
                deep_copied: field.deep_copied,
                is_static,
            };
            offset += field.kind.width();
            descriptor
        })
        .collect();
    (fields, offset)
}

/// Resolves class descriptors found in the target heap to local descriptors
pub trait ClassMetadata: Debug + Send + Sync {
    /// Resolves the class descriptor object at `class_actor` in the target
    fn resolve_class_descriptor(
        &self,
        reader: &RawReader<'_>,
        class_actor: Address,
    ) -> Result<Arc<ClassDescriptor>, DataAccessError>;

    /// Finds a local class by name
    fn class_named(&self, name: &str) -> Option<Arc<ClassDescriptor>>;

    /// Finds a local class by id
    fn class_with_id(&self, id: ClassId) -> Option<Arc<ClassDescriptor>>;
}

/// A class could not be defined
#[derive(Debug, Error)]
#[error("class {0} is already defined")]
pub struct DuplicateClassError(pub String);

/// The local class universe, keyed both by id and by name
#[derive(Debug)]
pub struct ClassRegistry {
    layout: Layout,
    next_id: AtomicU64,
    classes: RwLock<Classes>,
}

#[derive(Debug, Default)]
struct Classes {
    by_id: HashMap<ClassId, Arc<ClassDescriptor>>,
    by_name: HashMap<Arc<str>, Arc<ClassDescriptor>>,
}

impl ClassRegistry {
    /// Creates an empty registry for classes laid out by `layout`
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            next_id: AtomicU64::new(1),
            classes: RwLock::default(),
        }
    }

    /// Gets the layout classes are built with
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Lays out and registers a class, assigning it the next free id
    pub fn define(
        &self,
        builder: ClassDescriptorBuilder,
    ) -> Result<Arc<ClassDescriptor>, DuplicateClassError> {
        let mut classes = self.classes.write();
        if classes.by_name.contains_key(&builder.name) {
            return Err(DuplicateClassError(builder.name.to_string()));
        }
        let id = ClassId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let class = Arc::new(builder.build(id, &self.layout));
        classes.by_id.insert(id, class.clone());
        classes.by_name.insert(class.name.clone(), class.clone());
        Ok(class)
    }

    /// Every registered class
    pub fn classes(&self) -> Vec<Arc<ClassDescriptor>> {
        self.classes.read().by_id.values().cloned().collect()
    }

    /// The number of registered classes
    pub fn len(&self) -> usize {
        self.classes.read().by_id.len()
    }

    /// Whether no class has been registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ClassMetadata for ClassRegistry {
    fn resolve_class_descriptor(
        &self,
        reader: &RawReader<'_>,
        class_actor: Address,
    ) -> Result<Arc<ClassDescriptor>, DataAccessError> {
        let id = reader.read_class_id(class_actor)?;
        u64::try_from(id)
            .ok()
            .and_then(|id| self.class_with_id(ClassId::new(id)))
            .ok_or(DataAccessError::UnknownClass(id))
    }

    fn class_named(&self, name: &str) -> Option<Arc<ClassDescriptor>> {
        self.classes.read().by_name.get(name).cloned()
    }

    fn class_with_id(&self, id: ClassId) -> Option<Arc<ClassDescriptor>> {
        self.classes.read().by_id.get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_fields_are_laid_out_after_inherited_ones() {
        let registry = ClassRegistry::new(Layout::default());
        let object = registry.define(ClassDescriptor::builder("Object")).unwrap();
        let bar = registry
            .define(
                ClassDescriptor::builder("Bar")
                    .extends(&object)
                    .field("flag", Kind::Boolean)
                    .field("count", Kind::Int),
            )
            .unwrap();
        let foo = registry
            .define(
                ClassDescriptor::builder("Foo")
                    .extends(&bar)
                    .reference_field("next", "Foo"),
            )
            .unwrap();

        assert_eq!(object.instance_size(), 16);
        assert_eq!(bar.find_field("flag").unwrap().offset(), 16);
        assert_eq!(bar.find_field("count").unwrap().offset(), 20);
        assert_eq!(foo.find_field("next").unwrap().offset(), 24);
        assert_eq!(foo.instance_size(), 32);
        assert_eq!(
            foo.instance_fields()
                .iter()
                .map(|field| field.name())
                .collect::<Vec<_>>(),
            vec!["flag", "count", "next"]
        );
        assert!(foo.is_subclass_of("Bar"));
        assert!(!bar.is_subclass_of("Foo"));
    }

    #[test]
    fn test_find_nearest_prefers_the_closest_ancestor() {
        let registry = ClassRegistry::new(Layout::default());
        let base = registry.define(ClassDescriptor::builder("Base")).unwrap();
        let middle = registry
            .define(ClassDescriptor::builder("Middle").extends(&base))
            .unwrap();
        let leaf = registry
            .define(ClassDescriptor::builder("Leaf").extends(&middle))
            .unwrap();

        let registered = ["Base", "Middle"];
        let found = leaf.find_nearest(|class| {
            registered
                .iter()
                .find(|name| **name == class.name())
                .copied()
        });
        assert_eq!(found, Some("Middle"));
    }

    #[test]
    fn test_hybrid_category_is_inherited() {
        let registry = ClassRegistry::new(Layout::default());
        let object = registry.define(ClassDescriptor::builder("Object")).unwrap();
        let hub = registry
            .define(
                ClassDescriptor::builder("Hub")
                    .extends(&object)
                    .hybrid()
                    .reference_field("classActor", "ClassActor"),
            )
            .unwrap();
        let dynamic = registry
            .define(ClassDescriptor::builder("DynamicHub").extends(&hub))
            .unwrap();
        assert_eq!(dynamic.category(), &ClassCategory::Hybrid);
        assert_eq!(dynamic.table_kind("vTable"), None);
        assert_eq!(hub.find_field("classActor").unwrap().offset(), 24);
        registry
            .define(ClassDescriptor::builder("Hub"))
            .expect_err("duplicate definition");
    }

    #[test]
    fn test_table_kinds_are_inherited() {
        let registry = ClassRegistry::new(Layout::default());
        let object = registry.define(ClassDescriptor::builder("Object")).unwrap();
        let hub = registry
            .define(
                ClassDescriptor::builder("Hub")
                    .extends(&object)
                    .hybrid()
                    .table("vTable", Kind::Word)
                    .table("mTable", Kind::Int),
            )
            .unwrap();
        let dynamic = registry
            .define(ClassDescriptor::builder("DynamicHub").extends(&hub))
            .unwrap();
        assert_eq!(dynamic.table_kind("vTable"), Some(Kind::Word));
        assert_eq!(dynamic.table_kind("mTable"), Some(Kind::Int));
        assert_eq!(dynamic.table_kind("iTable"), None);
        assert_eq!(object.table_kind("vTable"), None);
    }
}
