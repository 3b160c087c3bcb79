use crate::memory::SimulatedMemory;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tele_access::classes::{ClassDescriptor, ClassDescriptorBuilder, ClassMetadata, ClassRegistry};
use tele_access::{Layout, ReferenceManager};
use tele_types::names::{classes, fields, tables};
use tele_types::{Address, ClassId, Epoch, Kind, Value, WordType};
use tracing::trace;

/// Where ordinary objects are allocated
pub const HEAP_START: Address = Address::new(0x1000);
/// Where class actors, hubs, static tuples and their names are allocated
pub const METADATA_START: Address = Address::new(0x10_0000);

/// The objects the target keeps for every class
#[derive(Debug, Clone)]
pub struct ClassObjects {
    pub class_actor: Address,
    pub dynamic_hub: Address,
    pub static_hub: Option<Address>,
    pub static_tuple: Option<Address>,
    tables: HubTables,
}

/// The contents of the tables in the array part of a dynamic hub
#[derive(Debug, Clone, Default)]
pub struct HubTables {
    pub vtable: Vec<u64>,
    pub itable: Vec<u64>,
    pub mtable: Vec<i32>,
    pub reference_map: Vec<i32>,
}

impl HubTables {
    fn word_count(&self) -> u32 {
        let ints = self.mtable.len() + self.reference_map.len();
        (self.vtable.len() + self.itable.len() + ints.div_ceil(2)) as u32
    }
}

#[derive(Debug, Copy, Clone)]
enum Space {
    Heap,
    Metadata,
}

#[derive(Debug)]
struct Allocator {
    heap: u64,
    metadata: u64,
}

/// A target heap built in [SimulatedMemory].
///
/// Every object is mapped as a segment of its own, so freeing or moving an object makes its
/// old memory unreadable.
#[derive(Debug)]
pub struct SimulatedTarget {
    layout: Layout,
    memory: Arc<SimulatedMemory>,
    classes: Arc<ClassRegistry>,
    references: Arc<ReferenceManager>,
    allocator: Mutex<Allocator>,
    class_objects: RwLock<HashMap<ClassId, ClassObjects>>,
}

impl SimulatedTarget {
    /// Creates a target holding the classes of the runtime itself
    pub fn new() -> Self {
        let layout = Layout::default();
        let target = Self {
            layout,
            memory: Arc::new(SimulatedMemory::new()),
            classes: Arc::new(ClassRegistry::new(layout)),
            references: Arc::new(ReferenceManager::new()),
            allocator: Mutex::new(Allocator {
                heap: HEAP_START.get(),
                metadata: METADATA_START.get(),
            }),
            class_objects: RwLock::default(),
        };
        target.bootstrap();
        target
    }

    fn bootstrap(&self) {
        let define = |builder: ClassDescriptorBuilder| {
            self.classes
                .define(builder)
                .expect("bootstrap classes are distinct")
        };
        let object = define(ClassDescriptor::builder(classes::OBJECT));
        let hub = define(
            ClassDescriptor::builder(classes::HUB)
                .extends(&object)
                .hybrid()
                .reference_field(fields::HUB_CLASS_ACTOR, classes::CLASS_ACTOR)
                .field(fields::V_TABLE_START, Kind::Int)
                .field(fields::V_TABLE_LENGTH, Kind::Int)
                .field(fields::I_TABLE_START, Kind::Int)
                .field(fields::I_TABLE_LENGTH, Kind::Int)
                .field(fields::M_TABLE_START, Kind::Int)
                .field(fields::M_TABLE_LENGTH, Kind::Int)
                .field(fields::REFERENCE_MAP_START, Kind::Int)
                .field(fields::REFERENCE_MAP_LENGTH, Kind::Int)
                .table(tables::V_TABLE, Kind::Word)
                .table(tables::I_TABLE, Kind::Word)
                .table(tables::M_TABLE, Kind::Int)
                .table(tables::REFERENCE_MAP, Kind::Int),
        );
        define(ClassDescriptor::builder(classes::DYNAMIC_HUB).extends(&hub));
        define(ClassDescriptor::builder(classes::STATIC_HUB).extends(&hub));
        define(
            ClassDescriptor::builder(classes::CLASS_ACTOR)
                .extends(&object)
                .field(fields::CLASS_ACTOR_ID, Kind::Int)
                .reference_field(fields::CLASS_ACTOR_NAME, classes::STRING),
        );
        define(
            ClassDescriptor::builder(classes::STRING)
                .extends(&object)
                .reference_field(fields::STRING_VALUE, "char[]"),
        );
        for kind in [
            Kind::Boolean,
            Kind::Byte,
            Kind::Char,
            Kind::Short,
            Kind::Int,
            Kind::Float,
            Kind::Long,
            Kind::Double,
            Kind::Word,
        ] {
            define(
                ClassDescriptor::builder(format!("{}[]", kind.name()))
                    .extends(&object)
                    .array(kind),
            );
        }
        define(
            ClassDescriptor::builder(format!("{}[]", classes::OBJECT))
                .extends(&object)
                .object_array(classes::OBJECT),
        );
        define(
            ClassDescriptor::builder(classes::ENUM)
                .extends(&object)
                .reference_field(fields::ENUM_NAME, classes::STRING)
                .field(fields::ENUM_ORDINAL, Kind::Int),
        );
        let region = define(
            ClassDescriptor::builder(classes::MEMORY_REGION)
                .extends(&object)
                .word_field(fields::REGION_START, WordType::Address)
                .word_field(fields::REGION_SIZE, WordType::Size)
                .reference_field(fields::REGION_NAME, classes::STRING),
        );
        define(
            ClassDescriptor::builder(classes::TARGET_METHOD)
                .extends(&region)
                .reference_field(fields::TARGET_METHOD_ACTOR, classes::METHOD_ACTOR)
                .reference_field(fields::TARGET_METHOD_CODE, "byte[]")
                .reference_field(fields::TARGET_METHOD_SAFEPOINTS, "int[]")
                .reference_field(fields::TARGET_METHOD_SAFEPOINT_BCIS, "int[]")
                .reference_field(fields::TARGET_METHOD_BCI_TO_POS, "int[]"),
        );
        define(
            ClassDescriptor::builder(classes::METHOD_ACTOR)
                .extends(&object)
                .reference_field(fields::METHOD_NAME, classes::STRING)
                .reference_field(fields::METHOD_HOLDER, classes::CLASS_ACTOR)
                .reference_field(fields::METHOD_CODE_ATTRIBUTE, classes::CODE_ATTRIBUTE),
        );
        define(
            ClassDescriptor::builder(classes::CODE_ATTRIBUTE)
                .extends(&object)
                .reference_field(fields::CODE_ATTRIBUTE_CODE, "byte[]")
                .reference_field(fields::CODE_ATTRIBUTE_POOL, classes::CONSTANT_POOL),
        );
        define(
            ClassDescriptor::builder(classes::CONSTANT_POOL)
                .extends(&object)
                .reference_field(fields::POOL_CONSTANTS, format!("{}[]", classes::POOL_CONSTANT)),
        );
        let constant = define(ClassDescriptor::builder(classes::POOL_CONSTANT).extends(&object));
        define(
            ClassDescriptor::builder(format!("{}[]", classes::POOL_CONSTANT))
                .extends(&object)
                .object_array(classes::POOL_CONSTANT),
        );
        define(
            ClassDescriptor::builder(classes::UTF8_CONSTANT)
                .extends(&constant)
                .reference_field(fields::UTF8_STRING, classes::STRING),
        );
        define(
            ClassDescriptor::builder(classes::STRING_CONSTANT)
                .extends(&constant)
                .reference_field(fields::STRING_CONSTANT_VALUE, classes::STRING),
        );
        define(
            ClassDescriptor::builder(classes::METHOD_REF_CONSTANT)
                .extends(&constant)
                .reference_field(fields::METHOD_REF_HOLDER, classes::STRING)
                .reference_field(fields::METHOD_REF_NAME, classes::STRING),
        );

        // hubs and class actors refer to each other, so allocate them all before linking any
        let bootstrap = self.classes.classes();
        for class in &bootstrap {
            self.allocate_class_objects(class, HubTables::default());
        }
        for class in &bootstrap {
            self.link_class_objects(class);
        }
    }

    /// Defines a class and creates its hubs, class actor and static tuple
    pub fn define_class(&self, builder: ClassDescriptorBuilder) -> Arc<ClassDescriptor> {
        self.define_class_with_tables(builder, HubTables::default())
    }

    /// Defines a class whose dynamic hub carries the given tables
    pub fn define_class_with_tables(
        &self,
        builder: ClassDescriptorBuilder,
        tables: HubTables,
    ) -> Arc<ClassDescriptor> {
        let class = self.classes.define(builder).expect("class already defined");
        self.allocate_class_objects(&class, tables);
        self.link_class_objects(&class);
        class
    }

    fn allocate_class_objects(&self, class: &Arc<ClassDescriptor>, tables: HubTables) {
        let has_statics = !class.static_fields().is_empty();
        let objects = ClassObjects {
            class_actor: self.allocate(
                Space::Metadata,
                self.class(classes::CLASS_ACTOR).instance_size() as u64,
            ),
            dynamic_hub: self.allocate(
                Space::Metadata,
                self.hub_size(classes::DYNAMIC_HUB, tables.word_count()),
            ),
            static_hub: has_statics
                .then(|| self.allocate(Space::Metadata, self.hub_size(classes::STATIC_HUB, 0))),
            static_tuple: has_statics
                .then(|| self.allocate(Space::Metadata, class.static_tuple_size() as u64)),
            tables,
        };
        self.class_objects.write().insert(class.id(), objects);
    }

    fn hub_size(&self, hub_class: &str, words: u32) -> u64 {
        self.layout.align(
            self.class(hub_class).instance_size() as u64
                + words as u64 * self.layout.word_size() as u64,
        )
    }

    fn link_class_objects(&self, class: &Arc<ClassDescriptor>) {
        let objects = self.class_objects(class);
        let class_actor_class = self.class(classes::CLASS_ACTOR);
        let dynamic_hub_class = self.class(classes::DYNAMIC_HUB);
        let static_hub_class = self.class(classes::STATIC_HUB);

        self.write_header(
            objects.class_actor,
            self.class_objects(&class_actor_class).dynamic_hub,
            None,
        );
        self.set_field(
            objects.class_actor,
            &class_actor_class,
            fields::CLASS_ACTOR_ID,
            Value::Int(class.id().get() as i32),
        );

        self.write_hub(
            objects.dynamic_hub,
            &dynamic_hub_class,
            objects.class_actor,
            &objects.tables,
        );
        if let (Some(static_hub), Some(static_tuple)) = (objects.static_hub, objects.static_tuple)
        {
            self.write_hub(
                static_hub,
                &static_hub_class,
                objects.class_actor,
                &HubTables::default(),
            );
            self.write_header(static_tuple, static_hub, None);
        }

        let name = self.new_string_in(Space::Metadata, class.name());
        self.set_field(
            objects.class_actor,
            &class_actor_class,
            fields::CLASS_ACTOR_NAME,
            Value::Reference(name),
        );
        trace!("linked {} at {}", class.name(), objects.class_actor);
    }

    fn write_hub(
        &self,
        origin: Address,
        hub_class: &Arc<ClassDescriptor>,
        class_actor: Address,
        tables: &HubTables,
    ) {
        let meta_hub = self.class_objects(hub_class).dynamic_hub;
        self.write_header(origin, meta_hub, Some(tables.word_count()));
        let set = |name: &str, value: usize| {
            self.set_field(origin, hub_class, name, Value::Int(value as i32))
        };
        let v_length = tables.vtable.len();
        let i_length = tables.itable.len();
        let m_start = (v_length + i_length) * 2;
        let r_start = m_start + tables.mtable.len();
        set(fields::V_TABLE_START, 0);
        set(fields::V_TABLE_LENGTH, v_length);
        set(fields::I_TABLE_START, v_length);
        set(fields::I_TABLE_LENGTH, i_length);
        set(fields::M_TABLE_START, m_start);
        set(fields::M_TABLE_LENGTH, tables.mtable.len());
        set(fields::REFERENCE_MAP_START, r_start);
        set(fields::REFERENCE_MAP_LENGTH, tables.reference_map.len());
        self.set_field(
            origin,
            hub_class,
            fields::HUB_CLASS_ACTOR,
            Value::Reference(class_actor),
        );

        let first = origin.plus(hub_class.instance_size() as u64);
        for (index, word) in tables.vtable.iter().chain(&tables.itable).enumerate() {
            self.memory
                .write(first.plus(index as u64 * 8), &word.to_le_bytes());
        }
        for (index, int) in tables.mtable.iter().chain(&tables.reference_map).enumerate() {
            self.memory
                .write(first.plus((m_start + index) as u64 * 4), &int.to_le_bytes());
        }
    }

    fn allocate(&self, space: Space, size: u64) -> Address {
        let size = self.layout.align(size.max(self.layout.word_size() as u64));
        let mut allocator = self.allocator.lock();
        let next = match space {
            Space::Heap => &mut allocator.heap,
            Space::Metadata => &mut allocator.metadata,
        };
        let origin = Address::new(*next);
        *next += size;
        self.memory.map(origin, size as usize);
        self.memory.add_origin(origin);
        origin
    }

    fn write_header(&self, origin: Address, hub: Address, length: Option<u32>) {
        self.memory.write(
            origin.plus(self.layout.hub_offset() as u64),
            &hub.get().to_le_bytes(),
        );
        if let Some(length) = length {
            self.memory.write(
                origin.plus(self.layout.length_offset() as u64),
                &(length as i32).to_le_bytes(),
            );
        }
    }

    // ---- accessors

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn memory(&self) -> Arc<SimulatedMemory> {
        self.memory.clone()
    }

    pub fn classes(&self) -> Arc<ClassRegistry> {
        self.classes.clone()
    }

    /// The reference manager the simulated collector reports its moves to
    pub fn references(&self) -> Arc<ReferenceManager> {
        self.references.clone()
    }

    /// Gets a class by name
    ///
    /// # Panic
    /// Panics if no such class is defined
    pub fn class(&self, name: &str) -> Arc<ClassDescriptor> {
        self.classes
            .class_named(name)
            .unwrap_or_else(|| panic!("no class named {name}"))
    }

    /// The hubs, class actor and static tuple of a class
    pub fn class_objects(&self, class: &ClassDescriptor) -> ClassObjects {
        self.class_objects
            .read()
            .get(&class.id())
            .cloned()
            .unwrap_or_else(|| panic!("{} has no class objects", class.name()))
    }

    pub fn read_count(&self) -> usize {
        self.memory.read_count()
    }

    pub fn advance_epoch(&self) -> Epoch {
        self.memory.advance_epoch()
    }

    // ---- objects

    /// Allocates a zeroed instance of a tuple class
    pub fn new_tuple(&self, class: &ClassDescriptor) -> Address {
        let origin = self.allocate(Space::Heap, class.instance_size() as u64);
        self.write_header(origin, self.class_objects(class).dynamic_hub, None);
        origin
    }

    /// Allocates an instance of a hybrid class with `words` zeroed words in its array part
    pub fn new_hybrid(&self, class: &ClassDescriptor, words: u32) -> Address {
        let origin = self.allocate(
            Space::Heap,
            class.instance_size() as u64 + words as u64 * self.layout.word_size() as u64,
        );
        self.write_header(origin, self.class_objects(class).dynamic_hub, Some(words));
        origin
    }

    /// Allocates an array of the named array class holding `values`
    pub fn new_array(&self, class_name: &str, values: &[Value]) -> Address {
        self.new_array_in(Space::Heap, class_name, values)
    }

    fn new_array_in(&self, space: Space, class_name: &str, values: &[Value]) -> Address {
        let class = self.class(class_name);
        let kind = class
            .component_kind()
            .unwrap_or_else(|| panic!("{class_name} is not an array class"));
        let origin = self.allocate(space, self.layout.array_size(kind, values.len() as u64));
        self.write_header(
            origin,
            self.class_objects(&class).dynamic_hub,
            Some(values.len() as u32),
        );
        for (index, value) in values.iter().enumerate() {
            self.write_value(
                origin.plus(self.layout.array_element_offset(kind, index as u64)),
                *value,
            );
        }
        origin
    }

    pub fn new_int_array(&self, values: &[i32]) -> Address {
        let values: Vec<Value> = values.iter().copied().map(Value::Int).collect();
        self.new_array("int[]", &values)
    }

    pub fn new_byte_array(&self, bytes: &[u8]) -> Address {
        let values: Vec<Value> = bytes.iter().map(|byte| Value::Byte(*byte as i8)).collect();
        self.new_array("byte[]", &values)
    }

    /// Allocates an array of references of the named array class
    pub fn new_reference_array(&self, class_name: &str, elements: &[Address]) -> Address {
        let values: Vec<Value> = elements.iter().copied().map(Value::Reference).collect();
        self.new_array(class_name, &values)
    }

    /// Allocates a string and its character array
    pub fn new_string(&self, text: &str) -> Address {
        self.new_string_in(Space::Heap, text)
    }

    fn new_string_in(&self, space: Space, text: &str) -> Address {
        let chars: Vec<Value> = text.encode_utf16().map(Value::Char).collect();
        let value = self.new_array_in(space, "char[]", &chars);
        let string_class = self.class(classes::STRING);
        let origin = self.allocate(space, string_class.instance_size() as u64);
        self.write_header(origin, self.class_objects(&string_class).dynamic_hub, None);
        self.set_field(
            origin,
            &string_class,
            fields::STRING_VALUE,
            Value::Reference(value),
        );
        origin
    }

    /// Writes an instance field of the object at `origin`
    ///
    /// # Panic
    /// Panics if `class` has no such field
    pub fn set_field(&self, origin: Address, class: &ClassDescriptor, name: &str, value: Value) {
        let field = class
            .find_field(name)
            .unwrap_or_else(|| panic!("{} has no field {name}", class.name()));
        self.write_value(origin.plus(field.offset() as u64), value);
    }

    /// Writes a static field of a class
    pub fn set_static_field(&self, class: &ClassDescriptor, name: &str, value: Value) {
        let field = class
            .find_static_field(name)
            .unwrap_or_else(|| panic!("{} has no static field {name}", class.name()));
        let statics = self
            .class_objects(class)
            .static_tuple
            .expect("class has static fields");
        self.write_value(statics.plus(field.offset() as u64), value);
    }

    /// Overwrites memory
    pub fn write_bytes(&self, address: Address, bytes: &[u8]) {
        self.memory.write(address, bytes);
    }

    pub fn write_value(&self, address: Address, value: Value) {
        match value {
            Value::Boolean(v) => self.memory.write(address, &[v as u8]),
            Value::Byte(v) => self.memory.write(address, &v.to_le_bytes()),
            Value::Char(v) => self.memory.write(address, &v.to_le_bytes()),
            Value::Short(v) => self.memory.write(address, &v.to_le_bytes()),
            Value::Int(v) => self.memory.write(address, &v.to_le_bytes()),
            Value::Float(v) => self.memory.write(address, &v.to_le_bytes()),
            Value::Long(v) => self.memory.write(address, &v.to_le_bytes()),
            Value::Double(v) => self.memory.write(address, &v.to_le_bytes()),
            Value::Word(v) | Value::Reference(v) => {
                self.memory.write(address, &v.get().to_le_bytes())
            }
            Value::Void => {}
        }
    }

    // ---- the collector

    /// Copies the object at `from` to a fresh location, returning its new origin
    pub fn copy_object(&self, from: Address) -> Address {
        let bytes = self
            .memory
            .segment(from)
            .unwrap_or_else(|| panic!("no object at {from}"));
        let to = self.allocate(Space::Heap, bytes.len() as u64);
        self.memory.write(to, &bytes);
        to
    }

    /// Copies an object and leaves a forwarding behind; the old copy stays readable
    pub fn forward(&self, from: Address) -> Address {
        let to = self.copy_object(from);
        self.references.forward(from, to);
        to
    }

    /// Moves an object; the old copy is unmapped
    pub fn relocate(&self, from: Address) -> Address {
        let to = self.copy_object(from);
        self.memory.remove_origin(from);
        self.memory.unmap(from);
        self.references.relocate(from, to);
        to
    }

    /// Collects an object
    pub fn free(&self, origin: Address) {
        self.memory.remove_origin(origin);
        self.memory.unmap(origin);
        self.references.mark_dead(origin);
    }
}

impl Default for SimulatedTarget {
    fn default() -> Self {
        Self::new()
    }
}
