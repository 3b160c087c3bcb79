use crate::target::SimulatedTarget;
use tele_access::classes::ClassMetadata;
use tele_types::names::{classes, fields};
use tele_types::{Address, Kind, Safepoint, Value};

/// What to put in the target for one compiled method
#[derive(Debug, Clone, Default)]
pub struct CompiledMethodSpec {
    pub holder: String,
    pub name: String,
    /// machine code, in the instruction set of [ToyDisassembler](crate::ToyDisassembler)
    pub code: Vec<u8>,
    pub safepoints: Vec<Safepoint>,
    pub safepoint_bcis: Vec<i32>,
    pub bci_to_pos: Option<Vec<i32>>,
    pub bytecodes: Vec<u8>,
    /// constant pool entries; `Some((holder, name))` is a method reference, `None` an empty
    /// slot
    pub pool: Vec<Option<(String, String)>>,
}

/// The objects created for a compiled method
#[derive(Debug, Clone, Copy)]
pub struct CompiledMethod {
    pub target_method: Address,
    pub method_actor: Address,
    pub code_array: Address,
    pub code_start: Address,
}

impl SimulatedTarget {
    /// Creates a compiled method along with its method actor, code attribute and constant pool
    pub fn compiled_method(&self, spec: &CompiledMethodSpec) -> CompiledMethod {
        let holder = self
            .class_actor_named(&spec.holder)
            .unwrap_or_else(|| self.class_objects(&self.class(classes::OBJECT)).class_actor);

        let constants: Vec<Address> = spec
            .pool
            .iter()
            .map(|entry| match entry {
                Some((holder, name)) => {
                    let class = self.class(classes::METHOD_REF_CONSTANT);
                    let constant = self.new_tuple(&class);
                    let holder = self.new_string(holder);
                    let name = self.new_string(name);
                    self.set_field(
                        constant,
                        &class,
                        fields::METHOD_REF_HOLDER,
                        Value::Reference(holder),
                    );
                    self.set_field(constant, &class, fields::METHOD_REF_NAME, Value::Reference(name));
                    constant
                }
                None => Address::ZERO,
            })
            .collect();
        let constants = self.new_reference_array(&format!("{}[]", classes::POOL_CONSTANT), &constants);
        let pool_class = self.class(classes::CONSTANT_POOL);
        let pool = self.new_tuple(&pool_class);
        self.set_field(pool, &pool_class, fields::POOL_CONSTANTS, Value::Reference(constants));

        let attribute_class = self.class(classes::CODE_ATTRIBUTE);
        let attribute = self.new_tuple(&attribute_class);
        let bytecodes = self.new_byte_array(&spec.bytecodes);
        self.set_field(
            attribute,
            &attribute_class,
            fields::CODE_ATTRIBUTE_CODE,
            Value::Reference(bytecodes),
        );
        self.set_field(
            attribute,
            &attribute_class,
            fields::CODE_ATTRIBUTE_POOL,
            Value::Reference(pool),
        );

        let actor_class = self.class(classes::METHOD_ACTOR);
        let method_actor = self.new_tuple(&actor_class);
        let name = self.new_string(&spec.name);
        self.set_field(method_actor, &actor_class, fields::METHOD_NAME, Value::Reference(name));
        self.set_field(
            method_actor,
            &actor_class,
            fields::METHOD_HOLDER,
            Value::Reference(holder),
        );
        self.set_field(
            method_actor,
            &actor_class,
            fields::METHOD_CODE_ATTRIBUTE,
            Value::Reference(attribute),
        );

        let method_class = self.class(classes::TARGET_METHOD);
        let target_method = self.new_tuple(&method_class);
        let set = |name: &str, value: Value| self.set_field(target_method, &method_class, name, value);
        set(fields::TARGET_METHOD_ACTOR, Value::Reference(method_actor));
        let safepoints: Vec<i32> = spec.safepoints.iter().map(|s| s.raw() as i32).collect();
        set(
            fields::TARGET_METHOD_SAFEPOINTS,
            Value::Reference(self.new_int_array(&safepoints)),
        );
        set(
            fields::TARGET_METHOD_SAFEPOINT_BCIS,
            Value::Reference(self.new_int_array(&spec.safepoint_bcis)),
        );
        if let Some(bci_to_pos) = &spec.bci_to_pos {
            set(
                fields::TARGET_METHOD_BCI_TO_POS,
                Value::Reference(self.new_int_array(bci_to_pos)),
            );
        }
        let region_name = self.new_string(&format!("{}.{}", spec.holder, spec.name));
        set(fields::REGION_NAME, Value::Reference(region_name));
        let code_array = self.install_code(target_method, &spec.code);

        CompiledMethod {
            target_method,
            method_actor,
            code_array,
            code_start: self.code_start(code_array),
        }
    }

    /// Overwrites code in place, starting `position` bytes into the code
    pub fn patch_code(&self, method: &CompiledMethod, position: u32, bytes: &[u8]) {
        self.write_bytes(method.code_start.plus(position as u64), bytes);
    }

    /// Gives a compiled method a fresh copy of its code somewhere else, returning the method
    /// with its new code location
    pub fn move_code(&self, method: &CompiledMethod) -> CompiledMethod {
        let code_array = self.relocate(method.code_array);
        self.point_at_code(method.target_method, code_array);
        CompiledMethod {
            code_array,
            code_start: self.code_start(code_array),
            ..*method
        }
    }

    /// Replaces the code of a compiled method with new code at a new location
    pub fn replace_code(&self, method: &CompiledMethod, code: &[u8]) -> CompiledMethod {
        let code_array = self.install_code(method.target_method, code);
        CompiledMethod {
            code_array,
            code_start: self.code_start(code_array),
            ..*method
        }
    }

    /// Throws the code of a compiled method away
    pub fn evict_code(&self, method: &CompiledMethod) {
        let class = self.class(classes::TARGET_METHOD);
        self.set_field(
            method.target_method,
            &class,
            fields::TARGET_METHOD_CODE,
            Value::Reference(Address::ZERO),
        );
        self.free(method.code_array);
    }

    fn install_code(&self, target_method: Address, code: &[u8]) -> Address {
        let code_array = self.new_byte_array(code);
        self.point_at_code(target_method, code_array);
        code_array
    }

    /// The region of a compiled method covers its code array
    fn point_at_code(&self, target_method: Address, code_array: Address) {
        let class = self.class(classes::TARGET_METHOD);
        let size = self
            .memory()
            .segment(code_array)
            .map(|segment| segment.len() as u64)
            .unwrap_or(0);
        let set = |name: &str, value: Value| self.set_field(target_method, &class, name, value);
        set(fields::TARGET_METHOD_CODE, Value::Reference(code_array));
        set(fields::REGION_START, Value::Word(code_array));
        set(fields::REGION_SIZE, Value::Word(Address::new(size)));
    }

    fn code_start(&self, code_array: Address) -> Address {
        code_array.plus(self.layout().array_element_offset(Kind::Byte, 0))
    }

    fn class_actor_named(&self, name: &str) -> Option<Address> {
        let class = self.classes().class_named(name)?;
        Some(self.class_objects(&class).class_actor)
    }
}
