//! Names of the target classes and fields that the mirror layer depends on.
//!
//! The debugger and the target share one class universe, so these names resolve to the same
//! classes on both sides.

/// Class names
pub mod classes {
    /// The root of every class hierarchy
    pub const OBJECT: &str = "java.lang.Object";
    /// Strings
    pub const STRING: &str = "java.lang.String";
    /// The base class of all enum types
    pub const ENUM: &str = "java.lang.Enum";
    /// The per-class metadata object referenced from every object header
    pub const HUB: &str = "vm.Hub";
    /// Hubs describing instances
    pub const DYNAMIC_HUB: &str = "vm.DynamicHub";
    /// Hubs describing static tuples
    pub const STATIC_HUB: &str = "vm.StaticHub";
    /// The target's descriptor of a class
    pub const CLASS_ACTOR: &str = "vm.ClassActor";
    /// The target's descriptor of a method
    pub const METHOD_ACTOR: &str = "vm.MethodActor";
    /// The bytecode of a method together with its constant pool
    pub const CODE_ATTRIBUTE: &str = "vm.CodeAttribute";
    /// A class's constant pool
    pub const CONSTANT_POOL: &str = "vm.ConstantPool";
    /// The base class of all constant pool entries
    pub const POOL_CONSTANT: &str = "vm.PoolConstant";
    /// A constant pool entry holding a UTF-8 symbol
    pub const UTF8_CONSTANT: &str = "vm.Utf8Constant";
    /// A constant pool entry holding a string literal
    pub const STRING_CONSTANT: &str = "vm.StringConstant";
    /// A constant pool entry naming a method
    pub const METHOD_REF_CONSTANT: &str = "vm.MethodRefConstant";
    /// A contiguous region of target memory
    pub const MEMORY_REGION: &str = "vm.MemoryRegion";
    /// The compiled machine code of a method
    pub const TARGET_METHOD: &str = "vm.TargetMethod";
}

/// Field names, grouped by the class declaring them
#[allow(missing_docs)]
pub mod fields {
    /// hub → the class descriptor it describes
    pub const HUB_CLASS_ACTOR: &str = "classActor";
    /// hub → first virtual table slot
    pub const V_TABLE_START: &str = "vTableStartIndex";
    /// hub → number of virtual table slots
    pub const V_TABLE_LENGTH: &str = "vTableLength";
    /// hub → first interface table slot
    pub const I_TABLE_START: &str = "iTableStartIndex";
    /// hub → number of interface table slots
    pub const I_TABLE_LENGTH: &str = "iTableLength";
    /// hub → first interface method table slot
    pub const M_TABLE_START: &str = "mTableStartIndex";
    /// hub → number of interface method table slots
    pub const M_TABLE_LENGTH: &str = "mTableLength";
    /// hub → first reference map slot
    pub const REFERENCE_MAP_START: &str = "referenceMapStartIndex";
    /// hub → number of reference map slots
    pub const REFERENCE_MAP_LENGTH: &str = "referenceMapLength";

    pub const CLASS_ACTOR_ID: &str = "id";
    pub const CLASS_ACTOR_NAME: &str = "name";

    pub const STRING_VALUE: &str = "value";

    pub const ENUM_NAME: &str = "name";
    pub const ENUM_ORDINAL: &str = "ordinal";

    pub const REGION_START: &str = "start";
    pub const REGION_SIZE: &str = "size";
    pub const REGION_NAME: &str = "regionName";

    pub const TARGET_METHOD_ACTOR: &str = "classMethodActor";
    pub const TARGET_METHOD_CODE: &str = "code";
    pub const TARGET_METHOD_SAFEPOINTS: &str = "safepoints";
    pub const TARGET_METHOD_SAFEPOINT_BCIS: &str = "safepointBcis";
    pub const TARGET_METHOD_BCI_TO_POS: &str = "bciToPosMap";

    pub const METHOD_NAME: &str = "name";
    pub const METHOD_HOLDER: &str = "holder";
    pub const METHOD_CODE_ATTRIBUTE: &str = "codeAttribute";

    pub const CODE_ATTRIBUTE_CODE: &str = "code";
    pub const CODE_ATTRIBUTE_POOL: &str = "constantPool";

    pub const POOL_CONSTANTS: &str = "constants";
    pub const UTF8_STRING: &str = "string";
    pub const STRING_CONSTANT_VALUE: &str = "value";
    pub const METHOD_REF_HOLDER: &str = "holder";
    pub const METHOD_REF_NAME: &str = "name";
}

/// Names of the tables in the array part of a hub
pub mod tables {
    /// virtual method entry points
    pub const V_TABLE: &str = "vTable";
    /// interface method entry points
    pub const I_TABLE: &str = "iTable";
    /// interface method indexes into the itable
    pub const M_TABLE: &str = "mTable";
    /// offsets of the reference fields of an instance
    pub const REFERENCE_MAP: &str = "referenceMap";
}
