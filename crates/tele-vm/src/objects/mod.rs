//! Surrogates for the classes of the target runtime the debugger understands

use crate::factory::{SurrogateConstructor, SurrogateRegistry};
use crate::surrogate::Surrogate;
use std::sync::Arc;
use tele_types::names::classes;

pub use array::TeleArrayObject;
pub use class_actor::TeleClassActor;
pub use constant_pool::{
    MethodSymbol, TeleConstantPool, TeleMethodRefConstant, TelePoolConstant, TeleStringConstant,
    TeleUtf8Constant,
};
pub use enums::TeleEnum;
pub use hub::{HubFlavor, TeleHub};
pub use memory_region::{RegionBounds, TeleMemoryRegion};
pub use method_actor::{TeleCodeAttribute, TeleMethodActor};
pub use string::TeleString;
pub use target_method::TeleTargetMethod;
pub use tuple::{TeleStaticTuple, TeleTupleObject};

mod array;
mod class_actor;
mod constant_pool;
mod enums;
mod hub;
mod memory_region;
mod method_actor;
mod string;
mod target_method;
mod tuple;

/// Wraps a surrogate type's `Default` as a constructor
pub fn default_constructor<S: Surrogate + Default>() -> SurrogateConstructor {
    Arc::new(|_| Box::new(S::default()))
}

pub(crate) fn register_defaults(registry: &mut SurrogateRegistry) {
    registry.register(classes::OBJECT, default_constructor::<TeleTupleObject>());
    registry.register(classes::STRING, default_constructor::<TeleString>());
    registry.register(classes::ENUM, default_constructor::<TeleEnum>());
    registry.register(classes::CLASS_ACTOR, default_constructor::<TeleClassActor>());
    registry.register(classes::METHOD_ACTOR, default_constructor::<TeleMethodActor>());
    registry.register(
        classes::CODE_ATTRIBUTE,
        default_constructor::<TeleCodeAttribute>(),
    );
    registry.register(
        classes::CONSTANT_POOL,
        default_constructor::<TeleConstantPool>(),
    );
    registry.register(
        classes::POOL_CONSTANT,
        default_constructor::<TelePoolConstant>(),
    );
    registry.register(
        classes::UTF8_CONSTANT,
        default_constructor::<TeleUtf8Constant>(),
    );
    registry.register(
        classes::STRING_CONSTANT,
        default_constructor::<TeleStringConstant>(),
    );
    registry.register(
        classes::METHOD_REF_CONSTANT,
        default_constructor::<TeleMethodRefConstant>(),
    );
    registry.register(
        classes::MEMORY_REGION,
        default_constructor::<TeleMemoryRegion>(),
    );
    registry.register(
        classes::TARGET_METHOD,
        default_constructor::<TeleTargetMethod>(),
    );
}
