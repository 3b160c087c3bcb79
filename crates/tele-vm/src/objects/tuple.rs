use crate::object::TeleObject;
use crate::surrogate::Surrogate;

/// A tuple with no more specific surrogate
#[derive(Debug, Default)]
pub struct TeleTupleObject;

impl Surrogate for TeleTupleObject {
    fn type_name(&self) -> &'static str {
        "TeleTupleObject"
    }
}

/// The tuple holding the static fields of a class
#[derive(Debug, Default)]
pub struct TeleStaticTuple;

impl Surrogate for TeleStaticTuple {
    fn type_name(&self) -> &'static str {
        "TeleStaticTuple"
    }

    fn role(&self) -> Option<&'static str> {
        Some("static fields")
    }

    fn textual_visualization(&self, object: &TeleObject) -> Option<String> {
        Some(format!("statics of {}", object.class_name()))
    }
}
