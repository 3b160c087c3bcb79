use crate::object::{ObjectShape, TeleObject};
use crate::surrogate::Surrogate;

/// An array of any component kind
#[derive(Debug, Default)]
pub struct TeleArrayObject;

impl Surrogate for TeleArrayObject {
    fn type_name(&self) -> &'static str {
        "TeleArrayObject"
    }

    fn textual_visualization(&self, object: &TeleObject) -> Option<String> {
        match object.shape() {
            ObjectShape::Array { component, length } => {
                Some(format!("{}[{length}]", component.name()))
            }
            _ => None,
        }
    }
}
