#![allow(dead_code)]

use eyre::eyre;
use std::sync::Arc;
use tele_test_fixtures::{SimulatedTarget, ToyDisassembler};
use tele_vm::tele_access::classes::{ClassDescriptor, ClassDescriptorBuilder};
use tele_vm::tele_types::names::classes;
use tele_vm::tele_types::{Address, Kind, Value};
use tele_vm::{TeleObject, TeleVm, TeleVmBuilder};

pub const POINT: &str = "test.Point";

/// A builder for a VM attached to `target`
pub fn builder(target: &SimulatedTarget) -> TeleVmBuilder {
    TeleVm::builder(target.memory(), target.classes())
        .references(target.references())
        .layout(target.layout())
        .disassembler(Arc::new(ToyDisassembler))
}

pub fn attach(target: &SimulatedTarget) -> Arc<TeleVm> {
    builder(target).build()
}

/// Starts a class extending `java.lang.Object`
pub fn class(target: &SimulatedTarget, name: &str) -> ClassDescriptorBuilder {
    ClassDescriptor::builder(name).extends(&target.class(classes::OBJECT))
}

/// `test.Point { int x; int y; test.Point next; }`
pub fn define_point(target: &SimulatedTarget) -> Arc<ClassDescriptor> {
    target.define_class(
        class(target, POINT)
            .field("x", Kind::Int)
            .field("y", Kind::Int)
            .reference_field("next", POINT),
    )
}

pub fn new_point(target: &SimulatedTarget, class: &ClassDescriptor, x: i32, y: i32) -> Address {
    let point = target.new_tuple(class);
    target.set_field(point, class, "x", Value::Int(x));
    target.set_field(point, class, "y", Value::Int(y));
    point
}

/// Mirrors the object at `origin`, failing if there isn't one
pub fn mirror(vm: &TeleVm, origin: Address) -> eyre::Result<Arc<TeleObject>> {
    vm.make_object_at(origin)?
        .ok_or_else(|| eyre!("no object at {origin}"))
}
