use tele_test_fixtures::{HubTables, SimulatedTarget};
use tele_vm::objects::{
    default_constructor, HubFlavor, TeleArrayObject, TeleClassActor, TeleHub, TeleStaticTuple,
    TeleTupleObject,
};
use tele_vm::tele_access::classes::ClassDescriptor;
use tele_vm::tele_types::names::classes;
use tele_vm::tele_types::{Address, Kind, ObjectKind, Value};
use tele_vm::{HybridTable, LocalValue, ObjectShape, Surrogate, TeleError};
use test_log::test;

mod common;

#[derive(Debug, Default)]
struct TeleBar;

impl Surrogate for TeleBar {
    fn type_name(&self) -> &'static str {
        "TeleBar"
    }
}

#[test]
fn test_tuples_and_arrays() -> eyre::Result<()> {
    let target = SimulatedTarget::new();
    let point = common::define_point(&target);
    let tuple = common::new_point(&target, &point, 3, 4);
    let array = target.new_int_array(&[1, 2, 3]);
    let vm = common::attach(&target);

    let tuple = common::mirror(&vm, tuple)?;
    assert!(tuple.is::<TeleTupleObject>());
    assert_eq!(tuple.kind(), ObjectKind::Tuple);
    assert_eq!(tuple.class().name(), common::POINT);
    assert_eq!(tuple.read_int_field("y")?, 4);
    assert!(tuple.read_reference_field("next")?.is_none());

    let array = common::mirror(&vm, array)?;
    assert!(array.is::<TeleArrayObject>());
    assert_eq!(
        *array.shape(),
        ObjectShape::Array {
            component: Kind::Int,
            length: 3
        }
    );
    assert_eq!(array.read_int_elements()?, vec![1, 2, 3]);
    assert_eq!(array.read_element_value(2)?, Value::Int(3));
    assert!(matches!(
        array.read_element_value(3),
        Err(TeleError::IndexOutOfBounds {
            index: 3,
            length: 3
        })
    ));
    Ok(())
}

#[test]
fn test_operations_of_the_wrong_shape_are_rejected() -> eyre::Result<()> {
    let target = SimulatedTarget::new();
    let point = common::define_point(&target);
    let tuple = common::new_point(&target, &point, 3, 4);
    let array = target.new_int_array(&[1]);
    let vm = common::attach(&target);

    let tuple = common::mirror(&vm, tuple)?;
    let array = common::mirror(&vm, array)?;
    assert!(matches!(
        tuple.length(),
        Err(TeleError::UnsupportedShape {
            kind: ObjectKind::Tuple,
            ..
        })
    ));
    assert!(matches!(
        tuple.table(HybridTable::VTable),
        Err(TeleError::UnsupportedShape { .. })
    ));
    assert!(matches!(
        array.read_field("x"),
        Err(TeleError::UnsupportedShape {
            kind: ObjectKind::Array,
            ..
        })
    ));
    assert!(matches!(
        tuple.read_field("z"),
        Err(TeleError::NoSuchField { .. })
    ));
    Ok(())
}

#[test]
fn test_hubs_and_their_tables() -> eyre::Result<()> {
    let target = SimulatedTarget::new();
    let shape = target.define_class_with_tables(
        common::class(&target, "test.Shape").field("sides", Kind::Int),
        HubTables {
            vtable: vec![0x100, 0x200, 0x300],
            itable: vec![0x400],
            mtable: vec![5, 6, 7],
            reference_map: vec![8],
        },
    );
    let origin = target.new_tuple(&shape);
    let vm = common::attach(&target);

    let object = common::mirror(&vm, origin)?;
    let hub = object.hub()?.expect("objects have hubs");
    let hub_view = hub.downcast::<TeleHub>().expect("a hub");
    assert_eq!(hub_view.surrogate().flavor(), HubFlavor::Dynamic);
    assert_eq!(hub.type_name(), "TeleDynamicHub");
    assert_eq!(hub.kind(), ObjectKind::Hybrid);
    assert_eq!(hub_view.described_class()?.name(), "test.Shape");
    // three vtable words, one itable word and four ints
    assert_eq!(hub.length()?, 6);

    let vtable = hub_view.table_region(HybridTable::VTable)?;
    assert_eq!(vtable.length, 3);
    assert_eq!(vtable.element_kind, Kind::Word);
    // the int tables follow the three vtable words and one itable word, two ints per word
    let mtable = hub_view.table_region(HybridTable::MTable)?;
    assert_eq!(mtable.element_kind, Kind::Int);
    assert_eq!(mtable.width(), 4);
    assert_eq!(mtable.start(), vtable.first_element.plus(4 * 8));
    assert_eq!(
        hub.read_table_element(HybridTable::VTable, 1)?,
        Value::Word(Address::new(0x200))
    );
    assert_eq!(
        hub.read_table_element(HybridTable::ITable, 0)?,
        Value::Word(Address::new(0x400))
    );
    assert_eq!(hub.read_table_element(HybridTable::MTable, 2)?, Value::Int(7));
    assert_eq!(
        hub.read_table_element(HybridTable::ReferenceMap, 0)?,
        Value::Int(8)
    );
    assert!(matches!(
        hub.read_table_element(HybridTable::ReferenceMap, 1),
        Err(TeleError::IndexOutOfBounds { .. })
    ));
    assert_eq!(hub.read_hybrid_words()?.len(), 6);

    let class_actor = hub_view.class_actor()?.expect("hubs name their class");
    assert!(class_actor.is::<TeleClassActor>());
    assert_eq!(
        class_actor
            .downcast::<TeleClassActor>()
            .expect("a class actor")
            .name()?,
        "test.Shape"
    );
    assert!(matches!(
        hub.local_equivalent()?,
        Some(LocalValue::Class(class)) if class.name() == "test.Shape"
    ));
    Ok(())
}

#[test]
fn test_static_tuples() -> eyre::Result<()> {
    let target = SimulatedTarget::new();
    let counter = target.define_class(
        common::class(&target, "test.Counter")
            .field("value", Kind::Int)
            .static_field("instances", Kind::Int),
    );
    target.set_static_field(&counter, "instances", Value::Int(42));
    let statics = target
        .class_objects(&counter)
        .static_tuple
        .expect("class has statics");
    let vm = common::attach(&target);

    let object = common::mirror(&vm, statics)?;
    assert!(object.is::<TeleStaticTuple>());
    assert_eq!(*object.shape(), ObjectShape::StaticTuple);
    assert_eq!(object.class().name(), "test.Counter");
    assert_eq!(object.read_int_field("instances")?, 42);
    assert!(matches!(
        object.read_field("value"),
        Err(TeleError::NoSuchField { .. })
    ));

    let hub = object.hub()?.expect("static tuples have hubs");
    assert_eq!(
        hub.downcast::<TeleHub>().expect("a hub").surrogate().flavor(),
        HubFlavor::Static
    );
    Ok(())
}

#[test]
fn test_nearest_registered_ancestor_supplies_the_surrogate() -> eyre::Result<()> {
    let target = SimulatedTarget::new();
    let bar = target.define_class(common::class(&target, "test.Bar"));
    let foo = target.define_class(ClassDescriptor::builder("test.Foo").extends(&bar));
    let origin = target.new_tuple(&foo);
    let vm = common::builder(&target)
        .surrogate("test.Bar", default_constructor::<TeleBar>())
        .build();

    let object = common::mirror(&vm, origin)?;
    assert!(object.is::<TeleBar>());
    assert_eq!(object.class().name(), "test.Foo");
    assert_eq!(object.type_name(), "TeleBar");
    Ok(())
}

#[test]
fn test_hybrid_that_is_no_hub_is_fatal() -> eyre::Result<()> {
    let target = SimulatedTarget::new();
    let odd = target.define_class(common::class(&target, "test.Odd").hybrid());
    let origin = target.new_hybrid(&odd, 2);
    let vm = common::attach(&target);

    assert!(matches!(
        vm.make_object_at(origin),
        Err(TeleError::FatalInconsistency(_))
    ));
    Ok(())
}

#[test]
fn test_object_whose_hub_is_no_hub_gets_no_mirror() -> eyre::Result<()> {
    let target = SimulatedTarget::new();
    // shaped like a hub as far as the class actor slot, but not one
    let fake_hub_class = target.define_class(
        common::class(&target, "test.FakeHub")
            .reference_field("padding", classes::OBJECT)
            .reference_field("classActor", classes::CLASS_ACTOR),
    );
    let point = common::define_point(&target);
    let fake_hub = target.new_tuple(&fake_hub_class);
    target.set_field(
        fake_hub,
        &fake_hub_class,
        "classActor",
        Value::Reference(target.class_objects(&point).class_actor),
    );
    let origin = common::new_point(&target, &point, 1, 1);
    target.write_value(origin, Value::Reference(fake_hub));
    let vm = common::attach(&target);

    assert!(vm.make_object_at(origin)?.is_none());
    Ok(())
}

#[test]
fn test_unreadable_header_gets_no_mirror() -> eyre::Result<()> {
    let target = SimulatedTarget::new();
    let point = common::define_point(&target);
    let origin = common::new_point(&target, &point, 1, 1);
    // the hub points at memory that isn't an object
    target.write_value(origin, Value::Reference(Address::new(0xbad0)));
    let vm = common::attach(&target);

    assert!(vm.make_object_at(origin)?.is_none());
    Ok(())
}
