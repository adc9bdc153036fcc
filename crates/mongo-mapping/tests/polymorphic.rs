use std::sync::Arc;

use mongo_bson::{doc, encode, Bson};
use mongo_mapping::{
    impl_entity, ClassMapBuilder, InMemoryMappingStore, Instance, MappingError, MemberType,
    PersistentMemberMap, SerializationFactory,
};

// BaseClass { A } <- ClassA { B } <- ClassD { E }
// BaseClass { A } <- ClassB { C }

#[derive(Debug, Clone, Default, PartialEq)]
struct ClassA {
    a: String,
    b: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct ClassB {
    a: String,
    c: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct ClassD {
    a: String,
    b: String,
    e: String,
}

impl_entity!(ClassA, "ClassA");
impl_entity!(ClassB, "ClassB");
impl_entity!(ClassD, "ClassD");

macro_rules! string_member {
    ($ty:ty, $name:literal, $field:ident) => {
        PersistentMemberMap::new(
            $name,
            MemberType::Native,
            |e: &$ty| e.$field.clone().into(),
            |e: &mut $ty, v| {
                e.$field = v.extract()?;
                Ok(())
            },
        )
    };
}

fn factory() -> SerializationFactory {
    let store = InMemoryMappingStore::builder()
        .add(ClassMapBuilder::abstract_type("BaseClass").collection("bases").build())
        .add(
            ClassMapBuilder::concrete::<ClassA>("ClassA")
                .extends("BaseClass")
                .member(string_member!(ClassA, "A", a))
                .member(string_member!(ClassA, "B", b))
                .build(),
        )
        .add(
            ClassMapBuilder::concrete::<ClassB>("ClassB")
                .extends("BaseClass")
                .member(string_member!(ClassB, "A", a))
                .member(string_member!(ClassB, "C", c))
                .build(),
        )
        .add(
            ClassMapBuilder::concrete::<ClassD>("ClassD")
                .extends("ClassA")
                .member(string_member!(ClassD, "A", a))
                .member(string_member!(ClassD, "B", b))
                .member(string_member!(ClassD, "E", e))
                .build(),
        )
        .build()
        .unwrap();
    SerializationFactory::new(Arc::new(store))
}

fn base() -> MemberType {
    MemberType::class("BaseClass")
}

#[test]
fn deserializes_subclass_requested_as_base() {
    let bytes = encode(&doc! { "_t" => "ClassB", "A" => "a", "C" => "c" }).unwrap();
    let instance = factory().deserialize(&bytes, &base()).unwrap();
    let object: ClassB = instance.into_entity().unwrap();
    assert_eq!(object, ClassB { a: "a".into(), c: "c".into() });
}

#[test]
fn deserializes_subclass_requested_directly() {
    let bytes = encode(&doc! { "_t" => "ClassB", "A" => "a", "C" => "c" }).unwrap();
    let instance = factory().deserialize(&bytes, &MemberType::class("ClassB")).unwrap();
    assert_eq!(instance.as_entity::<ClassB>().map(|b| b.c.as_str()), Some("c"));
}

#[test]
fn deserializes_deep_subclass_from_tag_chain() {
    let bytes = encode(&doc! {
        "_t" => vec!["ClassA", "ClassD"],
        "A" => "a",
        "B" => "b",
        "E" => "e",
    })
    .unwrap();
    let object: ClassD = factory().deserialize(&bytes, &base()).unwrap().into_entity().unwrap();
    assert_eq!(object, ClassD { a: "a".into(), b: "b".into(), e: "e".into() });

    let through_middle = factory().deserialize(&bytes, &MemberType::class("ClassA")).unwrap();
    assert!(through_middle.as_entity::<ClassD>().is_some());
}

#[test]
fn writes_discriminator_first_then_inherited_members() {
    let factory = factory();
    let object = Instance::object(ClassB { a: "a".into(), c: "c".into() });
    let document = factory.to_document(&object, &base()).unwrap();
    assert_eq!(document, doc! { "_t" => "ClassB", "A" => "a", "C" => "c" });
}

#[test]
fn deep_subclass_round_trips_with_tag_chain() {
    let factory = factory();
    let original = ClassD { a: "1".into(), b: "2".into(), e: "3".into() };
    let bytes = factory.serialize(&Instance::object(original.clone()), &base()).unwrap();

    let document = mongo_bson::decode(&bytes).unwrap();
    assert_eq!(document.get("_t"), Some(&Bson::from(vec!["ClassA", "ClassD"])));
    let keys: Vec<&String> = document.keys().collect();
    assert_eq!(keys, ["_t", "A", "B", "E"]);

    let back: ClassD = factory.deserialize(&bytes, &base()).unwrap().into_entity().unwrap();
    assert_eq!(back, original);
}

#[test]
fn subclasses_share_the_root_collection() {
    let factory = factory();
    assert_eq!(factory.collection_name(&MemberType::class("ClassD")).unwrap(), "bases");
    assert!(factory.collection_name(&MemberType::Document).is_err());
}

#[test]
fn unknown_discriminator_is_an_error() {
    let bytes = encode(&doc! { "_t" => "ClassZ", "A" => "a" }).unwrap();
    let err = factory().deserialize(&bytes, &base()).unwrap_err();
    assert!(matches!(err, MappingError::UnknownDiscriminator { ref discriminator, .. } if discriminator == "ClassZ"));
}

#[test]
fn discriminator_outside_requested_hierarchy_is_an_error() {
    let bytes = encode(&doc! { "_t" => "ClassB", "A" => "a" }).unwrap();
    let err = factory().deserialize(&bytes, &MemberType::class("ClassA")).unwrap_err();
    assert!(matches!(err, MappingError::UnknownDiscriminator { .. }));
}

#[test]
fn abstract_base_without_discriminator_cannot_be_built() {
    let bytes = encode(&doc! { "A" => "a" }).unwrap();
    let err = factory().deserialize(&bytes, &base()).unwrap_err();
    assert!(matches!(err, MappingError::AbstractType(ref t) if t == "BaseClass"));
}
