use std::sync::Arc;

use mongo_bson::{doc, encode, Bson, Document, ObjectId};
use mongo_mapping::{
    impl_entity, ClassMapBuilder, ExampleObject, InMemoryMappingStore, Instance, MemberType,
    PersistentMemberMap, Result, SerializationFactory,
};

#[derive(Debug, Clone, Default, PartialEq)]
struct Person {
    id: Option<ObjectId>,
    first_name: String,
    age: i32,
    extra: Document,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Team {
    name: String,
    members: Vec<Person>,
}

impl_entity!(Person, "Person");
impl_entity!(Team, "Team");

fn person_map() -> mongo_mapping::ClassMap {
    ClassMapBuilder::concrete::<Person>("Person")
        .collection("people")
        .id(PersistentMemberMap::new(
            "Id",
            MemberType::ObjectId,
            |p: &Person| p.id.into(),
            |p: &mut Person, v| {
                p.id = v.extract()?;
                Ok(())
            },
        ))
        .member(
            PersistentMemberMap::new(
                "FirstName",
                MemberType::Native,
                |p: &Person| p.first_name.clone().into(),
                |p: &mut Person, v| {
                    p.first_name = v.extract()?;
                    Ok(())
                },
            )
            .with_alias("fn"),
        )
        .member(PersistentMemberMap::new(
            "Age",
            MemberType::Native,
            |p: &Person| p.age.into(),
            |p: &mut Person, v| {
                p.age = v.extract()?;
                Ok(())
            },
        ))
        .extended_properties(PersistentMemberMap::new(
            "Extra",
            MemberType::Document,
            |p: &Person| p.extra.clone().into(),
            |p: &mut Person, v| {
                p.extra = v.extract()?;
                Ok(())
            },
        ))
        .build()
}

fn team_members(instance: Instance) -> Result<Vec<Person>> {
    match instance {
        Instance::Array(items) => items.into_iter().map(Instance::into_entity).collect(),
        _ => Ok(Vec::new()),
    }
}

fn factory() -> SerializationFactory {
    let store = InMemoryMappingStore::builder()
        .add(person_map())
        .add(
            ClassMapBuilder::concrete::<Team>("Team")
                .member(PersistentMemberMap::new(
                    "Name",
                    MemberType::Native,
                    |t: &Team| t.name.clone().into(),
                    |t: &mut Team, v| {
                        t.name = v.extract()?;
                        Ok(())
                    },
                ))
                .member(PersistentMemberMap::new(
                    "Members",
                    MemberType::collection_of(MemberType::class("Person")),
                    |t: &Team| Instance::Array(t.members.iter().cloned().map(Instance::object).collect()),
                    |t: &mut Team, v| {
                        t.members = team_members(v)?;
                        Ok(())
                    },
                ))
                .build(),
        )
        .build()
        .unwrap();
    SerializationFactory::new(Arc::new(store))
}

fn person_type() -> MemberType {
    MemberType::class("Person")
}

fn jack() -> Person {
    Person {
        id: None,
        first_name: "Jack".into(),
        age: 30,
        extra: Document::new(),
    }
}

// ---- Aliases and identity

#[test]
fn members_are_written_under_their_aliases() {
    let document = factory().to_document(&Instance::object(jack()), &person_type()).unwrap();
    assert_eq!(document, doc! { "_id" => Bson::Null, "fn" => "Jack", "Age" => 30 });
}

#[test]
fn ensure_id_fills_an_object_id() {
    let factory = factory();
    let mut instance = Instance::object(jack());
    factory.ensure_id(&mut instance).unwrap();
    let id = instance.as_entity::<Person>().and_then(|p| p.id);
    assert!(id.is_some());

    // An assigned id is kept.
    factory.ensure_id(&mut instance).unwrap();
    assert_eq!(instance.as_entity::<Person>().and_then(|p| p.id), id);

    let bytes = factory.serialize(&instance, &person_type()).unwrap();
    let back: Person = factory.deserialize(&bytes, &person_type()).unwrap().into_entity().unwrap();
    assert_eq!(back.id, id);
}

#[test]
fn ensure_id_prepends_to_plain_documents() {
    let mut instance = Instance::from(doc! { "name" => "x" });
    factory().ensure_id(&mut instance).unwrap();
    let Instance::Value(Bson::Document(document)) = instance else {
        panic!("expected a document");
    };
    let keys: Vec<&String> = document.keys().collect();
    assert_eq!(keys, ["_id", "name"]);
    assert!(document.get("_id").and_then(Bson::as_object_id).is_some());
}

#[test]
fn collection_names() {
    let factory = factory();
    assert_eq!(factory.collection_name(&person_type()).unwrap(), "people");
    assert_eq!(factory.collection_name(&MemberType::class("Team")).unwrap(), "Team");
    assert!(factory.collection_name(&MemberType::Document).is_err());
}

// ---- Extended properties

#[test]
fn unmapped_keys_land_in_extended_properties() {
    let id = ObjectId::new();
    let bytes = encode(&doc! {
        "_id" => id,
        "fn" => "Jack",
        "Age" => 30,
        "Nick" => "J",
        "Score" => 7,
    })
    .unwrap();
    let person: Person = factory().deserialize(&bytes, &person_type()).unwrap().into_entity().unwrap();
    assert_eq!(person.id, Some(id));
    assert_eq!(person.first_name, "Jack");
    assert_eq!(person.extra, doc! { "Nick" => "J", "Score" => 7 });
}

#[test]
fn extended_properties_are_written_after_members() {
    let mut person = jack();
    person.extra = doc! { "Nick" => "J" };
    let document = factory().to_document(&Instance::object(person), &person_type()).unwrap();
    let keys: Vec<&String> = document.keys().collect();
    assert_eq!(keys, ["_id", "fn", "Age", "Nick"]);
}

// ---- Collections of classes

#[test]
fn class_collections_round_trip() {
    let factory = factory();
    let team = Team {
        name: "core".into(),
        members: vec![jack(), Person { first_name: "Jill".into(), age: 28, ..Person::default() }],
    };
    let document = factory.to_document(&Instance::object(team.clone()), &MemberType::class("Team")).unwrap();
    let members = document.get_array("Members").unwrap();
    assert_eq!(members.len(), 2);
    assert_eq!(members[1].as_document().and_then(|d| d.get_str("fn")), Some("Jill"));

    let back: Team = factory
        .from_document(document, &MemberType::class("Team"))
        .unwrap()
        .into_entity()
        .unwrap();
    assert_eq!(back, team);
}

// ---- Documents and examples through a class map

#[test]
fn document_keyed_by_member_names_uses_aliases() {
    let instance = Instance::from(doc! { "FirstName" => "Jack", "Unmapped" => true });
    let document = factory().to_document(&instance, &person_type()).unwrap();
    assert_eq!(document, doc! { "fn" => "Jack", "Unmapped" => true });
}

#[test]
fn example_object_uses_aliases() {
    let example = ExampleObject::new().with("FirstName", "Jack").with("Age", 30);
    let document = factory().to_document(&Instance::Example(example), &person_type()).unwrap();
    assert_eq!(document, doc! { "fn" => "Jack", "Age" => 30 });
}

#[test]
fn plain_documents_pass_through() {
    let original = doc! { "FirstName" => "Jack", "nested" => doc! { "x" => 1 } };
    let document = factory()
        .to_document(&Instance::from(original.clone()), &MemberType::Document)
        .unwrap();
    assert_eq!(document, original);
}
