//! Class-map driven serialization of typed objects to BSON documents.
//!
//! A [`ClassMap`] describes how one type is persisted: member aliases,
//! identity, discriminator and base type. [`BsonClassMapDescriptor`] lowers
//! an [`Instance`] to a [`Document`](mongo_bson::Document) through those
//! maps and [`BsonClassMapBuilder`] materializes documents back, following
//! discriminators to the concrete subclass.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use mongo_mapping::{
//!     impl_entity, ClassMapBuilder, InMemoryMappingStore, Instance, MemberType,
//!     PersistentMemberMap, SerializationFactory,
//! };
//!
//! #[derive(Debug, Clone, Default)]
//! struct Person {
//!     name: String,
//! }
//! impl_entity!(Person, "Person");
//!
//! let store = InMemoryMappingStore::builder()
//!     .add(
//!         ClassMapBuilder::concrete::<Person>("Person")
//!             .member(
//!                 PersistentMemberMap::new(
//!                     "Name",
//!                     MemberType::Native,
//!                     |p: &Person| p.name.clone().into(),
//!                     |p: &mut Person, v| {
//!                         p.name = v.extract()?;
//!                         Ok(())
//!                     },
//!                 )
//!                 .with_alias("n"),
//!             )
//!             .build(),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let factory = SerializationFactory::new(Arc::new(store));
//! let person_type = MemberType::class("Person");
//! let bytes = factory
//!     .serialize(&Instance::object(Person { name: "Jack".into() }), &person_type)
//!     .unwrap();
//! let back: Person = factory.deserialize(&bytes, &person_type).unwrap().into_entity().unwrap();
//! assert_eq!(back.name, "Jack");
//! ```

pub mod builder;
pub mod class_map;
pub mod descriptor;
pub mod error;
pub mod factory;
pub mod instance;
pub mod store;

pub use builder::BsonClassMapBuilder;
pub use class_map::{
    ClassMap, ClassMapBuilder, Discriminator, IdGenerator, MemberType, PersistentMemberMap,
    DEFAULT_DISCRIMINATOR_ALIAS, ID_ALIAS,
};
pub use descriptor::{BsonClassMapDescriptor, PropertyDescriptor};
pub use error::{MappingError, Result};
pub use factory::SerializationFactory;
pub use instance::{Entity, ExampleObject, FromInstance, Instance};
pub use store::{InMemoryMappingStore, MappingStore, MappingStoreBuilder};
