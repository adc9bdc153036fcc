//! Lowering of instances to documents.
//!
//! Every object-like instance is described by a [`PropertyDescriptor`] that
//! knows which wire names to emit and how to fetch each value together with
//! its declared type. The declared type travels down the recursion, so a
//! nested value is always described against the type its parent declares.

use std::sync::Arc;

use mongo_bson::{Bson, Document};

use crate::class_map::{ClassMap, MemberType};
use crate::error::{MappingError, Result};
use crate::instance::{Entity, ExampleObject, Instance};
use crate::store::MappingStore;

/// Resolution strategy for the properties of one object.
pub enum PropertyDescriptor<'i> {
    /// A plain document: keys and values as they are.
    Document(&'i Document),
    /// A document whose keys are member names of a class map.
    DocumentClassMap {
        class_map: Arc<ClassMap>,
        document: &'i Document,
    },
    /// A typed entity.
    ClassMap {
        class_map: Arc<ClassMap>,
        entity: &'i dyn Entity,
    },
    /// An example object, optionally interpreted through a class map.
    Example {
        class_map: Option<Arc<ClassMap>>,
        example: &'i ExampleObject,
    },
}

impl PropertyDescriptor<'_> {
    fn class_map(&self) -> Option<&ClassMap> {
        match self {
            PropertyDescriptor::Document(_) => None,
            PropertyDescriptor::DocumentClassMap { class_map, .. }
            | PropertyDescriptor::ClassMap { class_map, .. } => Some(class_map.as_ref()),
            PropertyDescriptor::Example { class_map, .. } => class_map.as_deref(),
        }
    }

    fn persisted_discriminator(&self) -> Option<(&str, Bson)> {
        let class_map = self.class_map().filter(|m| m.should_persist_discriminator())?;
        let discriminator = class_map.discriminator()?;
        Some((class_map.discriminator_alias(), discriminator.to_bson()))
    }

    /// Wire names in emission order: the discriminator when the type is
    /// polymorphic, then member aliases, then unmapped names as they are.
    pub fn property_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let discriminator = self.persisted_discriminator().map(|(alias, _)| alias.to_owned());
        if let Some(alias) = &discriminator {
            names.push(alias.clone());
        }
        let mut push = |name: String| {
            if discriminator.as_deref() != Some(name.as_str()) {
                names.push(name);
            }
        };

        match self {
            PropertyDescriptor::Document(document) => document.keys().cloned().for_each(&mut push),
            PropertyDescriptor::DocumentClassMap { class_map, document } => {
                for key in document.keys() {
                    push(alias_for(class_map, key));
                }
            }
            PropertyDescriptor::ClassMap { class_map, entity } => {
                for member in class_map.members() {
                    push(member.alias().to_owned());
                }
                if let Some(extended) = class_map.extended_properties() {
                    if let Instance::Value(Bson::Document(extra)) = extended.get(*entity)? {
                        extra.keys().cloned().for_each(&mut push);
                    }
                }
            }
            PropertyDescriptor::Example { class_map, example } => {
                for name in example.names() {
                    match class_map {
                        Some(class_map) => push(alias_for(class_map, name)),
                        None => push(name.to_owned()),
                    }
                }
            }
        }
        Ok(names)
    }

    /// Declared type and value of the property emitted under `name`.
    pub fn begin_property(&self, name: &str) -> Result<(MemberType, Instance)> {
        if let Some((alias, value)) = self.persisted_discriminator() {
            if alias == name {
                return Ok((MemberType::Native, Instance::Value(value)));
            }
        }

        let missing = |type_name: &str| MappingError::MemberNotFound {
            type_name: type_name.to_owned(),
            member: name.to_owned(),
        };

        match self {
            PropertyDescriptor::Document(document) => document
                .get(name)
                .map(|v| (MemberType::Any, Instance::from(v.clone())))
                .ok_or_else(|| missing("document")),
            PropertyDescriptor::DocumentClassMap { class_map, document } => {
                match class_map.member_from_alias(name) {
                    Some(member) => {
                        let value = document.get(member.member_name()).cloned().unwrap_or(Bson::Null);
                        Ok((member.member_type().clone(), Instance::from(value)))
                    }
                    None => document
                        .get(name)
                        .map(|v| (MemberType::Any, Instance::from(v.clone())))
                        .ok_or_else(|| missing(class_map.type_name())),
                }
            }
            PropertyDescriptor::ClassMap { class_map, entity } => {
                if let Some(member) = class_map.member_from_alias(name) {
                    return Ok((member.member_type().clone(), member.get(*entity)?));
                }
                let extended = match class_map.extended_properties() {
                    Some(extended) => extended.get(*entity)?,
                    None => Instance::Null,
                };
                match extended {
                    Instance::Value(Bson::Document(extra)) => extra
                        .get(name)
                        .map(|v| (MemberType::Any, Instance::from(v.clone())))
                        .ok_or_else(|| missing(class_map.type_name())),
                    _ => Err(missing(class_map.type_name())),
                }
            }
            PropertyDescriptor::Example { class_map, example } => {
                let member = class_map.as_ref().and_then(|m| m.member_from_alias(name));
                let (member_type, member_name) = match member {
                    Some(member) => (member.member_type().clone(), member.member_name()),
                    None => (MemberType::Any, name),
                };
                example
                    .get(member_name)
                    .map(|v| (member_type, v.clone()))
                    .ok_or_else(|| missing("example object"))
            }
        }
    }
}

fn alias_for(class_map: &ClassMap, member_name: &str) -> String {
    class_map
        .member_from_member_name(member_name)
        .map_or(member_name, |m| m.alias())
        .to_owned()
}

/// Lowers instances to documents through the class maps of a mapping
/// store.
pub struct BsonClassMapDescriptor<'s> {
    store: &'s dyn MappingStore,
}

impl<'s> BsonClassMapDescriptor<'s> {
    pub fn new(store: &'s dyn MappingStore) -> Self {
        Self { store }
    }

    /// Arrays: explicit instance arrays and BSON arrays.
    pub fn is_array(&self, instance: &Instance) -> bool {
        matches!(instance, Instance::Array(_) | Instance::Value(Bson::Array(_)))
    }

    /// Objects: entities, examples and documents. Everything else is
    /// written natively.
    pub fn is_object(&self, instance: &Instance) -> bool {
        matches!(
            instance,
            Instance::Object(_) | Instance::Example(_) | Instance::Value(Bson::Document(_))
        )
    }

    pub fn begin_array(&self, instance: &Instance) -> Result<Vec<Instance>> {
        match instance {
            Instance::Array(items) => Ok(items.clone()),
            Instance::Value(Bson::Array(items)) => Ok(items.iter().cloned().map(Instance::from).collect()),
            other => Err(MappingError::mismatch("array", other.kind())),
        }
    }

    /// Picks the descriptor for `instance` described as `expected`.
    ///
    /// Entities are always described by the class map of their runtime
    /// type, so subclass-only members are written too.
    pub fn begin_object<'i>(&self, instance: &'i Instance, expected: &MemberType) -> Result<PropertyDescriptor<'i>> {
        match instance {
            Instance::Value(Bson::Document(document)) => match expected {
                MemberType::Class(type_name) => Ok(PropertyDescriptor::DocumentClassMap {
                    class_map: self.store.class_map(type_name)?,
                    document,
                }),
                _ => Ok(PropertyDescriptor::Document(document)),
            },
            Instance::Object(entity) => Ok(PropertyDescriptor::ClassMap {
                class_map: self.store.class_map(entity.type_name())?,
                entity: entity.as_ref(),
            }),
            Instance::Example(example) => Ok(PropertyDescriptor::Example {
                class_map: match expected {
                    MemberType::Class(type_name) => Some(self.store.class_map(type_name)?),
                    _ => None,
                },
                example,
            }),
            other => Err(MappingError::mismatch("object", other.kind())),
        }
    }

    pub fn to_document(&self, instance: &Instance, expected: &MemberType) -> Result<Document> {
        let descriptor = self.begin_object(instance, expected)?;
        let names = descriptor.property_names()?;
        let mut document = Document::with_capacity(names.len());
        for name in names {
            let (member_type, value) = descriptor.begin_property(&name)?;
            let value = self.to_bson(&value, &member_type)?;
            document.insert(name, value);
        }
        Ok(document)
    }

    pub fn to_bson(&self, instance: &Instance, expected: &MemberType) -> Result<Bson> {
        match instance {
            Instance::Null => Ok(Bson::Null),
            Instance::Value(value) if !expected.involves_class() => Ok(value.clone()),
            _ if self.is_array(instance) => {
                let element_type = expected.element_type();
                let items = self
                    .begin_array(instance)?
                    .iter()
                    .map(|item| self.to_bson(item, &element_type))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Bson::Array(items))
            }
            _ if self.is_object(instance) => Ok(Bson::Document(self.to_document(instance, expected)?)),
            Instance::Value(value) => Ok(value.clone()),
            other => Err(MappingError::UnsupportedValue(other.kind())),
        }
    }
}
