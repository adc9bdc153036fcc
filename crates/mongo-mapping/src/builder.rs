//! Materialization of decoded documents into instances.

use std::sync::Arc;

use mongo_bson::{Bson, Document};
use tracing::trace;

use crate::class_map::{ClassMap, Discriminator, MemberType};
use crate::error::{MappingError, Result};
use crate::instance::{Entity, Instance};
use crate::store::MappingStore;

/// Builds instances from documents through the class maps of a mapping
/// store.
pub struct BsonClassMapBuilder<'s> {
    store: &'s dyn MappingStore,
}

impl<'s> BsonClassMapBuilder<'s> {
    pub fn new(store: &'s dyn MappingStore) -> Self {
        Self { store }
    }

    /// Materializes `document` as `expected`. Non-class types receive the
    /// document unchanged.
    pub fn from_document(&self, document: Document, expected: &MemberType) -> Result<Instance> {
        match expected {
            MemberType::Class(type_name) => Ok(Instance::Object(self.materialize(type_name, document)?)),
            MemberType::Collection(_) => Err(MappingError::mismatch("array", "document")),
            _ => Ok(Instance::Value(Bson::Document(document))),
        }
    }

    pub fn from_bson(&self, value: Bson, expected: &MemberType) -> Result<Instance> {
        match value {
            Bson::Null => Ok(Instance::Null),
            Bson::Document(document) => self.from_document(document, expected),
            Bson::Array(items) if expected.involves_class() => {
                let element_type = expected.element_type();
                let items = items
                    .into_iter()
                    .map(|item| self.from_bson(item, &element_type))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Instance::Array(items))
            }
            other => Ok(Instance::Value(other)),
        }
    }

    /// Resolves the concrete class map for a document read as `type_name`,
    /// following its discriminator when present.
    pub fn resolve_class_map(&self, type_name: &str, document: &Document) -> Result<Arc<ClassMap>> {
        let class_map = self.store.class_map(type_name)?;
        if !class_map.is_polymorphic() {
            return Ok(class_map);
        }
        let Some(stored) = document.get(class_map.discriminator_alias()) else {
            return Ok(class_map);
        };
        let discriminator = Discriminator::from_bson(stored).ok_or_else(|| MappingError::UnknownDiscriminator {
            base: type_name.to_owned(),
            discriminator: format!("{stored:?}"),
        })?;
        let tag = discriminator.concrete_tag();
        if class_map.discriminator().map(Discriminator::concrete_tag) == Some(tag) {
            return Ok(class_map);
        }
        self.store.class_map_for_discriminator(type_name, tag)
    }

    fn materialize(&self, type_name: &str, document: Document) -> Result<Box<dyn Entity>> {
        let class_map = self.resolve_class_map(type_name, &document)?;
        trace!(requested = type_name, concrete = class_map.type_name(), "materializing");
        let mut entity = class_map.create_instance()?;

        let mut extra = Document::new();
        for (key, value) in document {
            if class_map.is_polymorphic() && key == class_map.discriminator_alias() {
                continue;
            }
            match class_map.member_from_alias(&key) {
                Some(member) => {
                    let value = self.from_bson(value, member.member_type())?;
                    member.set(entity.as_mut(), value)?;
                }
                None => {
                    extra.insert(key, value);
                }
            }
        }

        if let Some(extended) = class_map.extended_properties() {
            extended.set(entity.as_mut(), Instance::Value(Bson::Document(extra)))?;
        } else if !extra.is_empty() {
            trace!(ignored = extra.len(), type_name = class_map.type_name(), "dropping unmapped keys");
        }
        Ok(entity)
    }
}
