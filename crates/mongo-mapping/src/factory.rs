use std::sync::Arc;

use mongo_bson::{Bson, BsonReader, BsonWriter, CodecOptions, Document};
use tracing::debug;

use crate::builder::BsonClassMapBuilder;
use crate::class_map::{MemberType, ID_ALIAS};
use crate::descriptor::BsonClassMapDescriptor;
use crate::error::{MappingError, Result};
use crate::instance::Instance;
use crate::store::MappingStore;

/// Entry point for turning instances into BSON bytes and back.
#[derive(Clone)]
pub struct SerializationFactory {
    store: Arc<dyn MappingStore>,
    options: CodecOptions,
}

impl SerializationFactory {
    pub fn new(store: Arc<dyn MappingStore>) -> Self {
        Self::with_options(store, CodecOptions::default())
    }

    pub fn with_options(store: Arc<dyn MappingStore>, options: CodecOptions) -> Self {
        Self { store, options }
    }

    pub fn store(&self) -> &Arc<dyn MappingStore> {
        &self.store
    }

    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    pub fn descriptor(&self) -> BsonClassMapDescriptor<'_> {
        BsonClassMapDescriptor::new(self.store.as_ref())
    }

    pub fn builder(&self) -> BsonClassMapBuilder<'_> {
        BsonClassMapBuilder::new(self.store.as_ref())
    }

    pub fn to_document(&self, instance: &Instance, root_type: &MemberType) -> Result<Document> {
        self.descriptor().to_document(instance, root_type)
    }

    pub fn from_document(&self, document: Document, root_type: &MemberType) -> Result<Instance> {
        self.builder().from_document(document, root_type)
    }

    pub fn serialize(&self, instance: &Instance, root_type: &MemberType) -> Result<Vec<u8>> {
        let document = self.to_document(instance, root_type)?;
        let mut writer = BsonWriter::with_options(Vec::new(), self.options.clone());
        let size = writer.write(&document)?;
        debug!(size, ?root_type, "serialized instance");
        Ok(writer.into_inner())
    }

    pub fn deserialize(&self, bytes: &[u8], root_type: &MemberType) -> Result<Instance> {
        let mut reader = BsonReader::with_options(bytes, self.options.clone());
        let document = reader.read()?;
        debug!(size = reader.position(), ?root_type, "deserialized document");
        self.from_document(document, root_type)
    }

    /// Collection a type is stored in. Plain documents have none.
    pub fn collection_name(&self, root_type: &MemberType) -> Result<String> {
        match root_type {
            MemberType::Class(type_name) => Ok(self.store.class_map(type_name)?.collection_name().to_owned()),
            other => Err(MappingError::UnsupportedValue(format!(
                "{other:?} values have no collection"
            ))),
        }
    }

    /// Fills an unset identity from the class map's id generator. Documents
    /// without `_id` receive a new ObjectId as their first element.
    pub fn ensure_id(&self, instance: &mut Instance) -> Result<()> {
        match instance {
            Instance::Object(entity) => {
                let class_map = self.store.class_map(entity.type_name())?;
                let Some(id_member) = class_map.id_member() else {
                    return Ok(());
                };
                if !id_member.get(entity.as_ref())?.is_null() {
                    return Ok(());
                }
                if let Some(id) = class_map.id_generator().generate() {
                    debug!(type_name = class_map.type_name(), "generated id");
                    id_member.set(entity.as_mut(), Instance::Value(id))?;
                }
                Ok(())
            }
            Instance::Value(Bson::Document(document)) if !document.contains_key(ID_ALIAS) => {
                let mut with_id = Document::with_capacity(document.len() + 1);
                with_id.insert(ID_ALIAS, mongo_bson::ObjectId::new());
                with_id.merge(std::mem::take(document));
                *document = with_id;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
