//! Runtime values handed to the serializer: typed entities, example
//! objects, raw BSON values and arrays of any of these.

use std::any::Any;
use std::fmt;

use mongo_bson::chrono::{DateTime, Utc};
use mongo_bson::{Bson, Document, ObjectId};
use uuid::Uuid;

use crate::error::{MappingError, Result};

/// A typed object described by a class map.
///
/// Implement it with [`impl_entity!`](crate::impl_entity).
pub trait Entity: Any + fmt::Debug + Send + Sync {
    /// Class-map name of the runtime type.
    fn type_name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    fn clone_entity(&self) -> Box<dyn Entity>;
}

impl dyn Entity {
    pub fn downcast_ref<T: Entity>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    pub fn downcast_mut<T: Entity>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut()
    }
}

impl Clone for Box<dyn Entity> {
    fn clone(&self) -> Self {
        self.clone_entity()
    }
}

/// Implements [`Entity`] for a `Clone + Debug` type under the given
/// class-map name.
#[macro_export]
macro_rules! impl_entity {
    ($ty:ty, $name:expr) => {
        impl $crate::Entity for $ty {
            fn type_name(&self) -> &'static str {
                $name
            }
            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }
            fn into_any(self: ::std::boxed::Box<Self>) -> ::std::boxed::Box<dyn ::std::any::Any> {
                self
            }
            fn clone_entity(&self) -> ::std::boxed::Box<dyn $crate::Entity> {
                ::std::boxed::Box::new(::std::clone::Clone::clone(self))
            }
        }
    };
}

/// An ad-hoc bag of named values, used to describe partial documents such
/// as query examples. Property names are member names, not aliases.
#[derive(Debug, Clone, Default)]
pub struct ExampleObject {
    properties: Vec<(String, Instance)>,
}

impl ExampleObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Instance>) -> Self {
        self.insert(name, value);
        self
    }

    /// Sets `name`, replacing an earlier value in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Instance>) {
        let name = name.into();
        let value = value.into();
        match self.properties.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.properties.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Instance> {
        self.properties.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// A value handed to or produced by the serializer.
#[derive(Debug, Clone)]
pub enum Instance {
    Null,
    Value(Bson),
    Object(Box<dyn Entity>),
    Example(ExampleObject),
    Array(Vec<Instance>),
}

impl Instance {
    pub fn object<T: Entity>(entity: T) -> Self {
        Instance::Object(Box::new(entity))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Instance::Null | Instance::Value(Bson::Null))
    }

    /// Short description used in error messages.
    pub fn kind(&self) -> String {
        match self {
            Instance::Null => "null".into(),
            Instance::Value(v) => format!("{:?}", v.element_type()),
            Instance::Object(e) => e.type_name().into(),
            Instance::Example(_) => "example object".into(),
            Instance::Array(_) => "array".into(),
        }
    }

    pub fn as_entity<T: Entity>(&self) -> Option<&T> {
        match self {
            Instance::Object(e) => e.downcast_ref(),
            _ => None,
        }
    }

    pub fn as_entity_mut<T: Entity>(&mut self) -> Option<&mut T> {
        match self {
            Instance::Object(e) => e.downcast_mut(),
            _ => None,
        }
    }

    pub fn into_entity<T: Entity>(self) -> Result<T> {
        match self {
            Instance::Object(e) => {
                let found = e.type_name();
                e.into_any()
                    .downcast::<T>()
                    .map(|b| *b)
                    .map_err(|_| MappingError::mismatch(std::any::type_name::<T>(), found))
            }
            other => Err(MappingError::mismatch(std::any::type_name::<T>(), other.kind())),
        }
    }

    /// Like [`into_entity`](Self::into_entity) but maps null to `None`.
    pub fn into_optional_entity<T: Entity>(self) -> Result<Option<T>> {
        if self.is_null() {
            return Ok(None);
        }
        self.into_entity().map(Some)
    }

    /// Converts into a plain Rust value.
    pub fn extract<T: FromInstance>(self) -> Result<T> {
        T::from_instance(self)
    }
}

impl From<Bson> for Instance {
    fn from(v: Bson) -> Self {
        match v {
            Bson::Null => Instance::Null,
            other => Instance::Value(other),
        }
    }
}

impl From<Document> for Instance {
    fn from(v: Document) -> Self {
        Instance::Value(Bson::Document(v))
    }
}

impl From<ExampleObject> for Instance {
    fn from(v: ExampleObject) -> Self {
        Instance::Example(v)
    }
}

impl From<Box<dyn Entity>> for Instance {
    fn from(v: Box<dyn Entity>) -> Self {
        Instance::Object(v)
    }
}

macro_rules! instance_from_bson {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Instance {
                fn from(v: $ty) -> Self {
                    Instance::Value(Bson::from(v))
                }
            }
        )*
    };
}

instance_from_bson!(&str, String, i32, i64, f64, bool, ObjectId, Uuid, DateTime<Utc>);

impl<T: Into<Instance>> From<Option<T>> for Instance {
    fn from(v: Option<T>) -> Self {
        v.map_or(Instance::Null, Into::into)
    }
}

impl<T: Into<Instance>> From<Vec<T>> for Instance {
    fn from(v: Vec<T>) -> Self {
        Instance::Array(v.into_iter().map(Into::into).collect())
    }
}

/// Conversion out of an [`Instance`], used by member setters.
pub trait FromInstance: Sized {
    fn from_instance(instance: Instance) -> Result<Self>;
}

fn value_of(instance: Instance, expected: &str) -> Result<Bson> {
    match instance {
        Instance::Value(v) => Ok(v),
        Instance::Null => Ok(Bson::Null),
        other => Err(MappingError::mismatch(expected, other.kind())),
    }
}

impl FromInstance for Bson {
    fn from_instance(instance: Instance) -> Result<Self> {
        match instance {
            Instance::Array(items) => Ok(Bson::Array(
                items.into_iter().map(Bson::from_instance).collect::<Result<_>>()?,
            )),
            other => value_of(other, "BSON value"),
        }
    }
}

impl FromInstance for String {
    fn from_instance(instance: Instance) -> Result<Self> {
        match value_of(instance, "string")? {
            Bson::String(s) => Ok(s),
            other => Err(MappingError::mismatch("string", format!("{:?}", other.element_type()))),
        }
    }
}

impl FromInstance for i32 {
    fn from_instance(instance: Instance) -> Result<Self> {
        let value = value_of(instance, "int32")?;
        value
            .as_i32()
            .ok_or_else(|| MappingError::mismatch("int32", format!("{:?}", value.element_type())))
    }
}

impl FromInstance for i64 {
    fn from_instance(instance: Instance) -> Result<Self> {
        let value = value_of(instance, "int64")?;
        value
            .as_i64()
            .ok_or_else(|| MappingError::mismatch("int64", format!("{:?}", value.element_type())))
    }
}

impl FromInstance for f64 {
    fn from_instance(instance: Instance) -> Result<Self> {
        let value = value_of(instance, "double")?;
        value
            .as_f64()
            .ok_or_else(|| MappingError::mismatch("double", format!("{:?}", value.element_type())))
    }
}

impl FromInstance for bool {
    fn from_instance(instance: Instance) -> Result<Self> {
        let value = value_of(instance, "boolean")?;
        value
            .as_bool()
            .ok_or_else(|| MappingError::mismatch("boolean", format!("{:?}", value.element_type())))
    }
}

impl FromInstance for ObjectId {
    fn from_instance(instance: Instance) -> Result<Self> {
        let value = value_of(instance, "ObjectId")?;
        value
            .as_object_id()
            .ok_or_else(|| MappingError::mismatch("ObjectId", format!("{:?}", value.element_type())))
    }
}

impl FromInstance for Uuid {
    fn from_instance(instance: Instance) -> Result<Self> {
        match value_of(instance, "UUID")? {
            Bson::Uuid(uuid) => Ok(uuid),
            other => Err(MappingError::mismatch("UUID", format!("{:?}", other.element_type()))),
        }
    }
}

impl FromInstance for DateTime<Utc> {
    fn from_instance(instance: Instance) -> Result<Self> {
        match value_of(instance, "date")? {
            Bson::DateTime(date) => Ok(date),
            other => Err(MappingError::mismatch("date", format!("{:?}", other.element_type()))),
        }
    }
}

impl FromInstance for Document {
    fn from_instance(instance: Instance) -> Result<Self> {
        match value_of(instance, "document")? {
            Bson::Document(d) => Ok(d),
            other => Err(MappingError::mismatch("document", format!("{:?}", other.element_type()))),
        }
    }
}

impl<T: FromInstance> FromInstance for Option<T> {
    fn from_instance(instance: Instance) -> Result<Self> {
        if instance.is_null() {
            return Ok(None);
        }
        T::from_instance(instance).map(Some)
    }
}

impl<T: FromInstance> FromInstance for Vec<T> {
    fn from_instance(instance: Instance) -> Result<Self> {
        match instance {
            Instance::Array(items) => items.into_iter().map(T::from_instance).collect(),
            Instance::Value(Bson::Array(items)) => {
                items.into_iter().map(|v| T::from_instance(Instance::from(v))).collect()
            }
            other => Err(MappingError::mismatch("array", other.kind())),
        }
    }
}
