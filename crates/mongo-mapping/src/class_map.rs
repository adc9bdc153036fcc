//! Per-type mapping metadata: members, aliases, identity and
//! discriminators.

use std::fmt;
use std::sync::Arc;

use mongo_bson::{Bson, ObjectId};
use uuid::Uuid;

use crate::error::{MappingError, Result};
use crate::instance::{Entity, Instance};

/// Default wire name of the discriminator element.
pub const DEFAULT_DISCRIMINATOR_ALIAS: &str = "_t";

/// Wire name of the identity element.
pub const ID_ALIAS: &str = "_id";

/// Declared type of a member, used to pick the descriptor or builder for
/// nested values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberType {
    /// No static expectation; values pass through as they are.
    Any,
    /// A scalar stored as-is.
    Native,
    ObjectId,
    Uuid,
    /// A plain document, never interpreted through a class map.
    Document,
    /// A class-mapped type.
    Class(String),
    Collection(Box<MemberType>),
}

impl MemberType {
    pub fn class(name: impl Into<String>) -> Self {
        MemberType::Class(name.into())
    }

    pub fn collection_of(element: MemberType) -> Self {
        MemberType::Collection(Box::new(element))
    }

    /// Element type for arrays; `Any` for non-collections.
    pub fn element_type(&self) -> MemberType {
        match self {
            MemberType::Collection(inner) => (**inner).clone(),
            _ => MemberType::Any,
        }
    }

    pub fn class_name(&self) -> Option<&str> {
        match self {
            MemberType::Class(name) => Some(name),
            _ => None,
        }
    }

    /// True when values of this type need a class map to be written.
    pub fn involves_class(&self) -> bool {
        match self {
            MemberType::Class(_) => true,
            MemberType::Collection(inner) => inner.involves_class(),
            _ => false,
        }
    }
}

pub type Getter = Arc<dyn Fn(&dyn Entity) -> Result<Instance> + Send + Sync>;
pub type Setter = Arc<dyn Fn(&mut dyn Entity, Instance) -> Result<()> + Send + Sync>;
pub type Factory = Arc<dyn Fn() -> Box<dyn Entity> + Send + Sync>;

/// One persisted member: in-memory name, wire alias, declared type and
/// accessors.
#[derive(Clone)]
pub struct PersistentMemberMap {
    member_name: String,
    alias: String,
    member_type: MemberType,
    getter: Getter,
    setter: Setter,
}

impl PersistentMemberMap {
    pub fn new<T, G, S>(member_name: impl Into<String>, member_type: MemberType, getter: G, setter: S) -> Self
    where
        T: Entity,
        G: Fn(&T) -> Instance + Send + Sync + 'static,
        S: Fn(&mut T, Instance) -> Result<()> + Send + Sync + 'static,
    {
        let member_name = member_name.into();
        let getter: Getter = Arc::new(move |entity: &dyn Entity| {
            entity
                .as_any()
                .downcast_ref::<T>()
                .map(&getter)
                .ok_or_else(|| MappingError::mismatch(std::any::type_name::<T>(), entity.type_name()))
        });
        let setter: Setter = Arc::new(move |entity: &mut dyn Entity, value: Instance| {
            let found = entity.type_name();
            match entity.as_any_mut().downcast_mut::<T>() {
                Some(target) => setter(target, value),
                None => Err(MappingError::mismatch(std::any::type_name::<T>(), found)),
            }
        });
        Self {
            alias: member_name.clone(),
            member_name,
            member_type,
            getter,
            setter,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn member_name(&self) -> &str {
        &self.member_name
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn member_type(&self) -> &MemberType {
        &self.member_type
    }

    pub fn get(&self, entity: &dyn Entity) -> Result<Instance> {
        (self.getter)(entity)
    }

    pub fn set(&self, entity: &mut dyn Entity, value: Instance) -> Result<()> {
        (self.setter)(entity, value)
    }
}

impl fmt::Debug for PersistentMemberMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentMemberMap")
            .field("member_name", &self.member_name)
            .field("alias", &self.alias)
            .field("member_type", &self.member_type)
            .finish_non_exhaustive()
    }
}

/// Discriminator value: a single tag, or the tag chain from the first
/// subclass below the root down to the concrete type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discriminator {
    Single(String),
    Chain(Vec<String>),
}

impl Discriminator {
    /// Tag of the most derived type.
    pub fn concrete_tag(&self) -> &str {
        match self {
            Discriminator::Single(tag) => tag,
            Discriminator::Chain(tags) => tags.last().map(String::as_str).unwrap_or_default(),
        }
    }

    pub fn to_bson(&self) -> Bson {
        match self {
            Discriminator::Single(tag) => Bson::String(tag.clone()),
            Discriminator::Chain(tags) => Bson::Array(tags.iter().cloned().map(Bson::String).collect()),
        }
    }

    /// Reads a stored discriminator: a string, or an array of strings.
    pub fn from_bson(value: &Bson) -> Option<Self> {
        match value {
            Bson::String(tag) => Some(Discriminator::Single(tag.clone())),
            Bson::Array(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_owned))
                .collect::<Option<Vec<_>>>()
                .filter(|tags| !tags.is_empty())
                .map(Discriminator::Chain),
            _ => None,
        }
    }
}

/// Strategy for filling an unset identity before insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdGenerator {
    ObjectId,
    Uuid,
    /// The caller assigns identities.
    Assigned,
}

impl IdGenerator {
    /// Default generator for an id member of the given type.
    pub fn for_member_type(member_type: &MemberType) -> Self {
        match member_type {
            MemberType::ObjectId => IdGenerator::ObjectId,
            MemberType::Uuid => IdGenerator::Uuid,
            _ => IdGenerator::Assigned,
        }
    }

    pub fn generate(&self) -> Option<Bson> {
        match self {
            IdGenerator::ObjectId => Some(Bson::ObjectId(ObjectId::new())),
            IdGenerator::Uuid => Some(Bson::Uuid(Uuid::new_v4())),
            IdGenerator::Assigned => None,
        }
    }
}

/// Mapping metadata of one type.
#[derive(Clone)]
pub struct ClassMap {
    pub(crate) type_name: String,
    pub(crate) base_type: Option<String>,
    pub(crate) collection_name: Option<String>,
    pub(crate) id_member: Option<PersistentMemberMap>,
    pub(crate) id_generator: Option<IdGenerator>,
    pub(crate) members: Vec<PersistentMemberMap>,
    pub(crate) extended_properties: Option<PersistentMemberMap>,
    pub(crate) discriminator: Option<Discriminator>,
    pub(crate) discriminator_alias: Option<String>,
    pub(crate) is_polymorphic: bool,
    pub(crate) factory: Option<Factory>,
}

impl ClassMap {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn base_type(&self) -> Option<&str> {
        self.base_type.as_deref()
    }

    pub fn is_subclass(&self) -> bool {
        self.base_type.is_some()
    }

    pub fn collection_name(&self) -> &str {
        self.collection_name.as_deref().unwrap_or(&self.type_name)
    }

    pub fn id_member(&self) -> Option<&PersistentMemberMap> {
        self.id_member.as_ref()
    }

    pub fn id_generator(&self) -> IdGenerator {
        match (&self.id_generator, &self.id_member) {
            (Some(generator), _) => *generator,
            (None, Some(id)) => IdGenerator::for_member_type(id.member_type()),
            (None, None) => IdGenerator::Assigned,
        }
    }

    /// Persistent members in emission order: identity first, then declared
    /// members, base-class members before subclass members.
    pub fn members(&self) -> impl Iterator<Item = &PersistentMemberMap> {
        self.id_member.iter().chain(self.members.iter())
    }

    pub fn member_from_alias(&self, alias: &str) -> Option<&PersistentMemberMap> {
        self.members().find(|m| m.alias() == alias)
    }

    pub fn member_from_member_name(&self, member_name: &str) -> Option<&PersistentMemberMap> {
        self.members().find(|m| m.member_name() == member_name)
    }

    pub fn extended_properties(&self) -> Option<&PersistentMemberMap> {
        self.extended_properties.as_ref()
    }

    pub fn discriminator(&self) -> Option<&Discriminator> {
        self.discriminator.as_ref()
    }

    pub fn discriminator_alias(&self) -> &str {
        self.discriminator_alias.as_deref().unwrap_or(DEFAULT_DISCRIMINATOR_ALIAS)
    }

    /// True when the type has a base type or subclasses.
    pub fn is_polymorphic(&self) -> bool {
        self.is_polymorphic
    }

    pub fn should_persist_discriminator(&self) -> bool {
        self.is_polymorphic && self.discriminator.is_some()
    }

    pub fn is_abstract(&self) -> bool {
        self.factory.is_none()
    }

    pub fn create_instance(&self) -> Result<Box<dyn Entity>> {
        self.factory
            .as_ref()
            .map(|factory| factory())
            .ok_or_else(|| MappingError::AbstractType(self.type_name.clone()))
    }
}

impl fmt::Debug for ClassMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassMap")
            .field("type_name", &self.type_name)
            .field("base_type", &self.base_type)
            .field("collection_name", &self.collection_name())
            .field("id_member", &self.id_member)
            .field("members", &self.members)
            .field("discriminator", &self.discriminator)
            .field("is_polymorphic", &self.is_polymorphic)
            .finish_non_exhaustive()
    }
}

/// Assembles a [`ClassMap`]. Inheritance and discriminator defaults are
/// resolved when the map is registered in a mapping store.
pub struct ClassMapBuilder {
    map: ClassMap,
}

impl ClassMapBuilder {
    /// A concrete type, instantiated through `Default`.
    pub fn concrete<T: Entity + Default>(type_name: impl Into<String>) -> Self {
        let mut builder = Self::abstract_type(type_name);
        builder.map.factory = Some(Arc::new(|| Box::new(T::default())));
        builder
    }

    /// A type that is never instantiated itself.
    pub fn abstract_type(type_name: impl Into<String>) -> Self {
        Self {
            map: ClassMap {
                type_name: type_name.into(),
                base_type: None,
                collection_name: None,
                id_member: None,
                id_generator: None,
                members: Vec::new(),
                extended_properties: None,
                discriminator: None,
                discriminator_alias: None,
                is_polymorphic: false,
                factory: None,
            },
        }
    }

    pub fn extends(mut self, base_type: impl Into<String>) -> Self {
        self.map.base_type = Some(base_type.into());
        self
    }

    pub fn collection(mut self, collection_name: impl Into<String>) -> Self {
        self.map.collection_name = Some(collection_name.into());
        self
    }

    /// Identity member; its alias is always `_id`.
    pub fn id(mut self, member: PersistentMemberMap) -> Self {
        self.map.id_member = Some(member.with_alias(ID_ALIAS));
        self
    }

    pub fn id_generator(mut self, generator: IdGenerator) -> Self {
        self.map.id_generator = Some(generator);
        self
    }

    pub fn member(mut self, member: PersistentMemberMap) -> Self {
        self.map.members.push(member);
        self
    }

    /// Sink for document keys no member claims; declared as a document.
    pub fn extended_properties(mut self, member: PersistentMemberMap) -> Self {
        self.map.extended_properties = Some(member);
        self
    }

    pub fn discriminator(mut self, discriminator: Discriminator) -> Self {
        self.map.discriminator = Some(discriminator);
        self
    }

    pub fn discriminator_alias(mut self, alias: impl Into<String>) -> Self {
        self.map.discriminator_alias = Some(alias.into());
        self
    }

    pub fn build(self) -> ClassMap {
        self.map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default)]
    struct Account {
        id: Option<ObjectId>,
        owner: String,
    }

    crate::impl_entity!(Account, "Account");

    fn account_map() -> ClassMap {
        ClassMapBuilder::concrete::<Account>("Account")
            .collection("accounts")
            .id(PersistentMemberMap::new(
                "Id",
                MemberType::ObjectId,
                |a: &Account| a.id.into(),
                |a: &mut Account, v| {
                    a.id = v.extract()?;
                    Ok(())
                },
            ))
            .member(
                PersistentMemberMap::new(
                    "Owner",
                    MemberType::Native,
                    |a: &Account| a.owner.clone().into(),
                    |a: &mut Account, v| {
                        a.owner = v.extract()?;
                        Ok(())
                    },
                )
                .with_alias("o"),
            )
            .build()
    }

    #[test]
    fn member_lookup_by_alias_and_name() {
        let map = account_map();
        assert_eq!(map.member_from_alias("o").map(|m| m.member_name()), Some("Owner"));
        assert_eq!(map.member_from_member_name("Owner").map(|m| m.alias()), Some("o"));
        assert_eq!(map.member_from_alias("_id").map(|m| m.member_name()), Some("Id"));
        assert!(map.member_from_alias("Owner").is_none());
        let aliases: Vec<&str> = map.members().map(|m| m.alias()).collect();
        assert_eq!(aliases, ["_id", "o"]);
    }

    #[test]
    fn accessors_go_through_entity() {
        let map = account_map();
        let mut entity = map.create_instance().unwrap();
        let owner = map.member_from_alias("o").unwrap();
        owner.set(entity.as_mut(), Instance::from("ann")).unwrap();
        assert!(matches!(owner.get(entity.as_ref()).unwrap(), Instance::Value(Bson::String(ref s)) if s == "ann"));
    }

    #[test]
    fn id_generator_defaults_by_member_type() {
        assert_eq!(account_map().id_generator(), IdGenerator::ObjectId);
        assert_eq!(IdGenerator::for_member_type(&MemberType::Uuid), IdGenerator::Uuid);
        assert_eq!(IdGenerator::for_member_type(&MemberType::Native), IdGenerator::Assigned);
        assert!(IdGenerator::Assigned.generate().is_none());
        assert!(matches!(IdGenerator::Uuid.generate(), Some(Bson::Uuid(_))));
    }

    #[test]
    fn discriminator_forms() {
        let chain = Discriminator::Chain(vec!["ClassA".into(), "ClassD".into()]);
        assert_eq!(chain.concrete_tag(), "ClassD");
        assert_eq!(Discriminator::from_bson(&chain.to_bson()), Some(chain));
        assert_eq!(
            Discriminator::from_bson(&Bson::from("ClassB")),
            Some(Discriminator::Single("ClassB".into()))
        );
        assert_eq!(Discriminator::from_bson(&Bson::Int32(1)), None);
        assert_eq!(Discriminator::from_bson(&Bson::Array(vec![])), None);
    }

    #[test]
    fn abstract_types_cannot_be_created() {
        let map = ClassMapBuilder::abstract_type("Shape").build();
        assert!(matches!(map.create_instance(), Err(MappingError::AbstractType(ref t)) if t == "Shape"));
    }
}
