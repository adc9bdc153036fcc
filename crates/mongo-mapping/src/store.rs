//! Class-map lookup.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::class_map::{ClassMap, Discriminator, PersistentMemberMap};
use crate::error::{MappingError, Result};

/// Read-only source of class maps, shared across serializers and query
/// translators.
pub trait MappingStore: Send + Sync {
    fn class_map(&self, type_name: &str) -> Result<Arc<ClassMap>>;

    /// Resolves a stored discriminator tag to `base_type` or one of its
    /// subclasses.
    fn class_map_for_discriminator(&self, base_type: &str, tag: &str) -> Result<Arc<ClassMap>>;

    /// True when `derived` is `base` or inherits from it.
    fn is_assignable(&self, base: &str, derived: &str) -> bool {
        let mut current = Some(derived.to_owned());
        let mut seen = HashSet::new();
        while let Some(name) = current {
            if name == base {
                return true;
            }
            if !seen.insert(name.clone()) {
                return false;
            }
            current = self
                .class_map(&name)
                .ok()
                .and_then(|map| map.base_type().map(str::to_owned));
        }
        false
    }
}

/// Class maps held in memory, with inheritance resolved at build time.
#[derive(Debug, Default)]
pub struct InMemoryMappingStore {
    maps: HashMap<String, Arc<ClassMap>>,
    roots: HashMap<String, String>,
    discriminators: HashMap<(String, String), String>,
}

impl InMemoryMappingStore {
    pub fn builder() -> MappingStoreBuilder {
        MappingStoreBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

impl MappingStore for InMemoryMappingStore {
    fn class_map(&self, type_name: &str) -> Result<Arc<ClassMap>> {
        self.maps
            .get(type_name)
            .cloned()
            .ok_or_else(|| MappingError::ClassMapNotFound(type_name.to_owned()))
    }

    fn class_map_for_discriminator(&self, base_type: &str, tag: &str) -> Result<Arc<ClassMap>> {
        let unknown = || MappingError::UnknownDiscriminator {
            base: base_type.to_owned(),
            discriminator: tag.to_owned(),
        };
        let root = self.roots.get(base_type).ok_or_else(unknown)?;
        let type_name = self
            .discriminators
            .get(&(root.clone(), tag.to_owned()))
            .ok_or_else(unknown)?;
        if !self.is_assignable(base_type, type_name) {
            return Err(unknown());
        }
        self.class_map(type_name)
    }
}

/// Collects class maps, then resolves inheritance: subclasses receive the
/// identity, members, collection and discriminator alias of their base,
/// and every type in a hierarchy becomes polymorphic with a default
/// discriminator.
///
/// Member accessors are bound to one Rust type, so a subclass redeclares
/// the inherited members its struct stores; the redeclaration replaces the
/// base accessors while keeping the base alias and position.
#[derive(Default)]
pub struct MappingStoreBuilder {
    maps: Vec<ClassMap>,
}

impl MappingStoreBuilder {
    pub fn add(mut self, map: ClassMap) -> Self {
        self.maps.push(map);
        self
    }

    pub fn build(self) -> Result<InMemoryMappingStore> {
        let by_name: HashMap<String, ClassMap> =
            self.maps.into_iter().map(|m| (m.type_name.clone(), m)).collect();

        let mut chains: HashMap<String, Vec<String>> = HashMap::new();
        for name in by_name.keys() {
            chains.insert(name.clone(), ancestry(&by_name, name)?);
        }
        let bases: HashSet<&str> = by_name.values().filter_map(|m| m.base_type()).collect();

        // Shallow types first, so a base is resolved before its subclasses.
        let mut order: Vec<&String> = by_name.keys().collect();
        order.sort_by_key(|name| (chains[*name].len(), (*name).clone()));

        let mut store = InMemoryMappingStore::default();
        for name in order {
            let chain = &chains[name];
            let mut map = by_name[name].clone();
            if let Some(base) = map.base_type().and_then(|b| store.maps.get(b)).cloned() {
                inherit(&mut map, &base);
            }
            map.is_polymorphic = chain.len() > 1 || bases.contains(name.as_str());
            if map.is_polymorphic && map.discriminator.is_none() {
                map.discriminator = default_discriminator(chain, map.is_abstract());
            }

            let root = chain[0].clone();
            if let Some(discriminator) = &map.discriminator {
                let tag = discriminator.concrete_tag().to_owned();
                debug!(type_name = %name, root = %root, tag = %tag, "registering discriminator");
                store.discriminators.insert((root.clone(), tag), name.clone());
            }
            store.roots.insert(name.clone(), root);
            store.maps.insert(name.clone(), Arc::new(map));
        }
        Ok(store)
    }
}

/// Type names from the root of the hierarchy down to `name`.
fn ancestry(maps: &HashMap<String, ClassMap>, name: &str) -> Result<Vec<String>> {
    let mut chain = vec![name.to_owned()];
    let mut current = maps.get(name);
    while let Some(base) = current.and_then(|m| m.base_type()) {
        if chain.iter().any(|n| n == base) {
            return Err(MappingError::UnsupportedValue(format!(
                "inheritance cycle through {base}"
            )));
        }
        current = Some(
            maps.get(base)
                .ok_or_else(|| MappingError::ClassMapNotFound(base.to_owned()))?,
        );
        chain.push(base.to_owned());
    }
    chain.reverse();
    Ok(chain)
}

fn inherit(map: &mut ClassMap, base: &ClassMap) {
    if map.id_member.is_none() {
        map.id_member = base.id_member.clone();
        map.id_generator = map.id_generator.or(base.id_generator);
    }
    // Redeclared members keep the base position and alias but use the
    // subclass accessors.
    let own = std::mem::take(&mut map.members);
    let mut members: Vec<PersistentMemberMap> = base
        .members
        .iter()
        .map(|inherited| {
            match own.iter().find(|m| m.member_name() == inherited.member_name()) {
                Some(redeclared) => redeclared.clone().with_alias(inherited.alias()),
                None => inherited.clone(),
            }
        })
        .collect();
    members.extend(
        own.into_iter()
            .filter(|m| base.members.iter().all(|b| b.member_name() != m.member_name())),
    );
    map.members = members;
    if map.extended_properties.is_none() {
        map.extended_properties = base.extended_properties.clone();
    }
    if map.collection_name.is_none() {
        map.collection_name = Some(base.collection_name().to_owned());
    }
    if map.discriminator_alias.is_none() {
        map.discriminator_alias = base.discriminator_alias.clone();
    }
}

/// Tags of every type below the root down to the concrete type; a concrete
/// root is tagged with its own name.
fn default_discriminator(chain: &[String], is_abstract: bool) -> Option<Discriminator> {
    match chain {
        [root] if !is_abstract => Some(Discriminator::Single(root.clone())),
        [_] => None,
        [_, only] => Some(Discriminator::Single(only.clone())),
        [_, rest @ ..] => Some(Discriminator::Chain(rest.to_vec())),
        [] => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_map::ClassMapBuilder;

    #[test]
    fn default_discriminators_follow_the_hierarchy() {
        let chain = |names: &[&str]| names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
        assert_eq!(default_discriminator(&chain(&["Base"]), true), None);
        assert_eq!(
            default_discriminator(&chain(&["Base"]), false),
            Some(Discriminator::Single("Base".into()))
        );
        assert_eq!(
            default_discriminator(&chain(&["Base", "ClassB"]), false),
            Some(Discriminator::Single("ClassB".into()))
        );
        assert_eq!(
            default_discriminator(&chain(&["Base", "ClassA", "ClassD"]), false),
            Some(Discriminator::Chain(vec!["ClassA".into(), "ClassD".into()]))
        );
    }

    #[test]
    fn missing_base_is_reported() {
        let result = InMemoryMappingStore::builder()
            .add(ClassMapBuilder::abstract_type("Child").extends("Parent").build())
            .build();
        assert!(matches!(result, Err(MappingError::ClassMapNotFound(ref t)) if t == "Parent"));
    }

    #[test]
    fn cycles_are_rejected() {
        let result = InMemoryMappingStore::builder()
            .add(ClassMapBuilder::abstract_type("A").extends("B").build())
            .add(ClassMapBuilder::abstract_type("B").extends("A").build())
            .build();
        assert!(matches!(result, Err(MappingError::UnsupportedValue(_))));
    }

    #[test]
    fn standalone_types_are_not_polymorphic() {
        let store = InMemoryMappingStore::builder()
            .add(ClassMapBuilder::abstract_type("Loner").collection("loners").build())
            .build()
            .unwrap();
        let map = store.class_map("Loner").unwrap();
        assert!(!map.is_polymorphic());
        assert!(!map.should_persist_discriminator());
        assert_eq!(map.collection_name(), "loners");
        assert!(store.class_map("Missing").is_err());
    }

    #[test]
    fn assignability_walks_base_types() {
        let store = InMemoryMappingStore::builder()
            .add(ClassMapBuilder::abstract_type("Base").build())
            .add(ClassMapBuilder::abstract_type("Mid").extends("Base").build())
            .add(ClassMapBuilder::abstract_type("Leaf").extends("Mid").build())
            .build()
            .unwrap();
        assert!(store.is_assignable("Base", "Leaf"));
        assert!(store.is_assignable("Mid", "Mid"));
        assert!(!store.is_assignable("Leaf", "Base"));
        assert_eq!(store.class_map("Leaf").unwrap().collection_name(), "Base");
    }
}
