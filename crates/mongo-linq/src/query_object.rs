use mongo_bson::{Bson, Document};
use mongo_mapping::MemberType;

use crate::javascript::JavaScript;
use crate::projector::Projector;

/// The result of translating one query: everything the transport needs to
/// issue it, plus the projector that shapes the returned rows.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryObject {
    pub database: String,
    pub collection_name: String,
    pub document_type: MemberType,
    /// Condition document.
    pub query: Document,
    /// Field inclusion document; empty requests whole documents.
    pub fields: Document,
    /// Sort document in ordering priority.
    pub order: Document,
    pub number_to_skip: i32,
    /// Zero means no limit.
    pub number_to_limit: i32,
    pub projector: Option<Projector>,
    pub map_function: Option<JavaScript>,
    pub reduce_function: Option<JavaScript>,
}

impl Default for QueryObject {
    fn default() -> Self {
        Self {
            database: String::new(),
            collection_name: String::new(),
            document_type: MemberType::Document,
            query: Document::new(),
            fields: Document::new(),
            order: Document::new(),
            number_to_skip: 0,
            number_to_limit: 0,
            projector: None,
            map_function: None,
            reduce_function: None,
        }
    }
}

impl QueryObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// `database.collection`, the namespace used on the wire.
    pub fn full_collection_name(&self) -> String {
        format!("{}.{}", self.database, self.collection_name)
    }

    /// Adds a sort key; a key sorted twice keeps its first position and
    /// takes the later direction.
    pub fn add_order_by(&mut self, name: impl Into<String>, direction: i32) {
        self.order.insert(name, direction);
    }

    pub fn is_map_reduce(&self) -> bool {
        self.map_function.is_some()
    }

    /// Query document as sent on the wire: the bare condition document, or
    /// the `{query, orderby}` envelope when a sort is present.
    pub fn query_spec(&self) -> Document {
        if self.order.is_empty() {
            return self.query.clone();
        }
        let mut spec = Document::with_capacity(2);
        spec.insert("query", self.query.clone());
        spec.insert("orderby", self.order.clone());
        spec
    }

    /// Map/reduce command for a grouped query; `None` otherwise.
    pub fn map_reduce_command(&self) -> Option<Document> {
        let map = self.map_function.as_ref()?;
        let mut command = Document::new();
        command.insert("mapreduce", self.collection_name.clone());
        command.insert("map", Bson::from(map.clone()));
        if let Some(reduce) = &self.reduce_function {
            command.insert("reduce", Bson::from(reduce.clone()));
        }
        if !self.query.is_empty() {
            command.insert("query", self.query.clone());
        }
        Some(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongo_bson::doc;

    #[test]
    fn empty_query_defaults() {
        let query = QueryObject::new();
        assert_eq!(query.number_to_limit, 0);
        assert_eq!(query.number_to_skip, 0);
        assert!(query.order.is_empty());
        assert!(query.query.is_empty());
        assert!(query.projector.is_none());
    }

    #[test]
    fn envelope_only_with_a_sort() {
        let mut query = QueryObject::new();
        query.query = doc! { "Age" => 21 };
        assert_eq!(query.query_spec(), doc! { "Age" => 21 });
        query.add_order_by("LastName", 1);
        assert_eq!(
            query.query_spec(),
            doc! { "query" => doc! { "Age" => 21 }, "orderby" => doc! { "LastName" => 1 } }
        );
    }

    #[test]
    fn namespace() {
        let query = QueryObject {
            database: "tests".into(),
            collection_name: "people".into(),
            ..Default::default()
        };
        assert_eq!(query.full_collection_name(), "tests.people");
        assert!(query.map_reduce_command().is_none());
    }
}
