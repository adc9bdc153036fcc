//! Query document assembly driven by a scope stack.
//!
//! The formatter pushes a field scope when it meets a field and an operator
//! scope (`$gt`, `$not`, `$size`) when it meets an operator; a value is then
//! stored under the path those scopes spell. Scopes are popped on the way
//! back out, so sibling conditions on one field merge into one subdocument:
//! `Age > 21 && Age < 42` yields `{Age: {$gt: 21, $lt: 42}}`.

use mongo_bson::{Bson, Document};

use crate::error::{QueryError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Field(String),
    Operator(String),
}

impl Scope {
    fn key(&self) -> &str {
        match self {
            Scope::Field(name) | Scope::Operator(name) => name,
        }
    }

    fn is_field(&self) -> bool {
        matches!(self, Scope::Field(_))
    }
}

#[derive(Debug, Default)]
pub struct ConditionBuilder {
    query: Document,
    scopes: Vec<Scope>,
}

impl ConditionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` with `scope` pushed; the stack is restored even when `f`
    /// fails.
    pub fn with_scope<T>(&mut self, scope: Scope, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let depth = self.enter(scope);
        let result = f(self);
        self.leave(depth);
        result
    }

    /// Pushes `scope` and returns the depth to restore with [`leave`].
    /// Prefer [`with_scope`] unless the nested work needs more than the
    /// builder.
    ///
    /// [`leave`]: ConditionBuilder::leave
    /// [`with_scope`]: ConditionBuilder::with_scope
    pub fn enter(&mut self, scope: Scope) -> usize {
        let depth = self.scopes.len();
        self.scopes.push(scope);
        depth
    }

    pub fn leave(&mut self, depth: usize) {
        self.scopes.truncate(depth);
    }

    /// Key path of the current position: field segments first, then
    /// operators, so `$not` and `$size` nest under the field they apply to.
    fn path(&self) -> Vec<&str> {
        let fields = self.scopes.iter().filter(|s| s.is_field());
        let operators = self.scopes.iter().filter(|s| !s.is_field());
        fields.chain(operators).map(Scope::key).collect()
    }

    pub fn add_condition(&mut self, value: Bson) -> Result<()> {
        let path: Vec<String> = self.path().into_iter().map(str::to_owned).collect();
        let Some((last, parents)) = path.split_last() else {
            return Err(QueryError::invalid("a condition needs a field"));
        };

        let mut target = &mut self.query;
        for key in parents {
            let slot = target
                .entry(key.clone())
                .or_insert_with(|| Bson::Document(Document::new()));
            target = match slot {
                Bson::Document(inner) => inner,
                _ => return Err(conflict(&path)),
            };
        }

        match target.get(last) {
            Some(existing) if *existing == value => Ok(()),
            Some(_) => Err(conflict(&path)),
            None => {
                target.insert(last.clone(), value);
                Ok(())
            }
        }
    }

    pub fn query(&self) -> &Document {
        &self.query
    }

    pub fn into_query(self) -> Document {
        self.query
    }
}

fn conflict(path: &[String]) -> QueryError {
    QueryError::invalid(format!("conflicting conditions on {}", path.join(".")))
}
