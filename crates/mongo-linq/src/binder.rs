//! Binding of row-parameter member chains to document fields.

use mongo_mapping::{MappingStore, MemberType};
use tracing::trace;

use crate::error::{QueryError, Result};
use crate::expr::{Expr, FieldExpr, ProjectionExpr, SelectExpr};
use crate::visitor::{walk_expr, walk_select, ExprFolder};

/// Members that stay member accesses on the bound field.
const LENGTH_MEMBERS: [&str; 2] = ["Length", "Count"];

struct BindScope {
    alias: String,
    document_type: Option<String>,
}

/// Rewrites `p.A.B` into the field `A.B` of the rows read by the enclosing
/// select. With a mapping store, member names are replaced by their wire
/// aliases along the path.
pub struct QueryBinder<'s> {
    store: Option<&'s dyn MappingStore>,
    scopes: Vec<BindScope>,
}

impl<'s> QueryBinder<'s> {
    pub fn new(store: Option<&'s dyn MappingStore>) -> Self {
        Self {
            store,
            scopes: Vec::new(),
        }
    }

    pub fn bind(&mut self, expr: Expr) -> Result<Expr> {
        self.fold_expr(expr)
    }

    fn with_scope<T>(&mut self, scope: BindScope, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.scopes.push(scope);
        let result = f(self);
        self.scopes.pop();
        result
    }

    fn current(&self) -> Result<&BindScope> {
        self.scopes
            .last()
            .ok_or_else(|| QueryError::invalid("a row parameter is used outside of a select"))
    }

    fn bind_chain(&self, segments: &[String]) -> Result<Expr> {
        if let [inner @ .., last] = segments {
            if !inner.is_empty() && LENGTH_MEMBERS.contains(&last.as_str()) {
                return Ok(self.bind_chain(inner)?.member(last.clone()));
            }
        }
        let scope = self.current()?;
        let name = self.wire_path(scope.document_type.as_deref(), segments)?;
        trace!(alias = %scope.alias, name = %name, "bound field");
        Ok(Expr::Field(FieldExpr {
            alias: scope.alias.clone(),
            name,
        }))
    }

    /// Dotted wire path for member names read from `document_type`.
    fn wire_path(&self, document_type: Option<&str>, segments: &[String]) -> Result<String> {
        let Some(store) = self.store else {
            return Ok(segments.join("."));
        };
        let mut current = document_type.map(str::to_owned);
        let mut path = Vec::with_capacity(segments.len());
        for segment in segments {
            let class_map = match current.take() {
                Some(type_name) => Some(store.class_map(&type_name)?),
                None => None,
            };
            match class_map.as_ref().and_then(|m| m.member_from_member_name(segment)) {
                Some(member) => {
                    current = class_of(member.member_type());
                    path.push(member.alias().to_owned());
                }
                None => path.push(segment.clone()),
            }
        }
        Ok(path.join("."))
    }
}

fn class_of(member_type: &MemberType) -> Option<String> {
    match member_type {
        MemberType::Class(name) => Some(name.clone()),
        MemberType::Collection(inner) => class_of(inner),
        _ => None,
    }
}

/// Member names of `expr` when it is a chain rooted at a row parameter.
fn parameter_chain(expr: &Expr) -> Option<Vec<String>> {
    match expr {
        Expr::Member { expression, member } => match expression.as_ref() {
            Expr::Parameter(_) => Some(vec![member.clone()]),
            inner => parameter_chain(inner).map(|mut chain| {
                chain.push(member.clone());
                chain
            }),
        },
        _ => None,
    }
}

/// Class-mapped type of the documents a select ultimately reads.
fn document_type(select: &SelectExpr) -> Option<String> {
    match &select.from {
        Some(Expr::Collection(collection)) => collection.document_type.class_name().map(str::to_owned),
        Some(Expr::Select(inner)) => document_type(inner),
        _ => None,
    }
}

impl ExprFolder for QueryBinder<'_> {
    fn fold_expr(&mut self, expr: Expr) -> Result<Expr> {
        if let Some(chain) = parameter_chain(&expr) {
            return self.bind_chain(&chain);
        }
        match expr {
            Expr::Member { expression, member } => {
                let inner = self.fold_expr(*expression)?;
                match inner {
                    // A member of a projected object is the expression that
                    // produced it.
                    Expr::New(fields) => fields
                        .into_iter()
                        .find(|(name, _)| *name == member)
                        .map(|(_, value)| value)
                        .ok_or_else(|| QueryError::invalid(format!("the projection has no member {member}"))),
                    Expr::Field(field) if !LENGTH_MEMBERS.contains(&member.as_str()) => Ok(Expr::Field(FieldExpr {
                        name: format!("{}.{}", field.name, member),
                        ..field
                    })),
                    other => Ok(other.member(member)),
                }
            }
            Expr::Projection(projection) => {
                let ProjectionExpr { source, projector } = *projection;
                let source = self.fold_select(source)?;
                let scope = BindScope {
                    alias: source.alias.clone(),
                    document_type: document_type(&source),
                };
                let projector = self.with_scope(scope, |binder| binder.fold_expr(projector))?;
                Ok(Expr::Projection(Box::new(ProjectionExpr { source, projector })))
            }
            other => walk_expr(self, other),
        }
    }

    fn fold_select(&mut self, select: SelectExpr) -> Result<SelectExpr> {
        let scope = BindScope {
            alias: select.from_alias().unwrap_or_default().to_owned(),
            document_type: document_type(&select),
        };
        self.with_scope(scope, |binder| walk_select(binder, select))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::CollectionExpr;

    fn select_over(document_type: MemberType, filter: Expr) -> SelectExpr {
        let collection = Expr::Collection(CollectionExpr {
            alias: "t0".into(),
            database: "tests".into(),
            collection_name: "people".into(),
            document_type,
        });
        let mut select = SelectExpr::new("t1", collection);
        select.filter = Some(filter);
        select
    }

    fn bound_filter(select: SelectExpr) -> Expr {
        let bound = QueryBinder::new(None).fold_select(select).unwrap();
        bound.filter.unwrap()
    }

    #[test]
    fn member_chains_become_dotted_fields() {
        let select = select_over(
            MemberType::Document,
            Expr::param("p").member("Address").member("City").equal("Paris"),
        );
        assert_eq!(bound_filter(select), Expr::field("t0", "Address.City").equal("Paris"));
    }

    #[test]
    fn length_stays_a_member_access() {
        let select = select_over(MemberType::Document, Expr::param("p").member("Tags").length().equal(2));
        assert_eq!(bound_filter(select), Expr::field("t0", "Tags").length().equal(2));
    }

    #[test]
    fn members_of_projected_objects_resolve_to_their_source() {
        let projected = Expr::new_object([("Name", Expr::param("p").member("FirstName"))]);
        let select = select_over(MemberType::Document, projected.member("Name").equal("Jack"));
        assert_eq!(bound_filter(select), Expr::field("t0", "FirstName").equal("Jack"));
    }

    #[test]
    fn parameters_outside_a_select_are_rejected() {
        let err = QueryBinder::new(None).bind(Expr::param("p").member("Age")).unwrap_err();
        assert!(matches!(err, QueryError::InvalidQuery(_)));
    }
}
