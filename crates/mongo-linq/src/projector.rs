//! Field selection for result projections.
//!
//! [`FieldProjector`] walks a bound projector expression twice. The
//! nominator marks, bottom-up, the nodes that may stand for a single
//! document field; the substitution pass then replaces each marked field by
//! a [`Expr::RowField`] placeholder and records it, so the query requests
//! only the fields the projection reads.

use std::collections::HashSet;

use mongo_bson::{Bson, Document};

use crate::error::Result;
use crate::eval::evaluate;
use crate::expr::{AggregateExpr, Expr, FieldDeclaration, FieldExpr};

/// Result of [`FieldProjector::project_fields`].
#[derive(Debug, Clone, PartialEq)]
pub struct FieldProjection {
    /// Fields read by the projector, in first-use order, without duplicates.
    pub fields: Vec<FieldExpr>,
    /// The projector with every field replaced by a row placeholder.
    pub projector: Expr,
    /// True when the projector reads the whole row.
    pub uses_row: bool,
}

impl FieldProjection {
    pub fn field_declarations(&self) -> Vec<FieldDeclaration> {
        self.fields
            .iter()
            .map(|field| FieldDeclaration::new(field.name.clone(), Expr::Field(field.clone())))
            .collect()
    }
}

pub struct FieldProjector<P> {
    can_be_field: P,
}

impl<P: Fn(&Expr) -> bool> FieldProjector<P> {
    pub fn new(can_be_field: P) -> Self {
        Self { can_be_field }
    }

    pub fn project_fields(&self, expr: &Expr) -> FieldProjection {
        let mut nominator = Nominator {
            can_be_field: &self.can_be_field,
            candidates: HashSet::new(),
        };
        nominator.nominate(expr);

        let mut substitution = Substitution {
            candidates: nominator.candidates,
            fields: Vec::new(),
            uses_row: false,
        };
        let projector = substitution.substitute(expr);
        FieldProjection {
            fields: substitution.fields,
            projector,
            uses_row: substitution.uses_row,
        }
    }
}

/// Projector over plain document fields.
pub fn project_document_fields(expr: &Expr) -> FieldProjection {
    FieldProjector::new(|e: &Expr| matches!(e, Expr::Field(_))).project_fields(expr)
}

struct Nominator<'p, P> {
    can_be_field: &'p P,
    candidates: HashSet<*const Expr>,
}

impl<P: Fn(&Expr) -> bool> Nominator<'_, P> {
    /// Returns true when `expr` or a descendant cannot be a field.
    fn nominate(&mut self, expr: &Expr) -> bool {
        let mut blocked = false;
        for child in expr.children() {
            blocked |= self.nominate(child);
        }
        if !blocked {
            if (self.can_be_field)(expr) {
                self.candidates.insert(expr as *const Expr);
            } else {
                blocked = true;
            }
        }
        blocked
    }
}

struct Substitution {
    candidates: HashSet<*const Expr>,
    fields: Vec<FieldExpr>,
    uses_row: bool,
}

impl Substitution {
    fn substitute(&mut self, expr: &Expr) -> Expr {
        if self.candidates.contains(&(expr as *const Expr)) {
            if let Expr::Field(field) = expr {
                if !self.fields.iter().any(|f| f.name == field.name) {
                    self.fields.push(field.clone());
                }
                return Expr::RowField(field.name.clone());
            }
        }
        match expr {
            Expr::Parameter(_) => {
                self.uses_row = true;
                expr.clone()
            }
            Expr::Member { expression, member } => Expr::Member {
                expression: Box::new(self.substitute(expression)),
                member: member.clone(),
            },
            Expr::Binary { op, left, right } => Expr::Binary {
                op: *op,
                left: Box::new(self.substitute(left)),
                right: Box::new(self.substitute(right)),
            },
            Expr::Unary { op, operand } => Expr::Unary {
                op: *op,
                operand: Box::new(self.substitute(operand)),
            },
            Expr::Call {
                method,
                object,
                arguments,
            } => Expr::Call {
                method: method.clone(),
                object: object.as_ref().map(|o| Box::new(self.substitute(o))),
                arguments: arguments.iter().map(|a| self.substitute(a)).collect(),
            },
            Expr::New(fields) => Expr::New(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), self.substitute(value)))
                    .collect(),
            ),
            Expr::Aggregate(aggregate) => Expr::Aggregate(AggregateExpr {
                argument: aggregate.argument.as_ref().map(|a| Box::new(self.substitute(a))),
                ..aggregate.clone()
            }),
            other => other.clone(),
        }
    }
}

/// Shapes decoded rows into projection results.
#[derive(Debug, Clone, PartialEq)]
pub struct Projector {
    expression: Expr,
}

impl Projector {
    pub fn new(expression: Expr) -> Self {
        Self { expression }
    }

    pub fn expression(&self) -> &Expr {
        &self.expression
    }

    pub fn project(&self, row: &Document) -> Result<Bson> {
        evaluate(&self.expression, Some(row))
    }

    /// Lazily projects every row; each item fails independently.
    pub fn project_rows<'a, I>(&'a self, rows: I) -> impl Iterator<Item = Result<Bson>> + 'a
    where
        I: IntoIterator<Item = Document>,
        I::IntoIter: 'a,
    {
        rows.into_iter().map(move |row| self.project(&row))
    }
}
