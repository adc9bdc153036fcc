//! Query document generation from bound selects.
//!
//! The formatter walks the select chain from the collection outward and
//! feeds every clause into one [`QueryObject`]: filters become conditions
//! through the [`ConditionBuilder`] scope stack, field declarations become
//! the inclusion document, orderings the sort document.

use mongo_bson::{Bson, Regex};
use tracing::trace;

use crate::condition::{ConditionBuilder, Scope};
use crate::error::{QueryError, Result};
use crate::expr::{BinaryOp, Expr, FieldExpr, Method, SelectExpr, UnaryOp};
use crate::javascript::{escape_regex, field_required};
use crate::query_object::QueryObject;

/// The field side of a comparison.
enum Operand<'a> {
    Field(&'a FieldExpr),
    /// `Length`, `Count` or `Count()` of an array field.
    Size(&'a FieldExpr),
}

fn operand(expr: &Expr) -> Option<Operand<'_>> {
    match expr {
        Expr::Field(field) => Some(Operand::Field(field)),
        Expr::Member { expression, member } if member == "Length" || member == "Count" => {
            expression.as_field().map(Operand::Size)
        }
        Expr::Call {
            method: Method::Count,
            object: None,
            arguments,
        } => match arguments.as_slice() {
            [source] => source.as_field().map(Operand::Size),
            _ => None,
        },
        _ => None,
    }
}

fn operator_key(op: BinaryOp) -> Option<&'static str> {
    match op {
        BinaryOp::GreaterThan => Some("$gt"),
        BinaryOp::GreaterThanOrEqual => Some("$gte"),
        BinaryOp::LessThan => Some("$lt"),
        BinaryOp::LessThanOrEqual => Some("$lte"),
        BinaryOp::NotEqual => Some("$ne"),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct QueryFormatter {
    conditions: ConditionBuilder,
    query: QueryObject,
}

impl QueryFormatter {
    /// Formats a select, or the source of a projection. The projector is
    /// left for the caller to attach.
    pub fn format(expr: &Expr) -> Result<QueryObject> {
        match expr {
            Expr::Select(select) => Self::format_select(select),
            Expr::Projection(projection) => Self::format_select(&projection.source),
            other => Err(QueryError::invalid(format!(
                "cannot format a {} expression as a query",
                other.kind()
            ))),
        }
    }

    pub fn format_select(select: &SelectExpr) -> Result<QueryObject> {
        let mut formatter = QueryFormatter::default();
        formatter.visit_select(select, true)?;
        let mut query = formatter.query;
        query.query = formatter.conditions.into_query();
        Ok(query)
    }

    fn visit_source(&mut self, source: Option<&Expr>) -> Result<()> {
        match source {
            Some(Expr::Collection(collection)) => {
                self.query.database = collection.database.clone();
                self.query.collection_name = collection.collection_name.clone();
                self.query.document_type = collection.document_type.clone();
                Ok(())
            }
            Some(Expr::Select(select)) => self.visit_select(select, false),
            _ => Err(QueryError::invalid("Select source is not valid type")),
        }
    }

    fn visit_select(&mut self, select: &SelectExpr, is_outermost: bool) -> Result<()> {
        if select.group_by.is_some() && !is_outermost {
            return Err(QueryError::not_supported(
                "Grouping is only supported on the outermost query.",
            ));
        }
        self.visit_source(select.from.as_ref())?;
        if let Some(filter) = &select.filter {
            self.visit_condition(filter)?;
        }

        for decl in &select.fields {
            if let Some(field) = decl.expression.as_field() {
                self.query.fields.insert(field.name.clone(), 1);
            }
        }

        for order in &select.order_by {
            let field = order.expression.as_field().ok_or_else(|| {
                QueryError::invalid("Could not find the field name from the order expression.")
            })?;
            self.query.add_order_by(field.name.clone(), order.order_type.direction());
        }

        let take = select.take.as_ref().map(|e| constant_count(e, "take")).transpose()?;
        let skip = select.skip.as_ref().map(|e| constant_count(e, "skip")).transpose()?;
        if let Some(skip) = skip {
            self.apply_skip(skip)?;
        }
        if let Some(take) = take {
            self.apply_take(take)?;
        }
        trace!(alias = %select.alias, "formatted select");
        Ok(())
    }

    /// A skip applied over an earlier take consumes part of that take.
    fn apply_skip(&mut self, skip: i32) -> Result<()> {
        if self.query.number_to_limit > 0 {
            let remaining = self.query.number_to_limit - skip;
            if remaining <= 0 {
                return Err(QueryError::not_supported(
                    "A skip that passes the end of an earlier take is not supported.",
                ));
            }
            self.query.number_to_limit = remaining;
        }
        self.query.number_to_skip = self
            .query
            .number_to_skip
            .checked_add(skip)
            .ok_or_else(|| QueryError::not_supported("The combined skip overflows the skip count."))?;
        Ok(())
    }

    /// A limit of zero means "no limit" on the wire, so an empty take has no encoding.
    fn apply_take(&mut self, take: i32) -> Result<()> {
        if take == 0 {
            return Err(QueryError::not_supported("A take of zero documents is not supported."));
        }
        self.query.number_to_limit = match self.query.number_to_limit {
            0 => take,
            limit => limit.min(take),
        };
        Ok(())
    }

    fn visit_condition(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Binary { op, left, right } if op.is_conjunction() => {
                self.visit_condition(left)?;
                self.visit_condition(right)
            }
            Expr::Binary { op, left, right } if op.is_comparison() => self.visit_comparison(*op, left, right),
            Expr::Binary { op, .. } => Err(QueryError::not_supported(format!(
                "The operation {op} is not supported."
            ))),
            Expr::Unary { op: UnaryOp::Not, operand } => {
                self.with_scope(Scope::Operator("$not".into()), |f| f.visit_condition(operand))
            }
            Expr::Unary { op, .. } => Err(QueryError::not_supported(format!(
                "The unary operator {op} is not supported."
            ))),
            Expr::Call {
                method,
                object,
                arguments,
            } => self.visit_call(method, object.as_deref(), arguments),
            Expr::Constant(Bson::Boolean(true)) => Ok(()),
            other => Err(QueryError::not_supported(format!(
                "The expression {} is not supported.",
                other.kind()
            ))),
        }
    }

    /// Condition scope spanning nested formatter work.
    fn with_scope<T>(&mut self, scope: Scope, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let depth = self.conditions.enter(scope);
        let result = f(self);
        self.conditions.leave(depth);
        result
    }

    fn visit_comparison(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<()> {
        let (field, value, op) = match (operand(left), operand(right)) {
            (Some(field), None) => (field, right, op),
            (None, Some(field)) => (field, left, op.mirror()),
            (Some(_), Some(_)) => {
                return Err(QueryError::invalid("a comparison cannot relate two fields"));
            }
            (None, None) => return Err(QueryError::invalid("a comparison needs a field on one side")),
        };
        let value = value
            .as_constant()
            .cloned()
            .ok_or_else(|| QueryError::invalid("a field can only be compared with a constant"))?;

        match field {
            Operand::Field(field) => self.conditions.with_scope(Scope::Field(field.name.clone()), |b| {
                match operator_key(op) {
                    Some(key) => b.with_scope(Scope::Operator(key.into()), |b| b.add_condition(value)),
                    None => b.add_condition(value),
                }
            }),
            Operand::Size(field) => {
                if op != BinaryOp::Equal {
                    return Err(QueryError::not_supported(format!(
                        "The operation {op} is not supported for a size."
                    )));
                }
                self.conditions.with_scope(Scope::Field(field.name.clone()), |b| {
                    b.with_scope(Scope::Operator("$size".into()), |b| b.add_condition(value))
                })
            }
        }
    }

    fn visit_call(&mut self, method: &Method, object: Option<&Expr>, arguments: &[Expr]) -> Result<()> {
        let (field, pattern) = match method {
            Method::StartsWith | Method::EndsWith | Method::Contains => {
                let field = object.and_then(Expr::as_field).ok_or_else(|| field_required(method))?;
                let value = escape_regex(constant_string(arguments.first())?);
                let pattern = match method {
                    Method::StartsWith => format!("^{value}"),
                    Method::EndsWith => format!("{value}$"),
                    _ => value,
                };
                (field, pattern)
            }
            Method::IsMatch => {
                if object.is_some() {
                    return Err(QueryError::invalid("Only the static Regex.IsMatch is supported."));
                }
                let field = arguments
                    .first()
                    .and_then(Expr::as_field)
                    .ok_or_else(|| field_required(method))?;
                (field, constant_string(arguments.get(1))?.to_owned())
            }
            other => {
                return Err(QueryError::not_supported(format!(
                    "The method {other} is not supported."
                )))
            }
        };
        let value = Bson::RegularExpression(Regex::new(pattern, ""));
        self.conditions
            .with_scope(Scope::Field(field.name.clone()), |b| b.add_condition(value))
    }
}

fn constant_string(expr: Option<&Expr>) -> Result<&str> {
    expr.and_then(Expr::as_constant)
        .and_then(Bson::as_str)
        .ok_or_else(|| QueryError::invalid("a string predicate needs a constant string argument"))
}

fn constant_count(expr: &Expr, clause: &str) -> Result<i32> {
    expr.as_constant()
        .and_then(Bson::as_i32)
        .filter(|n| *n >= 0)
        .ok_or_else(|| QueryError::invalid(format!("{clause} needs a non-negative integer constant")))
}
