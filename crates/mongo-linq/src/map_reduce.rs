//! Map and reduce functions for grouped queries.
//!
//! The map function emits one `(key, value)` pair per document: the key is
//! built from the fields the group-by expressions read, the value holds one
//! initializer per aggregate declaration. The reduce function folds the
//! emitted values of one key back into a single value of the same shape.

use indexmap::IndexMap;
use tracing::trace;

use crate::error::{QueryError, Result};
use crate::expr::{AggregateExpr, AggregateType, Expr, FieldDeclaration};
use crate::javascript::{JavaScript, JavascriptFormatter};

#[derive(Debug, Default)]
pub struct MapReduceMapFunctionBuilder {
    formatter: JavascriptFormatter,
}

impl MapReduceMapFunctionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(&mut self, fields: &[FieldDeclaration], group_by: &[Expr]) -> Result<JavaScript> {
        let mut keys = IndexMap::new();
        for expr in group_by {
            self.collect_key_fields(expr, &mut keys)?;
        }

        let mut values = IndexMap::new();
        for decl in fields {
            let Expr::Aggregate(aggregate) = &decl.expression else {
                trace!(name = %decl.name, "skipping non-aggregate declaration");
                continue;
            };
            values.insert(decl.name.clone(), self.initializer(aggregate)?);
        }

        Ok(JavaScript(format!(
            "function() {{ emit({}, {}); }}",
            render(&keys, true),
            render(&values, false)
        )))
    }

    fn collect_key_fields(&mut self, expr: &Expr, keys: &mut IndexMap<String, String>) -> Result<()> {
        if let Expr::Field(field) = expr {
            keys.insert(field.name.clone(), self.formatter.format(expr)?);
            return Ok(());
        }
        for child in expr.children() {
            self.collect_key_fields(child, keys)?;
        }
        Ok(())
    }

    fn initializer(&mut self, aggregate: &AggregateExpr) -> Result<String> {
        match (aggregate.aggregate_type, aggregate.argument.as_deref()) {
            (AggregateType::Count, _) => Ok("1".to_owned()),
            (AggregateType::Sum | AggregateType::Min | AggregateType::Max, Some(argument)) => {
                self.formatter.format(argument)
            }
            (aggregate_type, _) => Err(unsupported(aggregate_type)),
        }
    }
}

/// `1` for an empty map, the bare value for a single group key, otherwise
/// an object literal.
fn render(map: &IndexMap<String, String>, is_group: bool) -> String {
    match map.len() {
        0 => "1".to_owned(),
        1 if is_group => map.values().next().cloned().unwrap_or_default(),
        _ => {
            let entries: Vec<String> = map.iter().map(|(k, v)| format!("\"{k}\": {v}")).collect();
            format!("{{{}}}", entries.join(", "))
        }
    }
}

fn unsupported(aggregate_type: AggregateType) -> QueryError {
    QueryError::not_supported(format!("The aggregate {aggregate_type} is not supported."))
}

#[derive(Debug, Default)]
pub struct MapReduceReduceFunctionBuilder;

impl MapReduceReduceFunctionBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, fields: &[FieldDeclaration]) -> Result<JavaScript> {
        let mut steps = Vec::new();
        for decl in fields {
            let Expr::Aggregate(aggregate) = &decl.expression else {
                continue;
            };
            let name = &decl.name;
            let step = match aggregate.aggregate_type {
                AggregateType::Count | AggregateType::Sum => format!("result.{name} += values[i].{name};"),
                AggregateType::Min => format!("result.{name} = Math.min(result.{name}, values[i].{name});"),
                AggregateType::Max => format!("result.{name} = Math.max(result.{name}, values[i].{name});"),
                other => return Err(unsupported(other)),
            };
            steps.push(step);
        }

        if steps.is_empty() {
            return Ok(JavaScript::new("function(key, values) { return values[0]; }"));
        }
        Ok(JavaScript(format!(
            "function(key, values) {{ var result = values[0]; \
             for (var i = 1; i < values.length; i++) {{ {} }} return result; }}",
            steps.join(" ")
        )))
    }
}
