//! Hoisting of orderings to the outermost query.
//!
//! A query document carries a single flat sort specification, so orderings
//! declared on nested selects are gathered while walking out of the tree
//! and re-bound to each enclosing select's alias on the way. Grouping and
//! `distinct` stop orderings from passing; a select that skips or takes
//! keeps the orderings gathered so far, since they decide which rows it
//! sees.

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::error::Result;
use crate::expr::{Expr, FieldDeclaration, OrderExpr, SelectExpr};
use crate::visitor::{walk_select, ExprFolder};

#[derive(Debug, Default)]
pub struct OrderByRewriter {
    gathered: Option<Vec<OrderExpr>>,
    unique_fields: HashSet<(String, String)>,
    is_outermost: bool,
}

impl OrderByRewriter {
    pub fn rewrite(expr: Expr) -> Result<Expr> {
        let mut rewriter = OrderByRewriter {
            is_outermost: true,
            ..Default::default()
        };
        rewriter.fold_expr(expr)
    }

    /// Places `orderings` in front of the gathered ones, skipping fields
    /// already ordered on.
    fn prepend(&mut self, orderings: &[OrderExpr]) {
        let gathered = self.gathered.get_or_insert_with(|| {
            self.unique_fields.clear();
            Vec::new()
        });
        for ordering in orderings.iter().rev() {
            if let Some(field) = ordering.expression.as_field() {
                if !self.unique_fields.insert((field.alias.clone(), field.name.clone())) {
                    continue;
                }
            }
            gathered.insert(0, ordering.clone());
        }
    }

    fn rewrite_select(&mut self, select: SelectExpr, is_outermost: bool) -> Result<SelectExpr> {
        let mut select = walk_select(self, select)?;

        let has_group_by = select.group_by.is_some();
        let can_have_orderings = is_outermost || select.take.is_some() || select.skip.is_some();
        let can_receive_orderings = can_have_orderings && !has_group_by && !select.distinct;
        let can_pass_orderings = !is_outermost && !has_group_by && !select.distinct;

        if !select.order_by.is_empty() {
            let own = select.order_by.clone();
            self.prepend(&own);
        }

        let orderings = if can_receive_orderings {
            self.gathered.clone().unwrap_or_default()
        } else if can_have_orderings {
            std::mem::take(&mut select.order_by)
        } else {
            Vec::new()
        };

        if let Some(gathered) = self.gathered.take() {
            if can_pass_orderings {
                let produced = produced_aliases(select.from.as_ref());
                let fields = std::mem::take(&mut select.fields);
                let (fields, rebound) = rebind(gathered, &select.alias, &produced, fields);
                trace!(alias = %select.alias, count = rebound.len(), "passing orderings outward");
                self.prepend(&rebound);
                select.fields = fields;
            }
        }

        select.order_by = orderings;
        if is_outermost {
            debug!(count = select.order_by.len(), "hoisted orderings");
        }
        Ok(select)
    }
}

impl ExprFolder for OrderByRewriter {
    fn fold_select(&mut self, select: SelectExpr) -> Result<SelectExpr> {
        let is_outermost = self.is_outermost;
        self.is_outermost = false;
        let result = self.rewrite_select(select, is_outermost);
        self.is_outermost = is_outermost;
        result
    }

    fn fold_subquery(&mut self, select: SelectExpr) -> Result<Expr> {
        let gathered = self.gathered.take();
        let unique_fields = std::mem::take(&mut self.unique_fields);
        let result = self.fold_select(select);
        self.gathered = gathered;
        self.unique_fields = unique_fields;
        Ok(Expr::Subquery(Box::new(result?)))
    }
}

/// Aliases a select can read from its source.
fn produced_aliases(from: Option<&Expr>) -> HashSet<String> {
    match from {
        Some(Expr::Collection(collection)) => HashSet::from([collection.alias.clone()]),
        Some(Expr::Select(select)) => HashSet::from([select.alias.clone()]),
        _ => HashSet::new(),
    }
}

/// Re-expresses `orderings` over the rows of the select `alias`. Orderings
/// on fields the select cannot see are dropped.
fn rebind(
    orderings: Vec<OrderExpr>,
    alias: &str,
    produced: &HashSet<String>,
    mut fields: Vec<FieldDeclaration>,
) -> (Vec<FieldDeclaration>, Vec<OrderExpr>) {
    let projects_row = fields.is_empty();
    let mut rebound = Vec::with_capacity(orderings.len());
    for ordering in orderings {
        let field = ordering.expression.as_field().cloned();
        if let Some(field) = &field {
            if !produced.contains(&field.alias) {
                trace!(alias = %field.alias, name = %field.name, "dropping ordering from another source");
                continue;
            }
        }

        let declared = fields
            .iter()
            .find(|decl| {
                decl.expression == ordering.expression
                    || matches!((&field, decl.expression.as_field()), (Some(f), Some(d)) if f == d)
            })
            .map(|decl| decl.name.clone());
        let expression = match (declared, &field) {
            (Some(name), _) => Expr::field(alias, name),
            (None, Some(field)) if projects_row => Expr::field(alias, field.name.clone()),
            (None, _) => {
                let name = match &field {
                    Some(field) => field.name.clone(),
                    None => format!("_$f{}", fields.len()),
                };
                fields.push(FieldDeclaration::new(name.clone(), ordering.expression.clone()));
                Expr::field(alias, name)
            }
        };
        rebound.push(OrderExpr::new(ordering.order_type, expression));
    }
    (fields, rebound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{CollectionExpr, OrderType};
    use mongo_mapping::MemberType;

    fn collection() -> Expr {
        Expr::Collection(CollectionExpr {
            alias: "t0".into(),
            database: "tests".into(),
            collection_name: "people".into(),
            document_type: MemberType::Document,
        })
    }

    fn ascending(alias: &str, name: &str) -> OrderExpr {
        OrderExpr::new(OrderType::Ascending, Expr::field(alias, name))
    }

    fn outermost(expr: Expr) -> SelectExpr {
        match OrderByRewriter::rewrite(expr).unwrap() {
            Expr::Select(select) => *select,
            other => panic!("expected a select, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_orderings_collapse() {
        let mut select = SelectExpr::new("t1", collection());
        select.order_by = vec![ascending("t0", "Age"), ascending("t0", "Age")];
        let rewritten = outermost(select.into());
        assert_eq!(rewritten.order_by, vec![ascending("t0", "Age")]);
    }

    #[test]
    fn inner_orderings_move_to_the_skipping_select() {
        let mut ordered = SelectExpr::new("t1", collection());
        ordered.order_by = vec![ascending("t0", "LastName")];
        let mut skipped = SelectExpr::new("t2", ordered.into());
        skipped.skip = Some(Expr::from(5));
        let mut taken = SelectExpr::new("t3", skipped.into());
        taken.take = Some(Expr::from(10));

        let rewritten = outermost(taken.into());
        assert_eq!(rewritten.order_by, vec![ascending("t2", "LastName")]);
        let Some(Expr::Select(skipped)) = &rewritten.from else {
            panic!("expected a nested select");
        };
        assert_eq!(skipped.order_by, vec![ascending("t1", "LastName")]);
        let Some(Expr::Select(ordered)) = &skipped.from else {
            panic!("expected a nested select");
        };
        assert!(ordered.order_by.is_empty());
        assert!(ordered.fields.is_empty());
    }

    #[test]
    fn distinct_blocks_orderings() {
        let mut ordered = SelectExpr::new("t1", collection());
        ordered.order_by = vec![ascending("t0", "Age")];
        let mut distinct = SelectExpr::new("t2", ordered.into());
        distinct.distinct = true;
        let rewritten = outermost(distinct.into());
        assert!(rewritten.order_by.is_empty());
    }

    #[test]
    fn computed_orderings_get_a_declared_field() {
        let mut projected = SelectExpr::new("t1", collection());
        projected.fields = vec![FieldDeclaration::new("Name", Expr::field("t0", "Name"))];
        projected.order_by = vec![OrderExpr::new(
            OrderType::Descending,
            Expr::field("t0", "Age") + 1,
        )];
        let outer = SelectExpr::new("t2", projected.into());

        let rewritten = outermost(outer.into());
        assert_eq!(
            rewritten.order_by,
            vec![OrderExpr::new(OrderType::Descending, Expr::field("t1", "_$f1"))]
        );
        let Some(Expr::Select(projected)) = &rewritten.from else {
            panic!("expected a nested select");
        };
        let names: Vec<&str> = projected.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["Name", "_$f1"]);
    }

    #[test]
    fn subquery_orderings_stay_local() {
        let mut inner = SelectExpr::new("s1", collection());
        inner.order_by = vec![ascending("t0", "Score")];
        let mut outer = SelectExpr::new("t1", collection());
        outer.filter = Some(Expr::Subquery(Box::new(inner)).equal(1));
        let rewritten = outermost(outer.into());
        assert!(rewritten.order_by.is_empty());
    }
}
