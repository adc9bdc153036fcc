//! Constant folding of row-independent subtrees.

use mongo_bson::Bson;
use tracing::trace;

use crate::error::Result;
use crate::eval::evaluate;
use crate::expr::{Expr, Method};
use crate::visitor::{walk_expr, ExprFolder};

/// Replaces every subtree that does not read a row with the constant it
/// evaluates to, so captured locals and member chains on them reach the
/// formatter as plain values.
#[derive(Debug, Default)]
pub struct PartialEvaluator {
    folded: usize,
}

impl PartialEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate(&mut self, expr: Expr) -> Result<Expr> {
        self.folded = 0;
        let result = self.fold_expr(expr)?;
        trace!(folded = self.folded, "partial evaluation done");
        Ok(result)
    }

    /// Number of nodes folded by the last run.
    pub fn folded(&self) -> usize {
        self.folded
    }
}

fn is_constant(expr: &Expr) -> bool {
    matches!(expr, Expr::Constant(_))
}

/// True when `expr` is an operator node whose operands are all constants.
fn can_fold(expr: &Expr) -> bool {
    match expr {
        Expr::Member { expression, .. } => is_constant(expression),
        Expr::Binary { left, right, .. } => is_constant(left) && is_constant(right),
        Expr::Unary { operand, .. } => is_constant(operand),
        Expr::Call {
            method: Method::Other(_),
            ..
        } => false,
        Expr::Call { object, arguments, .. } => {
            object.as_deref().map_or(true, is_constant) && arguments.iter().all(is_constant)
        }
        Expr::New(fields) => fields.iter().all(|(_, value)| is_constant(value)),
        _ => false,
    }
}

impl ExprFolder for PartialEvaluator {
    fn fold_expr(&mut self, expr: Expr) -> Result<Expr> {
        let expr = walk_expr(self, expr)?;
        if !can_fold(&expr) {
            return Ok(expr);
        }
        let value: Bson = evaluate(&expr, None)?;
        self.folded += 1;
        Ok(Expr::Constant(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongo_bson::doc;

    #[test]
    fn folds_member_chains_on_constants() {
        let local = Expr::constant(doc! { "Test" => doc! { "Age" => 21 } });
        let predicate = Expr::param("p").member("Age").gt(local.member("Test").member("Age"));
        let mut evaluator = PartialEvaluator::new();
        let folded = evaluator.evaluate(predicate).unwrap();
        assert_eq!(folded, Expr::param("p").member("Age").gt(21));
        assert_eq!(evaluator.folded(), 2);
    }

    #[test]
    fn leaves_row_dependent_nodes() {
        let expr = Expr::param("p").member("Age") + (Expr::from(1) + 2);
        let folded = PartialEvaluator::new().evaluate(expr).unwrap();
        assert_eq!(folded, Expr::param("p").member("Age") + 3);
    }

    #[test]
    fn unknown_methods_are_kept() {
        let expr = Expr::call("Trim", Some(Expr::from(" a ")), vec![]);
        let folded = PartialEvaluator::new().evaluate(expr.clone()).unwrap();
        assert_eq!(folded, expr);
    }
}
