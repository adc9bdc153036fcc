//! Tree folding shared by the rewriting passes.
//!
//! A pass implements [`ExprFolder`] and overrides the hooks for the nodes it
//! rewrites; the `walk_*` functions rebuild every other node from its folded
//! children.

use crate::error::Result;
use crate::expr::{
    AggregateExpr, Expr, FieldDeclaration, OrderExpr, ProjectionExpr, SelectExpr,
};

pub trait ExprFolder {
    fn fold_expr(&mut self, expr: Expr) -> Result<Expr> {
        walk_expr(self, expr)
    }

    fn fold_select(&mut self, select: SelectExpr) -> Result<SelectExpr> {
        walk_select(self, select)
    }

    fn fold_subquery(&mut self, select: SelectExpr) -> Result<Expr> {
        Ok(Expr::Subquery(Box::new(self.fold_select(select)?)))
    }
}

fn fold_boxed<F: ExprFolder + ?Sized>(folder: &mut F, expr: Box<Expr>) -> Result<Box<Expr>> {
    folder.fold_expr(*expr).map(Box::new)
}

fn fold_option<F: ExprFolder + ?Sized>(folder: &mut F, expr: Option<Expr>) -> Result<Option<Expr>> {
    expr.map(|e| folder.fold_expr(e)).transpose()
}

fn fold_list<F: ExprFolder + ?Sized>(folder: &mut F, exprs: Vec<Expr>) -> Result<Vec<Expr>> {
    exprs.into_iter().map(|e| folder.fold_expr(e)).collect()
}

pub fn walk_expr<F: ExprFolder + ?Sized>(folder: &mut F, expr: Expr) -> Result<Expr> {
    Ok(match expr {
        Expr::Constant(_)
        | Expr::Parameter(_)
        | Expr::Field(_)
        | Expr::RowField(_)
        | Expr::Collection(_) => expr,
        Expr::Member { expression, member } => Expr::Member {
            expression: fold_boxed(folder, expression)?,
            member,
        },
        Expr::Binary { op, left, right } => Expr::Binary {
            op,
            left: fold_boxed(folder, left)?,
            right: fold_boxed(folder, right)?,
        },
        Expr::Unary { op, operand } => Expr::Unary {
            op,
            operand: fold_boxed(folder, operand)?,
        },
        Expr::Call {
            method,
            object,
            arguments,
        } => Expr::Call {
            method,
            object: object.map(|o| fold_boxed(folder, o)).transpose()?,
            arguments: fold_list(folder, arguments)?,
        },
        Expr::New(fields) => Expr::New(
            fields
                .into_iter()
                .map(|(name, value)| Ok((name, folder.fold_expr(value)?)))
                .collect::<Result<_>>()?,
        ),
        Expr::Select(select) => Expr::Select(Box::new(folder.fold_select(*select)?)),
        Expr::Projection(projection) => {
            let ProjectionExpr { source, projector } = *projection;
            Expr::Projection(Box::new(ProjectionExpr {
                source: folder.fold_select(source)?,
                projector: folder.fold_expr(projector)?,
            }))
        }
        Expr::Aggregate(aggregate) => Expr::Aggregate(AggregateExpr {
            argument: aggregate.argument.map(|a| fold_boxed(folder, a)).transpose()?,
            ..aggregate
        }),
        Expr::Subquery(select) => folder.fold_subquery(*select)?,
    })
}

/// Folds the source first, then the clauses in evaluation order.
pub fn walk_select<F: ExprFolder + ?Sized>(folder: &mut F, select: SelectExpr) -> Result<SelectExpr> {
    let from = fold_option(folder, select.from)?;
    let filter = fold_option(folder, select.filter)?;
    let group_by = select.group_by.map(|keys| fold_list(folder, keys)).transpose()?;
    let fields = select
        .fields
        .into_iter()
        .map(|decl| {
            Ok(FieldDeclaration {
                expression: folder.fold_expr(decl.expression)?,
                ..decl
            })
        })
        .collect::<Result<_>>()?;
    let order_by = select
        .order_by
        .into_iter()
        .map(|order| {
            Ok(OrderExpr {
                expression: folder.fold_expr(order.expression)?,
                ..order
            })
        })
        .collect::<Result<_>>()?;
    let skip = fold_option(folder, select.skip)?;
    let take = fold_option(folder, select.take)?;
    Ok(SelectExpr {
        alias: select.alias,
        fields,
        from,
        filter,
        order_by,
        group_by,
        distinct: select.distinct,
        skip,
        take,
    })
}
