use std::sync::Arc;

use mongo_mapping::MappingStore;
use tracing::debug;

use crate::binder::QueryBinder;
use crate::error::{QueryError, Result};
use crate::expr::{Expr, ProjectionExpr, SelectExpr};
use crate::formatter::QueryFormatter;
use crate::map_reduce::{MapReduceMapFunctionBuilder, MapReduceReduceFunctionBuilder};
use crate::order_by::OrderByRewriter;
use crate::partial_eval::PartialEvaluator;
use crate::projector::{project_document_fields, Projector};
use crate::query_object::QueryObject;
use crate::queryable::Queryable;

/// Translation settings.
#[derive(Clone, Default)]
pub struct TranslatorOptions {
    /// Class maps used to replace member names by their stored aliases.
    /// Without a store, member names are used as field names.
    pub mapping_store: Option<Arc<dyn MappingStore>>,
}

impl std::fmt::Debug for TranslatorOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslatorOptions")
            .field("mapping_store", &self.mapping_store.is_some())
            .finish()
    }
}

/// Compiles a query tree into a [`QueryObject`].
#[derive(Debug, Clone, Default)]
pub struct QueryTranslator {
    options: TranslatorOptions,
}

impl QueryTranslator {
    pub fn new(options: TranslatorOptions) -> Self {
        Self { options }
    }

    pub fn with_mapping_store(store: Arc<dyn MappingStore>) -> Self {
        Self::new(TranslatorOptions {
            mapping_store: Some(store),
        })
    }

    pub fn translate(&self, queryable: &Queryable) -> Result<QueryObject> {
        self.translate_expr(queryable.expression())
    }

    pub fn translate_expr(&self, expr: Expr) -> Result<QueryObject> {
        let mut evaluator = PartialEvaluator::new();
        let expr = evaluator.evaluate(expr)?;
        debug!(folded = evaluator.folded(), "partially evaluated");

        let expr = QueryBinder::new(self.options.mapping_store.as_deref()).bind(expr)?;
        let expr = OrderByRewriter::rewrite(expr)?;

        let (mut select, projector) = match expr {
            Expr::Select(select) => (*select, None),
            Expr::Projection(projection) => {
                let ProjectionExpr { source, projector } = *projection;
                (source, Some(projector))
            }
            other => {
                return Err(QueryError::invalid(format!(
                    "expected a query, found a {} expression",
                    other.kind()
                )))
            }
        };

        let projector = projector.map(|projector| project(&mut select, &projector));
        let mut query = QueryFormatter::format_select(&select)?;
        debug!(
            collection = %query.full_collection_name(),
            query = ?query.query,
            fields = query.fields.len(),
            order = query.order.len(),
            skip = query.number_to_skip,
            limit = query.number_to_limit,
            "formatted query"
        );
        query.projector = projector;

        if let Some(group_by) = &select.group_by {
            let map = MapReduceMapFunctionBuilder::new().build(&select.fields, group_by)?;
            let reduce = MapReduceReduceFunctionBuilder::new().build(&select.fields)?;
            debug!(map = %map, reduce = %reduce, "built map/reduce functions");
            query.map_function = Some(map);
            query.reduce_function = Some(reduce);
        }
        Ok(query)
    }
}

/// Restricts the outermost select to the fields `projector` reads and
/// returns the row projector.
fn project(select: &mut SelectExpr, projector: &Expr) -> Projector {
    let projection = project_document_fields(projector);
    if select.group_by.is_none() && !projection.uses_row {
        select.fields = projection.field_declarations();
    }
    Projector::new(projection.projector)
}
