//! Compiles query expression trees into MongoDB query documents.
//!
//! Queries are composed with [`Queryable`] and compiled by
//! [`QueryTranslator`], which runs the tree through constant folding,
//! field binding, ordering hoisting and field projection before
//! [`QueryFormatter`] writes the condition, field and sort documents.
//! Grouped queries additionally get map and reduce functions.
//!
//! # Example
//!
//! ```
//! use mongo_bson::doc;
//! use mongo_linq::{Queryable, QueryTranslator};
//!
//! let min_age = 21;
//! let query = Queryable::documents("tests", "people")
//!     .filter(|p| p.clone().member("Age").gt(min_age).and(p.member("Age").lt(42)))
//!     .order_by(|p| p.member("LastName"))
//!     .take(10);
//!
//! let compiled = QueryTranslator::default().translate(&query).unwrap();
//! assert_eq!(compiled.query, doc! { "Age" => doc! { "$gt" => 21, "$lt" => 42 } });
//! assert_eq!(compiled.order, doc! { "LastName" => 1 });
//! assert_eq!(compiled.number_to_limit, 10);
//! assert_eq!(compiled.full_collection_name(), "tests.people");
//! ```

pub mod binder;
pub mod condition;
pub mod error;
pub mod eval;
pub mod expr;
pub mod formatter;
pub mod javascript;
pub mod map_reduce;
pub mod order_by;
pub mod partial_eval;
pub mod projector;
pub mod query_object;
pub mod queryable;
pub mod translator;
pub mod visitor;

pub use binder::QueryBinder;
pub use condition::{ConditionBuilder, Scope};
pub use error::{QueryError, Result};
pub use eval::evaluate;
pub use expr::{
    AggregateExpr, AggregateType, BinaryOp, CollectionExpr, Expr, FieldDeclaration, FieldExpr, Method,
    OrderExpr, OrderType, ProjectionExpr, SelectExpr, UnaryOp,
};
pub use formatter::QueryFormatter;
pub use javascript::{JavaScript, JavascriptFormatter};
pub use map_reduce::{MapReduceMapFunctionBuilder, MapReduceReduceFunctionBuilder};
pub use order_by::OrderByRewriter;
pub use partial_eval::PartialEvaluator;
pub use projector::{project_document_fields, FieldProjection, FieldProjector, Projector};
pub use query_object::QueryObject;
pub use queryable::Queryable;
pub use translator::{QueryTranslator, TranslatorOptions};
pub use visitor::{walk_expr, walk_select, ExprFolder};
