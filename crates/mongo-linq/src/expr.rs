//! Query expression tree.
//!
//! Nodes are plain values; every rewriting pass consumes a tree and returns
//! a new one. The builder methods on [`Expr`] compose the shapes a query
//! author writes (member access on a row parameter, comparisons, string
//! predicates), while [`SelectExpr`] and friends are produced by
//! [`Queryable`](crate::Queryable) and the rewriting passes.

use std::fmt;
use std::ops;

use mongo_bson::{Bson, Document, ObjectId};
use mongo_mapping::MemberType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    And,
    AndAlso,
    Or,
    OrElse,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    ExclusiveOr,
    LeftShift,
    RightShift,
    Coalesce,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::GreaterThan
                | BinaryOp::GreaterThanOrEqual
                | BinaryOp::LessThan
                | BinaryOp::LessThanOrEqual
        )
    }

    pub fn is_conjunction(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::AndAlso)
    }

    /// The operator that gives the same result with the operands swapped.
    pub fn mirror(self) -> Self {
        match self {
            BinaryOp::GreaterThan => BinaryOp::LessThan,
            BinaryOp::GreaterThanOrEqual => BinaryOp::LessThanOrEqual,
            BinaryOp::LessThan => BinaryOp::GreaterThan,
            BinaryOp::LessThanOrEqual => BinaryOp::GreaterThanOrEqual,
            other => other,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Negate,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Methods with a known translation; anything else is carried by name and
/// rejected by the formatters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    StartsWith,
    EndsWith,
    Contains,
    /// Static `IsMatch(input, pattern)`.
    IsMatch,
    /// `Count(source)`; a second argument is a predicate.
    Count,
    Other(String),
}

impl Method {
    pub fn name(&self) -> &str {
        match self {
            Method::StartsWith => "StartsWith",
            Method::EndsWith => "EndsWith",
            Method::Contains => "Contains",
            Method::IsMatch => "IsMatch",
            Method::Count => "Count",
            Method::Other(name) => name,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderType {
    Ascending,
    Descending,
}

impl OrderType {
    /// Sort-document value.
    pub fn direction(self) -> i32 {
        match self {
            OrderType::Ascending => 1,
            OrderType::Descending => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateType {
    Count,
    Sum,
    Min,
    Max,
    Average,
}

impl fmt::Display for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A document field read from the rows produced by the source `alias`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldExpr {
    pub alias: String,
    /// Dotted path in wire names.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionExpr {
    pub alias: String,
    pub database: String,
    pub collection_name: String,
    pub document_type: MemberType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDeclaration {
    pub name: String,
    pub expression: Expr,
}

impl FieldDeclaration {
    pub fn new(name: impl Into<String>, expression: Expr) -> Self {
        Self {
            name: name.into(),
            expression,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderExpr {
    pub order_type: OrderType,
    pub expression: Expr,
}

impl OrderExpr {
    pub fn new(order_type: OrderType, expression: Expr) -> Self {
        Self {
            order_type,
            expression,
        }
    }
}

/// One query level. A select without field declarations produces the rows
/// of its source unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectExpr {
    pub alias: String,
    pub fields: Vec<FieldDeclaration>,
    pub from: Option<Expr>,
    pub filter: Option<Expr>,
    pub order_by: Vec<OrderExpr>,
    pub group_by: Option<Vec<Expr>>,
    pub distinct: bool,
    pub skip: Option<Expr>,
    pub take: Option<Expr>,
}

impl SelectExpr {
    pub fn new(alias: impl Into<String>, from: Expr) -> Self {
        Self {
            alias: alias.into(),
            fields: Vec::new(),
            from: Some(from),
            filter: None,
            order_by: Vec::new(),
            group_by: None,
            distinct: false,
            skip: None,
            take: None,
        }
    }

    /// Alias of the rows this select reads.
    pub fn from_alias(&self) -> Option<&str> {
        match &self.from {
            Some(Expr::Collection(collection)) => Some(&collection.alias),
            Some(Expr::Select(select)) => Some(&select.alias),
            _ => None,
        }
    }
}

/// A select together with the expression that shapes each result row.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionExpr {
    pub source: SelectExpr,
    pub projector: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateExpr {
    pub aggregate_type: AggregateType,
    pub argument: Option<Box<Expr>>,
    pub distinct: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant(Bson),
    /// The row variable of a lambda body.
    Parameter(String),
    Member {
        expression: Box<Expr>,
        member: String,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        method: Method,
        /// Receiver; `None` for static calls.
        object: Option<Box<Expr>>,
        arguments: Vec<Expr>,
    },
    /// Anonymous object construction.
    New(Vec<(String, Expr)>),
    Field(FieldExpr),
    /// A dotted path into the materialized result row.
    RowField(String),
    Collection(CollectionExpr),
    Select(Box<SelectExpr>),
    Projection(Box<ProjectionExpr>),
    Aggregate(AggregateExpr),
    /// A nested select used as a value.
    Subquery(Box<SelectExpr>),
}

impl Expr {
    pub fn constant(value: impl Into<Bson>) -> Self {
        Expr::Constant(value.into())
    }

    pub fn param(name: impl Into<String>) -> Self {
        Expr::Parameter(name.into())
    }

    pub fn field(alias: impl Into<String>, name: impl Into<String>) -> Self {
        Expr::Field(FieldExpr {
            alias: alias.into(),
            name: name.into(),
        })
    }

    pub fn new_object<K: Into<String>>(fields: impl IntoIterator<Item = (K, Expr)>) -> Self {
        Expr::New(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn member(self, member: impl Into<String>) -> Self {
        Expr::Member {
            expression: Box::new(self),
            member: member.into(),
        }
    }

    /// `.Length` of a string or array.
    pub fn length(self) -> Self {
        self.member("Length")
    }

    /// `Count(self)`.
    pub fn count(self) -> Self {
        Expr::Call {
            method: Method::Count,
            object: None,
            arguments: vec![self],
        }
    }

    pub fn binary(op: BinaryOp, left: impl Into<Expr>, right: impl Into<Expr>) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left.into()),
            right: Box::new(right.into()),
        }
    }

    pub fn equal(self, other: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::Equal, self, other)
    }

    pub fn not_equal(self, other: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::NotEqual, self, other)
    }

    pub fn gt(self, other: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::GreaterThan, self, other)
    }

    pub fn gte(self, other: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::GreaterThanOrEqual, self, other)
    }

    pub fn lt(self, other: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::LessThan, self, other)
    }

    pub fn lte(self, other: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::LessThanOrEqual, self, other)
    }

    /// Short-circuit conjunction.
    pub fn and(self, other: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::AndAlso, self, other)
    }

    /// Short-circuit disjunction.
    pub fn or(self, other: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::OrElse, self, other)
    }

    pub fn coalesce(self, other: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::Coalesce, self, other)
    }

    fn string_call(self, method: Method, value: impl Into<Expr>) -> Self {
        Expr::Call {
            method,
            object: Some(Box::new(self)),
            arguments: vec![value.into()],
        }
    }

    pub fn starts_with(self, value: impl Into<Expr>) -> Self {
        self.string_call(Method::StartsWith, value)
    }

    pub fn ends_with(self, value: impl Into<Expr>) -> Self {
        self.string_call(Method::EndsWith, value)
    }

    pub fn contains(self, value: impl Into<Expr>) -> Self {
        self.string_call(Method::Contains, value)
    }

    /// Static regular-expression match of `input` against `pattern`.
    pub fn is_match(input: impl Into<Expr>, pattern: impl Into<Expr>) -> Self {
        Expr::Call {
            method: Method::IsMatch,
            object: None,
            arguments: vec![input.into(), pattern.into()],
        }
    }

    /// A call without a translation of its own.
    pub fn call(name: impl Into<String>, object: Option<Expr>, arguments: Vec<Expr>) -> Self {
        Expr::Call {
            method: Method::Other(name.into()),
            object: object.map(Box::new),
            arguments,
        }
    }

    fn aggregate(aggregate_type: AggregateType, argument: Option<Expr>) -> Self {
        Expr::Aggregate(AggregateExpr {
            aggregate_type,
            argument: argument.map(Box::new),
            distinct: false,
        })
    }

    /// Number of rows in a group.
    pub fn count_rows() -> Self {
        Expr::aggregate(AggregateType::Count, None)
    }

    pub fn sum(argument: Expr) -> Self {
        Expr::aggregate(AggregateType::Sum, Some(argument))
    }

    pub fn min(argument: Expr) -> Self {
        Expr::aggregate(AggregateType::Min, Some(argument))
    }

    pub fn max(argument: Expr) -> Self {
        Expr::aggregate(AggregateType::Max, Some(argument))
    }

    pub fn average(argument: Expr) -> Self {
        Expr::aggregate(AggregateType::Average, Some(argument))
    }

    pub fn as_constant(&self) -> Option<&Bson> {
        match self {
            Expr::Constant(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_field(&self) -> Option<&FieldExpr> {
        match self {
            Expr::Field(field) => Some(field),
            _ => None,
        }
    }

    /// Operand nodes. Query-level nodes (collections, selects, projections,
    /// subqueries) are opaque and report none.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Member { expression, .. } => vec![expression.as_ref()],
            Expr::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::Unary { operand, .. } => vec![operand.as_ref()],
            Expr::Call { object, arguments, .. } => object.as_deref().into_iter().chain(arguments).collect(),
            Expr::New(fields) => fields.iter().map(|(_, value)| value).collect(),
            Expr::Aggregate(aggregate) => aggregate.argument.as_deref().into_iter().collect(),
            _ => Vec::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Expr::Constant(_) => "Constant",
            Expr::Parameter(_) => "Parameter",
            Expr::Member { .. } => "MemberAccess",
            Expr::Binary { .. } => "Binary",
            Expr::Unary { .. } => "Unary",
            Expr::Call { .. } => "Call",
            Expr::New(_) => "New",
            Expr::Field(_) => "Field",
            Expr::RowField(_) => "RowField",
            Expr::Collection(_) => "Collection",
            Expr::Select(_) => "Select",
            Expr::Projection(_) => "Projection",
            Expr::Aggregate(_) => "Aggregate",
            Expr::Subquery(_) => "Subquery",
        }
    }
}

macro_rules! expr_from_constant {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Expr {
                fn from(v: $ty) -> Self {
                    Expr::Constant(Bson::from(v))
                }
            }
        )*
    };
}

expr_from_constant!(&str, String, i32, i64, f64, bool, Document, ObjectId);

impl From<Bson> for Expr {
    fn from(v: Bson) -> Self {
        Expr::Constant(v)
    }
}

impl From<SelectExpr> for Expr {
    fn from(v: SelectExpr) -> Self {
        Expr::Select(Box::new(v))
    }
}

macro_rules! expr_binary_operator {
    ($($trait:ident, $method:ident, $op:ident;)*) => {
        $(
            impl<T: Into<Expr>> ops::$trait<T> for Expr {
                type Output = Expr;

                fn $method(self, rhs: T) -> Expr {
                    Expr::binary(BinaryOp::$op, self, rhs)
                }
            }
        )*
    };
}

expr_binary_operator! {
    Add, add, Add;
    Sub, sub, Subtract;
    Mul, mul, Multiply;
    Div, div, Divide;
    Rem, rem, Modulo;
    BitXor, bitxor, ExclusiveOr;
    Shl, shl, LeftShift;
    Shr, shr, RightShift;
}

impl ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(self),
        }
    }
}

impl ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Negate,
            operand: Box::new(self),
        }
    }
}
