//! Query composition.
//!
//! A [`Queryable`] records operators as nested selects: the collection is
//! aliased `t0`, the initial select `t1`, and every operator wraps what
//! came before in a fresh select. Lambdas receive the current row, which is
//! a row parameter until [`Queryable::select`] replaces it with the
//! projected shape.

use mongo_mapping::MemberType;

use crate::expr::{CollectionExpr, Expr, FieldDeclaration, OrderExpr, OrderType, ProjectionExpr, SelectExpr};

#[derive(Debug, Clone)]
pub struct Queryable {
    select: SelectExpr,
    projector: Option<Expr>,
    next_alias: usize,
}

impl Queryable {
    pub fn new(database: impl Into<String>, collection_name: impl Into<String>, document_type: MemberType) -> Self {
        let collection = Expr::Collection(CollectionExpr {
            alias: "t0".into(),
            database: database.into(),
            collection_name: collection_name.into(),
            document_type,
        });
        Self {
            select: SelectExpr::new("t1", collection),
            projector: None,
            next_alias: 2,
        }
    }

    /// Query over plain documents.
    pub fn documents(database: impl Into<String>, collection_name: impl Into<String>) -> Self {
        Self::new(database, collection_name, MemberType::Document)
    }

    /// Value handed to lambdas for rows of the current select.
    fn row(&self) -> Expr {
        match &self.projector {
            Some(projector) => projector.clone(),
            None => Expr::param(self.select.alias.clone()),
        }
    }

    fn wrap(self, configure: impl FnOnce(&mut SelectExpr)) -> Self {
        let mut select = SelectExpr::new(format!("t{}", self.next_alias), self.select.into());
        configure(&mut select);
        Self {
            select,
            projector: self.projector,
            next_alias: self.next_alias + 1,
        }
    }

    pub fn filter(self, predicate: impl FnOnce(Expr) -> Expr) -> Self {
        let predicate = predicate(self.row());
        self.wrap(|select| select.filter = Some(predicate))
    }

    fn ordered(self, order_type: OrderType, key: impl FnOnce(Expr) -> Expr) -> Self {
        let ordering = OrderExpr::new(order_type, key(self.row()));
        self.wrap(|select| select.order_by = vec![ordering])
    }

    pub fn order_by(self, key: impl FnOnce(Expr) -> Expr) -> Self {
        self.ordered(OrderType::Ascending, key)
    }

    pub fn order_by_descending(self, key: impl FnOnce(Expr) -> Expr) -> Self {
        self.ordered(OrderType::Descending, key)
    }

    /// Adds a secondary ordering to the current select.
    pub fn then_by(mut self, key: impl FnOnce(Expr) -> Expr) -> Self {
        let ordering = OrderExpr::new(OrderType::Ascending, key(self.row()));
        self.select.order_by.push(ordering);
        self
    }

    pub fn then_by_descending(mut self, key: impl FnOnce(Expr) -> Expr) -> Self {
        let ordering = OrderExpr::new(OrderType::Descending, key(self.row()));
        self.select.order_by.push(ordering);
        self
    }

    pub fn skip(self, count: i32) -> Self {
        self.wrap(|select| select.skip = Some(Expr::from(count)))
    }

    pub fn take(self, count: i32) -> Self {
        self.wrap(|select| select.take = Some(Expr::from(count)))
    }

    pub fn distinct(self) -> Self {
        self.wrap(|select| select.distinct = true)
    }

    /// Groups rows by `keys` and computes the named `aggregates` per group.
    /// Grouped queries run as map/reduce.
    pub fn group_by<K, A>(mut self, keys: K, aggregates: A) -> Self
    where
        K: FnOnce(Expr) -> Vec<Expr>,
        A: FnOnce(Expr) -> Vec<(String, Expr)>,
    {
        let keys = keys(self.row());
        let fields: Vec<FieldDeclaration> = aggregates(self.row())
            .into_iter()
            .map(|(name, expr)| FieldDeclaration::new(name, expr))
            .collect();
        self.projector = None;
        self.wrap(|select| {
            select.group_by = Some(keys);
            select.fields = fields;
        })
    }

    /// Shapes every result row; the returned expression becomes the row of
    /// later operators.
    pub fn select(mut self, projector: impl FnOnce(Expr) -> Expr) -> Self {
        self.projector = Some(projector(self.row()));
        self
    }

    /// The composed query tree.
    pub fn expression(&self) -> Expr {
        match &self.projector {
            Some(projector) => Expr::Projection(Box::new(ProjectionExpr {
                source: self.select.clone(),
                projector: projector.clone(),
            })),
            None => Expr::Select(Box::new(self.select.clone())),
        }
    }
}
