//! The composed shape of a query before compilation.
//!
//! A [`QueryModel`] is what a [`crate::Query`] accumulates while it is being
//! composed: one main source, body clauses in declaration order, a selector
//! and result operators. Nothing here does I/O.

use crate::expr::{Expr, SourceId};
use crate::value::Value;

/// What the main source yields per row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemShape {
    /// Generic row addressable by column name
    Row,
    /// Generic row addressable by position only
    Headerless,
    /// Typed record described by a schema
    Record(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ordering {
    pub expr: Expr,
    pub direction: OrderDirection,
}

/// A second source joined into the query
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub source: SourceId,
    pub table: String,
    pub outer_key: Expr,
    pub inner_key: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BodyClause {
    Where(Expr),
    OrderBy(Vec<Ordering>),
    Join(JoinClause),
    GroupJoin(JoinClause),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultOperator {
    Take(usize),
    Skip(usize),
    First,
    Last,
    Count,
    LongCount,
    Sum,
    Min,
    Max,
    Average,
    Distinct,
    Reverse,
    Contains(Value),
    DefaultIfEmpty,
    GroupBy(Expr),
    Union(Box<QueryModel>),
    Intersect(Box<QueryModel>),
    Except(Box<QueryModel>),
    OfType(String),
    Single,
}

impl ResultOperator {
    /// Operators whose result is a single scalar computed by the source
    pub fn is_scalar_aggregate(&self) -> bool {
        matches!(
            self,
            ResultOperator::Count
                | ResultOperator::LongCount
                | ResultOperator::Sum
                | ResultOperator::Min
                | ResultOperator::Max
                | ResultOperator::Average
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryModel {
    pub shape: ItemShape,
    /// Selector over the main source; `None` is the identity projection
    pub selector: Option<Expr>,
    pub body: Vec<BodyClause>,
    pub operators: Vec<ResultOperator>,
}

impl QueryModel {
    pub fn new(shape: ItemShape) -> Self {
        Self {
            shape,
            selector: None,
            body: Vec::new(),
            operators: Vec::new(),
        }
    }

    /// Selector, or the main source item when none was given
    pub fn selector_or_identity(&self) -> Expr {
        self.selector
            .clone()
            .unwrap_or(Expr::Source(SourceId::MAIN))
    }

    /// True when a non-identity selector is present
    pub fn has_projection(&self) -> bool {
        !matches!(self.selector, None | Some(Expr::Source(SourceId::MAIN)))
    }

    pub fn has_operator(&self, predicate: impl Fn(&ResultOperator) -> bool) -> bool {
        self.operators.iter().any(predicate)
    }
}
