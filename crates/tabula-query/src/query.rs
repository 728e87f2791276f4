//! Lazy query handles.
//!
//! A [`Query`] only records clauses and operators. Nothing is compiled or
//! executed until a terminal method such as [`Query::to_vec`] or
//! [`Query::count`] runs. `Skip`, `Reverse` and `Last` are applied to the
//! materialized items in declaration order.

use crate::args::QueryArgs;
use crate::compile::{CompiledStatement, QueryCompiler, RenderedStatement};
use crate::driver::DriverError;
use crate::error::{QueryError, QueryResult};
use crate::executor::{self, Fetched};
use crate::expr::Expr;
use crate::materialize::{Materialized, QueryItem, ResultMaterializer};
use crate::model::{BodyClause, OrderDirection, Ordering, QueryModel, ResultOperator};
use crate::project::ProjectionCompiler;
use crate::session::QuerySession;
use crate::value::{FieldValue, Value};
use std::fmt;
use std::marker::PhantomData;

pub struct Query<'s, T> {
    session: &'s QuerySession,
    args: QueryArgs,
    model: QueryModel,
    item: PhantomData<fn() -> T>,
}

impl<'s, T: QueryItem> Query<'s, T> {
    pub(crate) fn new(session: &'s QuerySession, args: QueryArgs) -> Self {
        Self {
            session,
            args,
            model: QueryModel::new(T::shape()),
            item: PhantomData,
        }
    }

    /// Keep items matching `predicate`. Repeated filters are AND-combined.
    pub fn filter(self, predicate: Expr) -> Self {
        self.with_clause(BodyClause::Where(predicate))
    }

    pub fn order_by(self, key: Expr) -> Self {
        self.ordered(key, OrderDirection::Asc)
    }

    pub fn order_by_desc(self, key: Expr) -> Self {
        self.ordered(key, OrderDirection::Desc)
    }

    /// Secondary key. Only the first key of the first ordering reaches the
    /// source.
    pub fn then_by(self, key: Expr) -> Self {
        self.then_ordered(key, OrderDirection::Asc)
    }

    pub fn then_by_desc(self, key: Expr) -> Self {
        self.then_ordered(key, OrderDirection::Desc)
    }

    fn ordered(self, expr: Expr, direction: OrderDirection) -> Self {
        self.with_clause(BodyClause::OrderBy(vec![Ordering { expr, direction }]))
    }

    fn then_ordered(mut self, expr: Expr, direction: OrderDirection) -> Self {
        match self.model.body.last_mut() {
            Some(BodyClause::OrderBy(orderings)) => {
                orderings.push(Ordering { expr, direction });
                self
            }
            _ => self.ordered(expr, direction),
        }
    }

    pub fn take(self, count: usize) -> Self {
        self.with_operator(ResultOperator::Take(count))
    }

    pub fn skip(self, count: usize) -> Self {
        self.with_operator(ResultOperator::Skip(count))
    }

    pub fn reverse(self) -> Self {
        self.with_operator(ResultOperator::Reverse)
    }

    /// Append a raw body clause
    pub fn with_clause(mut self, clause: BodyClause) -> Self {
        self.model.body.push(clause);
        self
    }

    /// Append a raw result operator
    pub fn with_operator(mut self, operator: ResultOperator) -> Self {
        self.model.operators.push(operator);
        self
    }

    /// Project every item through `selector`
    pub fn select(mut self, selector: Expr) -> Selection<'s, T> {
        self.model.selector = Some(selector);
        Selection { query: self }
    }

    pub fn model(&self) -> &QueryModel {
        &self.model
    }

    pub fn args(&self) -> &QueryArgs {
        &self.args
    }

    /// Compiled clauses without the table. Does no I/O.
    pub fn compiled(&self) -> QueryResult<CompiledStatement> {
        QueryCompiler::new(self.args.mapper()).compile_clauses(&self.model)
    }

    /// The statement as it would be sent. Resolving a worksheet index lists
    /// the worksheets of the source.
    pub fn statement(&self) -> QueryResult<RenderedStatement> {
        let clauses = self.compiled()?;
        let table = self.args.resolve(|| self.session.worksheet_names())?;
        Ok(clauses.for_table(&table).render())
    }

    pub fn to_vec(self) -> QueryResult<Vec<T>> {
        let items = self.run()?.into_items()?;
        Ok(post_process(&self.model.operators, items))
    }

    /// First item; [`QueryError::EmptySequence`] when there is none
    pub fn first(self) -> QueryResult<T> {
        self.first_or_none()?.ok_or(QueryError::EmptySequence)
    }

    pub fn first_or_none(self) -> QueryResult<Option<T>> {
        Ok(self.with_operator(ResultOperator::First).to_vec()?.into_iter().next())
    }

    pub fn last(self) -> QueryResult<Option<T>> {
        Ok(self.with_operator(ResultOperator::Last).to_vec()?.pop())
    }

    pub fn count(self) -> QueryResult<usize> {
        let count = self.long_count_with(ResultOperator::Count)?;
        usize::try_from(count).map_err(|_| QueryError::conversion(count, "usize"))
    }

    pub fn long_count(self) -> QueryResult<i64> {
        self.long_count_with(ResultOperator::LongCount)
    }

    fn long_count_with(self, operator: ResultOperator) -> QueryResult<i64> {
        let value = self.with_operator(operator).scalar()?;
        i64::from_value(value)
    }

    pub fn sum(self, selector: Expr) -> QueryResult<Value> {
        self.select(selector).sum()
    }

    pub fn min(self, selector: Expr) -> QueryResult<Value> {
        self.select(selector).min()
    }

    pub fn max(self, selector: Expr) -> QueryResult<Value> {
        self.select(selector).max()
    }

    pub fn average(self, selector: Expr) -> QueryResult<Value> {
        self.select(selector).average()
    }

    fn fetch(&self) -> QueryResult<Fetched> {
        let clauses = self.compiled()?;
        self.session
            .with_connection(&self.args.connection_spec(), |connection| {
                executor::execute(connection, &self.args, clauses)
            })
    }

    fn run(&self) -> QueryResult<Materialized<T>> {
        let fetched = self.fetch()?;
        ResultMaterializer::new(&self.args, &fetched.table, self.session.scalar_column())
            .materialize::<T>(&fetched.columns, fetched.rows)
    }

    fn scalar(self) -> QueryResult<Value> {
        self.run()?.into_scalar()
    }
}

impl<T> fmt::Debug for Query<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("args", &self.args.to_string())
            .field("model", &self.model)
            .finish()
    }
}

impl<T> Materialized<T> {
    fn into_items(self) -> QueryResult<Vec<T>> {
        match self {
            Materialized::Items(items) => Ok(items),
            Materialized::Scalar(value) => Err(QueryError::Driver(DriverError::new(format!(
                "expected rows, the source returned the single value '{}'",
                value
            )))),
        }
    }

    fn into_scalar(self) -> QueryResult<Value> {
        match self {
            Materialized::Scalar(value) => Ok(value),
            Materialized::Items(items) => Err(QueryError::Driver(DriverError::new(format!(
                "expected a single value, the source returned {} rows",
                items.len()
            )))),
        }
    }
}

/// A query whose items are projected through a selector
pub struct Selection<'s, T> {
    query: Query<'s, T>,
}

impl<'s, T: QueryItem> Selection<'s, T> {
    pub fn take(self, count: usize) -> Self {
        self.with_operator(ResultOperator::Take(count))
    }

    pub fn skip(self, count: usize) -> Self {
        self.with_operator(ResultOperator::Skip(count))
    }

    pub fn reverse(self) -> Self {
        self.with_operator(ResultOperator::Reverse)
    }

    /// Distinct values of the selected column, computed by the source
    pub fn distinct(self) -> Self {
        self.with_operator(ResultOperator::Distinct)
    }

    pub fn with_operator(self, operator: ResultOperator) -> Self {
        Self {
            query: self.query.with_operator(operator),
        }
    }

    pub fn model(&self) -> &QueryModel {
        self.query.model()
    }

    pub fn compiled(&self) -> QueryResult<CompiledStatement> {
        self.query.compiled()
    }

    pub fn statement(&self) -> QueryResult<RenderedStatement> {
        self.query.statement()
    }

    pub fn to_vec(self) -> QueryResult<Vec<Value>> {
        let model = &self.query.model;
        if model.has_operator(|op| matches!(op, ResultOperator::Distinct)) {
            let fetched = self.query.fetch()?;
            let materializer =
                ResultMaterializer::new(&self.query.args, &fetched.table, self.query.session.scalar_column());
            let values = T::distinct_values(&materializer, &model.selector_or_identity(), fetched.rows)?;
            return Ok(post_process(&model.operators, values));
        }

        let projector = ProjectionCompiler::compile(&model.selector_or_identity())?;
        let items = self.query.run()?.into_items()?;
        let items = post_process(&model.operators, items);
        items.iter().map(|item| projector.apply_to(item)).collect()
    }

    /// Selected values converted to `V`
    pub fn to_vec_of<V: FieldValue>(self) -> QueryResult<Vec<V>> {
        self.to_vec()?.into_iter().map(V::from_value).collect()
    }

    pub fn first(self) -> QueryResult<Value> {
        self.first_or_none()?.ok_or(QueryError::EmptySequence)
    }

    pub fn first_or_none(self) -> QueryResult<Option<Value>> {
        Ok(self.with_operator(ResultOperator::First).to_vec()?.into_iter().next())
    }

    pub fn last(self) -> QueryResult<Option<Value>> {
        Ok(self.with_operator(ResultOperator::Last).to_vec()?.pop())
    }

    pub fn count(self) -> QueryResult<usize> {
        self.query.count()
    }

    pub fn sum(self) -> QueryResult<Value> {
        self.with_operator(ResultOperator::Sum).query.scalar()
    }

    pub fn min(self) -> QueryResult<Value> {
        self.with_operator(ResultOperator::Min).query.scalar()
    }

    pub fn max(self) -> QueryResult<Value> {
        self.with_operator(ResultOperator::Max).query.scalar()
    }

    pub fn average(self) -> QueryResult<Value> {
        self.with_operator(ResultOperator::Average).query.scalar()
    }
}

impl<T> fmt::Debug for Selection<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selection").field("query", &self.query).finish()
    }
}

fn post_process<I>(operators: &[ResultOperator], mut items: Vec<I>) -> Vec<I> {
    for operator in operators {
        match operator {
            ResultOperator::Skip(count) => {
                items.drain(..(*count).min(items.len()));
            }
            ResultOperator::Reverse => items.reverse(),
            _ => {}
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_process_in_declaration_order() {
        let operators = [
            ResultOperator::Take(10),
            ResultOperator::Skip(1),
            ResultOperator::Reverse,
        ];
        assert_eq!(post_process(&operators, vec![1, 2, 3, 4]), vec![4, 3, 2]);

        let operators = [ResultOperator::Reverse, ResultOperator::Skip(1)];
        assert_eq!(post_process(&operators, vec![1, 2, 3, 4]), vec![3, 2, 1]);
    }

    #[test]
    fn test_skip_past_end() {
        assert!(post_process(&[ResultOperator::Skip(9)], vec![1, 2]).is_empty());
    }
}
