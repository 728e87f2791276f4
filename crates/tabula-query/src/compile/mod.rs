//! Query model to statement compilation.
//!
//! One pass over a [`QueryModel`]: joins are rejected first, then the
//! predicate clauses, the ordering and the result operators each fill in
//! their part of a [`CompiledStatement`]. `Skip`, `Reverse` and `Last` leave
//! the statement alone and are applied to the materialized rows.

mod predicate;
mod statement;

pub use predicate::{PredicateTranslator, TranslatedPredicate};
pub(crate) use predicate::resolve_column;
pub use statement::{CompiledStatement, RenderedStatement, SELECT_ALL};

use crate::args::ResolvedTable;
use crate::error::{QueryError, QueryResult};
use crate::expr::Expr;
use crate::mapping::ColumnMapper;
use crate::model::{BodyClause, QueryModel, ResultOperator};
use tracing::debug;

fn not_supported(method: &str) -> QueryError {
    QueryError::UnsupportedOperator(format!("the {}() method is not supported", method))
}

pub struct QueryCompiler<'a> {
    mapper: &'a ColumnMapper,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(mapper: &'a ColumnMapper) -> Self {
        Self { mapper }
    }

    pub fn compile(&self, model: &QueryModel, table: &ResolvedTable) -> QueryResult<CompiledStatement> {
        Ok(self.compile_clauses(model)?.for_table(table))
    }

    /// Everything but the table clause. Needs no knowledge of the source, so
    /// unsupported shapes fail before a connection is opened.
    pub fn compile_clauses(&self, model: &QueryModel) -> QueryResult<CompiledStatement> {
        reject_joins(model)?;

        let mut statement = CompiledStatement::new(String::new());
        self.visit_predicates(model, &mut statement)?;
        self.visit_ordering(model, &mut statement)?;
        for operator in &model.operators {
            self.visit_operator(operator, model, &mut statement)?;
        }

        debug!(
            aggregate = %statement.aggregate,
            predicate = ?statement.predicate,
            columns = ?statement.columns_used,
            "Compiled query clauses"
        );
        Ok(statement)
    }

    /// Predicate clauses are AND-combined in declaration order
    fn visit_predicates(&self, model: &QueryModel, statement: &mut CompiledStatement) -> QueryResult<()> {
        let combined = model
            .body
            .iter()
            .filter_map(|clause| match clause {
                BodyClause::Where(predicate) => Some(predicate.clone()),
                _ => None,
            })
            .reduce(|combined, predicate| combined.and(predicate));

        let Some(predicate) = combined else {
            return Ok(());
        };
        let translated = PredicateTranslator::new(self.mapper, model.shape).translate(&predicate)?;
        statement.predicate = Some(translated.text);
        statement.params = translated.params;
        for column in &translated.columns_used {
            statement.use_column(column);
        }
        Ok(())
    }

    /// Only the first key of the first ordering clause reaches the statement
    fn visit_ordering(&self, model: &QueryModel, statement: &mut CompiledStatement) -> QueryResult<()> {
        let first = model.body.iter().find_map(|clause| match clause {
            BodyClause::OrderBy(orderings) => orderings.first(),
            _ => None,
        });

        if let Some(ordering) = first {
            let column = resolve_column(self.mapper, model.shape, &ordering.expr)?;
            statement.use_column(&column);
            statement.order_by = Some((column, ordering.direction));
        }
        Ok(())
    }

    fn visit_operator(
        &self,
        operator: &ResultOperator,
        model: &QueryModel,
        statement: &mut CompiledStatement,
    ) -> QueryResult<()> {
        match operator {
            ResultOperator::Take(count) => statement.aggregate = format!("TOP {} *", count),
            ResultOperator::First => statement.aggregate = "TOP 1 *".to_string(),
            ResultOperator::Count | ResultOperator::LongCount => statement.aggregate = "COUNT(*)".to_string(),
            ResultOperator::Sum => self.aggregate("SUM", "Sum", model, statement)?,
            ResultOperator::Min => self.aggregate("MIN", "Min", model, statement)?,
            ResultOperator::Max => self.aggregate("MAX", "Max", model, statement)?,
            ResultOperator::Average => self.aggregate("AVG", "Average", model, statement)?,
            ResultOperator::Distinct => {
                if !selects_single_column(model) {
                    return Err(QueryError::UnsupportedOperator(
                        "the Distinct() method is only supported when a single property is selected, \
                         e.g. select(member(\"FirstName\")).distinct()"
                            .to_string(),
                    ));
                }
                self.aggregate("DISTINCT", "Distinct", model, statement)?;
            }
            ResultOperator::Skip(_) | ResultOperator::Last | ResultOperator::Reverse => {}
            ResultOperator::Contains(_) => return Err(not_supported("Contains")),
            ResultOperator::DefaultIfEmpty => return Err(not_supported("DefaultIfEmpty")),
            ResultOperator::GroupBy(_) => return Err(not_supported("Group")),
            ResultOperator::Union(_) => return Err(not_supported("Union")),
            ResultOperator::Intersect(_) => return Err(not_supported("Intersect")),
            ResultOperator::Except(_) => return Err(not_supported("Except")),
            ResultOperator::OfType(_) => return Err(not_supported("OfType")),
            ResultOperator::Single => {
                return Err(QueryError::UnsupportedOperator(
                    "the Single() method is not supported. Use the First() method instead".to_string(),
                ))
            }
        }
        Ok(())
    }

    /// `<FN>([column])` over the selected column. The column is bracketed
    /// as in `WHERE` and `ORDER BY`, so `DISTINCT(<column>)` renders as
    /// `DISTINCT([Boss])`.
    fn aggregate(
        &self,
        function: &str,
        method: &str,
        model: &QueryModel,
        statement: &mut CompiledStatement,
    ) -> QueryResult<()> {
        let column = match &model.selector {
            Some(selector) if selector.is_column_access() => {
                resolve_column(self.mapper, model.shape, selector)?
            }
            _ => {
                return Err(QueryError::UnsupportedOperator(format!(
                    "the {}() method requires a selector that is a single column",
                    method
                )))
            }
        };
        statement.aggregate = format!("{}([{}])", function, column);
        statement.use_column(&column);
        Ok(())
    }
}

fn selects_single_column(model: &QueryModel) -> bool {
    model.selector.as_ref().is_some_and(Expr::is_column_access)
}

fn reject_joins(model: &QueryModel) -> QueryResult<()> {
    for clause in &model.body {
        match clause {
            BodyClause::Join(_) => return Err(not_supported("Join")),
            BodyClause::GroupJoin(_) => {
                return Err(QueryError::UnsupportedOperator(
                    "group join is not supported".to_string(),
                ))
            }
            BodyClause::Where(_) | BodyClause::OrderBy(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{col, member, SourceId};
    use crate::model::{ItemShape, JoinClause, OrderDirection, Ordering};
    use crate::value::Value;
    use insta::assert_snapshot;
    use test_case::test_case;

    fn sheet() -> ResolvedTable {
        ResolvedTable {
            worksheet: Some("Sheet1".to_string()),
            named_range: None,
            range: None,
        }
    }

    fn company() -> QueryModel {
        QueryModel::new(ItemShape::Record("Company"))
    }

    fn company_mapper() -> ColumnMapper {
        let mut mapper = ColumnMapper::new();
        mapper.register("Name", "Company Title").unwrap();
        mapper.register("CEO", "Boss").unwrap();
        mapper
    }

    fn compile(model: &QueryModel) -> QueryResult<CompiledStatement> {
        let mapper = company_mapper();
        QueryCompiler::new(&mapper).compile(model, &sheet())
    }

    fn sql(model: &QueryModel) -> String {
        compile(model).unwrap().render().sql
    }

    // ========================================================================
    // Statement shape
    // ========================================================================

    #[test]
    fn test_mapped_predicate() {
        let mut model = company();
        model.body.push(BodyClause::Where(member("Name").eq("Taylor University")));

        let statement = compile(&model).unwrap();
        assert_snapshot!(statement.render().sql, @"SELECT * FROM [Sheet1$] WHERE ([Company Title] = ?)");
        assert_eq!(statement.params, vec![Value::from("Taylor University")]);
        assert_eq!(statement.columns_used, vec!["Company Title"]);
    }

    #[test]
    fn test_multiple_predicates_are_combined() {
        let mut model = company();
        model.body.push(BodyClause::Where(member("CEO").eq("Bob")));
        model.body.push(BodyClause::Where(member("Employees").gt(10)));

        let statement = compile(&model).unwrap();
        assert_snapshot!(
            statement.render().sql,
            @"SELECT * FROM [Sheet1$] WHERE (([Boss] = ?) AND ([Employees] > ?))"
        );
        assert_eq!(statement.params, vec![Value::from("Bob"), Value::Int(10)]);
    }

    #[test]
    fn test_only_first_ordering_is_honored() {
        let mut model = company();
        model.body.push(BodyClause::OrderBy(vec![
            Ordering {
                expr: member("CEO"),
                direction: OrderDirection::Desc,
            },
            Ordering {
                expr: member("Name"),
                direction: OrderDirection::Asc,
            },
        ]));
        model.body.push(BodyClause::OrderBy(vec![Ordering {
            expr: member("Employees"),
            direction: OrderDirection::Asc,
        }]));

        let statement = compile(&model).unwrap();
        assert_snapshot!(statement.render().sql, @"SELECT * FROM [Sheet1$] ORDER BY [Boss] DESC");
        assert_eq!(statement.columns_used, vec!["Boss"]);
    }

    #[test_case(ResultOperator::Take(5), "SELECT TOP 5 * FROM [Sheet1$]" ; "take")]
    #[test_case(ResultOperator::First, "SELECT TOP 1 * FROM [Sheet1$]" ; "first")]
    #[test_case(ResultOperator::Count, "SELECT COUNT(*) FROM [Sheet1$]" ; "count")]
    #[test_case(ResultOperator::LongCount, "SELECT COUNT(*) FROM [Sheet1$]" ; "long count")]
    #[test_case(ResultOperator::Skip(3), "SELECT * FROM [Sheet1$]" ; "skip is client side")]
    #[test_case(ResultOperator::Reverse, "SELECT * FROM [Sheet1$]" ; "reverse is client side")]
    #[test_case(ResultOperator::Last, "SELECT * FROM [Sheet1$]" ; "last is client side")]
    fn test_operator_aggregate(operator: ResultOperator, expected: &str) {
        let mut model = company();
        model.operators.push(operator);
        assert_eq!(sql(&model), expected);
    }

    #[test_case(ResultOperator::Sum, "SELECT SUM([Employees]) FROM [Sheet1$]" ; "sum")]
    #[test_case(ResultOperator::Min, "SELECT MIN([Employees]) FROM [Sheet1$]" ; "min")]
    #[test_case(ResultOperator::Max, "SELECT MAX([Employees]) FROM [Sheet1$]" ; "max")]
    #[test_case(ResultOperator::Average, "SELECT AVG([Employees]) FROM [Sheet1$]" ; "average")]
    fn test_column_aggregates(operator: ResultOperator, expected: &str) {
        let mut model = company();
        model.selector = Some(member("Employees"));
        model.operators.push(operator);
        assert_eq!(sql(&model), expected);
    }

    #[test]
    fn test_distinct_on_mapped_property() {
        let mut model = company();
        model.selector = Some(member("CEO"));
        model.operators.push(ResultOperator::Distinct);

        let statement = compile(&model).unwrap();
        assert_snapshot!(statement.render().sql, @"SELECT DISTINCT([Boss]) FROM [Sheet1$]");
        assert_eq!(statement.columns_used, vec!["Boss"]);
    }

    #[test]
    fn test_distinct_on_projection_fails() {
        let mut model = company();
        model.selector = Some(crate::expr::record([("n", member("Name")), ("c", member("CEO"))]));
        model.operators.push(ResultOperator::Distinct);

        let err = compile(&model).unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedOperator(ref m) if m.contains("Distinct()")));
    }

    #[test]
    fn test_sum_without_column_selector_fails() {
        let mut model = company();
        model.operators.push(ResultOperator::Sum);
        assert!(matches!(compile(&model), Err(QueryError::UnsupportedOperator(_))));
    }

    #[test]
    fn test_row_columns_on_table_variants() {
        let mut model = QueryModel::new(ItemShape::Row);
        model.body.push(BodyClause::Where(col("City").eq("Omaha")));
        model.operators.push(ResultOperator::Take(2));

        let mapper = ColumnMapper::new();
        let compiler = QueryCompiler::new(&mapper);
        let named = ResolvedTable {
            worksheet: None,
            named_range: Some("Firms".to_string()),
            range: None,
        };
        assert_snapshot!(
            compiler.compile(&model, &named).unwrap().render().sql,
            @"SELECT TOP 2 * FROM [Firms] WHERE ([City] = ?)"
        );

        let range = ResolvedTable {
            worksheet: Some("Sheet1".to_string()),
            named_range: None,
            range: Some(("A1".to_string(), "D10".to_string())),
        };
        assert_snapshot!(
            compiler.compile(&model, &range).unwrap().render().sql,
            @"SELECT TOP 2 * FROM [Sheet1$A1:D10] WHERE ([City] = ?)"
        );
    }

    // ========================================================================
    // Rejections
    // ========================================================================

    fn join() -> JoinClause {
        JoinClause {
            source: SourceId(1),
            table: "Sheet2".to_string(),
            outer_key: member("Name"),
            inner_key: Expr::Member {
                source: SourceId(1),
                name: "Name".to_string(),
            },
        }
    }

    #[test_case(ResultOperator::Contains(Value::Null), "Contains()" ; "contains")]
    #[test_case(ResultOperator::DefaultIfEmpty, "DefaultIfEmpty()" ; "default if empty")]
    #[test_case(ResultOperator::GroupBy(member("CEO")), "Group()" ; "group by")]
    #[test_case(ResultOperator::Union(Box::new(company())), "Union()" ; "union")]
    #[test_case(ResultOperator::Intersect(Box::new(company())), "Intersect()" ; "intersect")]
    #[test_case(ResultOperator::Except(Box::new(company())), "Except()" ; "except")]
    #[test_case(ResultOperator::OfType("Company".to_string()), "OfType()" ; "of type")]
    #[test_case(ResultOperator::Single, "Use the First() method instead" ; "single")]
    fn test_rejected_operators(operator: ResultOperator, reason: &str) {
        let mut model = company();
        model.operators.push(operator);
        match compile(&model) {
            Err(QueryError::UnsupportedOperator(message)) => assert!(message.contains(reason), "{}", message),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_joins_rejected_before_predicates() {
        // The predicate alone would fail translation; the join must win
        let mut model = company();
        model.body.push(BodyClause::Where(member("Name").plus(1).eq(2)));
        model.body.push(BodyClause::Join(join()));
        match compile(&model) {
            Err(QueryError::UnsupportedOperator(message)) => assert!(message.contains("Join()")),
            other => panic!("expected join rejection, got {:?}", other),
        }

        let mut model = company();
        model.body.push(BodyClause::GroupJoin(join()));
        match compile(&model) {
            Err(QueryError::UnsupportedOperator(message)) => assert!(message.contains("group join")),
            other => panic!("expected group join rejection, got {:?}", other),
        }
    }

    // ========================================================================
    // Mapping sources
    // ========================================================================

    #[test]
    fn test_hints_and_registration_compile_identically() {
        let mut model = company();
        model.body.push(BodyClause::Where(member("CEO").eq("Bob")));
        model.body.push(BodyClause::OrderBy(vec![Ordering {
            expr: member("CEO"),
            direction: OrderDirection::Asc,
        }]));

        let mut registered = ColumnMapper::new();
        registered.register("CEO", "Boss").unwrap();
        let mut hinted = ColumnMapper::new();
        hinted.merge_hints([("CEO", "Boss")]);

        let a = QueryCompiler::new(&registered).compile(&model, &sheet()).unwrap();
        let b = QueryCompiler::new(&hinted).compile(&model, &sheet()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.render().sql, "SELECT * FROM [Sheet1$] WHERE ([Boss] = ?) ORDER BY [Boss] ASC");
    }

    #[test]
    fn test_mappings_are_per_property() {
        let mut model = company();
        model.body.push(BodyClause::Where(member("Boss").eq("x").and(member("CEO").eq("y"))));
        assert_eq!(
            sql(&model),
            "SELECT * FROM [Sheet1$] WHERE (([Boss] = ?) AND ([Boss] = ?))"
        );

        let mut model = company();
        model.body.push(BodyClause::Where(member("Employees").eq(3)));
        assert_eq!(sql(&model), "SELECT * FROM [Sheet1$] WHERE ([Employees] = ?)");
    }
}
