//! Boolean expression to parameterized filter text.
//!
//! Comparisons always come out column first, null comparisons become
//! `IS NULL`/`IS NOT NULL` without a parameter, and string predicates become
//! `LIKE` patterns. Any other shape is an error naming the construct.

use crate::error::{QueryError, QueryResult};
use crate::expr::{BinaryOp, ColumnRef, Expr, SourceId, StringMethod};
use crate::mapping::ColumnMapper;
use crate::model::ItemShape;
use crate::value::Value;

/// Output of [`PredicateTranslator::translate`]
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedPredicate {
    pub text: String,
    pub params: Vec<Value>,
    /// Resolved column names in order of first use
    pub columns_used: Vec<String>,
}

/// Resolve a column access to the name the source knows it by.
///
/// Record members go through the mapper; named row columns are taken as
/// written; positional columns only exist on headerless rows and render as
/// `F<n>` counting from one.
pub(crate) fn resolve_column(mapper: &ColumnMapper, shape: ItemShape, expr: &Expr) -> QueryResult<String> {
    match expr.unwrap_convert() {
        Expr::Member { source, name } => {
            check_source(*source)?;
            Ok(mapper.map(name).to_string())
        }
        Expr::Column { source, column } => {
            check_source(*source)?;
            match (column, shape) {
                (ColumnRef::Index(index), ItemShape::Headerless) => Ok(format!("F{}", index + 1)),
                (ColumnRef::Index(_), _) => Err(QueryError::UnsupportedExpression(
                    "column indexes can only be used on headerless rows".to_string(),
                )),
                (ColumnRef::Name(name), ItemShape::Headerless) => Err(QueryError::UnsupportedExpression(
                    format!("column name '{}' used on a headerless row", name),
                )),
                (ColumnRef::Name(name), _) => Ok(name.clone()),
            }
        }
        other => Err(QueryError::UnsupportedExpression(format!(
            "{} is not a column reference",
            other.kind_name()
        ))),
    }
}

fn check_source(source: SourceId) -> QueryResult<()> {
    if source == SourceId::MAIN {
        Ok(())
    } else {
        Err(QueryError::UnsupportedExpression(format!(
            "reference to query source {} other than the main source",
            source.0
        )))
    }
}

fn comparison_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Eq => "=",
        BinaryOp::Ne => "<>",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        _ => unreachable!("not a comparison operator"),
    }
}

/// Walks one predicate tree, accumulating parameters and used columns
pub struct PredicateTranslator<'a> {
    mapper: &'a ColumnMapper,
    shape: ItemShape,
    params: Vec<Value>,
    columns_used: Vec<String>,
}

impl<'a> PredicateTranslator<'a> {
    pub fn new(mapper: &'a ColumnMapper, shape: ItemShape) -> Self {
        Self {
            mapper,
            shape,
            params: Vec::new(),
            columns_used: Vec::new(),
        }
    }

    pub fn translate(mut self, expr: &Expr) -> QueryResult<TranslatedPredicate> {
        let text = self.predicate(expr)?;
        Ok(TranslatedPredicate {
            text,
            params: self.params,
            columns_used: self.columns_used,
        })
    }

    fn column(&mut self, expr: &Expr) -> QueryResult<String> {
        let name = resolve_column(self.mapper, self.shape, expr)?;
        if !self.columns_used.contains(&name) {
            self.columns_used.push(name.clone());
        }
        Ok(format!("[{}]", name))
    }

    fn bind(&mut self, value: Value) -> &'static str {
        self.params.push(value);
        "?"
    }

    fn predicate(&mut self, expr: &Expr) -> QueryResult<String> {
        match expr.unwrap_convert() {
            Expr::Binary { op, left, right } => match op {
                BinaryOp::And | BinaryOp::Or => {
                    let left = self.predicate(left)?;
                    let right = self.predicate(right)?;
                    let joiner = if *op == BinaryOp::And { "AND" } else { "OR" };
                    Ok(format!("({} {} {})", left, joiner, right))
                }
                op if op.is_comparison() => self.comparison(*op, left, right),
                op => Err(QueryError::UnsupportedExpression(format!(
                    "{} is not supported in a filter",
                    op.name()
                ))),
            },
            Expr::Not(inner) => match inner.unwrap_convert() {
                Expr::StringCall {
                    method: StringMethod::IsNullOrEmpty,
                    target,
                    ..
                } => {
                    let column = self.column(target)?;
                    Ok(format!("(({0} <> '') OR ({0} IS NOT NULL))", column))
                }
                other => Ok(format!("(NOT {})", self.predicate(other)?)),
            },
            Expr::StringCall { method, target, arg } => self.string_call(*method, target, arg.as_deref()),
            access @ (Expr::Member { .. } | Expr::Column { .. }) => {
                // A bare boolean column
                let column = self.column(access)?;
                Ok(format!("({} = {})", column, self.bind(Value::Bool(true))))
            }
            Expr::Literal(Value::Bool(b)) => Ok(if *b { "(1 = 1)" } else { "(1 = 0)" }.to_string()),
            other => Err(QueryError::UnsupportedExpression(format!(
                "{} is not supported in a filter",
                other.kind_name()
            ))),
        }
    }

    fn comparison(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> QueryResult<String> {
        let (column_side, other, op) = if left.is_column_access() {
            (left, right, op)
        } else if right.is_column_access() {
            (right, left, op.mirrored())
        } else {
            return Err(QueryError::UnsupportedExpression(format!(
                "{} between {} and {} has no column operand",
                op.name(),
                left.kind_name(),
                right.kind_name()
            )));
        };

        let column = self.column(column_side)?;
        let other = other.unwrap_convert();

        if other.is_null_literal() {
            return match op {
                BinaryOp::Eq => Ok(format!("({} IS NULL)", column)),
                BinaryOp::Ne => Ok(format!("({} IS NOT NULL)", column)),
                op => Err(QueryError::UnsupportedExpression(format!(
                    "{} against null",
                    op.name()
                ))),
            };
        }

        let operand = match other {
            Expr::Literal(value) => self.bind(value.clone()).to_string(),
            access if access.is_column_access() => self.column(access)?,
            other => {
                return Err(QueryError::UnsupportedExpression(format!(
                    "{} operand of {}",
                    other.kind_name(),
                    op.name()
                )))
            }
        };
        Ok(format!("({} {} {})", column, comparison_symbol(op), operand))
    }

    fn string_call(&mut self, method: StringMethod, target: &Expr, arg: Option<&Expr>) -> QueryResult<String> {
        if !target.is_column_access() {
            return Err(QueryError::UnsupportedExpression(format!(
                "{} called on {}",
                method.name(),
                target.kind_name()
            )));
        }
        let column = self.column(target)?;

        if method == StringMethod::IsNullOrEmpty {
            return Ok(format!("(({0} = '') OR ({0} IS NULL))", column));
        }

        let text = match arg.map(Expr::unwrap_convert) {
            Some(Expr::Literal(value)) => value.to_string(),
            Some(other) => {
                return Err(QueryError::UnsupportedExpression(format!(
                    "{} argument to {}; only constants are supported",
                    other.kind_name(),
                    method.name()
                )))
            }
            None => {
                return Err(QueryError::UnsupportedExpression(format!(
                    "{} without an argument",
                    method.name()
                )))
            }
        };

        let (operator, pattern) = match method {
            StringMethod::Contains => ("LIKE", format!("%{}%", text)),
            StringMethod::StartsWith => ("LIKE", format!("{}%", text)),
            StringMethod::EndsWith => ("LIKE", format!("%{}", text)),
            StringMethod::Equals | StringMethod::IsNullOrEmpty => ("=", text),
        };
        Ok(format!("({} {} {})", column, operator, self.bind(Value::Text(pattern))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{col, col_at, is_null_or_empty, lit, member, null};
    use crate::model::QueryModel;
    use crate::value::FieldKind;
    use proptest::prelude::*;
    use test_case::test_case;

    fn translate(expr: Expr) -> QueryResult<TranslatedPredicate> {
        let mut mapper = ColumnMapper::new();
        mapper.register("CEO", "Boss").unwrap();
        PredicateTranslator::new(&mapper, ItemShape::Record("Company")).translate(&expr)
    }

    #[test_case(member("Name").eq("ACME"), "([Name] = ?)" ; "equal")]
    #[test_case(member("Employees").ne(5), "([Employees] <> ?)" ; "not equal")]
    #[test_case(lit(5).lt(member("Employees")), "([Employees] > ?)" ; "swapped less than is mirrored")]
    #[test_case(lit(5).ge(member("Employees")), "([Employees] <= ?)" ; "swapped greater or equal is mirrored")]
    #[test_case(member("CEO").eq("Bob"), "([Boss] = ?)" ; "mapped property")]
    #[test_case(member("Name").eq("A").and(member("CEO").eq("B")), "(([Name] = ?) AND ([Boss] = ?))" ; "and")]
    #[test_case(member("Name").eq("A").or(member("Name").eq("B")), "(([Name] = ?) OR ([Name] = ?))" ; "or")]
    #[test_case(member("Name").eq("A").not(), "(NOT ([Name] = ?))" ; "generic not")]
    #[test_case(member("Employees").cast(FieldKind::Float).gt(2.5), "([Employees] > ?)" ; "convert is transparent")]
    fn test_translate(expr: Expr, expected: &str) {
        assert_eq!(translate(expr).unwrap().text, expected);
    }

    #[test]
    fn test_null_comparisons_bind_nothing() {
        let translated = translate(member("CEO").eq(null())).unwrap();
        assert_eq!(translated.text, "([Boss] IS NULL)");
        assert!(translated.params.is_empty());

        let translated = translate(null().ne(member("CEO"))).unwrap();
        assert_eq!(translated.text, "([Boss] IS NOT NULL)");
        assert!(translated.params.is_empty());
    }

    #[test_case(member("Name").contains("A"), "([Name] LIKE ?)", "%A%" ; "contains")]
    #[test_case(member("Name").starts_with("A"), "([Name] LIKE ?)", "A%" ; "starts with")]
    #[test_case(member("Name").ends_with("A"), "([Name] LIKE ?)", "%A" ; "ends with")]
    #[test_case(member("Name").equals("A"), "([Name] = ?)", "A" ; "equals")]
    fn test_string_methods(expr: Expr, text: &str, param: &str) {
        let translated = translate(expr).unwrap();
        assert_eq!(translated.text, text);
        assert_eq!(translated.params, vec![Value::from(param)]);
    }

    #[test]
    fn test_is_null_or_empty() {
        let translated = translate(is_null_or_empty(member("CEO"))).unwrap();
        assert_eq!(translated.text, "(([Boss] = '') OR ([Boss] IS NULL))");
        assert!(translated.params.is_empty());

        let translated = translate(is_null_or_empty(member("CEO")).not()).unwrap();
        assert_eq!(translated.text, "(([Boss] <> '') OR ([Boss] IS NOT NULL))");
    }

    #[test]
    fn test_columns_used_are_mapped_names() {
        let translated = translate(
            member("CEO")
                .eq("Bob")
                .and(member("Name").contains("x"))
                .and(member("CEO").ne(null())),
        )
        .unwrap();
        assert_eq!(translated.columns_used, vec!["Boss", "Name"]);
        assert_eq!(translated.params, vec![Value::from("Bob"), Value::from("%x%")]);
    }

    #[test]
    fn test_headerless_positions() {
        let mapper = ColumnMapper::new();
        let translated = PredicateTranslator::new(&mapper, ItemShape::Headerless)
            .translate(&col_at(0).eq("ACME"))
            .unwrap();
        assert_eq!(translated.text, "([F1] = ?)");
        assert_eq!(translated.columns_used, vec!["F1"]);

        let err = PredicateTranslator::new(&mapper, ItemShape::Row)
            .translate(&col_at(0).eq("ACME"))
            .unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedExpression(_)));
    }

    #[test]
    fn test_row_columns_are_not_mapped() {
        let mut mapper = ColumnMapper::new();
        mapper.register("Name", "Company Title").unwrap();
        let translated = PredicateTranslator::new(&mapper, ItemShape::Row)
            .translate(&col("Name").eq("ACME"))
            .unwrap();
        assert_eq!(translated.text, "([Name] = ?)");
    }

    #[test_case(member("Employees").plus(1).gt(5) ; "arithmetic operand")]
    #[test_case(member("Name").upper().eq("A") ; "function operand")]
    #[test_case(lit(1).eq(2) ; "no column")]
    #[test_case(member("Name").contains(member("CEO")) ; "non-constant argument")]
    #[test_case(Expr::SubQuery(Box::new(QueryModel::new(ItemShape::Row))) ; "subquery")]
    #[test_case(member("Employees").lt(null()) ; "ordering against null")]
    fn test_unsupported(expr: Expr) {
        let err = translate(expr).unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedExpression(_)), "{:?}", err);
    }

    fn comparison() -> impl Strategy<Value = Expr> {
        let ops = prop::sample::select(vec![
            BinaryOp::Eq,
            BinaryOp::Ne,
            BinaryOp::Lt,
            BinaryOp::Le,
            BinaryOp::Gt,
            BinaryOp::Ge,
        ]);
        let names = prop::sample::select(vec!["Name", "CEO", "Employees"]);
        (ops, names, any::<i32>(), any::<bool>()).prop_map(|(op, name, value, swap)| {
            let (left, right) = if swap {
                (lit(value), member(name))
            } else {
                (member(name), lit(value))
            };
            Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            }
        })
    }

    fn predicate() -> impl Strategy<Value = Expr> {
        comparison().prop_recursive(4, 16, 2, |inner| {
            (inner.clone(), inner, any::<bool>())
                .prop_map(|(l, r, and)| if and { l.and(r) } else { l.or(r) })
        })
    }

    proptest! {
        #[test]
        fn prop_column_always_on_left(expr in predicate()) {
            let translated = translate(expr).unwrap();
            // Every group opens with a column or a nested group
            for (i, _) in translated.text.match_indices('(') {
                let next = translated.text[i + 1..].chars().next();
                prop_assert!(matches!(next, Some('[') | Some('(')), "{}", translated.text);
            }
            prop_assert_eq!(translated.params.len(), translated.text.matches('?').count());
        }
    }
}
