//! Selector expressions compiled to per-row functions.

use crate::error::{QueryError, QueryResult};
use crate::expr::{BinaryOp, ColumnRef, Expr, ScalarFn, SourceId, StringMethod};
use crate::value::{convert, Value};
use std::cmp::Ordering;

/// Access to the fields of one materialized item
pub trait Bindable {
    fn member(&self, name: &str) -> QueryResult<Value>;

    fn column(&self, column: &ColumnRef) -> QueryResult<Value>;

    /// The whole item as a value
    fn to_value(&self) -> Value;
}

/// Items bound to the query sources of one result row
#[derive(Default)]
pub struct Bindings<'a> {
    sources: Vec<(SourceId, &'a dyn Bindable)>,
}

impl<'a> Bindings<'a> {
    /// Bind `item` as the main source
    pub fn main(item: &'a dyn Bindable) -> Self {
        Self {
            sources: vec![(SourceId::MAIN, item)],
        }
    }

    pub fn bind(mut self, source: SourceId, item: &'a dyn Bindable) -> Self {
        self.sources.retain(|(id, _)| *id != source);
        self.sources.push((source, item));
        self
    }

    fn get(&self, source: SourceId) -> QueryResult<&'a dyn Bindable> {
        self.sources
            .iter()
            .find(|(id, _)| *id == source)
            .map(|(_, item)| *item)
            .ok_or_else(|| QueryError::UnsupportedExpression(format!("query source {} is not bound", source.0)))
    }
}

type Eval = Box<dyn Fn(&Bindings<'_>) -> QueryResult<Value> + Send + Sync>;

/// A compiled selector
pub struct Projector {
    eval: Eval,
}

impl Projector {
    pub fn apply(&self, bindings: &Bindings<'_>) -> QueryResult<Value> {
        (self.eval)(bindings)
    }

    /// Apply to a single item bound as the main source
    pub fn apply_to(&self, item: &dyn Bindable) -> QueryResult<Value> {
        self.apply(&Bindings::main(item))
    }
}

pub struct ProjectionCompiler;

impl ProjectionCompiler {
    /// Compile `selector` once. Selectors may only read the main source.
    pub fn compile(selector: &Expr) -> QueryResult<Projector> {
        Ok(Projector {
            eval: compile_expr(selector)?,
        })
    }
}

fn single_source(source: SourceId) -> QueryResult<()> {
    if source == SourceId::MAIN {
        Ok(())
    } else {
        Err(QueryError::UnsupportedExpression(
            "selector reads more than one query source".to_string(),
        ))
    }
}

fn compile_expr(expr: &Expr) -> QueryResult<Eval> {
    let eval: Eval = match expr {
        Expr::Source(source) => {
            single_source(*source)?;
            let source = *source;
            Box::new(move |b: &Bindings<'_>| Ok(b.get(source)?.to_value()))
        }
        Expr::Member { source, name } => {
            single_source(*source)?;
            let (source, name) = (*source, name.clone());
            Box::new(move |b: &Bindings<'_>| b.get(source)?.member(&name))
        }
        Expr::Column { source, column } => {
            single_source(*source)?;
            let (source, column) = (*source, column.clone());
            Box::new(move |b: &Bindings<'_>| b.get(source)?.column(&column))
        }
        Expr::Literal(value) => {
            let value = value.clone();
            Box::new(move |_: &Bindings<'_>| Ok(value.clone()))
        }
        Expr::Binary { op, left, right } => {
            let (op, left, right) = (*op, compile_expr(left)?, compile_expr(right)?);
            Box::new(move |b: &Bindings<'_>| binary(op, left(b)?, right(b)?))
        }
        Expr::Not(inner) => {
            let inner = compile_expr(inner)?;
            Box::new(move |b: &Bindings<'_>| Ok(Value::Bool(!inner(b)?.is_truthy())))
        }
        Expr::StringCall { method, target, arg } => {
            let method = *method;
            let target = compile_expr(target)?;
            let arg = arg.as_deref().map(compile_expr).transpose()?;
            Box::new(move |b: &Bindings<'_>| {
                let target = target(b)?;
                let arg = match &arg {
                    Some(arg) => arg(b)?,
                    None => Value::Null,
                };
                Ok(Value::Bool(string_call(method, &target, &arg)))
            })
        }
        Expr::Function { func, arg } => {
            let (func, arg) = (*func, compile_expr(arg)?);
            Box::new(move |b: &Bindings<'_>| Ok(function(func, arg(b)?)))
        }
        Expr::Convert { kind, expr } => {
            let (kind, inner) = (*kind, compile_expr(expr)?);
            Box::new(move |b: &Bindings<'_>| convert(inner(b)?, kind))
        }
        Expr::Record(fields) => {
            let fields = fields
                .iter()
                .map(|(name, expr)| Ok((name.clone(), compile_expr(expr)?)))
                .collect::<QueryResult<Vec<_>>>()?;
            Box::new(move |b: &Bindings<'_>| {
                fields
                    .iter()
                    .map(|(name, eval)| Ok((name.clone(), eval(b)?)))
                    .collect::<QueryResult<Vec<_>>>()
                    .map(Value::Record)
            })
        }
        Expr::SubQuery(_) => {
            return Err(QueryError::UnsupportedExpression(
                "SubQuery is not supported in a selector".to_string(),
            ))
        }
    };
    Ok(eval)
}

fn binary(op: BinaryOp, left: Value, right: Value) -> QueryResult<Value> {
    let compared = || left.compare(&right);
    Ok(match op {
        BinaryOp::And => Value::Bool(left.is_truthy() && right.is_truthy()),
        BinaryOp::Or => Value::Bool(left.is_truthy() || right.is_truthy()),
        BinaryOp::Eq => Value::Bool(equals(&left, &right)),
        BinaryOp::Ne => Value::Bool(!equals(&left, &right)),
        BinaryOp::Lt => Value::Bool(compared() == Some(Ordering::Less)),
        BinaryOp::Le => Value::Bool(matches!(compared(), Some(Ordering::Less | Ordering::Equal))),
        BinaryOp::Gt => Value::Bool(compared() == Some(Ordering::Greater)),
        BinaryOp::Ge => Value::Bool(matches!(compared(), Some(Ordering::Greater | Ordering::Equal))),
        BinaryOp::Add if matches!(left, Value::Text(_)) || matches!(right, Value::Text(_)) => {
            Value::Text(format!("{}{}", left, right))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => arithmetic(op, left, right)?,
    })
}

fn equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        _ => left.compare(right) == Some(Ordering::Equal) || left == right,
    }
}

fn arithmetic(op: BinaryOp, left: Value, right: Value) -> QueryResult<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    if let (Value::Int(a), Value::Int(b)) = (&left, &right) {
        let (a, b) = (*a, *b);
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            _ => a.checked_div(b),
        };
        return result.map(Value::Int).ok_or_else(|| {
            QueryError::UnsupportedExpression(format!("{} overflows or divides by zero", op.name()))
        });
    }

    let as_float = |value: Value| -> QueryResult<f64> {
        match convert(value, crate::value::FieldKind::Float)? {
            Value::Float(x) => Ok(x),
            other => Err(QueryError::conversion(other, "float")),
        }
    };
    let (a, b) = (as_float(left)?, as_float(right)?);
    Ok(Value::Float(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        _ => a / b,
    }))
}

fn string_call(method: StringMethod, target: &Value, arg: &Value) -> bool {
    if method == StringMethod::IsNullOrEmpty {
        return target.is_null() || matches!(target, Value::Text(s) if s.is_empty());
    }
    if target.is_null() {
        return false;
    }
    let (target, arg) = (target.to_string(), arg.to_string());
    match method {
        StringMethod::Contains => target.contains(&arg),
        StringMethod::StartsWith => target.starts_with(&arg),
        StringMethod::EndsWith => target.ends_with(&arg),
        StringMethod::Equals => target == arg,
        StringMethod::IsNullOrEmpty => unreachable!("handled above"),
    }
}

fn function(func: ScalarFn, value: Value) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    let text = value.to_string();
    match func {
        ScalarFn::Upper => Value::Text(text.to_uppercase()),
        ScalarFn::Lower => Value::Text(text.to_lowercase()),
        ScalarFn::Trim => Value::Text(text.trim().to_string()),
        ScalarFn::Length => Value::Int(text.chars().count() as i64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{col, is_null_or_empty, item, lit, member, null, record};
    use crate::value::FieldKind;
    use test_case::test_case;

    struct Company;

    impl Bindable for Company {
        fn member(&self, name: &str) -> QueryResult<Value> {
            match name {
                "Name" => Ok(Value::from("ACME")),
                "Employees" => Ok(Value::Int(400)),
                "Revenue" => Ok(Value::Float(2.5)),
                "CEO" => Ok(Value::Null),
                other => Err(QueryError::UnsupportedExpression(format!("no member {}", other))),
            }
        }

        fn column(&self, column: &ColumnRef) -> QueryResult<Value> {
            Err(QueryError::UnsupportedExpression(column.to_string()))
        }

        fn to_value(&self) -> Value {
            Value::Record(vec![("Name".to_string(), Value::from("ACME"))])
        }
    }

    fn eval(expr: Expr) -> QueryResult<Value> {
        ProjectionCompiler::compile(&expr)?.apply_to(&Company)
    }

    #[test_case(member("Name"), Value::from("ACME") ; "member")]
    #[test_case(member("Employees").plus(1), Value::Int(401) ; "integer add")]
    #[test_case(member("Employees").times(member("Revenue")), Value::Float(1000.0) ; "mixed multiply")]
    #[test_case(member("Employees").divided_by(3), Value::Int(133) ; "integer divide truncates")]
    #[test_case(member("Name").plus(" Inc"), Value::from("ACME Inc") ; "concat")]
    #[test_case(member("Name").lower(), Value::from("acme") ; "lower")]
    #[test_case(member("Name").length(), Value::Int(4) ; "length")]
    #[test_case(member("Employees").gt(100).and(member("Name").starts_with("AC")), Value::Bool(true) ; "boolean")]
    #[test_case(member("CEO").eq(null()), Value::Bool(true) ; "null equals null")]
    #[test_case(is_null_or_empty(member("CEO")), Value::Bool(true) ; "is null or empty")]
    #[test_case(member("CEO").upper(), Value::Null ; "function of null")]
    #[test_case(member("Employees").cast(FieldKind::Text), Value::from("400") ; "cast")]
    #[test_case(member("Employees").minus(member("CEO")), Value::Null ; "arithmetic with null")]
    fn test_eval(expr: Expr, expected: Value) {
        assert_eq!(eval(expr).unwrap(), expected);
    }

    #[test]
    fn test_record_projection() {
        let value = eval(record([("n", member("Name")), ("e", member("Employees").times(2))])).unwrap();
        assert_eq!(value.field("n"), Some(&Value::from("ACME")));
        assert_eq!(value.field("e"), Some(&Value::Int(800)));
    }

    #[test]
    fn test_identity() {
        assert_eq!(eval(item()).unwrap().field("Name"), Some(&Value::from("ACME")));
    }

    #[test]
    fn test_errors() {
        assert!(eval(member("Missing")).is_err());
        assert!(eval(col("Name")).is_err());
        assert!(eval(lit(1).divided_by(0)).is_err());

        let other = Expr::Member {
            source: SourceId(1),
            name: "Name".to_string(),
        };
        assert!(matches!(
            ProjectionCompiler::compile(&other),
            Err(QueryError::UnsupportedExpression(_))
        ));
    }
}
