//! Expression trees for predicates, orderings and selectors.
//!
//! A closed sum type: the predicate translator and the projection compiler
//! both match on it exhaustively, and every shape either of them cannot
//! handle has its own arm.

use crate::model::QueryModel;
use crate::value::{FieldKind, Value};
use std::fmt;

/// Identifies a logical query source. Only [`SourceId::MAIN`] is ever bound;
/// any other id stems from a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u32);

impl SourceId {
    pub const MAIN: SourceId = SourceId(0);
}

/// Column addressed on a generic row
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnRef {
    Name(String),
    /// Zero-based position, only meaningful on headerless rows
    Index(usize),
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRef::Name(name) => write!(f, "[\"{}\"]", name),
            ColumnRef::Index(i) => write!(f, "[{}]", i),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    /// Operator to use when the operands trade places
    pub fn mirrored(self) -> BinaryOp {
        match self {
            BinaryOp::Lt => BinaryOp::Gt,
            BinaryOp::Le => BinaryOp::Ge,
            BinaryOp::Gt => BinaryOp::Lt,
            BinaryOp::Ge => BinaryOp::Le,
            other => other,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Eq => "Equal",
            BinaryOp::Ne => "NotEqual",
            BinaryOp::Lt => "LessThan",
            BinaryOp::Le => "LessThanOrEqual",
            BinaryOp::Gt => "GreaterThan",
            BinaryOp::Ge => "GreaterThanOrEqual",
            BinaryOp::And => "AndAlso",
            BinaryOp::Or => "OrElse",
            BinaryOp::Add => "Add",
            BinaryOp::Sub => "Subtract",
            BinaryOp::Mul => "Multiply",
            BinaryOp::Div => "Divide",
        }
    }
}

/// String predicates that translate to filter text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringMethod {
    Contains,
    StartsWith,
    EndsWith,
    Equals,
    IsNullOrEmpty,
}

impl StringMethod {
    pub fn name(self) -> &'static str {
        match self {
            StringMethod::Contains => "Contains",
            StringMethod::StartsWith => "StartsWith",
            StringMethod::EndsWith => "EndsWith",
            StringMethod::Equals => "Equals",
            StringMethod::IsNullOrEmpty => "IsNullOrEmpty",
        }
    }
}

/// Scalar functions only available in selectors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarFn {
    Upper,
    Lower,
    Trim,
    Length,
}

impl ScalarFn {
    pub fn name(self) -> &'static str {
        match self {
            ScalarFn::Upper => "ToUpper",
            ScalarFn::Lower => "ToLower",
            ScalarFn::Trim => "Trim",
            ScalarFn::Length => "Length",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// The whole item of a query source
    Source(SourceId),
    /// Property of a typed record
    Member { source: SourceId, name: String },
    /// Column of a generic row
    Column { source: SourceId, column: ColumnRef },
    Literal(Value),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    /// `target.Method(arg)`; `IsNullOrEmpty` takes no argument
    StringCall {
        method: StringMethod,
        target: Box<Expr>,
        arg: Option<Box<Expr>>,
    },
    Function { func: ScalarFn, arg: Box<Expr> },
    /// Type-directed conversion, transparent in filters
    Convert { kind: FieldKind, expr: Box<Expr> },
    /// Named fields, e.g. `new { x.Name, x.CEO }`
    Record(Vec<(String, Expr)>),
    /// Nested query; never translatable
    SubQuery(Box<QueryModel>),
}

/// Property of the main query source
pub fn member(name: impl Into<String>) -> Expr {
    Expr::Member {
        source: SourceId::MAIN,
        name: name.into(),
    }
}

/// Named column of the main query source
pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column {
        source: SourceId::MAIN,
        column: ColumnRef::Name(name.into()),
    }
}

/// Positional column of the main query source
pub fn col_at(index: usize) -> Expr {
    Expr::Column {
        source: SourceId::MAIN,
        column: ColumnRef::Index(index),
    }
}

pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Literal(value.into())
}

/// The null literal
pub fn null() -> Expr {
    Expr::Literal(Value::Null)
}

/// The main query source item itself
pub fn item() -> Expr {
    Expr::Source(SourceId::MAIN)
}

pub fn is_null_or_empty(target: Expr) -> Expr {
    Expr::StringCall {
        method: StringMethod::IsNullOrEmpty,
        target: Box::new(target),
        arg: None,
    }
}

pub fn record<I, S>(fields: I) -> Expr
where
    I: IntoIterator<Item = (S, Expr)>,
    S: Into<String>,
{
    Expr::Record(fields.into_iter().map(|(n, e)| (n.into(), e)).collect())
}

impl Expr {
    fn binary(self, op: BinaryOp, other: impl Into<Expr>) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(self),
            right: Box::new(other.into()),
        }
    }

    pub fn eq(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Eq, other)
    }

    pub fn ne(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Ne, other)
    }

    pub fn lt(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Lt, other)
    }

    pub fn le(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Le, other)
    }

    pub fn gt(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Gt, other)
    }

    pub fn ge(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Ge, other)
    }

    pub fn and(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::And, other)
    }

    pub fn or(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Or, other)
    }

    pub fn plus(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Add, other)
    }

    pub fn minus(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Sub, other)
    }

    pub fn times(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Mul, other)
    }

    pub fn divided_by(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Div, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    fn string_call(self, method: StringMethod, arg: impl Into<Expr>) -> Expr {
        Expr::StringCall {
            method,
            target: Box::new(self),
            arg: Some(Box::new(arg.into())),
        }
    }

    pub fn contains(self, arg: impl Into<Expr>) -> Expr {
        self.string_call(StringMethod::Contains, arg)
    }

    pub fn starts_with(self, arg: impl Into<Expr>) -> Expr {
        self.string_call(StringMethod::StartsWith, arg)
    }

    pub fn ends_with(self, arg: impl Into<Expr>) -> Expr {
        self.string_call(StringMethod::EndsWith, arg)
    }

    pub fn equals(self, arg: impl Into<Expr>) -> Expr {
        self.string_call(StringMethod::Equals, arg)
    }

    pub fn upper(self) -> Expr {
        Expr::Function {
            func: ScalarFn::Upper,
            arg: Box::new(self),
        }
    }

    pub fn lower(self) -> Expr {
        Expr::Function {
            func: ScalarFn::Lower,
            arg: Box::new(self),
        }
    }

    pub fn trim(self) -> Expr {
        Expr::Function {
            func: ScalarFn::Trim,
            arg: Box::new(self),
        }
    }

    pub fn length(self) -> Expr {
        Expr::Function {
            func: ScalarFn::Length,
            arg: Box::new(self),
        }
    }

    pub fn cast(self, kind: FieldKind) -> Expr {
        Expr::Convert {
            kind,
            expr: Box::new(self),
        }
    }

    /// Strip conversions, which never change which column is addressed
    pub fn unwrap_convert(&self) -> &Expr {
        match self {
            Expr::Convert { expr, .. } => expr.unwrap_convert(),
            other => other,
        }
    }

    /// True for member/column access, possibly behind conversions
    pub fn is_column_access(&self) -> bool {
        matches!(
            self.unwrap_convert(),
            Expr::Member { .. } | Expr::Column { .. }
        )
    }

    pub fn is_null_literal(&self) -> bool {
        matches!(self, Expr::Literal(Value::Null))
    }

    /// Short description of the node kind, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expr::Source(_) => "QuerySourceReference",
            Expr::Member { .. } => "MemberAccess",
            Expr::Column { .. } => "ColumnAccess",
            Expr::Literal(_) => "Constant",
            Expr::Binary { op, .. } => op.name(),
            Expr::Not(_) => "Not",
            Expr::StringCall { method, .. } => method.name(),
            Expr::Function { func, .. } => func.name(),
            Expr::Convert { .. } => "Convert",
            Expr::Record(_) => "New",
            Expr::SubQuery(_) => "SubQuery",
        }
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Literal(value)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        lit(s)
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        lit(s)
    }
}

impl From<i32> for Expr {
    fn from(i: i32) -> Self {
        lit(i)
    }
}

impl From<i64> for Expr {
    fn from(i: i64) -> Self {
        lit(i)
    }
}

impl From<f64> for Expr {
    fn from(x: f64) -> Self {
        lit(x)
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        lit(b)
    }
}

impl From<chrono::NaiveDateTime> for Expr {
    fn from(dt: chrono::NaiveDateTime) -> Self {
        lit(dt)
    }
}
