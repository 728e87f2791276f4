//! In-memory workbook driver.
//!
//! Holds worksheets as grids of [`Value`]s (row 0 is spreadsheet row 1) and
//! evaluates the statement dialect the compiler emits: `*`, `TOP n *`,
//! `COUNT(*)`, `DISTINCT([c])`, `SUM/MIN/MAX/AVG([c])`, a `WHERE` predicate
//! with `?` placeholders and a single-key `ORDER BY`. Every executed
//! statement is recorded, and connection lifetimes are counted.

use crate::driver::{Connection, ConnectionSpec, Driver, DriverError, RowCursor, VecCursor, SCALAR_COLUMN};
use crate::value::{convert, FieldKind, Value};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

const MISSING_PARAMETER: &str = "No value given for one or more required parameters.";

/// A statement as the driver received it
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Clone)]
struct NamedRange {
    worksheet: Option<String>,
    name: String,
    start: CellPosition,
    end: CellPosition,
}

#[derive(Debug, Default)]
struct Workbook {
    sheets: Vec<(String, Vec<Vec<Value>>)>,
    named_ranges: Vec<NamedRange>,
    pending_failure: Option<String>,
    statements: Vec<ExecutedStatement>,
    opened: usize,
    live: usize,
}

impl Workbook {
    fn sheet(&self, name: &str) -> Option<&Vec<Vec<Value>>> {
        self.sheets.iter().find(|(n, _)| n == name).map(|(_, grid)| grid)
    }
}

/// Driver over worksheets held in memory. Clones share the same workbook.
#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
    workbook: Arc<Mutex<Workbook>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a worksheet with a header row followed by `rows`
    pub fn with_sheet(self, name: &str, header: &[&str], rows: Vec<Vec<Value>>) -> Self {
        let mut grid = Vec::with_capacity(rows.len() + 1);
        grid.push(header.iter().map(|h| Value::from(*h)).collect());
        grid.extend(rows);
        self.add_grid(name, grid);
        self
    }

    /// Add a worksheet from raw cells; nothing is treated as a header
    pub fn with_grid(self, name: &str, grid: Vec<Vec<Value>>) -> Self {
        self.add_grid(name, grid);
        self
    }

    /// Declare a named range, scoped to `worksheet` or to the workbook
    pub fn with_named_range(self, worksheet: Option<&str>, name: &str, start: &str, end: &str) -> Self {
        let (Some(start), Some(end)) = (CellPosition::parse(start), CellPosition::parse(end)) else {
            return self;
        };
        self.workbook.lock().named_ranges.push(NamedRange {
            worksheet: worksheet.map(str::to_string),
            name: name.to_string(),
            start,
            end,
        });
        self
    }

    pub fn add_grid(&self, name: &str, grid: Vec<Vec<Value>>) {
        let mut workbook = self.workbook.lock();
        workbook.sheets.retain(|(n, _)| n != name);
        workbook.sheets.push((name.to_string(), grid));
    }

    /// Make the next executed statement fail with `message`
    pub fn fail_next(&self, message: impl Into<String>) {
        self.workbook.lock().pending_failure = Some(message.into());
    }

    /// Every statement executed so far, oldest first
    pub fn statements(&self) -> Vec<ExecutedStatement> {
        self.workbook.lock().statements.clone()
    }

    pub fn last_statement(&self) -> Option<ExecutedStatement> {
        self.workbook.lock().statements.last().cloned()
    }

    /// Number of connections ever opened
    pub fn opened_connections(&self) -> usize {
        self.workbook.lock().opened
    }

    /// Number of connections currently open
    pub fn live_connections(&self) -> usize {
        self.workbook.lock().live
    }
}

impl Driver for MemoryDriver {
    fn name(&self) -> &str {
        "memory"
    }

    fn open(&self, spec: &ConnectionSpec) -> Result<Box<dyn Connection>, DriverError> {
        let mut workbook = self.workbook.lock();
        workbook.opened += 1;
        workbook.live += 1;
        debug!(path = %spec.path.display(), has_header = spec.has_header, "Opened memory connection");
        Ok(Box::new(MemoryConnection {
            workbook: Arc::clone(&self.workbook),
            has_header: spec.has_header,
        }))
    }
}

struct MemoryConnection {
    workbook: Arc<Mutex<Workbook>>,
    has_header: bool,
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        let mut workbook = self.workbook.lock();
        workbook.live = workbook.live.saturating_sub(1);
    }
}

impl Connection for MemoryConnection {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<Box<dyn RowCursor + '_>, DriverError> {
        let mut workbook = self.workbook.lock();
        workbook.statements.push(ExecutedStatement {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        if let Some(message) = workbook.pending_failure.take() {
            return Err(DriverError::new(message));
        }

        let statement = Parser::new(tokenize(sql)?, params).statement()?;
        let (columns, rows) = load_table(&workbook, &statement.table, self.has_header)?;
        drop(workbook);

        let (columns, rows) = statement.evaluate(columns, rows)?;
        Ok(Box::new(VecCursor::new(columns, rows)))
    }

    fn table_names(&mut self) -> Result<Vec<String>, DriverError> {
        let workbook = self.workbook.lock();
        let mut names: Vec<String> = workbook
            .sheets
            .iter()
            .map(|(name, _)| quote_table_name(&format!("{}$", name)))
            .collect();
        names.extend(workbook.named_ranges.iter().map(|range| match &range.worksheet {
            Some(worksheet) => quote_table_name(&format!("{}${}", worksheet, range.name)),
            None => range.name.clone(),
        }));
        Ok(names)
    }
}

fn quote_table_name(name: &str) -> String {
    if name.contains(' ') || name.contains('-') {
        format!("'{}'", name)
    } else {
        name.to_string()
    }
}

// ============================================================================
// Table loading
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CellPosition {
    row: usize,
    column: usize,
}

impl CellPosition {
    /// Parse `B3` into zero-based row 2, column 1
    fn parse(reference: &str) -> Option<Self> {
        let split = reference.find(|c: char| c.is_ascii_digit())?;
        let (letters, digits) = reference.split_at(split);
        if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }
        let column = letters
            .to_ascii_uppercase()
            .bytes()
            .fold(0usize, |acc, b| acc * 26 + (b - b'A' + 1) as usize);
        let row: usize = digits.parse().ok()?;
        Some(Self {
            row: row.checked_sub(1)?,
            column: column - 1,
        })
    }
}

fn table_not_found(table: &str) -> DriverError {
    DriverError::new(format!(
        "The engine could not find the object '{}'. Make sure the object exists and that you spell its name correctly.",
        table
    ))
}

fn slice(grid: &[Vec<Value>], start: CellPosition, end: CellPosition) -> Vec<Vec<Value>> {
    (start.row..=end.row)
        .filter_map(|r| grid.get(r))
        .map(|row| {
            (start.column..=end.column)
                .map(|c| row.get(c).cloned().unwrap_or_default())
                .collect()
        })
        .collect()
}

fn load_table(
    workbook: &Workbook,
    table: &str,
    has_header: bool,
) -> Result<(Vec<String>, Vec<Vec<Value>>), DriverError> {
    let grid = if let Some(grid) = workbook.sheet(table) {
        grid.clone()
    } else if let Some((worksheet, rest)) = table.rsplit_once('$') {
        let sheet = workbook
            .sheet(worksheet)
            .ok_or_else(|| table_not_found(&format!("{}$", worksheet)))?;
        if rest.is_empty() {
            sheet.clone()
        } else if let Some((start, end)) = rest.split_once(':') {
            let start = CellPosition::parse(start).ok_or_else(|| table_not_found(table))?;
            let end = CellPosition::parse(end).ok_or_else(|| table_not_found(table))?;
            slice(sheet, start, end)
        } else {
            let range = workbook
                .named_ranges
                .iter()
                .find(|r| r.name == rest && r.worksheet.as_deref().map_or(true, |w| w == worksheet))
                .ok_or_else(|| table_not_found(table))?;
            slice(sheet, range.start, range.end)
        }
    } else {
        let range = workbook
            .named_ranges
            .iter()
            .find(|r| r.worksheet.is_none() && r.name == table)
            .ok_or_else(|| table_not_found(table))?;
        // Workbook-scoped ranges live on the first worksheet
        let sheet = workbook
            .sheets
            .first()
            .map(|(_, grid)| grid)
            .ok_or_else(|| table_not_found(table))?;
        slice(sheet, range.start, range.end)
    };

    let width = grid.iter().map(Vec::len).max().unwrap_or(0);
    let mut rows: Vec<Vec<Value>> = grid
        .into_iter()
        .map(|mut row| {
            row.resize(width, Value::Null);
            row
        })
        .collect();

    let columns = if has_header && !rows.is_empty() {
        let header = rows.remove(0);
        header
            .iter()
            .enumerate()
            .map(|(i, v)| match v.to_string() {
                name if name.trim().is_empty() => format!("F{}", i + 1),
                name => name,
            })
            .collect()
    } else {
        (1..=width).map(|i| format!("F{}", i)).collect()
    };
    Ok((columns, rows))
}

// ============================================================================
// Statement parsing
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Bracketed(String),
    Param,
    Text(String),
    Number(Value),
    LParen,
    RParen,
    Star,
    Op(&'static str),
}

fn tokenize(sql: &str) -> Result<Vec<Token>, DriverError> {
    let mut tokens = Vec::new();
    let mut chars = sql.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '[' => {
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(c) => name.push(c),
                        None => return Err(DriverError::new("Unterminated bracketed name")),
                    }
                }
                tokens.push(Token::Bracketed(name));
            }
            '\'' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('\'') if chars.peek() == Some(&'\'') => {
                            chars.next();
                            text.push('\'');
                        }
                        Some('\'') => break,
                        Some(c) => text.push(c),
                        None => return Err(DriverError::new("Unterminated string literal")),
                    }
                }
                tokens.push(Token::Text(text));
            }
            '?' => {
                chars.next();
                tokens.push(Token::Param);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Op("="));
            }
            '<' => {
                chars.next();
                let op = match chars.peek() {
                    Some('>') => "<>",
                    Some('=') => "<=",
                    _ => "<",
                };
                if op.len() == 2 {
                    chars.next();
                }
                tokens.push(Token::Op(op));
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Op(">="));
                } else {
                    tokens.push(Token::Op(">"));
                }
            }
            c if c.is_ascii_digit() => {
                let mut number = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        number.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = match number.parse::<i64>() {
                    Ok(i) => Value::Int(i),
                    Err(_) => number
                        .parse::<f64>()
                        .map(Value::Float)
                        .map_err(|_| DriverError::new(format!("Invalid number '{}'", number)))?,
                };
                tokens.push(Token::Number(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&w) = chars.peek() {
                    if w.is_alphanumeric() || w == '_' {
                        word.push(w);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Word(word));
            }
            other => {
                return Err(DriverError::new(format!(
                    "Syntax error: unexpected character '{}'",
                    other
                )))
            }
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq)]
enum Selection {
    All,
    Top(usize),
    Count,
    Distinct(String),
    Aggregate(AggregateFn, String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum AggregateFn {
    Sum,
    Min,
    Max,
    Avg,
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Column(String),
    Literal(Value),
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
    Compare(Operand, &'static str, Operand),
    IsNull(Operand, bool),
    Like(Operand, Operand),
}

#[derive(Debug)]
struct Statement {
    selection: Selection,
    table: String,
    condition: Option<Condition>,
    order_by: Option<(String, bool)>,
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    params: &'a [Value],
    next_param: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: Vec<Token>, params: &'a [Value]) -> Self {
        Self {
            tokens,
            pos: 0,
            params,
            next_param: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn peek_word(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn eat_word(&mut self, keyword: &str) -> bool {
        if self.peek_word(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_word(&mut self, keyword: &str) -> Result<(), DriverError> {
        if self.eat_word(keyword) {
            Ok(())
        } else {
            Err(self.syntax_error(keyword))
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), DriverError> {
        if self.peek() == Some(&token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.syntax_error(&format!("{:?}", token)))
        }
    }

    fn expect_bracketed(&mut self) -> Result<String, DriverError> {
        match self.advance() {
            Some(Token::Bracketed(name)) => Ok(name),
            _ => Err(self.syntax_error("bracketed name")),
        }
    }

    fn syntax_error(&self, expected: &str) -> DriverError {
        DriverError::new(format!(
            "Syntax error: expected {} at token {}",
            expected, self.pos
        ))
    }

    fn statement(mut self) -> Result<Statement, DriverError> {
        self.expect_word("SELECT")?;
        let selection = self.selection()?;
        self.expect_word("FROM")?;
        let table = self.expect_bracketed()?;

        let condition = if self.eat_word("WHERE") {
            Some(self.or()?)
        } else {
            None
        };

        let order_by = if self.eat_word("ORDER") {
            self.expect_word("BY")?;
            let column = self.expect_bracketed()?;
            let descending = if self.eat_word("DESC") {
                true
            } else {
                self.eat_word("ASC");
                false
            };
            Some((column, descending))
        } else {
            None
        };

        if self.peek().is_some() {
            return Err(self.syntax_error("end of statement"));
        }
        if self.next_param != self.params.len() {
            return Err(DriverError::new(format!(
                "Statement has {} placeholders but {} parameters were bound",
                self.next_param,
                self.params.len()
            )));
        }

        Ok(Statement {
            selection,
            table,
            condition,
            order_by,
        })
    }

    fn selection(&mut self) -> Result<Selection, DriverError> {
        if self.peek() == Some(&Token::Star) {
            self.pos += 1;
            return Ok(Selection::All);
        }
        if self.eat_word("TOP") {
            let count = match self.advance() {
                Some(Token::Number(Value::Int(n))) if n >= 0 => n as usize,
                _ => return Err(self.syntax_error("row count")),
            };
            self.expect(Token::Star)?;
            return Ok(Selection::Top(count));
        }
        if self.eat_word("COUNT") {
            self.expect(Token::LParen)?;
            self.expect(Token::Star)?;
            self.expect(Token::RParen)?;
            return Ok(Selection::Count);
        }

        let function = match self.advance() {
            Some(Token::Word(w)) => w.to_ascii_uppercase(),
            _ => return Err(self.syntax_error("selection")),
        };
        self.expect(Token::LParen)?;
        let column = self.expect_bracketed()?;
        self.expect(Token::RParen)?;

        match function.as_str() {
            "DISTINCT" => Ok(Selection::Distinct(column)),
            "SUM" => Ok(Selection::Aggregate(AggregateFn::Sum, column)),
            "MIN" => Ok(Selection::Aggregate(AggregateFn::Min, column)),
            "MAX" => Ok(Selection::Aggregate(AggregateFn::Max, column)),
            "AVG" => Ok(Selection::Aggregate(AggregateFn::Avg, column)),
            other => Err(DriverError::new(format!("Undefined function '{}'", other))),
        }
    }

    fn or(&mut self) -> Result<Condition, DriverError> {
        let mut left = self.and()?;
        while self.eat_word("OR") {
            let right = self.and()?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Condition, DriverError> {
        let mut left = self.unary()?;
        while self.eat_word("AND") {
            let right = self.unary()?;
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Condition, DriverError> {
        if self.eat_word("NOT") {
            return Ok(Condition::Not(Box::new(self.unary()?)));
        }
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.or()?;
            self.expect(Token::RParen)?;
            return Ok(inner);
        }

        let left = self.operand()?;
        if self.eat_word("IS") {
            let negated = self.eat_word("NOT");
            self.expect_word("NULL")?;
            return Ok(Condition::IsNull(left, negated));
        }
        if self.eat_word("LIKE") {
            let pattern = self.operand()?;
            return Ok(Condition::Like(left, pattern));
        }
        match self.advance() {
            Some(Token::Op(op)) => {
                let right = self.operand()?;
                Ok(Condition::Compare(left, op, right))
            }
            _ => Err(self.syntax_error("comparison operator")),
        }
    }

    fn operand(&mut self) -> Result<Operand, DriverError> {
        match self.advance() {
            Some(Token::Bracketed(name)) => Ok(Operand::Column(name)),
            Some(Token::Param) => {
                let value = self
                    .params
                    .get(self.next_param)
                    .cloned()
                    .ok_or_else(|| DriverError::new(MISSING_PARAMETER))?;
                self.next_param += 1;
                Ok(Operand::Literal(value))
            }
            Some(Token::Text(text)) => Ok(Operand::Literal(Value::Text(text))),
            Some(Token::Number(value)) => Ok(Operand::Literal(value)),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("NULL") => Ok(Operand::Literal(Value::Null)),
            _ => Err(self.syntax_error("operand")),
        }
    }
}

// ============================================================================
// Evaluation
// ============================================================================

fn position(columns: &[String], name: &str) -> Result<usize, DriverError> {
    columns
        .iter()
        .position(|c| c == name)
        .ok_or_else(|| DriverError::new(MISSING_PARAMETER))
}

impl Operand {
    fn check(&self, columns: &[String]) -> Result<(), DriverError> {
        match self {
            Operand::Column(name) => position(columns, name).map(|_| ()),
            Operand::Literal(_) => Ok(()),
        }
    }

    fn value<'r>(&'r self, columns: &[String], row: &'r [Value]) -> &'r Value {
        const NULL: &Value = &Value::Null;
        match self {
            Operand::Column(name) => columns
                .iter()
                .position(|c| c == name)
                .and_then(|i| row.get(i))
                .unwrap_or(NULL),
            Operand::Literal(value) => value,
        }
    }
}

impl Condition {
    fn check(&self, columns: &[String]) -> Result<(), DriverError> {
        match self {
            Condition::And(l, r) | Condition::Or(l, r) => {
                l.check(columns)?;
                r.check(columns)
            }
            Condition::Not(inner) => inner.check(columns),
            Condition::Compare(l, _, r) | Condition::Like(l, r) => {
                l.check(columns)?;
                r.check(columns)
            }
            Condition::IsNull(operand, _) => operand.check(columns),
        }
    }

    fn matches(&self, columns: &[String], row: &[Value]) -> bool {
        match self {
            Condition::And(l, r) => l.matches(columns, row) && r.matches(columns, row),
            Condition::Or(l, r) => l.matches(columns, row) || r.matches(columns, row),
            Condition::Not(inner) => !inner.matches(columns, row),
            Condition::IsNull(operand, negated) => operand.value(columns, row).is_null() != *negated,
            Condition::Like(target, pattern) => {
                let target = target.value(columns, row);
                let pattern = pattern.value(columns, row);
                !target.is_null() && like(&target.to_string(), &pattern.to_string())
            }
            Condition::Compare(l, op, r) => {
                let ordering = l.value(columns, row).compare(r.value(columns, row));
                match (*op, ordering) {
                    (_, None) => false,
                    ("=", Some(o)) => o == Ordering::Equal,
                    ("<>", Some(o)) => o != Ordering::Equal,
                    ("<", Some(o)) => o == Ordering::Less,
                    ("<=", Some(o)) => o != Ordering::Greater,
                    (">", Some(o)) => o == Ordering::Greater,
                    (">=", Some(o)) => o != Ordering::Less,
                    _ => false,
                }
            }
        }
    }
}

/// Case-insensitive `LIKE` with `%` wildcards
fn like(text: &str, pattern: &str) -> bool {
    let text = text.to_lowercase();
    let pattern = pattern.to_lowercase();
    let parts: Vec<&str> = pattern.split('%').collect();
    if parts.len() == 1 {
        return text == pattern;
    }

    let (first, rest) = (parts[0], &parts[1..]);
    let Some(mut remaining) = text.strip_prefix(first) else {
        return false;
    };
    let (last, middle) = match rest.split_last() {
        Some(split) => split,
        None => return true,
    };
    for part in middle {
        match remaining.find(part) {
            Some(at) => remaining = &remaining[at + part.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last)
}

impl Statement {
    fn evaluate(
        self,
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    ) -> Result<(Vec<String>, Vec<Vec<Value>>), DriverError> {
        if let Some(condition) = &self.condition {
            condition.check(&columns)?;
        }
        let order = match &self.order_by {
            Some((column, descending)) => Some((position(&columns, column)?, *descending)),
            None => None,
        };

        let mut rows: Vec<Vec<Value>> = match &self.condition {
            Some(condition) => rows
                .into_iter()
                .filter(|row| condition.matches(&columns, row))
                .collect(),
            None => rows,
        };

        if let Some((index, descending)) = order {
            rows.sort_by(|a, b| {
                let ordering = match (a[index].is_null(), b[index].is_null()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    (false, false) => a[index].compare(&b[index]).unwrap_or(Ordering::Equal),
                };
                if descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        match self.selection {
            Selection::All => Ok((columns, rows)),
            Selection::Top(n) => {
                rows.truncate(n);
                Ok((columns, rows))
            }
            Selection::Count => Ok((
                vec![SCALAR_COLUMN.to_string()],
                vec![vec![Value::Int(rows.len() as i64)]],
            )),
            Selection::Distinct(column) => {
                let index = position(&columns, &column)?;
                let mut seen: Vec<Value> = Vec::new();
                for row in rows {
                    let value = row[index].clone();
                    if !seen.contains(&value) {
                        seen.push(value);
                    }
                }
                Ok((vec![column], seen.into_iter().map(|v| vec![v]).collect()))
            }
            Selection::Aggregate(function, column) => {
                let index = position(&columns, &column)?;
                let values: Vec<Value> = rows
                    .into_iter()
                    .map(|mut row| row.swap_remove(index))
                    .filter(|v| !v.is_null())
                    .collect();
                let result = aggregate(function, values)?;
                Ok((vec![SCALAR_COLUMN.to_string()], vec![vec![result]]))
            }
        }
    }
}

fn aggregate(function: AggregateFn, values: Vec<Value>) -> Result<Value, DriverError> {
    if values.is_empty() {
        return Ok(Value::Null);
    }
    match function {
        AggregateFn::Min | AggregateFn::Max => {
            let wanted = if function == AggregateFn::Min {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let mut best = values[0].clone();
            for value in values.into_iter().skip(1) {
                if value.compare(&best) == Some(wanted) {
                    best = value;
                }
            }
            Ok(best)
        }
        AggregateFn::Sum | AggregateFn::Avg => {
            let count = values.len();
            let all_integers = values.iter().all(|v| matches!(v, Value::Int(_)));
            let mut total = 0.0;
            for value in values {
                match convert(value, FieldKind::Float) {
                    Ok(Value::Float(x)) => total += x,
                    Ok(_) => {}
                    Err(_) => return Err(DriverError::new("Data type mismatch in criteria expression.")),
                }
            }
            Ok(match function {
                AggregateFn::Sum if all_integers => Value::Int(total as i64),
                AggregateFn::Sum => Value::Float(total),
                _ => Value::Float(total / count as f64),
            })
        }
    }
}
