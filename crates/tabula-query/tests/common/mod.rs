//! Shared fixtures: a company workbook and the records read from it

#![allow(dead_code)]

use chrono::NaiveDate;
use std::sync::Arc;
use tabula_query::{MemoryDriver, QuerySession, Record, SchemaBuilder, Value};

pub const COMPANY_COLUMNS: &[&str] = &[
    "Company Title",
    "Boss",
    "Number of People",
    "Initiation Date",
    "State",
    "Active",
];

fn date(y: i32, m: u32, d: u32) -> Value {
    NaiveDate::from_ymd_opt(y, m, d).map(Value::from).unwrap_or_default()
}

pub fn company_rows() -> Vec<Vec<Value>> {
    vec![
        vec![
            "ACME".into(),
            "Wile E. Coyote".into(),
            2.into(),
            date(1918, 11, 11),
            "NM".into(),
            "Y".into(),
        ],
        vec![
            "Taylor University".into(),
            "Eugene Habecker".into(),
            12.into(),
            date(1846, 1, 1),
            "IN".into(),
            "Y".into(),
        ],
        vec![
            "Looney Tunes".into(),
            "Bugs Bunny".into(),
            1250.into(),
            date(1930, 1, 1),
            "CA".into(),
            "N".into(),
        ],
        vec![
            "Contoso".into(),
            Value::Null,
            400.into(),
            date(1990, 6, 15),
            "WA".into(),
            "Y".into(),
        ],
        vec![
            "Northwind".into(),
            "Jane Doe".into(),
            25.into(),
            date(2001, 3, 3),
            "IN".into(),
            "N".into(),
        ],
    ]
}

/// `Sheet1` and `Company Worksheet` hold the companies, `Padded` holds
/// whitespace-padded text, and `Firms` names `Sheet1!A1:B3`
pub fn company_driver() -> MemoryDriver {
    MemoryDriver::new()
        .with_sheet("Sheet1", COMPANY_COLUMNS, company_rows())
        .with_sheet("Company Worksheet", COMPANY_COLUMNS, company_rows())
        .with_sheet(
            "Padded",
            &["Name", "CEO"],
            vec![vec!["  ACME  ".into(), " Wile E. Coyote".into()]],
        )
        .with_named_range(None, "Firms", "A1", "B3")
        .with_named_range(Some("Company Worksheet"), "Leaders", "B1", "B6")
}

pub fn session(driver: &MemoryDriver) -> QuerySession {
    QuerySession::new("companies.xls", Arc::new(driver.clone()))
}

/// Session with every company column mapped
pub fn mapped_session(driver: &MemoryDriver) -> QuerySession {
    let mut session = session(driver);
    session.add_mapping("Name", "Company Title").unwrap();
    session.add_mapping("CEO", "Boss").unwrap();
    session.add_mapping("EmployeeCount", "Number of People").unwrap();
    session.add_mapping("StartDate", "Initiation Date").unwrap();
    session
        .add_mapping_with_transform("IsActive", "Active", |s| Value::Bool(s == "Y"))
        .unwrap();
    session
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Company {
    pub name: String,
    pub ceo: String,
    pub employee_count: i64,
    pub start_date: Option<NaiveDate>,
    pub state: String,
    pub is_active: bool,
}

impl Record for Company {
    const NAME: &'static str = "Company";

    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema.field("Name", |c| &c.name, |c, v| c.name = v);
        schema.field("CEO", |c| &c.ceo, |c, v| c.ceo = v);
        schema.field("EmployeeCount", |c| &c.employee_count, |c, v| c.employee_count = v);
        schema.field("StartDate", |c| &c.start_date, |c, v| c.start_date = v);
        schema.field("State", |c| &c.state, |c, v| c.state = v);
        schema.field("IsActive", |c| &c.is_active, |c, v| c.is_active = v);
    }
}

/// Same shape as [`Company`], with its columns declared on the type
#[derive(Debug, Default, Clone, PartialEq)]
pub struct HintedCompany {
    pub name: String,
    pub ceo: String,
    pub employee_count: i64,
}

impl Record for HintedCompany {
    const NAME: &'static str = "HintedCompany";

    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema
            .field("Name", |c| &c.name, |c, v| c.name = v)
            .column("Company Title");
        schema.field("CEO", |c| &c.ceo, |c, v| c.ceo = v).column("Boss");
        schema
            .field("EmployeeCount", |c| &c.employee_count, |c, v| c.employee_count = v)
            .column("Number of People");
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Person {
    pub name: String,
    pub ceo: String,
}

impl Record for Person {
    const NAME: &'static str = "Person";

    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema.field("Name", |p| &p.name, |p, v| p.name = v);
        schema.field("CEO", |p| &p.ceo, |p, v| p.ceo = v);
    }
}
