//! Generic result rows.

mod cell;
mod row;

pub use cell::Cell;
pub use row::{ColumnIndex, HeaderlessRow, Row};
