//! Row data model and shared table

mod row;
mod table;

pub use row::{now_display, now_ms, PriceDirection, Row, LOCK_DURATION_MS};
pub use table::RowTable;
