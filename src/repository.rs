//! CSV load/save for the monitored table
//!
//! Format: `id,symbol,price,qty,status,lastUpdate`. Loading is lenient:
//! malformed fields fall back to defaults rather than failing the whole
//! file, and bad records are counted instead of aborting the load.

use crate::error::Result;
use crate::model::{now_display, Row};
use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use std::path::Path;
use tracing::{debug, info, warn};

const HEADER: [&str; 6] = ["id", "symbol", "price", "qty", "status", "lastUpdate"];

/// Outcome of a CSV load.
#[derive(Debug)]
pub struct ParseResult {
    pub rows: Vec<Row>,
    pub error_count: usize,
}

impl ParseResult {
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }
}

/// Load rows from a CSV file.
pub fn load_csv(path: impl AsRef<Path>) -> Result<ParseResult> {
    let path = path.as_ref();
    info!("Loading CSV from {}", path.display());

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)?;

    let mut rows = Vec::new();
    let mut error_count = 0;
    let mut line_number = 0;

    for record in reader.records() {
        line_number += 1;
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping unreadable record at line {}: {}", line_number, e);
                error_count += 1;
                continue;
            }
        };

        if line_number == 1 && is_header(&record) {
            debug!("Skipping header line");
            continue;
        }
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }

        rows.push(parse_row(&record, line_number));
    }

    info!("Parsed {} rows, {} errors", rows.len(), error_count);
    Ok(ParseResult { rows, error_count })
}

/// Save rows to a CSV file, header included.
pub fn save_csv(path: impl AsRef<Path>, rows: &[Row]) -> Result<()> {
    let path = path.as_ref();
    info!("Saving {} rows to {}", rows.len(), path.display());

    let mut writer = WriterBuilder::new().from_path(path)?;
    writer.write_record(HEADER)?;
    for row in rows {
        writer.write_record([
            row.id.to_string(),
            row.symbol.clone(),
            format!("{:.2}", row.price),
            row.qty.to_string(),
            row.status.clone(),
            row.last_update.clone(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn is_header(record: &StringRecord) -> bool {
    record.len() >= 2
        && record[0].eq_ignore_ascii_case("id")
        && record[1].eq_ignore_ascii_case("symbol")
}

/// Build a row from one record, substituting defaults for anything that
/// does not parse. `line_number` stands in for a missing id.
fn parse_row(record: &StringRecord, line_number: usize) -> Row {
    let field = |i: usize| record.get(i).unwrap_or("");

    let id = parse_or(field(0), line_number as i32);
    let symbol = if field(1).is_empty() {
        "UNKNOWN".to_string()
    } else {
        field(1).to_string()
    };
    let price = parse_or(field(2), 0.0);
    let qty = parse_or(field(3), 0);
    let status = normalize_status(field(4));
    let last_update = if field(5).is_empty() {
        now_display()
    } else {
        field(5).to_string()
    };

    Row::new(id, symbol, price, qty, status, last_update)
}

fn parse_or<T: std::str::FromStr>(value: &str, default: T) -> T {
    if value.is_empty() {
        return default;
    }
    value.parse().unwrap_or_else(|_| {
        debug!("Invalid value '{}', using default", value);
        default
    })
}

/// Map status synonyms onto the canonical tags the UI styles by.
fn normalize_status(status: &str) -> String {
    if status.is_empty() {
        return "NORMAL".to_string();
    }
    match status.to_uppercase().as_str() {
        "ALERT" | "WARN" | "WARNING" => "ALERT".to_string(),
        "OK" | "NORMAL" | "GOOD" => "NORMAL".to_string(),
        "PENDING" | "WAIT" | "WAITING" => "PENDING".to_string(),
        "ACTIVE" | "RUNNING" | "LIVE" => "ACTIVE".to_string(),
        "CLOSED" | "DONE" | "COMPLETE" | "FINISHED" => "CLOSED".to_string(),
        other => other.to_string(),
    }
}
