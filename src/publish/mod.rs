//! Flattening of enriched rows into the fixed 12-column sheet layout and the
//! sinks that receive it.
pub mod csv_file;
pub mod sheets;

use async_trait::async_trait;
use serde_json::{Number, Value};

use crate::error::Result;
use crate::reconcile::EnrichedRow;

pub use csv_file::CsvPublisher;
pub use sheets::GoogleSheetsPublisher;

pub const COLUMN_COUNT: usize = 12;

pub const COLUMNS: [&str; COLUMN_COUNT] = [
    "Icon",
    "App ID",
    "Name",
    "Paid",
    "Hours",
    "Price/Hour",
    "Achievements",
    "Discount",
    "Package",
    "Purchased",
    "Location",
    "License",
];

/// Rows above the data (the header row in the target sheet).
pub const HEADER_ROWS: usize = 1;
/// 1-based sheet row where data starts.
pub const FIRST_DATA_ROW: usize = HEADER_ROWS + 1;

pub const DATE_CELL_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Integer(u64),
    Number(f64),
    Empty,
}

impl Cell {
    pub fn to_json(&self) -> Value {
        match self {
            Cell::Text(s) => Value::String(s.clone()),
            Cell::Integer(n) => Value::from(*n),
            Cell::Number(n) => Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(String::new())),
            Cell::Empty => Value::String(String::new()),
        }
    }

    pub fn to_field(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Integer(n) => n.to_string(),
            Cell::Number(n) => n.to_string(),
            Cell::Empty => String::new(),
        }
    }
}

/// icon, id, name, paid, time, pricePerHour, achv, discount, package, date, location, license.
pub fn row_cells(row: &EnrichedRow) -> [Cell; COLUMN_COUNT] {
    let license = row.license.as_ref();
    [
        Cell::Text(row.icon.clone()),
        Cell::Integer(row.appid),
        Cell::Text(row.name.clone()),
        Cell::Number(row.paid),
        Cell::Number(row.playtime_hours),
        Cell::Number(row.price_per_hour),
        row.achievement.map(Cell::Number).unwrap_or(Cell::Empty),
        Cell::Number(row.discount),
        license.map(|l| Cell::Integer(l.package)).unwrap_or(Cell::Empty),
        license
            .map(|l| Cell::Text(l.date.format(DATE_CELL_FORMAT).to_string()))
            .unwrap_or(Cell::Empty),
        license
            .map(|l| Cell::Text(l.location.clone()))
            .unwrap_or(Cell::Empty),
        license
            .map(|l| Cell::Text(l.license_type.clone()))
            .unwrap_or(Cell::Empty),
    ]
}

pub fn grid(rows: &[EnrichedRow]) -> Vec<[Cell; COLUMN_COUNT]> {
    rows.iter().map(row_cells).collect()
}

/// Destination for a finished set of rows.
#[async_trait]
pub trait Publisher {
    async fn publish(&self, rows: &[EnrichedRow]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::LicenseFields;
    use chrono::NaiveDate;

    fn row() -> EnrichedRow {
        EnrichedRow {
            appid: 10,
            name: "A".into(),
            icon: "=IMAGE(\"x\"; 1)".into(),
            paid: 10.0,
            playtime_hours: 2.0,
            price_per_hour: 5.0,
            achievement: None,
            discount: 0.5,
            license: None,
        }
    }

    #[test]
    fn unlicensed_row_has_empty_trailing_cells() {
        let cells = row_cells(&row());
        assert_eq!(cells.len(), COLUMN_COUNT);
        assert_eq!(cells[1], Cell::Integer(10));
        assert_eq!(cells[6], Cell::Empty);
        assert!(cells[8..].iter().all(|c| *c == Cell::Empty));
    }

    #[test]
    fn licensed_row_formats_date() {
        let mut r = row();
        r.achievement = Some(0.25);
        r.license = Some(LicenseFields {
            package: 5,
            date: NaiveDate::from_ymd_opt(2013, 6, 7)
                .unwrap()
                .and_hms_opt(3, 4, 5)
                .unwrap(),
            location: "US".into(),
            license_type: "single".into(),
        });
        let cells = row_cells(&r);
        assert_eq!(cells[6], Cell::Number(0.25));
        assert_eq!(cells[8], Cell::Integer(5));
        assert_eq!(cells[9], Cell::Text("06/07/2013 03:04:05".into()));
        assert_eq!(cells[10], Cell::Text("US".into()));
        assert_eq!(cells[11], Cell::Text("single".into()));
    }

    #[test]
    fn cells_render_to_json() {
        assert_eq!(Cell::Number(2.5).to_json(), serde_json::json!(2.5));
        assert_eq!(Cell::Number(f64::NAN).to_json(), serde_json::json!(""));
        assert_eq!(Cell::Empty.to_json(), serde_json::json!(""));
        assert_eq!(Cell::Integer(7).to_field(), "7");
    }
}
