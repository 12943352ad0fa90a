//! Calendar attributes of the timestamp index.

use chrono::{Datelike, Timelike};
use chrono_tz::Tz;

use crate::table::{ObservationTable, TableError};

pub const CALENDAR_COLUMNS: [&str; 8] = [
    "hour",
    "dayofweek",
    "quarter",
    "month",
    "year",
    "dayofyear",
    "dayofmonth",
    "weekofyear",
];

/// Adds the [`CALENDAR_COLUMNS`] as `f64`, read in the given timezone.
///
/// `dayofweek` counts from Monday = 0 and `weekofyear` is the ISO week.
pub fn add_calendar_features(table: &mut ObservationTable, tz: Tz) -> Result<(), TableError> {
    let n = table.len();
    let mut cols: [Vec<f64>; 8] = Default::default();
    for col in cols.iter_mut() {
        col.reserve(n);
    }

    for ts in table.index() {
        let local = ts.with_timezone(&tz);
        let month = local.month();
        let values = [
            local.hour() as f64,
            local.weekday().num_days_from_monday() as f64,
            ((month - 1) / 3 + 1) as f64,
            month as f64,
            local.year() as f64,
            local.ordinal() as f64,
            local.day() as f64,
            local.iso_week().week() as f64,
        ];
        for (col, value) in cols.iter_mut().zip(values) {
            col.push(value);
        }
    }

    for (name, values) in CALENDAR_COLUMNS.into_iter().zip(cols) {
        table.set_column(name, values)?;
    }
    Ok(())
}
