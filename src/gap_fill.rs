//! Missing-value filling: time-weighted interpolation and forward fill.

use tracing::debug;

use crate::table::{ObservationTable, TableError};

/// Interpolates missing cells on elapsed time and returns a new table.
///
/// Interior gaps are linear in time between the nearest known neighbours.
/// Leading and trailing gaps take the nearest known value. A column with no
/// known value at all is left as is.
pub fn interpolate_time(table: &ObservationTable) -> Result<ObservationTable, TableError> {
    interpolate_time_counted(table).map(|(out, _)| out)
}

/// Same as [`interpolate_time`], also returning how many cells were filled.
pub fn interpolate_time_counted(
    table: &ObservationTable,
) -> Result<(ObservationTable, usize), TableError> {
    table.validate_index()?;

    let times: Vec<f64> = table
        .index()
        .iter()
        .map(|ts| ts.timestamp_millis() as f64)
        .collect();
    let mut out = table.clone();
    let mut filled_total = 0usize;

    for column in out.columns_mut() {
        if !column.values.iter().any(|v| v.is_nan()) {
            continue;
        }
        let filled = interpolate_series(&times, &mut column.values);
        if filled > 0 {
            debug!(
                component = "features",
                event = "features.gap_fill.column",
                column = %column.name,
                filled
            );
        }
        filled_total += filled;
    }

    Ok((out, filled_total))
}

fn interpolate_series(times: &[f64], values: &mut [f64]) -> usize {
    let known: Vec<usize> = (0..values.len()).filter(|&i| !values[i].is_nan()).collect();
    let (Some(&first), Some(&last)) = (known.first(), known.last()) else {
        return 0;
    };

    let mut filled = 0;
    for i in 0..first {
        values[i] = values[first];
        filled += 1;
    }
    for i in last + 1..values.len() {
        values[i] = values[last];
        filled += 1;
    }
    for pair in known.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        if hi - lo < 2 {
            continue;
        }
        let span = times[hi] - times[lo];
        for i in lo + 1..hi {
            let frac = if span > 0.0 {
                (times[i] - times[lo]) / span
            } else {
                0.0
            };
            values[i] = values[lo] + frac * (values[hi] - values[lo]);
            filled += 1;
        }
    }
    filled
}

/// Carries the last valid value forward in every column, in place.
///
/// Leading gaps stay missing. Returns the number of cells filled.
pub fn forward_fill(table: &mut ObservationTable) -> usize {
    let mut filled = 0;
    for column in table.columns_mut() {
        let mut last: Option<f64> = None;
        for value in column.values.iter_mut() {
            if value.is_nan() {
                if let Some(prev) = last {
                    *value = prev;
                    filled += 1;
                }
            } else {
                last = Some(*value);
            }
        }
    }
    filled
}
