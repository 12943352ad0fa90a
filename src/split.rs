//! Train/test partition on the timestamp index.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::table::ObservationTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitBoundaries {
    /// First timestamp of the test set (inclusive).
    pub test_start: DateTime<Utc>,
    /// End of the training set (exclusive).
    pub train_end: DateTime<Utc>,
}

impl Default for SplitBoundaries {
    fn default() -> Self {
        Self {
            test_start: Utc
                .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                .single()
                .expect("valid test start"),
            train_end: Utc
                .with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
                .single()
                .expect("valid train end"),
        }
    }
}

/// Returns `(train, test)`: train holds rows before `train_end`, test rows from `test_start`.
///
/// The two sets overlap when `test_start < train_end` and leave a gap when it is later.
pub fn split_train_test(
    table: &ObservationTable,
    bounds: &SplitBoundaries,
) -> (ObservationTable, ObservationTable) {
    let train = table.filter_rows(|ts| *ts < bounds.train_end);
    let test = table.filter_rows(|ts| *ts >= bounds.test_start);
    (train, test)
}
