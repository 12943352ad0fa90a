//! Backward-looking lagged copies of named signals.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::signals::{
    AFRR_COVER_RATIO, HISTORICAL_SPREAD, IMBALANCE_STATUS, LOAD_ERR, MFRR_COVER_RATIO, SOLAR_ERR,
    SPREAD_LONG, SPREAD_SHORT, TARGET_VOLUME, TOTAL_DIFF, TOTAL_PROD, TOTAL_RESERVES, WIND_ERR,
};
use crate::table::{
    ObservationTable, TableError, AFRR_DOWN, AFRR_UP, FOSSIL_GAS_REAL, IMB_PRICE_NEG,
    IMB_PRICE_POS, IMB_VOLUME, LOAD_REAL, MFRR_DOWN, MFRR_UP, NUCLEAR_REAL, SOLAR_FCST,
    SOLAR_REAL, WIND_FCST, WIND_REAL,
};

pub const DEFAULT_LAG_OFFSETS: [usize; 3] = [4, 5, 6];

/// Signals lagged by the default pipeline, in output order.
pub const DEFAULT_LAGGED_SIGNALS: [&str; 27] = [
    IMB_PRICE_POS,
    IMB_PRICE_NEG,
    NUCLEAR_REAL,
    SOLAR_FCST,
    WIND_FCST,
    FOSSIL_GAS_REAL,
    IMB_VOLUME,
    LOAD_REAL,
    LOAD_ERR,
    SOLAR_REAL,
    SOLAR_ERR,
    WIND_REAL,
    WIND_ERR,
    AFRR_UP,
    AFRR_DOWN,
    MFRR_UP,
    MFRR_DOWN,
    HISTORICAL_SPREAD,
    AFRR_COVER_RATIO,
    MFRR_COVER_RATIO,
    IMBALANCE_STATUS,
    SPREAD_LONG,
    SPREAD_SHORT,
    TOTAL_RESERVES,
    TOTAL_DIFF,
    TOTAL_PROD,
    TARGET_VOLUME,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LagEntry {
    pub name: String,
    pub offsets: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LagSpec {
    pub entries: Vec<LagEntry>,
}

impl Default for LagSpec {
    fn default() -> Self {
        Self::uniform(&DEFAULT_LAGGED_SIGNALS, &DEFAULT_LAG_OFFSETS)
    }
}

impl LagSpec {
    pub fn uniform(names: &[&str], offsets: &[usize]) -> Self {
        Self {
            entries: names
                .iter()
                .map(|name| LagEntry {
                    name: name.to_string(),
                    offsets: offsets.to_vec(),
                })
                .collect(),
        }
    }

    /// Output names in creation order.
    pub fn lagged_column_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .flat_map(|entry| {
                entry
                    .offsets
                    .iter()
                    .map(move |k| lagged_column_name(&entry.name, *k))
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut names = HashSet::new();
        for entry in &self.entries {
            if !names.insert(entry.name.as_str()) {
                return Err(format!("lag entry {} is listed twice", entry.name));
            }
            let mut offsets = HashSet::new();
            for k in &entry.offsets {
                if *k == 0 {
                    return Err(format!("lag offsets for {} must be > 0", entry.name));
                }
                if !offsets.insert(*k) {
                    return Err(format!("lag offset {k} repeated for {}", entry.name));
                }
            }
        }
        Ok(())
    }
}

pub fn lagged_column_name(name: &str, offset: usize) -> String {
    format!("{name}_lagged_{offset}")
}

/// Value `offset` rows earlier, or the row's own value when that is unavailable.
pub fn lag_series(values: &[f64], offset: usize) -> Vec<f64> {
    values
        .iter()
        .enumerate()
        .map(|(i, current)| match i.checked_sub(offset).map(|j| values[j]) {
            Some(prev) if !prev.is_nan() => prev,
            _ => *current,
        })
        .collect()
}

/// Adds `{name}_lagged_{k}` for every entry of `spec`, optionally dropping the source.
///
/// Returns the number of columns created.
pub fn lag_features(
    table: &mut ObservationTable,
    spec: &LagSpec,
    drop_sources: bool,
) -> Result<usize, TableError> {
    let names: Vec<&str> = spec.entries.iter().map(|e| e.name.as_str()).collect();
    table.require_columns(&names)?;

    let mut created = 0;
    for entry in &spec.entries {
        let source = table.column(&entry.name)?.to_vec();
        for k in &entry.offsets {
            table.set_column(lagged_column_name(&entry.name, *k), lag_series(&source, *k))?;
            created += 1;
        }
        if drop_sources {
            table.drop_column(&entry.name);
        }
    }

    debug!(
        component = "features",
        event = "features.lags.built",
        signals = spec.entries.len(),
        columns = created,
        dropped_sources = drop_sources
    );
    Ok(created)
}
