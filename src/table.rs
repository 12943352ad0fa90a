//! Timestamp-indexed column table shared by every pipeline stage.

use chrono::{DateTime, Utc};
use thiserror::Error;

pub const IMB_VOLUME: &str = "imb_volume";
pub const IMB_PRICE_POS: &str = "imb_price_pos";
pub const IMB_PRICE_NEG: &str = "imb_price_neg";
pub const AFRR_UP: &str = "afrr_up";
pub const AFRR_DOWN: &str = "afrr_down";
pub const MFRR_UP: &str = "mfrr_up";
pub const MFRR_DOWN: &str = "mfrr_down";
pub const ID_QH_VWAP: &str = "ID_QH_VWAP";
pub const LOAD_FCST: &str = "load_fcst";
pub const LOAD_REAL: &str = "load_real";
pub const SOLAR_FCST: &str = "solar_fcst";
pub const SOLAR_REAL: &str = "solar_real";
pub const WIND_FCST: &str = "wind_fcst";
pub const WIND_REAL: &str = "wind_real";
pub const NUCLEAR_REAL: &str = "nuclear_real";
pub const FOSSIL_GAS_REAL: &str = "fossil_gas_real";

pub const REQUIRED_RAW_COLUMNS: [&str; 16] = [
    IMB_VOLUME,
    IMB_PRICE_POS,
    IMB_PRICE_NEG,
    AFRR_UP,
    AFRR_DOWN,
    MFRR_UP,
    MFRR_DOWN,
    ID_QH_VWAP,
    LOAD_FCST,
    LOAD_REAL,
    SOLAR_FCST,
    SOLAR_REAL,
    WIND_FCST,
    WIND_REAL,
    NUCLEAR_REAL,
    FOSSIL_GAS_REAL,
];

#[derive(Debug, Error, PartialEq)]
pub enum TableError {
    #[error("missing required columns: {0:?}")]
    MissingColumns(Vec<String>),
    #[error("column {name} has {found} values, index has {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("index is not ascending at row {row}: {previous} followed by {current}")]
    UnsortedIndex {
        row: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },
    #[error("duplicate timestamp {ts} at row {row}")]
    DuplicateTimestamp { row: usize, ts: DateTime<Utc> },
    #[error("duplicate column name {0}")]
    DuplicateColumn(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<f64>,
}

impl Column {
    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_nan()).count()
    }
}

/// Rows keyed by a UTC timestamp index; missing cells are `NaN`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObservationTable {
    index: Vec<DateTime<Utc>>,
    columns: Vec<Column>,
}

impl ObservationTable {
    pub fn new(index: Vec<DateTime<Utc>>) -> Self {
        Self {
            index,
            columns: Vec::new(),
        }
    }

    pub fn from_columns(
        index: Vec<DateTime<Utc>>,
        columns: Vec<(String, Vec<f64>)>,
    ) -> Result<Self, TableError> {
        let mut table = Self::new(index);
        for (name, values) in columns {
            if table.has_column(&name) {
                return Err(TableError::DuplicateColumn(name));
            }
            table.set_column(name, values)?;
        }
        Ok(table)
    }

    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn column(&self, name: &str) -> Result<&[f64], TableError> {
        self.position(name)
            .map(|idx| self.columns[idx].values.as_slice())
            .ok_or_else(|| TableError::MissingColumns(vec![name.to_string()]))
    }

    pub(crate) fn columns_mut(&mut self) -> impl Iterator<Item = &mut Column> {
        self.columns.iter_mut()
    }

    /// Replaces the values of an existing column in place, or appends a new one.
    pub fn set_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<(), TableError> {
        let name = name.into();
        if values.len() != self.index.len() {
            return Err(TableError::LengthMismatch {
                name,
                expected: self.index.len(),
                found: values.len(),
            });
        }
        match self.position(&name) {
            Some(idx) => self.columns[idx].values = values,
            None => self.columns.push(Column { name, values }),
        }
        Ok(())
    }

    pub fn drop_column(&mut self, name: &str) -> Option<Column> {
        self.position(name).map(|idx| self.columns.remove(idx))
    }

    /// Keeps the rows whose timestamp satisfies `keep`, preserving order.
    pub fn filter_rows(&self, keep: impl Fn(&DateTime<Utc>) -> bool) -> Self {
        let mask: Vec<bool> = self.index.iter().map(&keep).collect();
        let index = self
            .index
            .iter()
            .zip(&mask)
            .filter(|(_, k)| **k)
            .map(|(ts, _)| *ts)
            .collect();
        let columns = self
            .columns
            .iter()
            .map(|column| Column {
                name: column.name.clone(),
                values: column
                    .values
                    .iter()
                    .zip(&mask)
                    .filter(|(_, k)| **k)
                    .map(|(v, _)| *v)
                    .collect(),
            })
            .collect();
        Self { index, columns }
    }

    /// Fails fast unless the index is strictly increasing.
    pub fn validate_index(&self) -> Result<(), TableError> {
        for (row, pair) in self.index.windows(2).enumerate() {
            let (previous, current) = (pair[0], pair[1]);
            if current == previous {
                return Err(TableError::DuplicateTimestamp {
                    row: row + 1,
                    ts: current,
                });
            }
            if current < previous {
                return Err(TableError::UnsortedIndex {
                    row: row + 1,
                    previous,
                    current,
                });
            }
        }
        Ok(())
    }

    pub fn require_columns(&self, names: &[&str]) -> Result<(), TableError> {
        let missing: Vec<String> = names
            .iter()
            .filter(|name| !self.has_column(name))
            .map(|name| name.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(TableError::MissingColumns(missing))
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// Borrowed view over the raw input columns, resolved once at pipeline entry.
#[derive(Debug, Clone, Copy)]
pub struct RawColumns<'a> {
    pub imb_volume: &'a [f64],
    pub imb_price_pos: &'a [f64],
    pub imb_price_neg: &'a [f64],
    pub afrr_up: &'a [f64],
    pub afrr_down: &'a [f64],
    pub mfrr_up: &'a [f64],
    pub mfrr_down: &'a [f64],
    pub vwap: &'a [f64],
    pub load_fcst: &'a [f64],
    pub load_real: &'a [f64],
    pub solar_fcst: &'a [f64],
    pub solar_real: &'a [f64],
    pub wind_fcst: &'a [f64],
    pub wind_real: &'a [f64],
    pub nuclear_real: &'a [f64],
    pub fossil_gas_real: &'a [f64],
}

impl<'a> RawColumns<'a> {
    pub fn resolve(table: &'a ObservationTable) -> Result<Self, TableError> {
        table.require_columns(&REQUIRED_RAW_COLUMNS)?;
        Ok(Self {
            imb_volume: table.column(IMB_VOLUME)?,
            imb_price_pos: table.column(IMB_PRICE_POS)?,
            imb_price_neg: table.column(IMB_PRICE_NEG)?,
            afrr_up: table.column(AFRR_UP)?,
            afrr_down: table.column(AFRR_DOWN)?,
            mfrr_up: table.column(MFRR_UP)?,
            mfrr_down: table.column(MFRR_DOWN)?,
            vwap: table.column(ID_QH_VWAP)?,
            load_fcst: table.column(LOAD_FCST)?,
            load_real: table.column(LOAD_REAL)?,
            solar_fcst: table.column(SOLAR_FCST)?,
            solar_real: table.column(SOLAR_REAL)?,
            wind_fcst: table.column(WIND_FCST)?,
            wind_real: table.column(WIND_REAL)?,
            nuclear_real: table.column(NUCLEAR_REAL)?,
            fossil_gas_real: table.column(FOSSIL_GAS_REAL)?,
        })
    }

    pub fn len(&self) -> usize {
        self.imb_volume.len()
    }

    pub fn is_empty(&self) -> bool {
        self.imb_volume.is_empty()
    }
}
