//! Missing-value summary for inspecting a table before and after filling.

use std::fmt;

use serde::Serialize;
use tracing::info;

use crate::table::ObservationTable;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingValueEntry {
    pub variable: String,
    pub missing_count: usize,
    pub missing_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingValueSummary {
    pub name: String,
    pub total_rows: usize,
    /// Sorted by `missing_pct` descending; ties keep column order.
    pub entries: Vec<MissingValueEntry>,
}

impl MissingValueSummary {
    pub fn total_missing(&self) -> usize {
        self.entries.iter().map(|e| e.missing_count).sum()
    }
}

pub fn missing_values_summary(table: &ObservationTable, name: &str) -> MissingValueSummary {
    let total_rows = table.len();
    let mut entries: Vec<MissingValueEntry> = table
        .columns()
        .iter()
        .map(|column| {
            let missing_count = column.missing_count();
            let missing_pct = if total_rows == 0 {
                0.0
            } else {
                missing_count as f64 / total_rows as f64 * 100.0
            };
            MissingValueEntry {
                variable: column.name.clone(),
                missing_count,
                missing_pct,
            }
        })
        .collect();
    entries.sort_by(|a, b| b.missing_pct.total_cmp(&a.missing_pct));

    let summary = MissingValueSummary {
        name: name.to_string(),
        total_rows,
        entries,
    };
    info!(
        component = "diagnostics",
        event = "diagnostics.missing_values",
        table = name,
        rows = total_rows,
        missing_cells = summary.total_missing()
    );
    summary
}

impl fmt::Display for MissingValueSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Missing Value summary for {} (Total rows : {})",
            self.name, self.total_rows
        )?;
        let width = self
            .entries
            .iter()
            .map(|e| e.variable.len())
            .chain(std::iter::once("Variable".len()))
            .max()
            .unwrap_or(0);
        writeln!(
            f,
            "{:<width$}  {:>13}  {:>17}",
            "Variable", "Missing Count", "Missing Value (%)"
        )?;
        for entry in &self.entries {
            writeln!(
                f,
                "{:<width$}  {:>13}  {:>17.4}",
                entry.variable, entry.missing_count, entry.missing_pct
            )?;
        }
        Ok(())
    }
}
