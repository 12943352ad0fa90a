//! Economic signals derived from imbalance, reserve and price observations.

use tracing::warn;

use crate::table::{ObservationTable, RawColumns, TableError};

pub const LOAD_ERR: &str = "load_err";
pub const SOLAR_ERR: &str = "solar_err";
pub const WIND_ERR: &str = "wind_err";
pub const TOTAL_PROD: &str = "total_prod";
pub const TOTAL_RESERVES: &str = "total_reserves";
pub const TOTAL_DIFF: &str = "total_diff";
pub const SPREAD_LONG: &str = "spread_long";
pub const SPREAD_SHORT: &str = "spread_short";
pub const POSITION: &str = "position";
pub const HISTORICAL_SPREAD: &str = "historical_spread";
pub const TARGET_VOLUME: &str = "target_volume";
pub const IMBALANCE_STATUS: &str = "imbalance_status";
pub const PNL_OPTIMAL: &str = "PnL_optimal";
pub const AFRR_COVER_RATIO: &str = "afrr_cover_ratio";
pub const MFRR_COVER_RATIO: &str = "mfrr_cover_ratio";

/// Column order written by [`derive_signals`] and [`compute_coverage_ratios`].
pub const SIGNAL_COLUMNS: [&str; 15] = [
    LOAD_ERR,
    SOLAR_ERR,
    WIND_ERR,
    TOTAL_PROD,
    TOTAL_RESERVES,
    TOTAL_DIFF,
    SPREAD_LONG,
    SPREAD_SHORT,
    POSITION,
    HISTORICAL_SPREAD,
    TARGET_VOLUME,
    IMBALANCE_STATUS,
    PNL_OPTIMAL,
    AFRR_COVER_RATIO,
    MFRR_COVER_RATIO,
];

pub const DEFAULT_COVERAGE_EPSILON: f64 = 1e-5;
pub const DEFAULT_BALANCED_DEADZONE: f64 = 1e-3;
pub const DEFAULT_HISTORICAL_SPREAD_THRESHOLD: f64 = 5.0;
pub const DEFAULT_LOT_SIZE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalParams {
    pub balanced_deadzone: f64,
    pub spread_threshold: f64,
    pub historical_spread_threshold: f64,
    pub lot_size: f64,
    pub unclassified_position: i8,
}

impl Default for SignalParams {
    fn default() -> Self {
        Self {
            balanced_deadzone: DEFAULT_BALANCED_DEADZONE,
            spread_threshold: 0.0,
            historical_spread_threshold: DEFAULT_HISTORICAL_SPREAD_THRESHOLD,
            lot_size: DEFAULT_LOT_SIZE,
            unclassified_position: 0,
        }
    }
}

/// The raw values one row contributes to the imbalance and spread signals.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SignalRow {
    pub imb_volume: f64,
    pub afrr_up: f64,
    pub afrr_down: f64,
    pub mfrr_up: f64,
    pub mfrr_down: f64,
    pub imb_price_pos: f64,
    pub imb_price_neg: f64,
    pub vwap: f64,
}

impl SignalRow {
    pub fn at(raw: &RawColumns<'_>, i: usize) -> Self {
        Self {
            imb_volume: raw.imb_volume[i],
            afrr_up: raw.afrr_up[i],
            afrr_down: raw.afrr_down[i],
            mfrr_up: raw.mfrr_up[i],
            mfrr_down: raw.mfrr_down[i],
            imb_price_pos: raw.imb_price_pos[i],
            imb_price_neg: raw.imb_price_neg[i],
            vwap: raw.vwap[i],
        }
    }

    pub fn spread_long(&self) -> f64 {
        self.imb_price_pos - self.vwap
    }

    pub fn spread_short(&self) -> f64 {
        self.vwap - self.imb_price_neg
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignalSummary {
    pub unclassified_spread_rows: usize,
}

/// Whether aFRR plus mFRR capacity covers the imbalance: 1 covered, -1 short, 0 balanced.
///
/// aFRR absorbs first; mFRR must cover the residual. A positive imbalance
/// draws on the down products, a negative one on the up products.
pub fn coverage_status(row: &SignalRow, deadzone: f64) -> i8 {
    let imb = row.imb_volume;
    if imb.abs() < deadzone {
        return 0;
    }
    let (afrr, mfrr) = if imb > 0.0 {
        (row.afrr_down, row.mfrr_down)
    } else {
        (row.afrr_up, row.mfrr_up)
    };
    let residual = (imb.abs() - afrr).max(0.0);
    if residual <= mfrr {
        1
    } else {
        -1
    }
}

pub fn afrr_cover_ratio(row: &SignalRow, epsilon: f64) -> f64 {
    let imb = row.imb_volume;
    if imb > 0.0 {
        row.afrr_down / (imb.abs() + epsilon)
    } else if imb < 0.0 {
        row.afrr_up / (imb.abs() + epsilon)
    } else {
        0.0
    }
}

pub fn mfrr_cover_ratio(row: &SignalRow, epsilon: f64) -> f64 {
    let imb = row.imb_volume;
    if imb > 0.0 {
        let residual = (imb.abs() - row.afrr_down).max(0.0);
        row.mfrr_down / (residual + epsilon)
    } else if imb < 0.0 {
        let residual = (imb.abs() - row.afrr_up).max(0.0);
        row.mfrr_up / (residual + epsilon)
    } else {
        0.0
    }
}

/// Directional opportunity from the two spreads; `None` when no branch applies.
pub fn classify_spread(spread_long: f64, spread_short: f64, threshold: f64) -> Option<i8> {
    if spread_long > threshold && spread_short < -threshold {
        Some(1)
    } else if spread_short > threshold && spread_long < -threshold {
        Some(-1)
    } else if spread_long < 0.0 && spread_short < 0.0 {
        Some(0)
    } else {
        None
    }
}

/// Per-row weights `i / n`; grows toward 1 at the end of the table.
///
/// The first row weighs 0, so weights stay in `[0, 1)` and never decrease.
///
/// Depends on the size of the table it is computed over, so it must be
/// evaluated on the full sorted table, never on a subset.
pub fn historical_weights(n: usize) -> Vec<f64> {
    (0..n).map(|i| i as f64 / n as f64).collect()
}

pub fn historical_spread(row: &SignalRow, weight: f64, threshold: f64) -> f64 {
    if row.spread_long() > threshold {
        weight
    } else if row.spread_short() > threshold {
        -weight
    } else {
        0.0
    }
}

pub fn map_position_to_volume(position: f64, lot_size: f64) -> f64 {
    if position == 1.0 {
        lot_size
    } else if position == -1.0 {
        -lot_size
    } else {
        0.0
    }
}

/// PnL had the ex-post optimal position been taken.
pub fn pnl_optimal(position: f64, spread_long: f64, spread_short: f64, target_volume: f64) -> f64 {
    if position == 1.0 {
        (spread_long * target_volume).abs()
    } else if position == -1.0 {
        (spread_short * target_volume).abs()
    } else {
        0.0
    }
}

/// Scores a predicted trade size against the realized spreads.
pub fn realized_pnl(spread_long: f64, spread_short: f64, prediction: f64, max_volume: f64) -> f64 {
    if prediction > 0.0 && prediction <= max_volume {
        spread_long * prediction
    } else if prediction >= -max_volume && prediction < 0.0 {
        -spread_short * prediction
    } else {
        0.0
    }
}

/// Realized PnL for each row of an enriched table given one prediction per row.
pub fn compute_realized_pnl(
    table: &ObservationTable,
    predictions: &[f64],
    max_volume: f64,
) -> Result<Vec<f64>, TableError> {
    if predictions.len() != table.len() {
        return Err(TableError::LengthMismatch {
            name: "prediction".to_string(),
            expected: table.len(),
            found: predictions.len(),
        });
    }
    let long = table.column(SPREAD_LONG)?;
    let short = table.column(SPREAD_SHORT)?;
    Ok(predictions
        .iter()
        .enumerate()
        .map(|(i, p)| realized_pnl(long[i], short[i], *p, max_volume))
        .collect())
}

/// Forecast errors and production/reserve aggregates.
pub fn derive_error_and_aggregates(table: &mut ObservationTable) -> Result<(), TableError> {
    let raw = RawColumns::resolve(table)?;
    let n = raw.len();

    let load_err = diff(raw.load_fcst, raw.load_real);
    let solar_err = diff(raw.solar_fcst, raw.solar_real);
    let wind_err = diff(raw.wind_fcst, raw.wind_real);
    let total_prod: Vec<f64> = (0..n)
        .map(|i| raw.nuclear_real[i] + raw.fossil_gas_real[i] + raw.solar_real[i] + raw.wind_real[i])
        .collect();
    let total_reserves: Vec<f64> = (0..n)
        .map(|i| raw.afrr_up[i] + raw.afrr_down[i] + raw.mfrr_up[i] + raw.mfrr_down[i])
        .collect();
    let total_diff = diff(&total_prod, raw.load_real);

    table.set_column(LOAD_ERR, load_err)?;
    table.set_column(SOLAR_ERR, solar_err)?;
    table.set_column(WIND_ERR, wind_err)?;
    table.set_column(TOTAL_PROD, total_prod)?;
    table.set_column(TOTAL_RESERVES, total_reserves)?;
    table.set_column(TOTAL_DIFF, total_diff)?;
    Ok(())
}

/// Spreads, position, historical spread, target volume, imbalance status and optimal PnL.
///
/// Each column feeds the next, so the order here is fixed.
pub fn derive_signals(
    table: &mut ObservationTable,
    params: &SignalParams,
) -> Result<SignalSummary, TableError> {
    let raw = RawColumns::resolve(table)?;
    let n = raw.len();
    let rows: Vec<SignalRow> = (0..n).map(|i| SignalRow::at(&raw, i)).collect();

    let spread_long: Vec<f64> = rows.iter().map(SignalRow::spread_long).collect();
    let spread_short: Vec<f64> = rows.iter().map(SignalRow::spread_short).collect();

    let mut summary = SignalSummary::default();
    let position: Vec<f64> = spread_long
        .iter()
        .zip(&spread_short)
        .map(|(long, short)| {
            classify_spread(*long, *short, params.spread_threshold).unwrap_or_else(|| {
                summary.unclassified_spread_rows += 1;
                params.unclassified_position
            }) as f64
        })
        .collect();
    if summary.unclassified_spread_rows > 0 {
        warn!(
            component = "features",
            event = "features.spread.unclassified",
            rows = summary.unclassified_spread_rows,
            default_position = params.unclassified_position
        );
    }

    let weights = historical_weights(n);
    let historical: Vec<f64> = rows
        .iter()
        .zip(&weights)
        .map(|(row, w)| historical_spread(row, *w, params.historical_spread_threshold))
        .collect();

    let target_volume: Vec<f64> = position
        .iter()
        .map(|p| map_position_to_volume(*p, params.lot_size))
        .collect();
    let status: Vec<f64> = rows
        .iter()
        .map(|row| coverage_status(row, params.balanced_deadzone) as f64)
        .collect();
    let pnl: Vec<f64> = (0..n)
        .map(|i| pnl_optimal(position[i], spread_long[i], spread_short[i], target_volume[i]))
        .collect();

    table.set_column(SPREAD_LONG, spread_long)?;
    table.set_column(SPREAD_SHORT, spread_short)?;
    table.set_column(POSITION, position)?;
    table.set_column(HISTORICAL_SPREAD, historical)?;
    table.set_column(TARGET_VOLUME, target_volume)?;
    table.set_column(IMBALANCE_STATUS, status)?;
    table.set_column(PNL_OPTIMAL, pnl)?;
    Ok(summary)
}

pub fn compute_coverage_ratios(table: &mut ObservationTable, epsilon: f64) -> Result<(), TableError> {
    let raw = RawColumns::resolve(table)?;
    let rows: Vec<SignalRow> = (0..raw.len()).map(|i| SignalRow::at(&raw, i)).collect();
    let afrr = rows.iter().map(|r| afrr_cover_ratio(r, epsilon)).collect();
    let mfrr = rows.iter().map(|r| mfrr_cover_ratio(r, epsilon)).collect();

    table.set_column(AFRR_COVER_RATIO, afrr)?;
    table.set_column(MFRR_COVER_RATIO, mfrr)?;
    Ok(())
}

fn diff(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x - y).collect()
}
