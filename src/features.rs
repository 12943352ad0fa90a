//! Raw observations to enriched feature table.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::calendar::{add_calendar_features, CALENDAR_COLUMNS};
use crate::gap_fill::{forward_fill, interpolate_time_counted};
use crate::lags::{lag_features, lagged_column_name, LagSpec};
use crate::signals::{
    compute_coverage_ratios, derive_error_and_aggregates, derive_signals, SignalParams,
    DEFAULT_BALANCED_DEADZONE, DEFAULT_COVERAGE_EPSILON, DEFAULT_HISTORICAL_SPREAD_THRESHOLD,
    DEFAULT_LOT_SIZE, SIGNAL_COLUMNS,
};
use crate::table::{ObservationTable, TableError, REQUIRED_RAW_COLUMNS};

pub const FEATURE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub coverage_epsilon: f64,
    pub balanced_deadzone: f64,
    pub spread_threshold: f64,
    pub historical_spread_threshold: f64,
    pub lot_size: f64,
    /// Position assigned when neither spread regime applies.
    pub unclassified_position: i8,
    pub lags: LagSpec,
    pub drop_lag_sources: bool,
    pub interpolate_gaps: bool,
    pub calendar_timezone: String,
    pub schema_version: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            coverage_epsilon: DEFAULT_COVERAGE_EPSILON,
            balanced_deadzone: DEFAULT_BALANCED_DEADZONE,
            spread_threshold: 0.0,
            historical_spread_threshold: DEFAULT_HISTORICAL_SPREAD_THRESHOLD,
            lot_size: DEFAULT_LOT_SIZE,
            unclassified_position: 0,
            lags: LagSpec::default(),
            drop_lag_sources: false,
            interpolate_gaps: true,
            calendar_timezone: "UTC".to_string(),
            schema_version: FEATURE_SCHEMA_VERSION,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, FeatureError> {
        let cfg: Self = serde_json::from_str(raw)?;
        validate_config(&cfg)?;
        Ok(cfg)
    }

    pub fn signal_params(&self) -> SignalParams {
        SignalParams {
            balanced_deadzone: self.balanced_deadzone,
            spread_threshold: self.spread_threshold,
            historical_spread_threshold: self.historical_spread_threshold,
            lot_size: self.lot_size,
            unclassified_position: self.unclassified_position,
        }
    }

    pub fn timezone(&self) -> Result<Tz, FeatureError> {
        self.calendar_timezone
            .parse::<Tz>()
            .map_err(|_| FeatureError::UnknownTimezone(self.calendar_timezone.clone()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureDType {
    F64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub dtype: FeatureDType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub fingerprint: String,
    pub columns: Vec<FeatureColumn>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureReport {
    pub input_rows: u64,
    pub output_rows: u64,
    pub output_columns: u64,
    pub interpolated_cells: u64,
    pub forward_filled_cells: u64,
    pub unclassified_spread_rows: u64,
    pub lagged_columns: u64,
}

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("invalid pipeline config: {0}")]
    InvalidConfig(String),
    #[error("pipeline config is not valid JSON: {0}")]
    ConfigJson(#[from] serde_json::Error),
    #[error("unknown calendar timezone: {0}")]
    UnknownTimezone(String),
    #[error("schema version mismatch: expected {expected}, got {actual}")]
    SchemaVersionMismatch { expected: u32, actual: u32 },
    #[error("schema fingerprint mismatch: expected {expected}, got {actual}")]
    SchemaFingerprintMismatch { expected: String, actual: String },
}

/// Optional time interpolation followed by [`add_all_features`].
pub fn run_pipeline(
    table: &ObservationTable,
    cfg: &PipelineConfig,
) -> Result<(ObservationTable, FeatureReport), FeatureError> {
    validate_config(cfg)?;
    if !cfg.interpolate_gaps {
        return add_all_features(table, cfg);
    }

    let (filled, interpolated) = interpolate_time_counted(table)?;
    info!(
        component = "features",
        event = "features.gap_fill.interpolated",
        rows = table.len(),
        cells = interpolated
    );
    let (out, mut report) = add_all_features(&filled, cfg)?;
    report.interpolated_cells = interpolated as u64;
    Ok((out, report))
}

/// [`run_pipeline`] with the output restricted to, and ordered by, the
/// fingerprinted schema. Input column order and extra input columns do not
/// change the layout.
pub fn run_pipeline_to_schema(
    table: &ObservationTable,
    cfg: &PipelineConfig,
) -> Result<(ObservationTable, FeatureReport, FeatureSchema), FeatureError> {
    let (enriched, mut report) = run_pipeline(table, cfg)?;
    let schema = build_feature_schema(cfg);
    let out = select_schema_columns(&enriched, &schema)?;

    let dropped = enriched.columns().len() - out.columns().len();
    if dropped > 0 {
        info!(
            component = "features",
            event = "features.schema.extra_columns_dropped",
            dropped = dropped
        );
    }
    report.output_columns = out.columns().len() as u64;
    Ok((out, report, schema))
}

/// Derives every feature column on a copy of `table`.
///
/// Stages run in a fixed order: forecast errors and aggregates, spread
/// signals, coverage ratios, calendar fields, lags, then a forward fill.
/// Applying it to its own output recomputes the derived columns in place.
pub fn add_all_features(
    table: &ObservationTable,
    cfg: &PipelineConfig,
) -> Result<(ObservationTable, FeatureReport), FeatureError> {
    validate_config(cfg)?;
    table.validate_index()?;
    table.require_columns(&REQUIRED_RAW_COLUMNS)?;
    let tz = cfg.timezone()?;

    info!(
        component = "features",
        event = "features.pipeline.start",
        rows = table.len(),
        columns = table.columns().len(),
        lag_signals = cfg.lags.entries.len(),
        timezone = %tz
    );

    let mut out = table.clone();
    derive_error_and_aggregates(&mut out)?;
    let signals = derive_signals(&mut out, &cfg.signal_params())?;
    compute_coverage_ratios(&mut out, cfg.coverage_epsilon)?;
    add_calendar_features(&mut out, tz)?;
    let lagged = lag_features(&mut out, &cfg.lags, cfg.drop_lag_sources)?;
    let forward_filled = forward_fill(&mut out);

    let report = FeatureReport {
        input_rows: table.len() as u64,
        output_rows: out.len() as u64,
        output_columns: out.columns().len() as u64,
        interpolated_cells: 0,
        forward_filled_cells: forward_filled as u64,
        unclassified_spread_rows: signals.unclassified_spread_rows as u64,
        lagged_columns: lagged as u64,
    };

    info!(
        component = "features",
        event = "features.pipeline.finish",
        output_rows = report.output_rows,
        output_columns = report.output_columns,
        forward_filled_cells = report.forward_filled_cells,
        unclassified_spread_rows = report.unclassified_spread_rows
    );

    Ok((out, report))
}

pub fn validate_config(cfg: &PipelineConfig) -> Result<(), FeatureError> {
    if !(cfg.coverage_epsilon > 0.0) {
        return Err(FeatureError::InvalidConfig(
            "coverage_epsilon must be > 0".to_string(),
        ));
    }
    if !(cfg.balanced_deadzone >= 0.0) {
        return Err(FeatureError::InvalidConfig(
            "balanced_deadzone must be >= 0".to_string(),
        ));
    }
    if !(cfg.spread_threshold >= 0.0) || !(cfg.historical_spread_threshold >= 0.0) {
        return Err(FeatureError::InvalidConfig(
            "spread thresholds must be >= 0".to_string(),
        ));
    }
    if !(cfg.lot_size > 0.0) {
        return Err(FeatureError::InvalidConfig(
            "lot_size must be > 0".to_string(),
        ));
    }
    if !(-1..=1).contains(&cfg.unclassified_position) {
        return Err(FeatureError::InvalidConfig(
            "unclassified_position must be -1, 0 or 1".to_string(),
        ));
    }
    if cfg.schema_version != FEATURE_SCHEMA_VERSION {
        return Err(FeatureError::InvalidConfig(format!(
            "schema_version must equal FEATURE_SCHEMA_VERSION ({FEATURE_SCHEMA_VERSION})"
        )));
    }
    cfg.lags.validate().map_err(FeatureError::InvalidConfig)?;
    cfg.timezone()?;
    Ok(())
}

/// Ordered feature layout produced for a table holding exactly the raw columns.
pub fn build_feature_schema(cfg: &PipelineConfig) -> FeatureSchema {
    let mut names: Vec<String> = REQUIRED_RAW_COLUMNS
        .iter()
        .chain(SIGNAL_COLUMNS.iter())
        .chain(CALENDAR_COLUMNS.iter())
        .map(|name| name.to_string())
        .collect();
    for entry in &cfg.lags.entries {
        for k in &entry.offsets {
            names.push(lagged_column_name(&entry.name, *k));
        }
        if cfg.drop_lag_sources {
            names.retain(|name| *name != entry.name);
        }
    }

    let columns: Vec<FeatureColumn> = names
        .into_iter()
        .map(|name| FeatureColumn {
            name,
            dtype: FeatureDType::F64,
        })
        .collect();
    let fingerprint = schema_fingerprint(cfg, &columns);

    info!(
        component = "features",
        event = "features.schema.built",
        version = cfg.schema_version,
        column_count = columns.len(),
        fingerprint = fingerprint
    );

    FeatureSchema {
        version: cfg.schema_version,
        fingerprint,
        columns,
    }
}

pub fn assert_schema_compatible(
    expected_version: u32,
    expected_fingerprint: &str,
    actual: &FeatureSchema,
) -> Result<(), FeatureError> {
    if expected_version != actual.version {
        return Err(FeatureError::SchemaVersionMismatch {
            expected: expected_version,
            actual: actual.version,
        });
    }

    if expected_fingerprint != actual.fingerprint {
        return Err(FeatureError::SchemaFingerprintMismatch {
            expected: expected_fingerprint.to_string(),
            actual: actual.fingerprint.clone(),
        });
    }

    Ok(())
}

/// Copy of `table` restricted to, and ordered by, the schema columns.
pub fn select_schema_columns(
    table: &ObservationTable,
    schema: &FeatureSchema,
) -> Result<ObservationTable, TableError> {
    let names: Vec<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();
    table.require_columns(&names)?;

    let mut out = ObservationTable::new(table.index().to_vec());
    for name in names {
        out.set_column(name, table.column(name)?.to_vec())?;
    }
    Ok(out)
}

fn schema_fingerprint(cfg: &PipelineConfig, columns: &[FeatureColumn]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{};", cfg.schema_version));
    hasher.update(format!(
        "epsilon:{};deadzone:{};spread_threshold:{};historical_threshold:{};lot:{};unclassified:{};tz:{};",
        cfg.coverage_epsilon,
        cfg.balanced_deadzone,
        cfg.spread_threshold,
        cfg.historical_spread_threshold,
        cfg.lot_size,
        cfg.unclassified_position,
        cfg.calendar_timezone
    ));
    hasher.update(";columns:");
    for column in columns {
        hasher.update(column.name.as_bytes());
        hasher.update(":f64;");
    }
    hex::encode(hasher.finalize())
}
