//! Feature engineering for imbalance-market trading signals.
//!
//! Implemented scope:
//! - time-weighted gap filling and forward fill
//! - spread, reserve-coverage and PnL signals
//! - calendar fields and leakage-safe lags
//! - feature schema fingerprinting, CSV adapter, diagnostics and train/test split

mod calendar;
mod diagnostics;
mod features;
mod gap_fill;
mod lags;
mod loader;
mod observability;
mod signals;
mod split;
mod table;

pub use calendar::{add_calendar_features, CALENDAR_COLUMNS};
pub use diagnostics::{missing_values_summary, MissingValueEntry, MissingValueSummary};
pub use features::{
    add_all_features, assert_schema_compatible, build_feature_schema, run_pipeline,
    run_pipeline_to_schema, select_schema_columns, validate_config, FeatureColumn, FeatureDType,
    FeatureError, FeatureReport, FeatureSchema, PipelineConfig, FEATURE_SCHEMA_VERSION,
};
pub use gap_fill::{forward_fill, interpolate_time, interpolate_time_counted};
pub use lags::{
    lag_features, lag_series, lagged_column_name, LagEntry, LagSpec, DEFAULT_LAGGED_SIGNALS,
    DEFAULT_LAG_OFFSETS,
};
pub use loader::{
    read_observation_csv, read_observation_csv_from, write_feature_csv, write_feature_csv_to,
    LoadError,
};
pub use observability::{
    init_logging, log_app_start, log_config_selected, log_run_complete, logging_config_from_env,
    LogFormat, LoggingConfig, LoggingInitError,
};
pub use signals::{
    afrr_cover_ratio, classify_spread, compute_coverage_ratios, compute_realized_pnl,
    coverage_status, derive_error_and_aggregates, derive_signals, historical_spread,
    historical_weights, map_position_to_volume, mfrr_cover_ratio, pnl_optimal, realized_pnl,
    SignalParams, SignalRow, SignalSummary, DEFAULT_BALANCED_DEADZONE, DEFAULT_COVERAGE_EPSILON,
    DEFAULT_HISTORICAL_SPREAD_THRESHOLD, DEFAULT_LOT_SIZE, SIGNAL_COLUMNS,
};
pub use split::{split_train_test, SplitBoundaries};
pub use table::{Column, ObservationTable, RawColumns, TableError, REQUIRED_RAW_COLUMNS};
