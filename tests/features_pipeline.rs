use chrono::{DateTime, Duration, TimeZone, Utc};
use imbalance_features::{
    add_all_features, assert_schema_compatible, build_feature_schema, compute_realized_pnl,
    lagged_column_name, run_pipeline, run_pipeline_to_schema, select_schema_columns,
    split_train_test, FeatureError, LagSpec, ObservationTable, PipelineConfig, SplitBoundaries,
    TableError, DEFAULT_LAGGED_SIGNALS, DEFAULT_LAG_OFFSETS, FEATURE_SCHEMA_VERSION,
    REQUIRED_RAW_COLUMNS,
};

const ROWS: usize = 10;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0)
        .single()
        .expect("valid start timestamp")
}

fn hourly_index(n: usize) -> Vec<DateTime<Utc>> {
    (0..n).map(|i| start() + Duration::hours(i as i64)).collect()
}

fn raw_values(name: &str) -> Vec<f64> {
    match name {
        "imb_volume" => vec![5.0, -3.0, 0.0, 0.0005, 8.0, -12.0, 2.0, -0.5, 15.0, -7.0],
        "imb_price_pos" => vec![110.0, 95.0, 98.0, 120.0, 101.0, 90.0, 100.0, 107.0, 99.0, 104.0],
        "imb_price_neg" => vec![105.0, 92.0, 103.0, 80.0, 97.0, 96.0, 100.0, 99.0, 102.0, 98.0],
        "ID_QH_VWAP" => vec![100.0; ROWS],
        "afrr_up" => vec![1.0, 1.0, 2.0, 0.0, 3.0, 4.0, 1.0, 0.2, 2.0, 5.0],
        "afrr_down" => vec![2.0, 0.5, 1.0, 0.0, 6.0, 1.0, 3.0, 1.0, 4.0, 2.0],
        "mfrr_up" => vec![0.0, 5.0, 0.0, 0.0, 1.0, 6.0, 0.0, 0.0, 0.0, 1.0],
        "mfrr_down" => vec![10.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 5.0, 0.0],
        other => (0..ROWS)
            .map(|i| 1_000.0 + other.len() as f64 * 10.0 + i as f64 * 3.0)
            .collect(),
    }
}

fn raw_table() -> ObservationTable {
    let columns = REQUIRED_RAW_COLUMNS
        .iter()
        .map(|name| (name.to_string(), raw_values(name)))
        .collect();
    ObservationTable::from_columns(hourly_index(ROWS), columns).expect("raw table builds")
}

fn col<'a>(table: &'a ObservationTable, name: &str) -> &'a [f64] {
    table.column(name).expect("column must exist")
}

#[test]
fn end_to_end_example_matches_expected_values() {
    let raw = raw_table();
    let (out, report) = add_all_features(&raw, &PipelineConfig::default()).expect("pipeline runs");

    let status = col(&out, "imbalance_status");
    // residual 5 - 2 = 3 <= mfrr_down 10
    assert_eq!(status[0], 1.0);
    // residual 3 - 1 = 2 <= mfrr_up 5
    assert_eq!(status[1], 1.0);
    assert_eq!(status[2], 0.0);
    assert_eq!(status[3], 0.0);
    // residual 8 - 6 = 2 > mfrr_down 1
    assert_eq!(status[4], -1.0);

    let afrr = col(&out, "afrr_cover_ratio");
    assert!((afrr[0] - 2.0 / 5.00001).abs() < 1e-12);
    assert_eq!(afrr[2], 0.0);
    let mfrr = col(&out, "mfrr_cover_ratio");
    assert!((mfrr[0] - 10.0 / 3.00001).abs() < 1e-12);

    assert_eq!(report.input_rows, ROWS as u64);
    assert_eq!(report.output_rows, ROWS as u64);
    assert_eq!(report.lagged_columns, 81);
    assert_eq!(report.output_columns, 16 + 15 + 8 + 81);
}

#[test]
fn aggregates_and_spreads_are_derived_from_raw_columns() {
    let (out, _) = add_all_features(&raw_table(), &PipelineConfig::default()).expect("pipeline");

    for i in 0..ROWS {
        let load_err = col(&out, "load_fcst")[i] - col(&out, "load_real")[i];
        assert_eq!(col(&out, "load_err")[i], load_err);
        let prod = col(&out, "nuclear_real")[i]
            + col(&out, "fossil_gas_real")[i]
            + col(&out, "solar_real")[i]
            + col(&out, "wind_real")[i];
        assert_eq!(col(&out, "total_prod")[i], prod);
        assert_eq!(col(&out, "total_diff")[i], prod - col(&out, "load_real")[i]);
        let reserves = col(&out, "afrr_up")[i]
            + col(&out, "afrr_down")[i]
            + col(&out, "mfrr_up")[i]
            + col(&out, "mfrr_down")[i];
        assert_eq!(col(&out, "total_reserves")[i], reserves);
    }

    assert_eq!(&col(&out, "spread_long")[..3], &[10.0, -5.0, -2.0]);
    assert_eq!(&col(&out, "spread_short")[..3], &[-5.0, 8.0, -3.0]);
}

#[test]
fn position_volume_and_optimal_pnl_are_consistent() {
    let (out, report) = add_all_features(&raw_table(), &PipelineConfig::default()).expect("pipeline");

    let position = col(&out, "position");
    assert_eq!(
        position,
        &[1.0, -1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0]
    );
    // rows 3, 4, 6, 7 and 9 have no spread regime
    assert_eq!(report.unclassified_spread_rows, 5);

    let volume = col(&out, "target_volume");
    let pnl = col(&out, "PnL_optimal");
    let long = col(&out, "spread_long");
    let short = col(&out, "spread_short");
    for i in 0..ROWS {
        assert_eq!(volume[i], position[i] * 10.0);
        assert!(pnl[i] >= 0.0);
        let expected = match position[i] as i8 {
            1 => (long[i] * volume[i]).abs(),
            -1 => (short[i] * volume[i]).abs(),
            _ => 0.0,
        };
        assert_eq!(pnl[i], expected);
    }
    assert_eq!(pnl[0], 100.0);
    assert_eq!(pnl[1], 80.0);
}

#[test]
fn unclassified_rows_take_configured_default() {
    let cfg = PipelineConfig {
        unclassified_position: -1,
        ..PipelineConfig::default()
    };
    let (out, _) = add_all_features(&raw_table(), &cfg).expect("pipeline");

    let position = col(&out, "position");
    assert_eq!(position[3], -1.0);
    assert_eq!(position[2], 0.0);
    assert_eq!(col(&out, "target_volume")[3], -10.0);
    assert_eq!(col(&out, "PnL_optimal")[3], 200.0);
}

#[test]
fn cover_ratios_are_finite_and_non_negative() {
    let (out, _) = add_all_features(&raw_table(), &PipelineConfig::default()).expect("pipeline");

    for name in ["afrr_cover_ratio", "mfrr_cover_ratio"] {
        for value in col(&out, name) {
            assert!(value.is_finite(), "{name} has non-finite value {value}");
            assert!(*value >= 0.0, "{name} has negative value {value}");
        }
    }
}

#[test]
fn historical_spread_uses_table_wide_ordinal_weights() {
    let (out, _) = add_all_features(&raw_table(), &PipelineConfig::default()).expect("pipeline");
    let hist = col(&out, "historical_spread");

    // long 10 > 5 at row 0 carries weight 0
    assert_eq!(hist[0], 0.0);
    assert!((hist[1] + 0.1).abs() < 1e-12);
    assert_eq!(hist[2], 0.0);
    assert!((hist[3] - 0.3).abs() < 1e-12);
    assert!((hist[7] - 0.7).abs() < 1e-12);
}

#[test]
fn historical_spread_magnitude_grows_with_position() {
    let mut raw = raw_table();
    raw.set_column("imb_price_pos", vec![90.0; ROWS])
        .expect("set pos");
    raw.set_column("imb_price_neg", vec![80.0; ROWS])
        .expect("set neg");

    let (out, _) = add_all_features(&raw, &PipelineConfig::default()).expect("pipeline");
    let hist = col(&out, "historical_spread");
    for pair in hist.windows(2) {
        assert!(pair[1].abs() >= pair[0].abs());
    }
    assert!(hist.iter().all(|v| *v <= 0.0 && *v > -1.0));
}

#[test]
fn lagged_columns_shift_with_same_row_fallback() {
    let (out, _) = add_all_features(&raw_table(), &PipelineConfig::default()).expect("pipeline");

    for name in DEFAULT_LAGGED_SIGNALS {
        let source = col(&out, name);
        for k in DEFAULT_LAG_OFFSETS {
            let lagged = col(&out, &lagged_column_name(name, k));
            for i in 0..ROWS {
                let expected = if i >= k { source[i - k] } else { source[i] };
                assert_eq!(lagged[i], expected, "{name} lag {k} row {i}");
            }
        }
    }
}

#[test]
fn calendar_fields_follow_index() {
    let (out, _) = add_all_features(&raw_table(), &PipelineConfig::default()).expect("pipeline");

    assert_eq!(&col(&out, "hour")[..3], &[0.0, 1.0, 2.0]);
    // 2024-03-04 is a Monday in ISO week 10
    assert!(col(&out, "dayofweek").iter().all(|v| *v == 0.0));
    assert!(col(&out, "weekofyear").iter().all(|v| *v == 10.0));
    assert!(col(&out, "dayofyear").iter().all(|v| *v == 64.0));
    assert!(col(&out, "quarter").iter().all(|v| *v == 1.0));
}

#[test]
fn pipeline_does_not_touch_callers_table() {
    let raw = raw_table();
    let before = raw.clone();
    let _ = add_all_features(&raw, &PipelineConfig::default()).expect("pipeline");
    assert_eq!(raw, before);
}

#[test]
fn run_pipeline_interpolates_before_deriving() {
    let mut raw = raw_table();
    let mut vwap = vec![100.0; ROWS];
    vwap[0] = f64::NAN;
    vwap[4] = f64::NAN;
    raw.set_column("ID_QH_VWAP", vwap).expect("set vwap");
    let mut load = raw_values("load_real");
    load[ROWS - 1] = f64::NAN;
    raw.set_column("load_real", load).expect("set load");

    let (out, report) = run_pipeline(&raw, &PipelineConfig::default()).expect("pipeline");
    assert_eq!(report.interpolated_cells, 3);
    assert!(out
        .columns()
        .iter()
        .all(|c| c.values.iter().all(|v| !v.is_nan())));
    assert_eq!(col(&out, "ID_QH_VWAP")[4], 100.0);
    assert_eq!(col(&out, "load_real")[ROWS - 1], col(&out, "load_real")[ROWS - 2]);
}

#[test]
fn add_all_features_forward_fills_remaining_gaps() {
    let mut raw = raw_table();
    let mut wind = raw_values("wind_real");
    wind[5] = f64::NAN;
    raw.set_column("wind_real", wind.clone()).expect("set wind");

    let cfg = PipelineConfig {
        interpolate_gaps: false,
        ..PipelineConfig::default()
    };
    let (out, report) = run_pipeline(&raw, &cfg).expect("pipeline");

    assert_eq!(report.interpolated_cells, 0);
    assert!(report.forward_filled_cells > 0);
    assert_eq!(col(&out, "wind_real")[5], wind[4]);
    assert_eq!(col(&out, "total_prod")[5], col(&out, "total_prod")[4]);
}

#[test]
fn missing_raw_column_fails_fast() {
    let mut raw = raw_table();
    raw.drop_column("mfrr_up");

    let err = add_all_features(&raw, &PipelineConfig::default()).expect_err("must fail");
    match err {
        FeatureError::Table(TableError::MissingColumns(missing)) => {
            assert_eq!(missing, vec!["mfrr_up".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unsorted_index_fails_fast() {
    let mut index = hourly_index(ROWS);
    index.swap(2, 3);
    let columns = REQUIRED_RAW_COLUMNS
        .iter()
        .map(|name| (name.to_string(), raw_values(name)))
        .collect();
    let raw = ObservationTable::from_columns(index, columns).expect("table builds");

    let err = run_pipeline(&raw, &PipelineConfig::default()).expect_err("must fail");
    assert!(matches!(
        err,
        FeatureError::Table(TableError::UnsortedIndex { row: 3, .. })
    ));
}

#[test]
fn schema_matches_pipeline_output_and_is_deterministic() {
    let cfg = PipelineConfig::default();
    let schema_a = build_feature_schema(&cfg);
    let schema_b = build_feature_schema(&cfg);
    assert_eq!(schema_a, schema_b);
    assert_eq!(schema_a.version, FEATURE_SCHEMA_VERSION);

    let (out, _) = add_all_features(&raw_table(), &cfg).expect("pipeline");
    let schema_names: Vec<&str> = schema_a.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(schema_names, out.column_names());

    let selected = select_schema_columns(&out, &schema_a).expect("select");
    assert_eq!(selected, out);

    assert_schema_compatible(FEATURE_SCHEMA_VERSION, &schema_a.fingerprint, &schema_a)
        .expect("compatible");
    let other = build_feature_schema(&PipelineConfig {
        lags: LagSpec::uniform(&["imb_volume"], &[1]),
        ..PipelineConfig::default()
    });
    assert_ne!(other.fingerprint, schema_a.fingerprint);
    assert!(matches!(
        assert_schema_compatible(FEATURE_SCHEMA_VERSION, &other.fingerprint, &schema_a),
        Err(FeatureError::SchemaFingerprintMismatch { .. })
    ));
    assert!(matches!(
        assert_schema_compatible(FEATURE_SCHEMA_VERSION + 1, &schema_a.fingerprint, &schema_a),
        Err(FeatureError::SchemaVersionMismatch { .. })
    ));
}

#[test]
fn schema_output_ignores_input_column_order_and_extras() {
    let cfg = PipelineConfig::default();
    let mut columns: Vec<(String, Vec<f64>)> = REQUIRED_RAW_COLUMNS
        .iter()
        .rev()
        .map(|name| (name.to_string(), raw_values(name)))
        .collect();
    columns.push(("extra".to_string(), vec![1.0; ROWS]));
    let raw = ObservationTable::from_columns(hourly_index(ROWS), columns).expect("raw table");

    let (out, report, schema) = run_pipeline_to_schema(&raw, &cfg).expect("pipeline");
    let schema_names: Vec<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(out.column_names(), schema_names);
    assert!(!out.has_column("extra"));
    assert_eq!(report.output_columns, schema.columns.len() as u64);
    assert_eq!(schema, build_feature_schema(&cfg));

    let (reference, _) = run_pipeline(&raw_table(), &cfg).expect("reference pipeline");
    for name in ["imb_volume", "imbalance_status", "PnL_optimal", "hour"] {
        assert_eq!(col(&out, name), col(&reference, name), "column {name}");
    }
}

#[test]
fn realized_pnl_scores_predictions_against_spreads() {
    let (out, _) = add_all_features(&raw_table(), &PipelineConfig::default()).expect("pipeline");
    let mut predictions = vec![0.0; ROWS];
    predictions[0] = 10.0;
    predictions[1] = -5.0;
    predictions[2] = 12.0;

    let pnl = compute_realized_pnl(&out, &predictions, 10.0).expect("pnl");
    assert_eq!(pnl[0], 100.0);
    assert_eq!(pnl[1], 40.0);
    assert_eq!(pnl[2], 0.0);

    let err = compute_realized_pnl(&out, &predictions[..3], 10.0).expect_err("length mismatch");
    assert!(matches!(err, TableError::LengthMismatch { .. }));
}

#[test]
fn split_applies_half_open_boundaries_to_enriched_table() {
    let (out, _) = add_all_features(&raw_table(), &PipelineConfig::default()).expect("pipeline");
    let bounds = SplitBoundaries {
        test_start: start() + Duration::hours(6),
        train_end: start() + Duration::hours(6),
    };

    let (train, test) = split_train_test(&out, &bounds);
    assert_eq!(train.len(), 6);
    assert_eq!(test.len(), 4);
    assert_eq!(test.index()[0], start() + Duration::hours(6));
    assert_eq!(train.column_names(), out.column_names());
}
